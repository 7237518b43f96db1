pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::*;
pub use error::*;
pub use identity::{mountpoint_to_number, parse_sr_info};
pub use types::*;

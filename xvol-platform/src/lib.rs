mod sim_host;
mod state;


use std::sync::Arc;
use xvol_core::{Config, Result};

pub use sim_host::SimHost;
pub use state::{HostState, SrRecord, VbdRecord, VdiRecord, VmRecord};

/// Opens the simulated host recorded at the configured state path.
pub async fn open_host(config: &Config) -> Result<Arc<SimHost>> {
    let path = config.state_path()?;
    Ok(Arc::new(SimHost::open(path).await?))
}

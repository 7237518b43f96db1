use std::path::Path;
use xvol_core::{ConnectionInfo, Result};

/// Reads connection info given inline as JSON or as `@path/to/file.json`.
pub fn parse_connection(arg: &str) -> Result<ConnectionInfo> {
    let content = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))?,
        None => arg.to_string(),
    };
    Ok(serde_json::from_str(&content)?)
}

pub fn format_age(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub supported_driver_types: Vec<String>,
    pub default_sr_description: String,
    pub compensation: CompensationPolicy,
    pub iscsi: IscsiConfig,
    pub state_file: Option<PathBuf>,
}

/// Which repositories an attach failure is allowed to forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationPolicy {
    /// Only repositories introduced by the failing call.
    CreatedOnly,
    /// Whatever repository the call resolved, including pre-existing ones.
    Always,
}

/// Fallbacks for connection data that carries no `target_portal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IscsiConfig {
    pub target_host: Option<String>,
    pub target_port: u16,
}

impl Default for IscsiConfig {
    fn default() -> Self {
        Self {
            target_host: None,
            target_port: 3260,
        }
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> crate::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)
                .map_err(|e| crate::XvolError::ConfigError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> crate::Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> crate::Result<()> {
        if let Some(config_dir) = config_path.parent() {
            std::fs::create_dir_all(config_dir)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| crate::XvolError::ConfigError(e.to_string()))?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    fn base_dir() -> crate::Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            crate::XvolError::ConfigError("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(".xvol"))
    }

    fn config_path() -> crate::Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.yaml"))
    }

    /// Where the simulated host keeps its records.
    pub fn state_path(&self) -> crate::Result<PathBuf> {
        match &self.state_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::base_dir()?.join("host.json")),
        }
    }

    pub fn is_supported_driver(&self, driver_type: &str) -> bool {
        self.supported_driver_types
            .iter()
            .any(|supported| supported == driver_type)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            supported_driver_types: vec!["iscsi".to_string(), "xensm".to_string()],
            default_sr_description: "Disk-for:unattached".to_string(),
            compensation: CompensationPolicy::CreatedOnly,
            iscsi: IscsiConfig::default(),
            state_file: None,
        }
    }
}

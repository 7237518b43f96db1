use thiserror::Error;

#[derive(Error, Debug)]
pub enum XvolError {
    #[error("Volume driver not supported: {driver_type}")]
    UnsupportedVolumeDriver { driver_type: String },

    #[error("Storage repository not found: {0}")]
    StorageRepoNotFound(String),

    #[error("Virtual disk not found: {0}")]
    VirtualDiskNotFound(String),

    #[error("No block device at slot {device_number} on VM {vm}")]
    DeviceNotFound { vm: String, device_number: u32 },

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Mountpoint cannot be translated: {0}")]
    InvalidMountpoint(String),

    #[error("Unable to obtain target information: {0}")]
    InvalidConnectionData(String),

    #[error("Remote operation {operation} failed: {message}")]
    RemoteOperationFailed { operation: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, XvolError>;

impl XvolError {
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        XvolError::RemoteOperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Backend-specific connection parameters, as handed over by the volume service.
pub type ConnectionData = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub driver_volume_type: String,
    #[serde(default)]
    pub data: ConnectionData,
}

impl ConnectionInfo {
    pub fn new(driver_volume_type: impl Into<String>, data: ConnectionData) -> Self {
        Self {
            driver_volume_type: driver_volume_type.into(),
            data,
        }
    }
}

/// Reads a scalar connection parameter as a string. Numbers and booleans are
/// rendered with their JSON spelling; null, arrays and objects yield `None`.
pub fn data_string(data: &ConnectionData, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

macro_rules! opaque_ref {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

opaque_ref!(
    /// Handle to a storage repository on the host.
    SrRef
);
opaque_ref!(
    /// Handle to a virtual disk image.
    VdiRef
);
opaque_ref!(
    /// Handle to a virtual block device (VDI <-> VM link).
    VbdRef
);
opaque_ref!(
    /// Handle to a VM record.
    VmRef
);

/// Identity of the storage repository backing a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageIdentity {
    pub uuid: String,
    pub label: String,
    pub params: BTreeMap<String, String>,
}

/// How a disk is located when it is introduced into a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VdiLocator {
    Uuid(String),
    Lun(String),
    /// Single-disk repositories: take whatever the scan finds first.
    FirstInRepo,
}

impl VdiLocator {
    /// Picks the locator from connection data: `vdi_uuid` wins over `target_lun`.
    pub fn from_connection_data(data: &ConnectionData) -> Self {
        if let Some(uuid) = data_string(data, "vdi_uuid") {
            VdiLocator::Uuid(uuid)
        } else if let Some(lun) = data_string(data, "target_lun") {
            VdiLocator::Lun(lun)
        } else {
            VdiLocator::FirstInRepo
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Running,
    Paused,
    Halted,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::Running => write!(f, "Running"),
            PowerState::Paused => write!(f, "Paused"),
            PowerState::Halted => write!(f, "Halted"),
        }
    }
}

/// Outcome of connecting a volume: the repository and disk it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConnection {
    pub sr_uuid: String,
    pub vdi_uuid: String,
}

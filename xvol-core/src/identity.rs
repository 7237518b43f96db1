//! Pure helpers that turn volume-service connection data into the names the
//! host understands: repository identity and device slot numbers.

use crate::config::IscsiConfig;
use crate::types::{ConnectionData, StorageIdentity, data_string};
use crate::{Result, XvolError};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

const SR_UUID_PREFIX: &str = "FA15E-D15C-";

/// Derives the repository uuid, label and introduce parameters for a
/// connection. `description` becomes `name_description` unless the
/// connection data carries its own.
pub fn parse_sr_info(
    data: &ConnectionData,
    description: &str,
    iscsi: &IscsiConfig,
) -> Result<StorageIdentity> {
    let volume_id = data_string(data, "volume_id");

    let (uuid, mut params) = match data_string(data, "sr_uuid") {
        Some(sr_uuid) => {
            let mut params = BTreeMap::new();
            if let Some(Value::Array(keys)) = data.get("introduce_sr_keys") {
                for key in keys.iter().filter_map(Value::as_str) {
                    if let Some(value) = data_string(data, key) {
                        params.insert(key.to_string(), value);
                    }
                }
            }
            (sr_uuid, params)
        }
        None => {
            let params = parse_volume_info(data, iscsi)?;
            let id = params.get("id").cloned().unwrap_or_default();
            (format!("{SR_UUID_PREFIX}{id}"), params)
        }
    };

    let label = data_string(data, "name_label").unwrap_or_else(|| {
        format!("tempSR-{}", volume_id.as_deref().unwrap_or(uuid.as_str()))
    });

    params.insert(
        "name_description".to_string(),
        data_string(data, "name_description").unwrap_or_else(|| description.to_string()),
    );

    Ok(StorageIdentity {
        uuid,
        label,
        params,
    })
}

fn parse_volume_info(
    data: &ConnectionData,
    iscsi: &IscsiConfig,
) -> Result<BTreeMap<String, String>> {
    let volume_id = data_string(data, "volume_id");
    let portal = data_string(data, "target_portal").filter(|p| !p.is_empty());
    let target_iqn = data_string(data, "target_iqn");

    let (target_host, target_port) = match portal.as_deref() {
        Some(portal) => match portal.rsplit_once(':') {
            Some((host, port)) => (Some(host.to_string()), port.to_string()),
            None => (Some(portal.to_string()), iscsi.target_port.to_string()),
        },
        None => (iscsi.target_host.clone(), iscsi.target_port.to_string()),
    };

    let (Some(volume_id), Some(target_host), Some(target_iqn)) =
        (volume_id, target_host, target_iqn)
    else {
        return Err(XvolError::InvalidConnectionData(format!(
            "volume_id, target host and target_iqn are required, got keys {:?}",
            data.keys().collect::<Vec<_>>()
        )));
    };

    let mut info = BTreeMap::new();
    info.insert("id".to_string(), volume_id);
    info.insert("target".to_string(), target_host);
    info.insert("port".to_string(), target_port);
    info.insert("targetIQN".to_string(), target_iqn);

    if data_string(data, "auth_method").as_deref() == Some("CHAP") {
        if let Some(user) = data_string(data, "auth_username") {
            info.insert("chapuser".to_string(), user);
        }
        if let Some(password) = data_string(data, "auth_password") {
            info.insert("chappassword".to_string(), password);
        }
    }

    Ok(info)
}

/// Translates a mountpoint like `/dev/xvdc` or `sdb` into a device slot.
pub fn mountpoint_to_number(mountpoint: &str) -> Result<u32> {
    let name = mountpoint.strip_prefix("/dev/").unwrap_or(mountpoint);

    let letter_slot = |prefix_len: usize| -> Option<u32> {
        let rest = name.get(prefix_len..)?;
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some(c @ 'a'..='p'), None) => Some(c as u32 - 'a' as u32),
            _ => None,
        }
    };

    let slot = if name.starts_with("hd") || name.starts_with("sd") {
        letter_slot(2)
    } else if name.starts_with("xvd") {
        letter_slot(3)
    } else if name.starts_with("vd") {
        letter_slot(2)
    } else if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    };

    slot.ok_or_else(|| {
        warn!("Mountpoint cannot be translated: {}", mountpoint);
        XvolError::InvalidMountpoint(mountpoint.to_string())
    })
}

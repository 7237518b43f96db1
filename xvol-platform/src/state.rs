use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xvol_core::{PowerState, SrRef, VbdRef, VdiRef, VmRef};

/// Every record the simulated host knows about, keyed by opaque ref.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostState {
    #[serde(default)]
    pub vms: BTreeMap<VmRef, VmRecord>,
    #[serde(default)]
    pub srs: BTreeMap<SrRef, SrRecord>,
    #[serde(default)]
    pub vdis: BTreeMap<VdiRef, VdiRecord>,
    #[serde(default)]
    pub vbds: BTreeMap<VbdRef, VbdRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub uuid: String,
    pub name_label: String,
    pub power_state: PowerState,
    pub created_at: DateTime<Utc>,
    /// Last boot. `None` while halted.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrRecord {
    pub uuid: String,
    pub name_label: String,
    pub name_description: String,
    pub sr_type: String,
    pub params: BTreeMap<String, String>,
    /// Disks in scan order.
    pub vdis: Vec<VdiRef>,
    pub introduced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdiRecord {
    pub uuid: String,
    pub sr: SrRef,
    pub lun: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VbdRecord {
    pub vm: VmRef,
    pub vdi: VdiRef,
    pub device_number: u32,
    pub bootable: bool,
    pub osvol: bool,
    pub plugged: bool,
}

impl HostState {
    pub fn vm_by_name(&self, name: &str) -> Option<(&VmRef, &VmRecord)> {
        self.vms.iter().find(|(_, vm)| vm.name_label == name)
    }

    pub fn sr_by_uuid(&self, uuid: &str) -> Option<(&SrRef, &SrRecord)> {
        self.srs.iter().find(|(_, sr)| sr.uuid == uuid)
    }

    pub fn vbd_at(&self, vm: &VmRef, device_number: u32) -> Option<&VbdRef> {
        self.vbds
            .iter()
            .find(|(_, vbd)| &vbd.vm == vm && vbd.device_number == device_number)
            .map(|(vbd_ref, _)| vbd_ref)
    }

    pub fn vbds_of_vdi<'a>(&'a self, vdi: &'a VdiRef) -> impl Iterator<Item = &'a VbdRef> + 'a {
        self.vbds
            .iter()
            .filter(move |(_, vbd)| &vbd.vdi == vdi)
            .map(|(vbd_ref, _)| vbd_ref)
    }

    /// Whether any disk of the repository is still linked to a VM.
    pub fn sr_in_use(&self, sr: &SrRef) -> bool {
        self.srs.get(sr).is_some_and(|record| {
            record
                .vdis
                .iter()
                .any(|vdi| self.vbds_of_vdi(vdi).next().is_some())
        })
    }
}

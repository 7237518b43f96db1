use crate::state::{HostState, SrRecord, VbdRecord, VdiRecord, VmRecord};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use xvol_core::{
    PowerState, Result, SrRef, StorageIdentity, VbdRef, VdiLocator, VdiRef, VmRef, XvolError,
};
use xvol_storage::{SrOps, VbdOps, VmOps};

const DEFAULT_SR_TYPE: &str = "iscsi";
const FIRST_LUN: &str = "0";

/// In-memory hypervisor host. Introducing a disk behaves like an SR scan
/// against a backend that always has the requested disk available.
pub struct SimHost {
    state: RwLock<HostState>,
    state_file: Option<PathBuf>,
    failing: RwLock<HashSet<String>>,
}

fn opaque_ref() -> String {
    format!("OpaqueRef:{}", Uuid::new_v4())
}

fn find_in_repo(
    state: &HostState,
    disks: &[VdiRef],
    matches: impl Fn(&VdiRecord) -> bool,
) -> Option<VdiRef> {
    disks
        .iter()
        .find(|vdi| state.vdis.get(*vdi).is_some_and(&matches))
        .cloned()
}

fn bad_handle(operation: &str, handle: &impl std::fmt::Display) -> XvolError {
    XvolError::remote(operation, format!("HANDLE_INVALID {handle}"))
}

impl SimHost {
    pub fn new() -> Self {
        Self::from_state(HostState::default())
    }

    pub fn from_state(state: HostState) -> Self {
        Self {
            state: RwLock::new(state),
            state_file: None,
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Loads host records from `path`, starting empty if it does not exist.
    /// [`SimHost::save`] writes back to the same file.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let state: HostState = serde_json::from_str(&content)?;
            debug!(
                "Loaded {} VMs and {} SRs from {}",
                state.vms.len(),
                state.srs.len(),
                path.display()
            );
            state
        } else {
            HostState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            state_file: Some(path),
            failing: RwLock::new(HashSet::new()),
        })
    }

    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let state = self.state.read().await;
        let content = serde_json::to_string_pretty(&*state)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> HostState {
        self.state.read().await.clone()
    }

    /// Makes every later call of the named primitive fail.
    pub async fn fail_on(&self, operation: &str) {
        self.failing.write().await.insert(operation.to_string());
    }

    pub async fn clear_faults(&self) {
        self.failing.write().await.clear();
    }

    async fn check_fault(&self, operation: &str) -> Result<()> {
        if self.failing.read().await.contains(operation) {
            Err(XvolError::remote(operation, "injected failure"))
        } else {
            Ok(())
        }
    }

    pub async fn create_vm(&self, name: &str, power_state: PowerState) -> Result<VmRef> {
        let mut state = self.state.write().await;
        if state.vm_by_name(name).is_some() {
            return Err(XvolError::remote(
                "VM.create",
                format!("VM {name} already exists"),
            ));
        }

        let vm = VmRef::new(opaque_ref());
        let now = Utc::now();
        state.vms.insert(
            vm.clone(),
            VmRecord {
                uuid: Uuid::new_v4().to_string(),
                name_label: name.to_string(),
                power_state,
                created_at: now,
                started_at: (power_state != PowerState::Halted).then_some(now),
            },
        );
        info!("Created VM {} ({})", name, vm);
        Ok(vm)
    }

    /// Changes power state. Halting detaches every device; starting attaches
    /// them all again.
    pub async fn set_power_state(&self, vm: &VmRef, power_state: PowerState) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| bad_handle("VM.set_power_state", vm))?;
        if power_state == PowerState::Halted {
            record.started_at = None;
        } else if record.power_state == PowerState::Halted {
            record.started_at = Some(Utc::now());
        }
        record.power_state = power_state;

        let plugged = power_state != PowerState::Halted;
        for vbd in state.vbds.values_mut().filter(|vbd| &vbd.vm == vm) {
            vbd.plugged = plugged;
        }
        Ok(())
    }

    fn new_vdi(state: &mut HostState, sr: &SrRef, uuid: String, lun: Option<String>) -> VdiRef {
        let vdi = VdiRef::new(opaque_ref());
        state.vdis.insert(
            vdi.clone(),
            VdiRecord {
                uuid,
                sr: sr.clone(),
                lun,
            },
        );
        if let Some(record) = state.srs.get_mut(sr) {
            record.vdis.push(vdi.clone());
        }
        debug!("Discovered VDI {} in SR {}", vdi, sr);
        vdi
    }

    fn forget_locked(state: &mut HostState, sr: &SrRef) -> Result<()> {
        let record = state
            .srs
            .remove(sr)
            .ok_or_else(|| XvolError::StorageRepoNotFound(sr.to_string()))?;

        for vdi in &record.vdis {
            state.vdis.remove(vdi);
            state.vbds.retain(|_, vbd| &vbd.vdi != vdi);
        }
        info!("Forgot SR {} ({})", record.uuid, sr);
        Ok(())
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VmOps for SimHost {
    async fn lookup_vm(&self, instance_name: &str) -> Result<Option<VmRef>> {
        self.check_fault("lookup_vm").await?;
        let state = self.state.read().await;
        Ok(state.vm_by_name(instance_name).map(|(vm, _)| vm.clone()))
    }

    async fn is_vm_shutdown(&self, vm: &VmRef) -> Result<bool> {
        self.check_fault("is_vm_shutdown").await?;
        let state = self.state.read().await;
        let record = state
            .vms
            .get(vm)
            .ok_or_else(|| bad_handle("VM.get_power_state", vm))?;
        Ok(record.power_state == PowerState::Halted)
    }
}

#[async_trait]
impl VbdOps for SimHost {
    async fn create_vbd(
        &self,
        vm: &VmRef,
        vdi: &VdiRef,
        device_number: u32,
        bootable: bool,
        osvol: bool,
    ) -> Result<VbdRef> {
        self.check_fault("create_vbd").await?;
        let mut state = self.state.write().await;
        if !state.vms.contains_key(vm) {
            return Err(bad_handle("VBD.create", vm));
        }
        if !state.vdis.contains_key(vdi) {
            return Err(bad_handle("VBD.create", vdi));
        }
        if state.vbd_at(vm, device_number).is_some() {
            return Err(XvolError::remote(
                "VBD.create",
                format!("DEVICE_ALREADY_EXISTS {device_number}"),
            ));
        }

        let vbd = VbdRef::new(opaque_ref());
        state.vbds.insert(
            vbd.clone(),
            VbdRecord {
                vm: vm.clone(),
                vdi: vdi.clone(),
                device_number,
                bootable,
                osvol,
                plugged: false,
            },
        );
        debug!("Created VBD {} for VDI {} on VM {}", vbd, vdi, vm);
        Ok(vbd)
    }

    async fn plug_vbd(&self, vbd: &VbdRef, vm: &VmRef) -> Result<()> {
        self.check_fault("plug_vbd").await?;
        let mut state = self.state.write().await;
        let halted = state
            .vms
            .get(vm)
            .map(|record| record.power_state == PowerState::Halted)
            .ok_or_else(|| bad_handle("VBD.plug", vm))?;
        if halted {
            return Err(XvolError::remote("VBD.plug", "VM_BAD_POWER_STATE halted"));
        }

        let record = state
            .vbds
            .get_mut(vbd)
            .ok_or_else(|| bad_handle("VBD.plug", vbd))?;
        if record.plugged {
            return Err(XvolError::remote("VBD.plug", "DEVICE_ALREADY_ATTACHED"));
        }
        record.plugged = true;
        Ok(())
    }

    async fn unplug_vbd(&self, vbd: &VbdRef, _vm: &VmRef) -> Result<()> {
        self.check_fault("unplug_vbd").await?;
        let mut state = self.state.write().await;
        let record = state
            .vbds
            .get_mut(vbd)
            .ok_or_else(|| bad_handle("VBD.unplug", vbd))?;
        if !record.plugged {
            debug!("VBD {} already detached", vbd);
            return Ok(());
        }
        record.plugged = false;
        Ok(())
    }

    async fn destroy_vbd(&self, vbd: &VbdRef) -> Result<()> {
        self.check_fault("destroy_vbd").await?;
        let mut state = self.state.write().await;
        let plugged = state
            .vbds
            .get(vbd)
            .map(|record| record.plugged)
            .ok_or_else(|| bad_handle("VBD.destroy", vbd))?;
        if plugged {
            return Err(XvolError::remote(
                "VBD.destroy",
                "OPERATION_NOT_ALLOWED attached",
            ));
        }

        state.vbds.remove(vbd);
        Ok(())
    }

    async fn find_vbd_by_number(&self, vm: &VmRef, device_number: u32) -> Result<Option<VbdRef>> {
        self.check_fault("find_vbd_by_number").await?;
        let state = self.state.read().await;
        Ok(state.vbd_at(vm, device_number).cloned())
    }

    async fn vm_vbds(&self, vm: &VmRef) -> Result<Vec<VbdRef>> {
        self.check_fault("vm_vbds").await?;
        let state = self.state.read().await;
        if !state.vms.contains_key(vm) {
            return Err(bad_handle("VM.get_VBDs", vm));
        }
        Ok(state
            .vbds
            .iter()
            .filter(|(_, record)| &record.vm == vm)
            .map(|(vbd, _)| vbd.clone())
            .collect())
    }

    async fn is_osvol(&self, vbd: &VbdRef) -> Result<bool> {
        self.check_fault("is_osvol").await?;
        let state = self.state.read().await;
        state
            .vbds
            .get(vbd)
            .map(|record| record.osvol)
            .ok_or_else(|| bad_handle("VBD.get_other_config", vbd))
    }
}

#[async_trait]
impl SrOps for SimHost {
    async fn find_sr_by_uuid(&self, uuid: &str) -> Result<Option<SrRef>> {
        self.check_fault("find_sr_by_uuid").await?;
        let state = self.state.read().await;
        Ok(state.sr_by_uuid(uuid).map(|(sr, _)| sr.clone()))
    }

    async fn introduce_sr(&self, identity: &StorageIdentity) -> Result<SrRef> {
        self.check_fault("introduce_sr").await?;
        let mut state = self.state.write().await;
        if state.sr_by_uuid(&identity.uuid).is_some() {
            return Err(XvolError::remote(
                "SR.introduce",
                format!("SR {} already introduced", identity.uuid),
            ));
        }

        let mut params = identity.params.clone();
        let sr_type = params
            .remove("sr_type")
            .unwrap_or_else(|| DEFAULT_SR_TYPE.to_string());
        let name_description = params.remove("name_description").unwrap_or_default();

        let sr = SrRef::new(opaque_ref());
        state.srs.insert(
            sr.clone(),
            SrRecord {
                uuid: identity.uuid.clone(),
                name_label: identity.label.clone(),
                name_description,
                sr_type,
                params,
                vdis: Vec::new(),
                introduced_at: Utc::now(),
            },
        );
        Ok(sr)
    }

    async fn forget_sr(&self, sr: &SrRef) -> Result<()> {
        self.check_fault("forget_sr").await?;
        let mut state = self.state.write().await;
        Self::forget_locked(&mut state, sr)
    }

    async fn purge_sr(&self, sr: &SrRef) -> Result<()> {
        self.check_fault("purge_sr").await?;
        let mut state = self.state.write().await;
        if !state.srs.contains_key(sr) {
            return Err(XvolError::StorageRepoNotFound(sr.to_string()));
        }

        if state.sr_in_use(sr) {
            warn!("Cannot purge SR {} with referenced VDIs", sr);
            return Ok(());
        }
        Self::forget_locked(&mut state, sr)
    }

    async fn introduce_vdi(&self, sr: &SrRef, locator: &VdiLocator) -> Result<VdiRef> {
        self.check_fault("introduce_vdi").await?;
        let mut state = self.state.write().await;
        let disks = state
            .srs
            .get(sr)
            .map(|record| record.vdis.clone())
            .ok_or_else(|| XvolError::StorageRepoNotFound(sr.to_string()))?;

        let vdi = match locator {
            VdiLocator::Uuid(uuid) => {
                match find_in_repo(&state, &disks, |record| &record.uuid == uuid) {
                    Some(vdi) => vdi,
                    None if state.vdis.values().any(|record| &record.uuid == uuid) => {
                        return Err(XvolError::remote(
                            "VDI.introduce",
                            format!("UUID_ALREADY_EXISTS {uuid}"),
                        ));
                    }
                    None => Self::new_vdi(&mut state, sr, uuid.clone(), None),
                }
            }
            VdiLocator::Lun(lun) => {
                match find_in_repo(&state, &disks, |record| record.lun.as_ref() == Some(lun)) {
                    Some(vdi) => vdi,
                    None => Self::new_vdi(
                        &mut state,
                        sr,
                        Uuid::new_v4().to_string(),
                        Some(lun.clone()),
                    ),
                }
            }
            VdiLocator::FirstInRepo => match disks.first() {
                Some(vdi) => vdi.clone(),
                None => Self::new_vdi(
                    &mut state,
                    sr,
                    Uuid::new_v4().to_string(),
                    Some(FIRST_LUN.to_string()),
                ),
            },
        };
        Ok(vdi)
    }

    async fn vdi_uuid(&self, vdi: &VdiRef) -> Result<String> {
        self.check_fault("vdi_uuid").await?;
        let state = self.state.read().await;
        state
            .vdis
            .get(vdi)
            .map(|record| record.uuid.clone())
            .ok_or_else(|| XvolError::VirtualDiskNotFound(vdi.to_string()))
    }

    async fn find_sr_from_vbd(&self, vbd: &VbdRef) -> Result<SrRef> {
        self.check_fault("find_sr_from_vbd").await?;
        let state = self.state.read().await;
        let record = state
            .vbds
            .get(vbd)
            .ok_or_else(|| bad_handle("VBD.get_VDI", vbd))?;
        state
            .vdis
            .get(&record.vdi)
            .map(|vdi| vdi.sr.clone())
            .ok_or_else(|| XvolError::StorageRepoNotFound(format!("no SR behind VBD {vbd}")))
    }
}

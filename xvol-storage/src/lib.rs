pub mod volume_ops;


use async_trait::async_trait;
use xvol_core::{
    ConnectionData, IscsiConfig, Result, SrRef, StorageIdentity, VbdRef, VdiLocator, VdiRef,
    VmRef,
};

/// VM record primitives.
#[async_trait]
pub trait VmOps: Send + Sync {
    /// Finds the VM backing an instance, if the host knows it.
    async fn lookup_vm(&self, instance_name: &str) -> Result<Option<VmRef>>;
    async fn is_vm_shutdown(&self, vm: &VmRef) -> Result<bool>;
}

/// Virtual block device primitives.
#[async_trait]
pub trait VbdOps: Send + Sync {
    async fn create_vbd(
        &self,
        vm: &VmRef,
        vdi: &VdiRef,
        device_number: u32,
        bootable: bool,
        osvol: bool,
    ) -> Result<VbdRef>;
    async fn plug_vbd(&self, vbd: &VbdRef, vm: &VmRef) -> Result<()>;
    async fn unplug_vbd(&self, vbd: &VbdRef, vm: &VmRef) -> Result<()>;
    async fn destroy_vbd(&self, vbd: &VbdRef) -> Result<()>;
    async fn find_vbd_by_number(&self, vm: &VmRef, device_number: u32) -> Result<Option<VbdRef>>;
    async fn vm_vbds(&self, vm: &VmRef) -> Result<Vec<VbdRef>>;
    /// Whether the VBD carries the external-volume marker.
    async fn is_osvol(&self, vbd: &VbdRef) -> Result<bool>;
}

/// Storage repository and disk primitives.
#[async_trait]
pub trait SrOps: Send + Sync {
    fn parse_sr_info(
        &self,
        data: &ConnectionData,
        description: &str,
        iscsi: &IscsiConfig,
    ) -> Result<StorageIdentity> {
        xvol_core::parse_sr_info(data, description, iscsi)
    }

    fn device_number(&self, mountpoint: &str) -> Result<u32> {
        xvol_core::mountpoint_to_number(mountpoint)
    }

    async fn find_sr_by_uuid(&self, uuid: &str) -> Result<Option<SrRef>>;
    async fn introduce_sr(&self, identity: &StorageIdentity) -> Result<SrRef>;
    /// Unregisters the repository together with its disk and device records.
    async fn forget_sr(&self, sr: &SrRef) -> Result<()>;
    /// Forgets the repository unless one of its disks is still attached somewhere.
    async fn purge_sr(&self, sr: &SrRef) -> Result<()>;
    async fn introduce_vdi(&self, sr: &SrRef, locator: &VdiLocator) -> Result<VdiRef>;
    async fn vdi_uuid(&self, vdi: &VdiRef) -> Result<String>;
    async fn find_sr_from_vbd(&self, vbd: &VbdRef) -> Result<SrRef>;
}

/// An authenticated management session: everything the orchestrator needs
/// from the host.
pub trait Session: VmOps + VbdOps + SrOps {}

impl<T: VmOps + VbdOps + SrOps + ?Sized> Session for T {}

pub use volume_ops::VolumeOps;

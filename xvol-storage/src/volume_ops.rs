use crate::{Session, SrOps, VbdOps, VmOps};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use xvol_core::{
    CompensationPolicy, Config, ConnectionData, ConnectionInfo, Result, SrRef, VbdRef,
    VdiLocator, VdiRef, VmRef, VolumeConnection, XvolError,
};

/// Attaches and detaches backend volumes to VMs on one host.
///
/// Holds no state besides the session and configuration, so callers must
/// serialize operations that target the same VM device slot.
pub struct VolumeOps {
    session: Arc<dyn Session>,
    config: Config,
}

/// Repository resolved for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedSr {
    pub sr_ref: SrRef,
    pub sr_uuid: String,
    /// Introduced by this call rather than found on the host.
    pub introduced: bool,
}

/// Where an attach should land once the disk is connected.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VmTarget<'a> {
    pub vm: &'a VmRef,
    pub instance_name: &'a str,
    pub device_number: u32,
    pub hotplug: bool,
}

impl VolumeOps {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self::with_config(session, Config::default())
    }

    pub fn with_config(session: Arc<dyn Session>, config: Config) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attaches a volume to a named instance at `mountpoint`, hot-plugging it
    /// if the VM is running.
    pub async fn attach_volume(
        &self,
        connection_info: &ConnectionInfo,
        instance_name: &str,
        mountpoint: &str,
    ) -> Result<VolumeConnection> {
        self.attach_volume_with_hotplug(connection_info, instance_name, mountpoint, true)
            .await
    }

    pub async fn attach_volume_with_hotplug(
        &self,
        connection_info: &ConnectionInfo,
        instance_name: &str,
        mountpoint: &str,
        hotplug: bool,
    ) -> Result<VolumeConnection> {
        self.check_is_supported_driver_type(connection_info)?;

        let vm = self.vm_ref_or_raise(instance_name).await?;
        let device_number = self.session.device_number(mountpoint)?;

        let target = VmTarget {
            vm: &vm,
            instance_name,
            device_number,
            hotplug,
        };
        let connection = self.attach(connection_info, Some(target)).await?;

        info!("Mountpoint {} attached to instance {}", mountpoint, instance_name);
        Ok(connection)
    }

    /// Attaches to an already resolved VM at an explicit device slot.
    pub async fn attach_volume_to_vm_ref(
        &self,
        connection_info: &ConnectionInfo,
        vm: &VmRef,
        instance_name: &str,
        device_number: u32,
        hotplug: bool,
    ) -> Result<VolumeConnection> {
        self.check_is_supported_driver_type(connection_info)?;

        let target = VmTarget {
            vm,
            instance_name,
            device_number,
            hotplug,
        };
        self.attach(connection_info, Some(target)).await
    }

    /// Makes the volume known to the host without binding it to any VM.
    pub async fn connect_volume(
        &self,
        connection_info: &ConnectionInfo,
    ) -> Result<VolumeConnection> {
        self.check_is_supported_driver_type(connection_info)?;
        self.attach(connection_info, None).await
    }

    pub async fn detach_volume(
        &self,
        connection_info: &ConnectionInfo,
        instance_name: &str,
        mountpoint: &str,
    ) -> Result<()> {
        debug!(
            "Detach volume ({}) from {} at {}",
            connection_info.driver_volume_type, instance_name, mountpoint
        );

        let vm = self.vm_ref_or_raise(instance_name).await?;
        let device_number = self.session.device_number(mountpoint)?;

        let vbd = self
            .session
            .find_vbd_by_number(&vm, device_number)
            .await?
            .ok_or_else(|| XvolError::DeviceNotFound {
                vm: vm.to_string(),
                device_number,
            })?;

        let is_shutdown = self.session.is_vm_shutdown(&vm).await?;
        self.detach_vbd_and_sr(&vm, &vbd, is_shutdown).await?;

        info!("Mountpoint {} detached from instance {}", mountpoint, instance_name);
        Ok(())
    }

    /// Detaches every external volume from a VM and purges the repositories
    /// behind them. Local (non-volume) disks are left alone.
    pub async fn detach_all(&self, vm: &VmRef) -> Result<()> {
        let mut volume_vbds = Vec::new();
        for vbd in self.session.vm_vbds(vm).await? {
            if self.session.is_osvol(&vbd).await? {
                volume_vbds.push(vbd);
            }
        }

        if volume_vbds.is_empty() {
            debug!("No volumes attached to VM {}", vm);
            return Ok(());
        }

        let is_shutdown = self.session.is_vm_shutdown(vm).await?;
        for vbd in &volume_vbds {
            self.detach_vbd_and_sr(vm, vbd, is_shutdown).await?;
        }

        info!("Detached {} volumes from VM {}", volume_vbds.len(), vm);
        Ok(())
    }

    pub(crate) fn check_is_supported_driver_type(
        &self,
        connection_info: &ConnectionInfo,
    ) -> Result<()> {
        let driver_type = &connection_info.driver_volume_type;
        if self.config.is_supported_driver(driver_type) {
            Ok(())
        } else {
            Err(XvolError::UnsupportedVolumeDriver {
                driver_type: driver_type.clone(),
            })
        }
    }

    async fn vm_ref_or_raise(&self, instance_name: &str) -> Result<VmRef> {
        self.session
            .lookup_vm(instance_name)
            .await?
            .ok_or_else(|| XvolError::InstanceNotFound(instance_name.to_string()))
    }

    /// The attach pipeline shared by every entry point. The driver type has
    /// already been checked.
    async fn attach(
        &self,
        connection_info: &ConnectionInfo,
        target: Option<VmTarget<'_>>,
    ) -> Result<VolumeConnection> {
        let data = &connection_info.data;
        let instance_name = target.map(|t| t.instance_name);
        let sr = self.connect_to_volume_provider(data, instance_name).await?;

        match self.connect_and_bind(&sr, data, target).await {
            Ok(vdi_uuid) => Ok(VolumeConnection {
                sr_uuid: sr.sr_uuid,
                vdi_uuid,
            }),
            Err(err) => {
                self.forget_after_failure(&sr, &err).await;
                Err(err)
            }
        }
    }

    async fn connect_and_bind(
        &self,
        sr: &ResolvedSr,
        data: &ConnectionData,
        target: Option<VmTarget<'_>>,
    ) -> Result<String> {
        let vdi = self.connect_hypervisor_to_volume(&sr.sr_ref, data).await?;
        let vdi_uuid = self.session.vdi_uuid(&vdi).await?;
        info!("Connected volume (vdi_uuid): {}", vdi_uuid);

        if let Some(target) = target {
            self.attach_volume_to_vm(&vdi, target).await?;
        }

        Ok(vdi_uuid)
    }

    async fn forget_after_failure(&self, sr: &ResolvedSr, cause: &XvolError) {
        if !sr.introduced && self.config.compensation == CompensationPolicy::CreatedOnly {
            warn!(
                "Attach failed ({}); keeping pre-existing SR {}",
                cause, sr.sr_uuid
            );
            return;
        }

        // Forgetting the SR also drops the VDI and VBD records created under it.
        if let Err(cleanup_err) = self.session.forget_sr(&sr.sr_ref).await {
            error!(
                "Failed to forget SR {} after attach failure ({}): {}",
                sr.sr_uuid, cause, cleanup_err
            );
        }
    }

    pub(crate) async fn connect_to_volume_provider(
        &self,
        data: &ConnectionData,
        instance_name: Option<&str>,
    ) -> Result<ResolvedSr> {
        let description = match instance_name {
            Some(name) => format!("Disk-for:{name}"),
            None => self.config.default_sr_description.clone(),
        };
        let identity = self
            .session
            .parse_sr_info(data, &description, &self.config.iscsi)?;

        if let Some(sr_ref) = self.session.find_sr_by_uuid(&identity.uuid).await? {
            debug!("Reusing SR {} ({})", identity.uuid, sr_ref);
            return Ok(ResolvedSr {
                sr_ref,
                sr_uuid: identity.uuid,
                introduced: false,
            });
        }

        let sr_ref = self.session.introduce_sr(&identity).await?;
        info!("Introduced SR {} labelled {}", identity.uuid, identity.label);
        Ok(ResolvedSr {
            sr_ref,
            sr_uuid: identity.uuid,
            introduced: true,
        })
    }

    pub(crate) async fn connect_hypervisor_to_volume(
        &self,
        sr: &SrRef,
        data: &ConnectionData,
    ) -> Result<VdiRef> {
        let locator = VdiLocator::from_connection_data(data);
        self.session.introduce_vdi(sr, &locator).await
    }

    pub(crate) async fn attach_volume_to_vm(
        &self,
        vdi: &VdiRef,
        target: VmTarget<'_>,
    ) -> Result<()> {
        let VmTarget {
            vm,
            instance_name,
            device_number,
            hotplug,
        } = target;
        debug!("Attach volume vdi: {} vm: {}", vdi, vm);

        let vbd = self
            .session
            .create_vbd(vm, vdi, device_number, false, true)
            .await?;

        if hotplug {
            if let Err(err) = self.plug_if_running(&vbd, vm).await {
                if let Err(cleanup_err) = self.session.destroy_vbd(&vbd).await {
                    error!("Failed to destroy unplugged VBD {}: {}", vbd, cleanup_err);
                }
                return Err(err);
            }
        }

        info!("Dev {} attached to instance {}", device_number, instance_name);
        Ok(())
    }

    /// VBD.plug is only valid on a running VM.
    async fn plug_if_running(&self, vbd: &VbdRef, vm: &VmRef) -> Result<()> {
        if !self.session.is_vm_shutdown(vm).await? {
            debug!("Plugging VBD: {}", vbd);
            self.session.plug_vbd(vbd, vm).await?;
        }
        Ok(())
    }

    /// Tears down one volume VBD. The SR must be looked up before the VBD is
    /// destroyed; afterwards there is no path from the device to it.
    async fn detach_vbd_and_sr(&self, vm: &VmRef, vbd: &VbdRef, is_shutdown: bool) -> Result<()> {
        if !is_shutdown {
            self.session.unplug_vbd(vbd, vm).await?;
        }

        let sr = self.session.find_sr_from_vbd(vbd).await?;
        self.session.destroy_vbd(vbd).await?;
        self.session.purge_sr(&sr).await?;
        Ok(())
    }
}

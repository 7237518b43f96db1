use serde_json::json;
use std::sync::Arc;
use xvol_core::{ConnectionInfo, PowerState, Result, XvolError};
use xvol_platform::SimHost;
use xvol_storage::VolumeOps;

fn iscsi_connection(volume_id: &str, lun: u32) -> ConnectionInfo {
    let data = json!({
        "volume_id": volume_id,
        "target_portal": "192.168.10.5:3260",
        "target_iqn": format!("iqn.2010-10.org.openstack:{volume_id}"),
        "target_lun": lun,
    });
    ConnectionInfo::new("iscsi", data.as_object().cloned().unwrap_or_default())
}

fn setup() -> (Arc<SimHost>, VolumeOps) {
    let host = Arc::new(SimHost::new());
    let ops = VolumeOps::new(host.clone());
    (host, ops)
}

#[tokio::test]
async fn test_attach_and_detach_running_vm() -> Result<()> {
    let (host, ops) = setup();
    let vm = host.create_vm("web-1", PowerState::Running).await?;
    let conn = iscsi_connection("vol-1", 1);

    let attached = ops.attach_volume(&conn, "web-1", "/dev/xvdb").await?;
    assert_eq!(attached.sr_uuid, "FA15E-D15C-vol-1");

    let state = host.snapshot().await;
    let vbd_ref = state.vbd_at(&vm, 1).expect("VBD at slot 1").clone();
    let vbd = &state.vbds[&vbd_ref];
    assert!(vbd.plugged);
    assert!(vbd.osvol);
    assert!(!vbd.bootable);
    let (_, sr) = state.sr_by_uuid("FA15E-D15C-vol-1").expect("SR introduced");
    assert_eq!(sr.name_description, "Disk-for:web-1");
    assert_eq!(state.vdis[&vbd.vdi].uuid, attached.vdi_uuid);

    ops.detach_volume(&conn, "web-1", "/dev/xvdb").await?;

    let state = host.snapshot().await;
    assert!(state.vbds.is_empty());
    assert!(state.srs.is_empty());
    assert!(state.vdis.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_attach_to_halted_vm_leaves_vbd_unplugged() -> Result<()> {
    let (host, ops) = setup();
    let vm = host.create_vm("db-1", PowerState::Halted).await?;

    ops.attach_volume(&iscsi_connection("vol-2", 0), "db-1", "/dev/xvdc")
        .await?;

    let state = host.snapshot().await;
    let vbd = state.vbd_at(&vm, 2).expect("VBD at slot 2");
    assert!(!state.vbds[vbd].plugged);

    ops.detach_volume(&iscsi_connection("vol-2", 0), "db-1", "/dev/xvdc")
        .await?;
    assert!(host.snapshot().await.srs.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_detach_cold_attached_volume_from_running_vm() -> Result<()> {
    let (host, ops) = setup();
    let vm = host.create_vm("web-1", PowerState::Running).await?;
    let conn = iscsi_connection("vol-6", 0);

    ops.attach_volume_with_hotplug(&conn, "web-1", "/dev/xvdb", false)
        .await?;
    let state = host.snapshot().await;
    let vbd = state.vbd_at(&vm, 1).expect("VBD at slot 1");
    assert!(!state.vbds[vbd].plugged);

    ops.detach_volume(&conn, "web-1", "/dev/xvdb").await?;

    let state = host.snapshot().await;
    assert!(state.vbds.is_empty());
    assert!(state.srs.is_empty());
    assert!(state.vdis.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_connect_volume_reuses_sr() -> Result<()> {
    let (host, ops) = setup();
    let first = ops.connect_volume(&iscsi_connection("vol-3", 0)).await?;
    let second = ops.connect_volume(&iscsi_connection("vol-3", 0)).await?;

    assert_eq!(first, second);
    let state = host.snapshot().await;
    assert_eq!(state.srs.len(), 1);
    assert_eq!(state.vdis.len(), 1);
    assert!(state.vbds.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_attach_forgets_new_sr() -> Result<()> {
    let (host, ops) = setup();
    host.create_vm("web-1", PowerState::Running).await?;
    host.fail_on("plug_vbd").await;

    let err = ops
        .attach_volume(&iscsi_connection("vol-4", 0), "web-1", "/dev/xvdb")
        .await
        .unwrap_err();

    assert!(matches!(err, XvolError::RemoteOperationFailed { .. }));
    let state = host.snapshot().await;
    assert!(state.srs.is_empty());
    assert!(state.vdis.is_empty());
    assert!(state.vbds.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_attach_keeps_shared_sr() -> Result<()> {
    let (host, ops) = setup();
    let vm = host.create_vm("web-1", PowerState::Running).await?;
    let conn = iscsi_connection("vol-5", 0);
    ops.attach_volume(&conn, "web-1", "/dev/xvdb").await?;

    // Same slot is taken, so the second attach fails after the SR lookup.
    let err = ops
        .attach_volume(&conn, "web-1", "/dev/xvdb")
        .await
        .unwrap_err();
    assert!(matches!(err, XvolError::RemoteOperationFailed { .. }));

    let state = host.snapshot().await;
    assert_eq!(state.srs.len(), 1);
    assert!(state.vbd_at(&vm, 1).is_some());
    Ok(())
}

#[tokio::test]
async fn test_failed_power_query_removes_new_vbd() -> Result<()> {
    let (host, ops) = setup();
    let vm = host.create_vm("web-1", PowerState::Running).await?;
    let conn = iscsi_connection("vol-7", 0);
    ops.connect_volume(&conn).await?;
    host.fail_on("is_vm_shutdown").await;

    let err = ops
        .attach_volume(&conn, "web-1", "/dev/xvdb")
        .await
        .unwrap_err();
    assert!(matches!(err, XvolError::RemoteOperationFailed { .. }));

    let state = host.snapshot().await;
    assert_eq!(state.srs.len(), 1);
    assert!(state.vbd_at(&vm, 1).is_none());
    assert!(state.vbds.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unsupported_driver_touches_nothing() -> Result<()> {
    let (host, ops) = setup();
    host.create_vm("web-1", PowerState::Running).await?;
    let conn = ConnectionInfo::new("rbd", Default::default());

    let err = ops.attach_volume(&conn, "web-1", "/dev/xvdb").await.unwrap_err();
    assert!(matches!(err, XvolError::UnsupportedVolumeDriver { .. }));
    assert!(host.snapshot().await.srs.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_detach_unknown_device() -> Result<()> {
    let (host, ops) = setup();
    host.create_vm("web-1", PowerState::Running).await?;

    let err = ops
        .detach_volume(&iscsi_connection("vol-6", 0), "web-1", "/dev/xvdf")
        .await
        .unwrap_err();
    assert!(matches!(err, XvolError::DeviceNotFound { device_number: 5, .. }));
    Ok(())
}

#[tokio::test]
async fn test_detach_all_spares_local_disks() -> Result<()> {
    let (host, ops) = setup();
    let vm = host.create_vm("web-1", PowerState::Running).await?;
    ops.attach_volume(&iscsi_connection("vol-7", 0), "web-1", "/dev/xvdb")
        .await?;
    ops.attach_volume(&iscsi_connection("vol-8", 0), "web-1", "/dev/xvdc")
        .await?;

    // A root disk that is not an external volume.
    let root = ops.connect_volume(&iscsi_connection("root", 0)).await?;
    {
        use xvol_storage::{SrOps, VbdOps};
        let sr = host.find_sr_by_uuid(&root.sr_uuid).await?.expect("root SR");
        let vdi = host
            .introduce_vdi(&sr, &xvol_core::VdiLocator::FirstInRepo)
            .await?;
        host.create_vbd(&vm, &vdi, 0, true, false).await?;
    }

    ops.detach_all(&vm).await?;

    let state = host.snapshot().await;
    assert_eq!(state.vbds.len(), 1);
    assert!(state.vbd_at(&vm, 0).is_some());
    assert_eq!(state.srs.len(), 1);
    Ok(())
}

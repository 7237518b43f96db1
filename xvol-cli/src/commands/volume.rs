use crate::output::{OutputFormat, print_progress, print_success};
use crate::utils::parse_connection;
use std::sync::Arc;
use xvol_core::{Config, Result, VolumeConnection, XvolError};
use xvol_platform::SimHost;
use xvol_storage::{VmOps, VolumeOps};

fn report(connection: &VolumeConnection, message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            print_success(message);
            println!("  SR:  {}", connection.sr_uuid);
            println!("  VDI: {}", connection.vdi_uuid);
        }
        _ => println!("{}", format.render(connection)),
    }
}

pub async fn connect(
    connection: &str,
    host: &Arc<SimHost>,
    config: Config,
    format: OutputFormat,
) -> Result<()> {
    let info = parse_connection(connection)?;
    let ops = VolumeOps::with_config(host.clone(), config);

    let connected = ops.connect_volume(&info).await?;
    report(&connected, "Volume connected", format);
    Ok(())
}

pub async fn attach(
    instance: &str,
    mountpoint: &str,
    connection: &str,
    hotplug: bool,
    host: &Arc<SimHost>,
    config: Config,
    format: OutputFormat,
) -> Result<()> {
    let info = parse_connection(connection)?;
    let ops = VolumeOps::with_config(host.clone(), config);

    if format == OutputFormat::Table {
        print_progress(&format!("Attaching volume to {instance} at {mountpoint}"));
    }
    let attached = ops
        .attach_volume_with_hotplug(&info, instance, mountpoint, hotplug)
        .await?;
    report(
        &attached,
        &format!("Volume attached to {instance} at {mountpoint}"),
        format,
    );
    Ok(())
}

pub async fn detach(
    instance: &str,
    mountpoint: &str,
    connection: &str,
    host: &Arc<SimHost>,
    config: Config,
) -> Result<()> {
    let info = parse_connection(connection)?;
    let ops = VolumeOps::with_config(host.clone(), config);

    ops.detach_volume(&info, instance, mountpoint).await?;
    print_success(&format!("Volume detached from {instance} at {mountpoint}"));
    Ok(())
}

pub async fn detach_all(instance: &str, host: &Arc<SimHost>, config: Config) -> Result<()> {
    let vm = host
        .lookup_vm(instance)
        .await?
        .ok_or_else(|| XvolError::InstanceNotFound(instance.to_string()))?;
    let ops = VolumeOps::with_config(host.clone(), config);

    ops.detach_all(&vm).await?;
    print_success(&format!("All volumes detached from {instance}"));
    Ok(())
}

use crate::output::{OutputFormat, print_section};
use crate::utils::format_age;
use colored::*;
use tabled::Tabled;
use xvol_core::{PowerState, Result};
use xvol_platform::{HostState, SimHost};

#[derive(Tabled)]
struct VmRow {
    name: String,
    state: String,
    volumes: usize,
    uptime: String,
}

#[derive(Tabled)]
struct SrRow {
    uuid: String,
    label: String,
    #[tabled(rename = "type")]
    sr_type: String,
    disks: usize,
    age: String,
}

#[derive(Tabled)]
struct VbdRow {
    vm: String,
    device: u32,
    disk: String,
    sr: String,
    plugged: String,
    volume: String,
}

fn vm_rows(state: &HostState) -> Vec<VmRow> {
    state
        .vms
        .iter()
        .map(|(vm_ref, vm)| {
            let colored_state = match vm.power_state {
                PowerState::Running => "Running".green().to_string(),
                PowerState::Paused => "Paused".yellow().to_string(),
                PowerState::Halted => "Halted".red().to_string(),
            };
            let uptime = match (vm.power_state, vm.started_at) {
                (PowerState::Running, Some(started_at)) => {
                    format_age(chrono::Utc::now() - started_at)
                }
                _ => "-".to_string(),
            };
            VmRow {
                name: vm.name_label.clone(),
                state: colored_state,
                volumes: state
                    .vbds
                    .values()
                    .filter(|vbd| &vbd.vm == vm_ref && vbd.osvol)
                    .count(),
                uptime,
            }
        })
        .collect()
}

fn sr_rows(state: &HostState) -> Vec<SrRow> {
    state
        .srs
        .values()
        .map(|sr| SrRow {
            uuid: sr.uuid.clone(),
            label: sr.name_label.clone(),
            sr_type: sr.sr_type.clone(),
            disks: sr.vdis.len(),
            age: format_age(chrono::Utc::now() - sr.introduced_at),
        })
        .collect()
}

fn vbd_rows(state: &HostState) -> Vec<VbdRow> {
    state
        .vbds
        .values()
        .map(|vbd| {
            let vdi = state.vdis.get(&vbd.vdi);
            let sr_uuid = vdi
                .and_then(|vdi| state.srs.get(&vdi.sr))
                .map(|sr| sr.uuid.clone())
                .unwrap_or_else(|| "-".to_string());
            VbdRow {
                vm: state
                    .vms
                    .get(&vbd.vm)
                    .map(|vm| vm.name_label.clone())
                    .unwrap_or_else(|| vbd.vm.to_string()),
                device: vbd.device_number,
                disk: vdi
                    .map(|vdi| vdi.uuid.clone())
                    .unwrap_or_else(|| vbd.vdi.to_string()),
                sr: sr_uuid,
                plugged: if vbd.plugged {
                    "yes".green().to_string()
                } else {
                    "no".dimmed().to_string()
                },
                volume: (if vbd.osvol { "yes" } else { "no" }).to_string(),
            }
        })
        .collect()
}

pub async fn execute(host: &SimHost, format: OutputFormat) -> Result<()> {
    let state = host.snapshot().await;

    match format {
        OutputFormat::Table => {
            print_section("VMs");
            println!("{}", format.render_rows(vm_rows(&state), "No VMs registered."));
            print_section("Storage repositories");
            println!("{}", format.render_rows(sr_rows(&state), "No storage repositories."));
            print_section("Block devices");
            println!("{}", format.render_rows(vbd_rows(&state), "No block devices."));
        }
        _ => println!("{}", format.render(&state)),
    }

    Ok(())
}

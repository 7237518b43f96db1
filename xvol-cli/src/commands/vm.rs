use super::VmAction;
use crate::output::{OutputFormat, print_success};
use xvol_core::{PowerState, Result, XvolError};
use xvol_platform::SimHost;
use xvol_storage::VmOps;

pub async fn execute(action: VmAction, host: &SimHost, _format: OutputFormat) -> Result<()> {
    match action {
        VmAction::Create { name, running } => {
            let power_state = if running {
                PowerState::Running
            } else {
                PowerState::Halted
            };
            let vm = host.create_vm(&name, power_state).await?;
            print_success(&format!("Created VM {name} ({vm}), {power_state}"));
        }
        VmAction::Start { name } => {
            set_power_state(host, &name, PowerState::Running).await?;
            print_success(&format!("Started VM {name}"));
        }
        VmAction::Stop { name } => {
            set_power_state(host, &name, PowerState::Halted).await?;
            print_success(&format!("Stopped VM {name}"));
        }
    }
    Ok(())
}

async fn set_power_state(host: &SimHost, name: &str, power_state: PowerState) -> Result<()> {
    let vm = host
        .lookup_vm(name)
        .await?
        .ok_or_else(|| XvolError::InstanceNotFound(name.to_string()))?;
    host.set_power_state(&vm, power_state).await
}

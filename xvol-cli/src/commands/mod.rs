mod status;
mod vm;
mod volume;

use clap::Subcommand;
use tracing::debug;
use xvol_core::{Config, Result};

use crate::output::OutputFormat;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage VMs on the simulated host
    Vm {
        #[command(subcommand)]
        action: VmAction,
    },

    /// Introduce a volume's storage on the host without binding it to a VM
    Connect {
        /// Connection info as JSON, or @file.json
        #[arg(short, long)]
        connection: String,
    },

    /// Attach a volume to an instance
    Attach {
        /// Instance (VM name label)
        instance: String,

        /// Guest device, e.g. /dev/xvdb
        mountpoint: String,

        /// Connection info as JSON, or @file.json
        #[arg(short, long)]
        connection: String,

        /// Create the device without plugging it into a running VM
        #[arg(long)]
        no_hotplug: bool,
    },

    /// Detach a volume from an instance and release its storage
    Detach {
        /// Instance (VM name label)
        instance: String,

        /// Guest device the volume is attached at
        mountpoint: String,

        /// Connection info as JSON, or @file.json
        #[arg(short, long)]
        connection: String,
    },

    /// Detach every external volume from an instance
    DetachAll {
        /// Instance (VM name label)
        instance: String,
    },

    /// Show VMs, storage repositories and block devices
    Status,
}

#[derive(Subcommand, Debug)]
pub enum VmAction {
    /// Register a VM
    Create {
        name: String,

        /// Create it powered on
        #[arg(long)]
        running: bool,
    },

    /// Power a VM on
    Start { name: String },

    /// Power a VM off
    Stop { name: String },
}

pub async fn execute(command: Command, config: Config, format: OutputFormat) -> Result<()> {
    let host = xvol_platform::open_host(&config).await?;
    debug!("Host state at {}", config.state_path()?.display());

    let result = match command {
        Command::Vm { action } => vm::execute(action, &host, format).await,
        Command::Connect { connection } => {
            volume::connect(&connection, &host, config, format).await
        }
        Command::Attach {
            instance,
            mountpoint,
            connection,
            no_hotplug,
        } => {
            volume::attach(
                &instance,
                &mountpoint,
                &connection,
                !no_hotplug,
                &host,
                config,
                format,
            )
            .await
        }
        Command::Detach {
            instance,
            mountpoint,
            connection,
        } => volume::detach(&instance, &mountpoint, &connection, &host, config).await,
        Command::DetachAll { instance } => volume::detach_all(&instance, &host, config).await,
        Command::Status => status::execute(&host, format).await,
    };

    // Failed attaches compensate on the host, so persist either way.
    host.save().await?;
    result
}

mod commands;
mod output;
mod utils;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xvol_core::Config;

#[derive(Parser, Debug)]
#[command(name = "xvol")]
#[command(about = "xvol - attach backend storage volumes to hypervisor VMs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    #[arg(short, long, global = true, help = "Verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Quiet output")]
    quiet: bool,

    #[arg(
        long,
        global = true,
        help = "Output format",
        value_enum,
        default_value = "table"
    )]
    format: output::OutputFormat,

    #[arg(
        long,
        global = true,
        env = "XVOL_STATE",
        help = "Host state file (default: ~/.xvol/host.json)"
    )]
    state: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(state) = cli.state {
        config.state_file = Some(state);
    }

    match commands::execute(cli.command, config, cli.format).await {
        Ok(_) => Ok(()),
        Err(e) => {
            output::print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

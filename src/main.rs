//! slowrelay - delay and forward IPv4 frames from one host to a gateway MAC.
//!
//! Requires root or CAP_NET_RAW.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slowrelay::config::{self, Settings};
use slowrelay::link;
use slowrelay::Relay;

#[derive(Parser)]
#[command(name = "slowrelay")]
#[command(about = "Capture frames from a host, delay them and forward them to a gateway MAC")]
struct Args {
    /// Network interface to capture on (e.g., eth0)
    #[arg(short, long)]
    interface: Option<String>,

    /// Next-hop MAC address (e.g., cc:ce:1e:3a:40:e8)
    #[arg(short, long)]
    gateway: Option<String>,

    /// Only frames with this IPv4 source address are forwarded
    #[arg(short, long)]
    target: Option<String>,

    /// Delay applied to every forwarded frame, in milliseconds
    #[arg(short, long = "delay-ms")]
    delay_ms: Option<u64>,

    /// Queue capacity in frames
    #[arg(short, long)]
    capacity: Option<usize>,

    /// Interface to forward out of (defaults to the capture interface)
    #[arg(long)]
    egress_interface: Option<String>,

    /// Source MAC for forwarded frames (defaults to the egress interface's)
    #[arg(long)]
    local_mac: Option<String>,

    /// Config file (defaults to /etc/slowrelay.conf if it exists)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every matched frame
    #[arg(short, long)]
    verbose: bool,

    /// List network interfaces and exit
    #[arg(long)]
    list_interfaces: bool,
}

impl Args {
    fn settings(&self) -> Settings {
        Settings {
            interface: self.interface.clone(),
            egress_interface: self.egress_interface.clone(),
            gateway: self.gateway.clone(),
            local_mac: self.local_mac.clone(),
            target: self.target.clone(),
            delay_ms: self.delay_ms.map(|ms| ms.to_string()),
            capacity: self.capacity.map(|c| c.to_string()),
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    let config = config::load(args.config.as_deref(), args.settings())
        .context("Invalid configuration")?;

    let endpoints = link::open(
        &config.interface,
        config.egress_interface(),
        config.poll_interval,
    )
    .context("Failed to open link")?;

    let relay = Relay::new(
        config,
        endpoints.receiver,
        endpoints.transmitter,
        endpoints.local_mac,
    );

    let running = relay.running_flag();
    ctrlc::set_handler(move || {
        info!("Received termination signal, shutting down");
        running.store(false, Ordering::SeqCst);
    })
    .context("Failed to install signal handler")?;

    relay.run().context("Relay failed")?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_interfaces {
        for iface in link::list_interfaces() {
            println!("{}", iface);
        }
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_become_settings() {
        let args = Args::parse_from([
            "slowrelay",
            "-i",
            "eth0",
            "-g",
            "cc:ce:1e:3a:40:e8",
            "-t",
            "192.168.1.10",
            "-d",
            "250",
            "-c",
            "64",
        ]);
        let settings = args.settings();
        assert_eq!(settings.interface.as_deref(), Some("eth0"));
        assert_eq!(settings.gateway.as_deref(), Some("cc:ce:1e:3a:40:e8"));
        assert_eq!(settings.target.as_deref(), Some("192.168.1.10"));
        assert_eq!(settings.delay_ms.as_deref(), Some("250"));
        assert_eq!(settings.capacity.as_deref(), Some("64"));
        assert_eq!(settings.egress_interface, None);
    }

    #[test]
    fn test_unset_flags_stay_unset() {
        let args = Args::parse_from(["slowrelay", "--list-interfaces"]);
        assert!(args.list_interfaces);
        assert_eq!(args.settings(), Settings::default());
    }

    #[test]
    fn test_args_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}

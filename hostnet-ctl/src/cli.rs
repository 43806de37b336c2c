//! Command-line argument parsing.

use clap::{Parser, Subcommand, ValueEnum};

/// hostnet-ctl - ensure VLAN port groups exist on a virtualization host
#[derive(Parser, Debug)]
#[command(name = "hostnet-ctl")]
#[command(about = "hostnet-ctl - ensure VLAN port groups exist on a virtualization host")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "HOSTNET_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Management endpoint (e.g., unix:/var/run/openvswitch/db.sock, tcp:10.0.0.5:6640)
    #[arg(long, env = "HOSTNET_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Enable development mode (in-memory mock host)
    #[arg(long)]
    pub dev: bool,

    /// How to print the result
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the port group if missing, otherwise verify it matches
    Ensure(EnsureArgs),
}

#[derive(clap::Args, Debug)]
pub struct EnsureArgs {
    /// VLAN tag (0 for untagged)
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=4095))]
    pub vlan: u16,

    /// Port group name
    #[arg(long)]
    pub bridge: String,

    /// Physical adapter (defaults to network.vlan_interface from the config)
    #[arg(long)]
    pub adapter: Option<String>,

    /// Extra attribute recorded on creation, as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

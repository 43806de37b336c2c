//! # hostnet-ctl
//!
//! Ensures a VLAN-tagged port group exists on the host, creating it on the
//! virtual switch behind the chosen physical adapter when missing and
//! verifying it otherwise.
//!
//! ## Usage
//! ```bash
//! hostnet-ctl --config /etc/hostnet/hostnet.yaml ensure --vlan 100 --bridge pg-100
//! hostnet-ctl --dev --output json ensure --vlan 0 --bridge pg-native --attr owner=ops
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use hostnet_bridge::{
    ensure_vlan_bridge, BridgeReconciler, DesiredState, MockHost, OvsNetwork, ReconcileOutcome,
    SessionProvider, VlanId,
};
use hostnet_common::LogFormat;

mod cli;
mod config;

use cli::{Args, Command, EnsureArgs, OutputFormat};
use config::{Backend, Config, DEFAULT_CONFIG_PATH};

/// Switch the development mock puts the configured adapter on.
const DEV_SWITCH: &str = "vSwitch0";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let format = if args.log_json { LogFormat::Json } else { LogFormat::Pretty };
    hostnet_common::init(format, &args.log_level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting hostnet-ctl");

    // Load configuration
    let config = match Config::load_or_default(args.config.as_deref(), DEFAULT_CONFIG_PATH) {
        Ok(cfg) => cfg.with_cli_overrides(&args),
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return Err(e);
        }
    };
    config.validate()?;

    info!(
        backend = ?config.backend,
        endpoint = %config.session.endpoint,
        "hostnet-ctl configured"
    );

    match &args.command {
        Command::Ensure(ensure) => {
            let desired = desired_state(ensure, &config)?;
            let outcome = match run_ensure(&config, &desired).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        error = %e,
                        recoverable = e.is_recoverable(),
                        bridge = %desired.bridge,
                        "Failed to ensure port group"
                    );
                    return Err(e.into());
                }
            };
            print_report(args.output, &Report::new(&desired, outcome))?;
        }
    }

    Ok(())
}

fn desired_state(ensure: &EnsureArgs, config: &Config) -> Result<DesiredState> {
    let vlan = VlanId::try_from(ensure.vlan).map_err(anyhow::Error::msg)?;
    let adapter = ensure
        .adapter
        .clone()
        .unwrap_or_else(|| config.network.vlan_interface.clone());

    let mut desired = DesiredState::new(vlan, ensure.bridge.clone(), adapter);
    for (key, value) in &ensure.attributes {
        desired = desired.with_attribute(key.clone(), value.clone());
    }
    Ok(desired)
}

async fn run_ensure(
    config: &Config,
    desired: &DesiredState,
) -> Result<ReconcileOutcome, hostnet_bridge::ReconcileError> {
    let (provider, reconciler) = match config.backend {
        Backend::Ovs => {
            let ovs = Arc::new(OvsNetwork::new().with_sysfs_root(&config.network.sysfs_root));
            let provider: Arc<dyn SessionProvider> = ovs.clone();
            (provider, BridgeReconciler::from_backend(ovs))
        }
        Backend::Mock => {
            info!(
                adapter = %config.network.vlan_interface,
                switch = DEV_SWITCH,
                "Using mock host (development mode)"
            );
            let host = Arc::new(
                MockHost::new().with_adapter(&config.network.vlan_interface, Some(DEV_SWITCH)),
            );
            let provider: Arc<dyn SessionProvider> = host.clone();
            (provider, BridgeReconciler::from_backend(host))
        }
    };

    ensure_vlan_bridge(provider.as_ref(), &config.session, &reconciler, desired).await
}

/// Result printed on success.
#[derive(Debug, Serialize)]
struct Report<'a> {
    bridge: &'a str,
    adapter: &'a str,
    vlan: VlanId,
    outcome: ReconcileOutcome,
}

impl<'a> Report<'a> {
    fn new(desired: &'a DesiredState, outcome: ReconcileOutcome) -> Self {
        Self {
            bridge: &desired.bridge,
            adapter: &desired.adapter,
            vlan: desired.vlan,
            outcome,
        }
    }

    fn text(&self) -> String {
        let action = match self.outcome {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::Verified => "already present",
        };
        format!(
            "port group {} {} on adapter {} (vlan {})",
            self.bridge, action, self.adapter, self.vlan
        )
    }
}

fn print_report(format: OutputFormat, report: &Report<'_>) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report.text()),
        OutputFormat::Json => println!("{}", serde_json::to_string(report)?),
    }
    Ok(())
}

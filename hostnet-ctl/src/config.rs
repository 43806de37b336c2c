//! Configuration management for hostnet-ctl.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use hostnet_bridge::network::DEFAULT_SYSFS_NET;
use hostnet_bridge::SessionConfig;

use crate::cli::Args;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostnet/hostnet.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host backend
    pub backend: Backend,
    /// Management session settings
    pub session: SessionConfig,
    /// Host network defaults
    pub network: NetworkConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Load `explicit` when given, otherwise `default_path`.
    ///
    /// Built-in defaults are used only when no path was given and
    /// `default_path` does not exist. A default file that exists but fails
    /// to load is an error.
    pub fn load_or_default<P: AsRef<Path>>(explicit: Option<&str>, default_path: P) -> Result<Self> {
        if let Some(path) = explicit {
            let config = Self::load(path)?;
            info!(config_path = %path, "Configuration loaded");
            return Ok(config);
        }

        let default_path = default_path.as_ref();
        if !default_path.exists() {
            info!("No config file found, using CLI arguments and defaults");
            return Ok(Self::default());
        }

        let config = Self::load(default_path)?;
        info!(config_path = %default_path.display(), "Configuration loaded from default location");
        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref endpoint) = args.endpoint {
            self.session.endpoint = endpoint.clone();
        }

        if args.dev {
            self.backend = Backend::Mock;
        }

        self
    }

    /// Check the configuration before any host is contacted.
    pub fn validate(&self) -> Result<()> {
        self.session
            .validate()
            .context("Invalid session configuration")?;

        if self.network.vlan_interface.trim().is_empty() {
            anyhow::bail!("network.vlan_interface must not be empty");
        }

        Ok(())
    }
}

/// Host backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Open vSwitch via ovs-vsctl
    #[default]
    Ovs,
    /// In-memory mock host for development
    Mock,
}

/// Host network defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Adapter used when a request names none
    pub vlan_interface: String,
    /// Where local adapters are looked up
    pub sysfs_root: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vlan_interface: "vmnic0".to_string(),
            sysfs_root: DEFAULT_SYSFS_NET.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["hostnet-ctl"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["ensure", "--vlan", "1", "--bridge", "pg-1"]);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend, Backend::Ovs);
        assert_eq!(config.network.vlan_interface, "vmnic0");
        assert_eq!(config.network.sysfs_root, "/sys/class/net");
        assert_eq!(config.session.retry_count, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend: mock\nsession:\n  endpoint: tcp:10.0.0.5:6640\n  retry_count: 3\nnetwork:\n  vlan_interface: eth1\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend, Backend::Mock);
        assert_eq!(config.session.endpoint, "tcp:10.0.0.5:6640");
        assert_eq!(config.session.retry_count, 3);
        assert_eq!(config.session.retry_interval_secs, 2);
        assert_eq!(config.network.vlan_interface, "eth1");
        assert_eq!(config.network.sysfs_root, "/sys/class/net");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn test_load_rejects_unknown_backend() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend: vmware").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_default_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(None, dir.path().join("hostnet.yaml")).unwrap();
        assert_eq!(config.backend, Backend::Ovs);
        assert_eq!(config.session.endpoint, "unix:/var/run/openvswitch/db.sock");
    }

    #[test]
    fn test_broken_default_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostnet.yaml");
        std::fs::write(&path, "backend: vmware\nsession:\n  endpoint: tcp:10.0.0.5:6640\n").unwrap();
        assert!(Config::load_or_default(None, &path).is_err());

        std::fs::write(&path, "session: [unclosed\n").unwrap();
        assert!(Config::load_or_default(None, &path).is_err());

        std::fs::write(&path, "session:\n  endpoint: tcp:10.0.0.5:6640\n").unwrap();
        let config = Config::load_or_default(None, &path).unwrap();
        assert_eq!(config.session.endpoint, "tcp:10.0.0.5:6640");
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let default_path = dir.path().join("hostnet.yaml");
        assert!(Config::load_or_default(missing.to_str(), &default_path).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_cli_overrides(&args(&["--dev", "--endpoint", "tcp:192.168.1.2:6640"]));
        assert_eq!(config.backend, Backend::Mock);
        assert_eq!(config.session.endpoint, "tcp:192.168.1.2:6640");

        let untouched = Config::default().with_cli_overrides(&args(&[]));
        assert_eq!(untouched.backend, Backend::Ovs);
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.network.vlan_interface = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.endpoint = "ssl:esx01:6640".to_string();
        assert!(config.validate().is_err());
    }
}

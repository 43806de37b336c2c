//! Open vSwitch host integration.
//!
//! This module handles:
//! - Checking physical adapters (sysfs for local sessions, the OVSDB
//!   `Interface` table for remote ones)
//! - Resolving the OVS bridge that owns an adapter's port
//! - Looking up and creating VLAN port groups as OVS fake bridges
//! - Probing the OVSDB endpoint when a session is opened

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::command::{self, VsctlOutput, VSCTL_CMD};
use crate::error::{BackendError, SessionError};
use crate::session::{Session, SessionConfig};
use crate::traits::{NetworkInspector, NetworkMutator, SessionProvider};
use crate::types::{PortGroup, PortGroupSpec, VirtualSwitchRef, VlanId};

/// Where the kernel lists network interfaces.
pub const DEFAULT_SYSFS_NET: &str = "/sys/class/net";

/// `ovs-vsctl br-exists` exit status for a missing bridge.
const BR_EXISTS_ABSENT: i32 = 2;

/// OVS-backed implementation of the network capabilities.
#[derive(Clone)]
pub struct OvsNetwork {
    /// Directory listing kernel interfaces (default: "/sys/class/net")
    sysfs_root: PathBuf,
    /// `ovs-vsctl` program to run
    program: String,
}

impl OvsNetwork {
    /// Create an integration using the system `ovs-vsctl`.
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_NET),
            program: VSCTL_CMD.to_string(),
        }
    }

    /// Use another directory to look up kernel interfaces.
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    /// Use another `ovs-vsctl` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn vsctl(&self, session: &Session, args: &[&str]) -> Result<VsctlOutput, BackendError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        command::run(&self.program, session, &args).await
    }

    async fn local_adapter_exists(&self, adapter: &str) -> Result<bool, BackendError> {
        // Names containing separators cannot be interfaces and must not
        // escape the sysfs directory.
        if adapter.contains('/') || adapter == "." || adapter == ".." {
            return Ok(false);
        }
        tokio::fs::try_exists(self.sysfs_root.join(adapter))
            .await
            .map_err(|e| BackendError::Internal(format!(
                "Failed to check {}: {}",
                self.sysfs_root.join(adapter).display(),
                e
            )))
    }
}

impl Default for OvsNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the output of `br-to-vlan`.
fn parse_vlan(output: &str) -> Result<VlanId, BackendError> {
    output
        .trim()
        .parse::<u16>()
        .ok()
        .and_then(VlanId::new)
        .ok_or_else(|| BackendError::Parse(format!("invalid VLAN tag '{}'", output.trim())))
}

/// Arguments creating `spec` as a fake bridge, with attributes stored as
/// bridge external ids in the same transaction.
fn add_br_args(spec: &PortGroupSpec) -> Vec<String> {
    let mut args = vec![
        "add-br".to_string(),
        spec.name.clone(),
        spec.switch.as_str().to_string(),
        spec.vlan.to_string(),
    ];
    for (key, value) in &spec.attributes {
        args.extend([
            "--".to_string(),
            "br-set-external-id".to_string(),
            spec.name.clone(),
            key.clone(),
            value.clone(),
        ]);
    }
    args
}

#[async_trait]
impl SessionProvider for OvsNetwork {
    #[instrument(skip(self, config), fields(endpoint = %config.endpoint))]
    async fn open(&self, config: &SessionConfig) -> Result<Session, SessionError> {
        config.validate()?;
        let session = Session::new(config);

        let probe = self
            .vsctl(&session, &["get", "Open_vSwitch", ".", "ovs_version"])
            .await;
        let failure = match probe {
            Ok(out) if out.success() => {
                info!(
                    session_id = %session.id(),
                    ovs_version = %out.value().trim_matches('"'),
                    "OVS session opened"
                );
                return Ok(session);
            }
            Ok(out) => command::command_failed("get Open_vSwitch . ovs_version", &out),
            Err(e) => e,
        };

        let attempts = if failure.is_transient() {
            session.retry_count() + 1
        } else {
            1
        };
        warn!(error = %failure, attempts, "Failed to open OVS session");
        Err(SessionError::ConnectFailed {
            endpoint: session.endpoint().to_string(),
            attempts,
            source: failure,
        })
    }
}

#[async_trait]
impl NetworkInspector for OvsNetwork {
    #[instrument(skip(self, session))]
    async fn adapter_exists(&self, session: &Session, adapter: &str) -> Result<bool, BackendError> {
        if session.is_local() {
            return self.local_adapter_exists(adapter).await;
        }

        let filter = format!("name={}", adapter);
        let out = self
            .vsctl(session, &["--bare", "--columns=name", "find", "Interface", &filter])
            .await?;
        if !out.success() {
            return Err(command::command_failed("find Interface", &out));
        }
        Ok(!out.value().is_empty())
    }

    #[instrument(skip(self, session))]
    async fn switch_for_adapter(
        &self,
        session: &Session,
        adapter: &str,
    ) -> Result<Option<VirtualSwitchRef>, BackendError> {
        let out = self.vsctl(session, &["port-to-br", adapter]).await?;
        if out.success() {
            let bridge = out.value();
            debug!(switch = %bridge, "Adapter port found");
            return Ok((!bridge.is_empty()).then(|| VirtualSwitchRef::new(bridge)));
        }
        if out.stderr.contains("no port named") {
            return Ok(None);
        }
        Err(command::command_failed("port-to-br", &out))
    }

    #[instrument(skip(self, session))]
    async fn find_port_group(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<PortGroup>, BackendError> {
        let out = self.vsctl(session, &["br-exists", name]).await?;
        match out.exit_code {
            Some(0) => {}
            Some(BR_EXISTS_ABSENT) => return Ok(None),
            _ => return Err(command::command_failed("br-exists", &out)),
        }

        let parent = self.vsctl(session, &["br-to-parent", name]).await?;
        if !parent.success() {
            return Err(command::command_failed("br-to-parent", &parent));
        }

        let vlan = self.vsctl(session, &["br-to-vlan", name]).await?;
        if !vlan.success() {
            return Err(command::command_failed("br-to-vlan", &vlan));
        }

        Ok(Some(PortGroup {
            name: name.to_string(),
            switch: VirtualSwitchRef::new(parent.value()),
            vlan: parse_vlan(vlan.value())?,
        }))
    }
}

#[async_trait]
impl NetworkMutator for OvsNetwork {
    #[instrument(skip(self, session, spec), fields(name = %spec.name, switch = %spec.switch, vlan = %spec.vlan))]
    async fn create_port_group(&self, session: &Session, spec: &PortGroupSpec) -> Result<(), BackendError> {
        info!("Creating OVS fake bridge");

        let args = add_br_args(spec);
        let out = command::run_mutation(&self.program, session, &args).await?;
        if !out.success() {
            return Err(command::mutation_failure("add-br", &spec.name, &out));
        }

        debug!(attributes = spec.attributes.len(), "OVS fake bridge created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;

    use crate::error::ReconcileError;
    use crate::reconciler::BridgeReconciler;
    use crate::types::{DesiredState, ReconcileOutcome};

    /// Records the created fake bridge as `br-<name>` holding parent and VLAN.
    const ADD_BR_OK: &str = r#"printf '%s\n%s\n' "$3" "$4" > "$DIR/br-$2""#;

    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ovs-vsctl");
        std::fs::write(&path, format!("#!/bin/sh\nDIR=\"{}\"\n{}", dir.display(), body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Stand-in `ovs-vsctl`: `eth0` is a port of the real bridge `br-phys`,
    /// fake bridges live as files in `dir`, and every command is appended to
    /// `calls.log`. `add_br` runs when a new fake bridge is requested.
    fn fake_vsctl(dir: &Path, add_br: &str) -> PathBuf {
        let body = r##"
while [ $# -gt 0 ]; do
  case "$1" in
    --db=*|--timeout=*|--private-key=*|--certificate=*|--ca-cert=*|--bare|--columns=*) shift ;;
    *) break ;;
  esac
done
echo "$@" >> "$DIR/calls.log"
case "$1" in
  get) echo '"3.1.0"' ;;
  find) case "$*" in *name=eth0*) echo eth0 ;; esac ;;
  port-to-br)
    if [ "$2" = eth0 ]; then echo br-phys; exit 0; fi
    echo "ovs-vsctl: no port named $2" >&2; exit 1 ;;
  br-exists)
    if [ "$2" = br-phys ] || [ -f "$DIR/br-$2" ]; then exit 0; fi
    if [ "$2" = broken ]; then echo "ovs-vsctl: transaction error" >&2; exit 1; fi
    exit 2 ;;
  br-to-parent)
    if [ "$2" = br-phys ]; then echo br-phys; else sed -n 1p "$DIR/br-$2"; fi ;;
  br-to-vlan)
    if [ "$2" = br-phys ]; then echo 0; else sed -n 2p "$DIR/br-$2"; fi ;;
  add-br)
    if [ -f "$DIR/br-$2" ]; then
      echo "ovs-vsctl: cannot create a bridge named $2 because a bridge named $2 already exists" >&2
      exit 1
    fi
    ADD_BR
    ;;
  *) echo "ovs-vsctl: unknown command '$1'" >&2; exit 1 ;;
esac
"##;
        write_script(dir, &body.replace("ADD_BR", add_br))
    }

    fn calls_starting_with(dir: &Path, prefix: &str) -> usize {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn remote_session() -> Session {
        Session::new(&SessionConfig::default().with_endpoint("tcp:127.0.0.1:6640"))
    }

    fn local_session() -> Session {
        Session::new(&SessionConfig::default())
    }

    #[test]
    fn test_parse_vlan() {
        assert_eq!(parse_vlan("0\n").unwrap(), VlanId::UNTAGGED);
        assert_eq!(parse_vlan(" 100 ").unwrap().get(), 100);
        assert!(matches!(parse_vlan("4096"), Err(BackendError::Parse(_))));
        assert!(matches!(parse_vlan("abc"), Err(BackendError::Parse(_))));
    }

    #[test]
    fn test_add_br_args() {
        let mut attributes = BTreeMap::new();
        attributes.insert("owner".to_string(), "tenant-a".to_string());
        let spec = PortGroupSpec {
            name: "pg-100".to_string(),
            switch: VirtualSwitchRef::new("br-phys"),
            vlan: VlanId::new(100).unwrap(),
            attributes,
        };

        assert_eq!(
            add_br_args(&spec),
            vec![
                "add-br", "pg-100", "br-phys", "100",
                "--", "br-set-external-id", "pg-100", "owner", "tenant-a",
            ]
        );
    }

    #[tokio::test]
    async fn test_local_adapter_lookup_uses_sysfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("eth0")).unwrap();
        let ovs = OvsNetwork::new().with_sysfs_root(dir.path());
        let session = local_session();

        assert!(ovs.adapter_exists(&session, "eth0").await.unwrap());
        assert!(!ovs.adapter_exists(&session, "eth1").await.unwrap());
        assert!(!ovs.adapter_exists(&session, "../eth0").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config_without_probing() {
        let ovs = OvsNetwork::new().with_program("/nonexistent/ovs-vsctl");
        let config = SessionConfig::default().with_endpoint("ssl:10.0.0.5:6640");

        let err = ovs.open(&config).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig { ref field, .. } if field == "tls"));
    }

    #[tokio::test]
    async fn test_open_reports_unusable_program() {
        let ovs = OvsNetwork::new().with_program("/nonexistent/ovs-vsctl");

        let err = ovs.open(&SessionConfig::default()).await.unwrap_err();
        match err {
            SessionError::ConnectFailed { endpoint, attempts, source } => {
                assert_eq!(endpoint, "unix:/var/run/openvswitch/db.sock");
                assert_eq!(attempts, 1);
                assert!(matches!(source, BackendError::CommandFailed { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_switch_for_adapter_answers() {
        let dir = tempfile::tempdir().unwrap();
        let ovs = OvsNetwork::new().with_program(fake_vsctl(dir.path(), ADD_BR_OK).to_string_lossy());
        let session = remote_session();

        assert_eq!(
            ovs.switch_for_adapter(&session, "eth0").await.unwrap(),
            Some(VirtualSwitchRef::new("br-phys"))
        );
        assert_eq!(ovs.switch_for_adapter(&session, "eth9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remote_adapter_lookup_uses_interface_table() {
        let dir = tempfile::tempdir().unwrap();
        let ovs = OvsNetwork::new().with_program(fake_vsctl(dir.path(), ADD_BR_OK).to_string_lossy());
        let session = remote_session();

        assert!(ovs.adapter_exists(&session, "eth0").await.unwrap());
        assert!(!ovs.adapter_exists(&session, "eth9").await.unwrap());
        assert_eq!(calls_starting_with(dir.path(), "find Interface"), 2);
    }

    #[tokio::test]
    async fn test_find_port_group_answers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("br-pg-10"), "br-phys\n10\n").unwrap();
        let ovs = OvsNetwork::new().with_program(fake_vsctl(dir.path(), ADD_BR_OK).to_string_lossy());
        let session = remote_session();

        assert_eq!(ovs.find_port_group(&session, "pg-11").await.unwrap(), None);
        assert_eq!(
            ovs.find_port_group(&session, "pg-10").await.unwrap(),
            Some(PortGroup {
                name: "pg-10".to_string(),
                switch: VirtualSwitchRef::new("br-phys"),
                vlan: VlanId::new(10).unwrap(),
            })
        );

        let err = ovs.find_port_group(&session, "broken").await.unwrap_err();
        assert!(matches!(err, BackendError::CommandFailed { exit_code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_transient_failures_retried_per_session_policy() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_script(
            dir.path(),
            "echo x >> \"$DIR/calls.log\"\necho 'ovs-vsctl: database connection failed (Connection refused)' >&2\nexit 1\n",
        );
        let ovs = OvsNetwork::new().with_program(program.to_string_lossy());
        let mut config = SessionConfig::default().with_endpoint("tcp:127.0.0.1:6640");
        config.retry_count = 2;
        config.retry_interval_secs = 0;

        let err = ovs.open(&config).await.unwrap_err();
        match err {
            SessionError::ConnectFailed { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, BackendError::ConnectionFailed { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls_starting_with(dir.path(), "x"), 3);
    }

    #[tokio::test]
    async fn test_reconcile_creates_fake_bridge_once() {
        let dir = tempfile::tempdir().unwrap();
        let ovs = Arc::new(
            OvsNetwork::new().with_program(fake_vsctl(dir.path(), ADD_BR_OK).to_string_lossy()),
        );
        let reconciler = BridgeReconciler::from_backend(ovs);
        let session = remote_session();
        let desired = DesiredState::new(VlanId::new(10).unwrap(), "pg-10", "eth0");

        assert_eq!(
            reconciler.reconcile(&session, &desired).await,
            Ok(ReconcileOutcome::Created)
        );
        assert_eq!(
            reconciler.reconcile(&session, &desired).await,
            Ok(ReconcileOutcome::Verified)
        );
        assert_eq!(calls_starting_with(dir.path(), "add-br pg-10 br-phys 10"), 1);
    }

    #[tokio::test]
    async fn test_interrupted_creation_is_not_reissued() {
        let dir = tempfile::tempdir().unwrap();
        // Commit, then die before answering.
        let add_br = format!("{}\n    kill -9 $$", ADD_BR_OK);
        let ovs = Arc::new(
            OvsNetwork::new().with_program(fake_vsctl(dir.path(), &add_br).to_string_lossy()),
        );
        let reconciler = BridgeReconciler::from_backend(ovs);
        let session = remote_session();
        let desired = DesiredState::new(VlanId::new(10).unwrap(), "pg-10", "eth0");

        let err = reconciler.reconcile(&session, &desired).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::MutationFailed { source: BackendError::Timeout(_), .. }
        ));
        assert!(err.is_recoverable());
        assert_eq!(calls_starting_with(dir.path(), "add-br"), 1);

        // The next reconciliation re-verifies what the host committed.
        assert_eq!(
            reconciler.reconcile(&session, &desired).await,
            Ok(ReconcileOutcome::Verified)
        );
        assert_eq!(calls_starting_with(dir.path(), "add-br"), 1);
    }

    #[tokio::test]
    async fn test_switch_bridge_is_not_verified_as_port_group() {
        let dir = tempfile::tempdir().unwrap();
        let ovs = Arc::new(
            OvsNetwork::new().with_program(fake_vsctl(dir.path(), ADD_BR_OK).to_string_lossy()),
        );
        let reconciler = BridgeReconciler::from_backend(ovs);
        let desired = DesiredState::new(VlanId::UNTAGGED, "br-phys", "eth0");

        let err = reconciler.reconcile(&remote_session(), &desired).await.unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDesiredState { .. }));
        assert_eq!(calls_starting_with(dir.path(), "add-br"), 0);
    }
}

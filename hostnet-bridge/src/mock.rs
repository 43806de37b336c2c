//! Mock host for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{BackendError, SessionError};
use crate::session::{Session, SessionConfig};
use crate::traits::{NetworkInspector, NetworkMutator, SessionProvider};
use crate::types::{PortGroup, PortGroupSpec, VirtualSwitchRef, VlanId};

/// A capability call received by [`MockHost`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    AdapterExists(String),
    SwitchForAdapter(String),
    FindPortGroup(String),
    CreatePortGroup(PortGroupSpec),
}

/// In-memory host implementing every capability.
///
/// Useful for:
/// - Unit and integration testing (calls are recorded for assertions)
/// - Running the CLI without a real virtual switch
pub struct MockHost {
    state: RwLock<MockState>,
    lookup_delay: Option<Duration>,
}

#[derive(Default)]
struct MockState {
    /// Adapter name to the switch it backs, if any
    adapters: HashMap<String, Option<VirtualSwitchRef>>,
    port_groups: HashMap<String, PortGroup>,
    created: Vec<PortGroupSpec>,
    calls: Vec<HostCall>,
    create_failure: Option<BackendError>,
    lookup_failure: Option<BackendError>,
}

impl MockHost {
    /// Create an empty mock host.
    pub fn new() -> Self {
        info!("Creating mock host");
        Self {
            state: RwLock::new(MockState::default()),
            lookup_delay: None,
        }
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Add a physical adapter, optionally backing a virtual switch.
    pub fn with_adapter(mut self, adapter: &str, switch: Option<&str>) -> Self {
        self.state_mut()
            .adapters
            .insert(adapter.to_string(), switch.map(VirtualSwitchRef::new));
        self
    }

    /// Add an existing port group.
    pub fn with_port_group(mut self, name: &str, switch: &str, vlan: VlanId) -> Self {
        self.state_mut().port_groups.insert(
            name.to_string(),
            PortGroup {
                name: name.to_string(),
                switch: VirtualSwitchRef::new(switch),
                vlan,
            },
        );
        self
    }

    /// Make every creation fail with `error`.
    pub fn fail_create_with(mut self, error: BackendError) -> Self {
        self.state_mut().create_failure = Some(error);
        self
    }

    /// Make every port-group lookup fail with `error`.
    pub fn fail_port_group_lookups_with(mut self, error: BackendError) -> Self {
        self.state_mut().lookup_failure = Some(error);
        self
    }

    /// Delay each port-group lookup answer, widening the window between
    /// lookup and creation.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<HostCall> {
        self.snapshot(|s| s.calls.clone())
    }

    /// Creation requests that succeeded.
    pub fn created(&self) -> Vec<PortGroupSpec> {
        self.snapshot(|s| s.created.clone())
    }

    /// Number of mutating calls received, successful or not.
    pub fn mutation_count(&self) -> usize {
        self.snapshot(|s| {
            s.calls
                .iter()
                .filter(|c| matches!(c, HostCall::CreatePortGroup(_)))
                .count()
        })
    }

    /// Current state of a port group.
    pub fn port_group(&self, name: &str) -> Option<PortGroup> {
        self.snapshot(|s| s.port_groups.get(name).cloned())
    }

    fn record(&self, call: HostCall) -> Result<std::sync::RwLockWriteGuard<'_, MockState>, BackendError> {
        let mut state = self.state.write().map_err(|_| {
            BackendError::Internal("Lock poisoned".to_string())
        })?;
        state.calls.push(call);
        Ok(state)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionProvider for MockHost {
    async fn open(&self, config: &SessionConfig) -> Result<Session, SessionError> {
        config.validate()?;
        let session = Session::new(config);
        debug!(session_id = %session.id(), endpoint = %session.endpoint(), "Mock session opened");
        Ok(session)
    }
}

#[async_trait]
impl NetworkInspector for MockHost {
    async fn adapter_exists(&self, _session: &Session, adapter: &str) -> Result<bool, BackendError> {
        let state = self.record(HostCall::AdapterExists(adapter.to_string()))?;
        Ok(state.adapters.contains_key(adapter))
    }

    async fn switch_for_adapter(
        &self,
        _session: &Session,
        adapter: &str,
    ) -> Result<Option<VirtualSwitchRef>, BackendError> {
        let state = self.record(HostCall::SwitchForAdapter(adapter.to_string()))?;
        Ok(state.adapters.get(adapter).cloned().flatten())
    }

    #[instrument(skip(self, _session))]
    async fn find_port_group(
        &self,
        _session: &Session,
        name: &str,
    ) -> Result<Option<PortGroup>, BackendError> {
        let found = {
            let state = self.record(HostCall::FindPortGroup(name.to_string()))?;
            match &state.lookup_failure {
                Some(err) => Err(err.clone()),
                None => Ok(state.port_groups.get(name).cloned()),
            }
        };

        // The answer reflects the state at lookup time, as a remote call would.
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }

        found
    }
}

#[async_trait]
impl NetworkMutator for MockHost {
    #[instrument(skip(self, _session, spec), fields(name = %spec.name, switch = %spec.switch, vlan = %spec.vlan))]
    async fn create_port_group(&self, _session: &Session, spec: &PortGroupSpec) -> Result<(), BackendError> {
        let mut state = self.record(HostCall::CreatePortGroup(spec.clone()))?;

        if let Some(err) = &state.create_failure {
            return Err(err.clone());
        }

        if state.port_groups.contains_key(&spec.name) {
            return Err(BackendError::AlreadyExists(spec.name.clone()));
        }

        if !state.adapters.values().flatten().any(|s| *s == spec.switch) {
            return Err(BackendError::CommandFailed {
                command: format!("create {}", spec.name),
                exit_code: Some(1),
                stderr: format!("no virtual switch named {}", spec.switch),
            });
        }

        state.port_groups.insert(spec.name.clone(), spec.to_port_group());
        state.created.push(spec.clone());

        info!("Mock port group created");
        Ok(())
    }
}

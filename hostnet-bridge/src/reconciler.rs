//! Create-or-verify reconciliation of a VLAN port group.
//!
//! Existing state that disagrees with the desired state is reported, never
//! rewritten: rebinding a port group would disturb interfaces already
//! attached to it.
//!
//! The check-then-create sequence is not atomic. Two concurrent calls for
//! the same bridge may both see it missing; the losing creation is returned
//! as [`ReconcileError::MutationFailed`]. Use
//! [`SerializedReconciler`](crate::lock::SerializedReconciler) when calls
//! for one bridge can overlap.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::{ReconcileError, Result};
use crate::session::{Session, SessionConfig};
use crate::traits::{NetworkInspector, NetworkMutator, SessionProvider};
use crate::types::{DesiredState, ReconcileOutcome};

/// Drives a host toward a [`DesiredState`] through the capability traits.
///
/// Holds no state between calls; every decision is re-derived from fresh
/// queries.
#[derive(Clone)]
pub struct BridgeReconciler {
    inspector: Arc<dyn NetworkInspector>,
    mutator: Arc<dyn NetworkMutator>,
}

impl BridgeReconciler {
    /// Create a reconciler over the given capabilities.
    pub fn new(inspector: Arc<dyn NetworkInspector>, mutator: Arc<dyn NetworkMutator>) -> Self {
        Self { inspector, mutator }
    }

    /// Create a reconciler over one backend implementing both capabilities.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: NetworkInspector + NetworkMutator + 'static,
    {
        Self {
            inspector: backend.clone(),
            mutator: backend,
        }
    }

    /// Ensure the port group described by `desired` exists on the adapter's
    /// virtual switch.
    ///
    /// Checks run in a fixed order (adapter, switch, port group) and stop at
    /// the first failure. At most one mutating call is issued.
    #[instrument(
        skip(self, session, desired),
        fields(
            session_id = %session.id(),
            bridge = %desired.bridge,
            adapter = %desired.adapter,
            vlan = %desired.vlan,
        )
    )]
    pub async fn reconcile(&self, session: &Session, desired: &DesiredState) -> Result<ReconcileOutcome> {
        validate(desired)?;

        let adapter = desired.adapter.as_str();
        let bridge = desired.bridge.as_str();

        let exists = self
            .inspector
            .adapter_exists(session, adapter)
            .await
            .map_err(|source| ReconcileError::InspectionFailed {
                operation: "adapter_exists",
                source,
            })?;
        if !exists {
            warn!("Physical adapter not found");
            return Err(ReconcileError::AdapterNotFound {
                adapter: adapter.to_string(),
            });
        }

        let switch = self
            .inspector
            .switch_for_adapter(session, adapter)
            .await
            .map_err(|source| ReconcileError::InspectionFailed {
                operation: "switch_for_adapter",
                source,
            })?
            .ok_or_else(|| {
                warn!("No virtual switch uses the adapter");
                ReconcileError::SwitchNotAssociated {
                    adapter: adapter.to_string(),
                }
            })?;
        debug!(switch = %switch, "Resolved virtual switch");

        // A switch is not a port group of itself.
        if switch.as_str() == bridge {
            warn!(switch = %switch, "Bridge name is the virtual switch itself");
            return Err(ReconcileError::InvalidDesiredState {
                field: "bridge".to_string(),
                message: format!("{} is the virtual switch backing {}, not a port group", switch, adapter),
            });
        }

        let existing = self
            .inspector
            .find_port_group(session, bridge)
            .await
            .map_err(|source| ReconcileError::InspectionFailed {
                operation: "find_port_group",
                source,
            })?;

        let Some(port_group) = existing else {
            info!(switch = %switch, "Creating port group");
            let spec = desired.port_group_spec(switch);
            self.mutator
                .create_port_group(session, &spec)
                .await
                .map_err(|source| ReconcileError::MutationFailed {
                    bridge: bridge.to_string(),
                    source,
                })?;
            info!("Port group created");
            return Ok(ReconcileOutcome::Created);
        };

        if port_group.switch != switch {
            warn!(expected = %switch, actual = %port_group.switch, "Port group is on another virtual switch");
            return Err(ReconcileError::SwitchConflict {
                bridge: bridge.to_string(),
                expected: switch,
                actual: port_group.switch,
            });
        }

        if port_group.vlan != desired.vlan {
            warn!(expected = %desired.vlan, actual = %port_group.vlan, "Port group has another VLAN tag");
            return Err(ReconcileError::VlanConflict {
                bridge: bridge.to_string(),
                expected: desired.vlan,
                actual: port_group.vlan,
            });
        }

        debug!("Port group already matches");
        Ok(ReconcileOutcome::Verified)
    }
}

fn validate(desired: &DesiredState) -> Result<()> {
    for (field, value) in [("bridge", &desired.bridge), ("adapter", &desired.adapter)] {
        if value.trim().is_empty() {
            return Err(ReconcileError::InvalidDesiredState {
                field: field.to_string(),
                message: "must not be empty".to_string(),
            });
        }
    }
    Ok(())
}

/// Open a session with `provider` and reconcile `desired` over it.
///
/// Configuration and connection problems come back as
/// [`ReconcileError::Session`].
pub async fn ensure_vlan_bridge(
    provider: &dyn SessionProvider,
    config: &SessionConfig,
    reconciler: &BridgeReconciler,
    desired: &DesiredState,
) -> Result<ReconcileOutcome> {
    let session = provider.open(config).await?;
    reconciler.reconcile(&session, desired).await
}

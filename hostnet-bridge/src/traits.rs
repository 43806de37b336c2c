//! Capability traits a host integration must provide.
//!
//! The reconciler only talks to the host through these traits. Every call
//! receives the session explicitly so fakes can be substituted in tests.

use async_trait::async_trait;

use crate::error::{BackendError, SessionError};
use crate::session::{Session, SessionConfig};
use crate::types::{PortGroup, PortGroupSpec, VirtualSwitchRef};

/// Opens sessions against a host's management endpoint.
///
/// Implementations own connection setup and the retry policy for
/// transient failures.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Validate `config` and establish a session.
    async fn open(&self, config: &SessionConfig) -> Result<Session, SessionError>;
}

/// Read-only queries against the host's virtual networking.
#[async_trait]
pub trait NetworkInspector: Send + Sync {
    /// Check if a physical adapter with this name exists on the host.
    async fn adapter_exists(&self, session: &Session, adapter: &str) -> Result<bool, BackendError>;

    /// Get the virtual switch backed by the named physical adapter.
    async fn switch_for_adapter(
        &self,
        session: &Session,
        adapter: &str,
    ) -> Result<Option<VirtualSwitchRef>, BackendError>;

    /// Look up a port group by name, with its switch and VLAN tag.
    async fn find_port_group(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<PortGroup>, BackendError>;
}

/// The single write operation the reconciler performs.
#[async_trait]
pub trait NetworkMutator: Send + Sync {
    /// Create a VLAN-tagged port group on a virtual switch.
    async fn create_port_group(&self, session: &Session, spec: &PortGroupSpec) -> Result<(), BackendError>;
}

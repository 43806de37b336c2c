//! Error types for the port-group reconciler.

use thiserror::Error;

use crate::types::{VirtualSwitchRef, VlanId};

/// Errors reported by a host integration (session, inspection or mutation
/// capability).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The management endpoint could not be reached.
    #[error("Failed to connect to {endpoint}: {message}")]
    ConnectionFailed { endpoint: String, message: String },

    /// The call did not complete in time.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A port group with the requested name already exists.
    #[error("Port group already exists: {0}")]
    AlreadyExists(String),

    /// The session lacks the privilege for the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A management command exited unsuccessfully.
    #[error("Command '{command}' failed (exit code {exit_code:?}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The host returned an answer we could not interpret.
    #[error("Failed to parse host response: {0}")]
    Parse(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Transient failures may succeed when the same call is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout(_))
    }
}

/// Errors establishing a session with the management endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Missing or invalid endpoint/credential settings.
    #[error("Invalid session configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// The endpoint stayed unreachable for every attempt.
    #[error("Could not open session to {endpoint} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },
}

/// Errors returned by a reconciliation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// No session could be established.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The desired state itself is malformed.
    #[error("Invalid desired state for {field}: {message}")]
    InvalidDesiredState { field: String, message: String },

    /// The physical adapter is not present on the host.
    #[error("There is no physical network adapter named {adapter} on the host")]
    AdapterNotFound { adapter: String },

    /// The adapter exists but no virtual switch uses it.
    #[error("There is no virtual switch associated with the physical network adapter {adapter}")]
    SwitchNotAssociated { adapter: String },

    /// The port group exists on another virtual switch.
    #[error(
        "Port group {bridge} is on virtual switch {actual}, \
         expected {expected} (the switch backing the requested adapter)"
    )]
    SwitchConflict {
        bridge: String,
        expected: VirtualSwitchRef,
        actual: VirtualSwitchRef,
    },

    /// The port group exists with another VLAN tag.
    #[error("Port group {bridge} has VLAN tag {actual}, expected {expected}")]
    VlanConflict {
        bridge: String,
        expected: VlanId,
        actual: VlanId,
    },

    /// A read-only query against the host failed.
    #[error("Host query {operation} failed: {source}")]
    InspectionFailed {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    /// Creating the port group failed.
    #[error("Failed to create port group {bridge}: {source}")]
    MutationFailed {
        bridge: String,
        #[source]
        source: BackendError,
    },
}

impl ReconcileError {
    /// Whether repeating the whole reconciliation may succeed without
    /// operator intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Session(SessionError::ConnectFailed { .. }) => true,
            Self::InspectionFailed { .. } => true,
            Self::MutationFailed { source, .. } => {
                !matches!(source, BackendError::PermissionDenied(_))
            }
            _ => false,
        }
    }
}

/// Result type alias for reconciliations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

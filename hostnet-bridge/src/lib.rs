//! # hostnet Bridge
//!
//! Idempotent reconciliation of VLAN-tagged port groups ("bridges") on a
//! virtualization host.
//!
//! Given a VLAN tag, a bridge name and the physical adapter the bridge
//! should ride on, the reconciler either creates the missing port group on
//! the adapter's virtual switch or verifies that the existing one matches.
//! A port group bound to another switch or VLAN is reported as a conflict
//! and left untouched.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           BridgeReconciler              │
//! │  adapter → switch → port group → create │
//! └──────────┬─────────────────┬────────────┘
//!            │                 │
//!            ▼                 ▼
//!   NetworkInspector    NetworkMutator     (+ SessionProvider)
//!            │                 │
//!      ┌─────┴─────┐     ┌─────┴─────┐
//!      ▼           ▼     ▼           ▼
//!  OvsNetwork   MockHost ...
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hostnet_bridge::{BridgeReconciler, DesiredState, MockHost, Session, SessionConfig, VlanId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let host = Arc::new(MockHost::new().with_adapter("vmnic0", Some("vSwitch0")));
//!     let reconciler = BridgeReconciler::from_backend(host);
//!     let session = Session::new(&SessionConfig::default());
//!
//!     let desired = DesiredState::new(VlanId::new(100).unwrap(), "pg-100", "vmnic0");
//!     reconciler.reconcile(&session, &desired).await.unwrap();
//! }
//! ```

pub mod error;
pub mod lock;
pub mod mock;
pub mod network;
pub mod reconciler;
pub mod session;
pub mod traits;
pub mod types;

pub use error::{BackendError, ReconcileError, SessionError};
pub use lock::{BridgeLocks, SerializedReconciler};
pub use mock::{HostCall, MockHost};
pub use network::OvsNetwork;
pub use reconciler::{ensure_vlan_bridge, BridgeReconciler};
pub use session::{Session, SessionConfig, TlsCredentials, DEFAULT_ENDPOINT};
pub use traits::{NetworkInspector, NetworkMutator, SessionProvider};
pub use types::*;

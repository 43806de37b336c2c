//! Host integrations for the capability traits.
//!
//! This module provides:
//! - Open vSwitch integration: physical adapters are kernel interfaces,
//!   virtual switches are OVS bridges, port groups are VLAN-tagged
//!   fake bridges
//! - `ovs-vsctl` invocation with session-driven retry of transient failures

mod command;
mod ovs;

pub use ovs::{OvsNetwork, DEFAULT_SYSFS_NET};

//! Type definitions for port groups and the desired bridge state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// HOST OBJECTS
// =============================================================================

/// An 802.1Q VLAN tag. `0` means untagged (native VLAN).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Untagged traffic.
    pub const UNTAGGED: VlanId = VlanId(0);
    /// Largest value representable in the 12-bit VID field.
    pub const MAX: u16 = 4095;

    /// Create a VLAN tag, rejecting values outside `0..=4095`.
    pub fn new(id: u16) -> Option<Self> {
        (id <= Self::MAX).then_some(Self(id))
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn is_untagged(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u16> for VlanId {
    type Error = String;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        Self::new(id).ok_or_else(|| format!("VLAN tag {} is out of range 0..={}", id, Self::MAX))
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> Self {
        vlan.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a virtual switch on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualSwitchRef(String);

impl VirtualSwitchRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VirtualSwitchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, VLAN-tagged segment bound to one virtual switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortGroup {
    /// Unique name on the host
    pub name: String,
    /// Virtual switch the port group lives on
    pub switch: VirtualSwitchRef,
    /// VLAN tag applied to traffic in the port group
    pub vlan: VlanId,
}

/// Request handed to the mutation capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortGroupSpec {
    pub name: String,
    pub switch: VirtualSwitchRef,
    pub vlan: VlanId,
    /// Extra attributes recorded on the new port group
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PortGroupSpec {
    /// The port group this request creates.
    pub fn to_port_group(&self) -> PortGroup {
        PortGroup {
            name: self.name.clone(),
            switch: self.switch.clone(),
            vlan: self.vlan,
        }
    }
}

// =============================================================================
// DESIRED STATE
// =============================================================================

/// The bridge a caller wants to exist on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// VLAN tag for the port group
    pub vlan: VlanId,
    /// Port group name
    pub bridge: String,
    /// Physical adapter the port group should ride on
    pub adapter: String,
    /// Optional attributes applied when the port group is created
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DesiredState {
    pub fn new(vlan: VlanId, bridge: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            vlan,
            bridge: bridge.into(),
            adapter: adapter.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute applied on creation.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Creation request for this state on `switch`.
    pub fn port_group_spec(&self, switch: VirtualSwitchRef) -> PortGroupSpec {
        PortGroupSpec {
            name: self.bridge.clone(),
            switch,
            vlan: self.vlan,
            attributes: self.attributes.clone(),
        }
    }
}

/// Which path a successful reconciliation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The port group was missing and has been created.
    Created,
    /// The port group already existed with the desired binding.
    Verified,
}

impl ReconcileOutcome {
    pub fn is_mutation(self) -> bool {
        self == Self::Created
    }
}

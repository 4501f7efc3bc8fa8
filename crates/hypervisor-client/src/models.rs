//! Hypervisor API data models
//!
//! Observed machine state as reported by the hypervisor, plus the
//! effective machine configuration handed to it on create/update calls.

use serde::{Deserialize, Serialize};

/// Observed state of a machine on the hypervisor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    /// Machine name
    pub name: String,

    /// BIOS UUID assigned by the hypervisor; empty until the machine
    /// has been created
    #[serde(default)]
    pub bios_uuid: String,

    /// Lifecycle state
    #[serde(default)]
    pub state: VirtualMachineState,

    /// Per-adapter network status; may be empty before the machine
    /// exists or before guest tools report in
    #[serde(default)]
    pub network: Vec<NetworkStatus>,
}

impl VirtualMachine {
    /// Whether the machine is up and has a known identity.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == VirtualMachineState::Ready && !self.bios_uuid.is_empty()
    }

    /// Network status for the adapter attached to the named network.
    ///
    /// Adapter ordering on the hypervisor side is not assumed stable;
    /// entries are matched by network name.
    #[must_use]
    pub fn network_status(&self, network_name: &str) -> Option<&NetworkStatus> {
        self.network.iter().find(|s| s.network_name == network_name)
    }
}

/// Machine lifecycle state as reported by the hypervisor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum VirtualMachineState {
    /// Accepted but provisioning has not started
    #[default]
    Pending,

    /// Clone/power-on in progress
    Creating,

    /// Powered on with a known identity
    Ready,

    /// No such machine exists on the hypervisor
    NotFound,

    /// The hypervisor reports the machine in an error state
    Error,
}

/// Observed status of one network adapter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Whether the adapter link is up
    #[serde(default)]
    pub connected: bool,

    /// Addresses reported by the guest, in CIDR or plain notation
    #[serde(default)]
    pub ip_addrs: Vec<String>,

    /// Adapter MAC address
    #[serde(default)]
    pub mac_addr: String,

    /// Name of the hypervisor network the adapter is attached to
    #[serde(default)]
    pub network_name: String,
}

/// Effective machine configuration for create/update calls.
///
/// Built by the controller from the declarative spec with pool-bound
/// addresses already substituted in; the hypervisor never sees pool
/// references.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfig {
    /// Machine name
    pub name: String,

    /// Template to clone from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Ordered network device configuration
    #[serde(default)]
    pub devices: Vec<NetworkDeviceConfig>,
}

/// Effective configuration of one network device.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceConfig {
    /// Hypervisor network to attach to
    pub network_name: String,

    /// Request an IPv4 address via DHCP
    #[serde(default)]
    pub dhcp4: bool,

    /// Request an IPv6 address via DHCP
    #[serde(default)]
    pub dhcp6: bool,

    /// Static and pool-bound addresses in CIDR notation, in spec order
    #[serde(default)]
    pub ip_addrs: Vec<String>,
}

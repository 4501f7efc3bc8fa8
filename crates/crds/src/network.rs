//! Network configuration types shared by the VirtualMachine CRD
//!
//! The device list is ordered: the position of a device determines the
//! name of any AddressClaim created for it and the ethernet identifier
//! used in the guest boot metadata. Devices are matched to hypervisor
//! adapter status by network name, never by adapter index.

use crate::references::PoolReference;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired network configuration for a virtual machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Ordered list of network devices to attach to the machine
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<NetworkDeviceSpec>,
}

/// A single network device on a virtual machine.
///
/// By convention the device list is immutable once the machine exists:
/// re-specifying a different list does not retroactively alter claims
/// already created for prior device indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceSpec {
    /// Name of the hypervisor network to connect this device to
    pub network_name: String,

    /// Request an IPv4 address via DHCP
    #[serde(default)]
    pub dhcp4: bool,

    /// Per-device DHCP4 client overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp4_overrides: Option<DhcpOverrides>,

    /// Request an IPv6 address via DHCP
    #[serde(default)]
    pub dhcp6: bool,

    /// Per-device DHCP6 client overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp6_overrides: Option<DhcpOverrides>,

    /// Static IP addresses in CIDR notation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addrs: Vec<String>,

    /// External address pools to claim addresses from, one claim per
    /// reference; bound asynchronously by the pool allocator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses_from_pools: Vec<PoolReference>,
}

impl NetworkDeviceSpec {
    /// Whether this device requests any address via DHCP.
    #[must_use]
    pub fn has_dhcp(&self) -> bool {
        self.dhcp4 || self.dhcp6
    }

    /// Whether this device declares any address pool references.
    #[must_use]
    pub fn has_pool_refs(&self) -> bool {
        !self.addresses_from_pools.is_empty()
    }
}

/// Overrides for the guest DHCP client behavior of one address family.
///
/// Only explicitly-set fields are rendered into the boot metadata;
/// absent fields are omitted rather than defaulted so the guest keeps
/// its own DHCP client defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DhcpOverrides {
    /// Forward hostname to the DHCP server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_hostname: Option<bool>,

    /// Accept DNS servers from the DHCP lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_dns: Option<bool>,

    /// Accept search domains from the DHCP lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_domains: Option<bool>,

    /// Accept the hostname from the DHCP lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_hostname: Option<bool>,

    /// Accept the MTU from the DHCP lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_mtu: Option<bool>,

    /// Accept NTP servers from the DHCP lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_ntp: Option<bool>,

    /// Accept routes from the DHCP lease
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_routes: Option<bool>,
}

impl DhcpOverrides {
    /// Whether any override field is explicitly set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.send_hostname.is_none()
            && self.use_dns.is_none()
            && self.use_domains.is_none()
            && self.use_hostname.is_none()
            && self.use_mtu.is_none()
            && self.use_ntp.is_none()
            && self.use_routes.is_none()
    }
}

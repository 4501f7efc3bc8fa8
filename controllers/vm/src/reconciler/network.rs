//! Network readiness evaluation
//!
//! Pure decision logic over the declared network spec, the machine state
//! observed on the hypervisor, and the current claim bindings. The verdict
//! is an explicit tagged variant so the rule ordering is enforceable and
//! testable in isolation from any I/O:
//!
//! 1. A device with neither DHCP nor an effective static address blocks
//!    machine creation entirely (`WaitingForStaticAllocation`). Pool-bound
//!    addresses count as static; unbound pool references do not.
//! 2. Once the machine is Ready with a known identity, a connected DHCP
//!    device with no observed address for the requested family means
//!    `WaitingForDhcpAllocation`.
//! 3. Otherwise `NotWaiting`.
//!
//! A single blocking device forces the whole machine to wait.

use crate::reconciler::claims::ClaimBinding;
use crds::{NetworkDeviceSpec, NetworkSpec};
use hypervisor_client::{MachineConfig, NetworkDeviceConfig, NetworkStatus, VirtualMachine};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// What, if anything, blocks declaring the machine's network provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkReadiness {
    /// All requested addresses are satisfied
    NotWaiting,
    /// A device needs an address the pool allocator has not bound yet;
    /// machine creation is gated on this
    WaitingForStaticAllocation,
    /// A DHCP device is up but has not received an address yet
    WaitingForDhcpAllocation,
}

/// Evaluate the readiness verdict.
///
/// `observed` is absent before the machine exists; rule 2 only applies to
/// a machine that is Ready with a known identity.
pub fn evaluate(
    spec: &NetworkSpec,
    observed: Option<&VirtualMachine>,
    bindings: &BTreeMap<usize, Vec<ClaimBinding>>,
) -> NetworkReadiness {
    if is_waiting_for_static_allocation(spec, bindings) {
        return NetworkReadiness::WaitingForStaticAllocation;
    }
    if let Some(vm) = observed {
        if vm.is_ready() && is_waiting_for_dhcp_allocation(spec, &vm.network) {
            return NetworkReadiness::WaitingForDhcpAllocation;
        }
    }
    NetworkReadiness::NotWaiting
}

/// Whether any device has no DHCP and no effective static address.
pub(crate) fn is_waiting_for_static_allocation(
    spec: &NetworkSpec,
    bindings: &BTreeMap<usize, Vec<ClaimBinding>>,
) -> bool {
    spec.devices.iter().enumerate().any(|(index, device)| {
        !device.dhcp4
            && !device.dhcp6
            && device.ip_addrs.is_empty()
            && !all_pool_refs_bound(device, bindings.get(&index))
    })
}

/// Whether the device's declared pool references are all bound.
///
/// A device with no pool references has nothing bound, so this is false
/// for it; the static gate then depends on `ip_addrs` alone.
fn all_pool_refs_bound(device: &NetworkDeviceSpec, bindings: Option<&Vec<ClaimBinding>>) -> bool {
    if device.addresses_from_pools.is_empty() {
        return false;
    }
    match bindings {
        Some(claims) => {
            claims.len() == device.addresses_from_pools.len()
                && claims.iter().all(|claim| claim.address.is_some())
        }
        None => false,
    }
}

/// Whether any connected DHCP device is missing an observed address for
/// the requested family.
pub(crate) fn is_waiting_for_dhcp_allocation(spec: &NetworkSpec, statuses: &[NetworkStatus]) -> bool {
    spec.devices.iter().any(|device| {
        let Some(status) = statuses.iter().find(|s| s.network_name == device.network_name) else {
            return false;
        };
        if !status.connected {
            return false;
        }
        (device.dhcp4 && !has_family_addr(&status.ip_addrs, false))
            || (device.dhcp6 && !has_family_addr(&status.ip_addrs, true))
    })
}

/// Whether any address in the list belongs to the requested family.
/// Accepts both plain and CIDR notation.
pub(crate) fn has_family_addr(addrs: &[String], want_v6: bool) -> bool {
    addrs.iter().any(|addr| {
        let ip = addr.split('/').next().unwrap_or(addr);
        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => !want_v6,
            Ok(IpAddr::V6(_)) => want_v6,
            Err(_) => false,
        }
    })
}

/// The network spec with pool-bound addresses substituted in as static
/// addresses, in device order then pool-reference order.
///
/// This is what the hypervisor and the boot metadata codec see; neither
/// ever sees a pool reference.
pub(crate) fn effective_network_spec(
    spec: &NetworkSpec,
    bindings: &BTreeMap<usize, Vec<ClaimBinding>>,
) -> NetworkSpec {
    let mut effective = spec.clone();
    for (index, device) in effective.devices.iter_mut().enumerate() {
        if let Some(claims) = bindings.get(&index) {
            for claim in claims {
                if let Some(address) = &claim.address {
                    device.ip_addrs.push(address.clone());
                }
            }
        }
    }
    effective
}

/// Map the effective network spec onto the hypervisor machine config.
pub(crate) fn machine_config(
    name: &str,
    template: Option<&str>,
    effective: &NetworkSpec,
) -> MachineConfig {
    MachineConfig {
        name: name.to_string(),
        template: template.map(str::to_string),
        devices: effective
            .devices
            .iter()
            .map(|device| NetworkDeviceConfig {
                network_name: device.network_name.clone(),
                dhcp4: device.dhcp4,
                dhcp6: device.dhcp6,
                ip_addrs: device.ip_addrs.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::PoolReference;
    use hypervisor_client::VirtualMachineState;

    fn device(network_name: &str) -> NetworkDeviceSpec {
        NetworkDeviceSpec {
            network_name: network_name.to_string(),
            ..NetworkDeviceSpec::default()
        }
    }

    fn dhcp4_device(network_name: &str) -> NetworkDeviceSpec {
        NetworkDeviceSpec {
            dhcp4: true,
            ..device(network_name)
        }
    }

    fn pool_device(network_name: &str) -> NetworkDeviceSpec {
        NetworkDeviceSpec {
            addresses_from_pools: vec![PoolReference::new("some.ipam.api.group", "IPAMPool", "my-ip-pool")],
            ..device(network_name)
        }
    }

    fn spec(devices: Vec<NetworkDeviceSpec>) -> NetworkSpec {
        NetworkSpec { devices }
    }

    fn ready_vm(network: Vec<NetworkStatus>) -> VirtualMachine {
        VirtualMachine {
            name: "foo".to_string(),
            bios_uuid: "265104de-1472-547c-b873-6dc7883fb6cb".to_string(),
            state: VirtualMachineState::Ready,
            network,
        }
    }

    #[test]
    fn test_static_wait_one_device_with_dhcp() {
        let spec = spec(vec![dhcp4_device("nw-1")]);
        assert!(!is_waiting_for_static_allocation(&spec, &BTreeMap::new()));
    }

    #[test]
    fn test_static_wait_devices_with_dhcp_set_and_unset() {
        let spec = spec(vec![dhcp4_device("nw-1"), device("nw-2")]);
        assert!(is_waiting_for_static_allocation(&spec, &BTreeMap::new()));
    }

    #[test]
    fn test_static_wait_devices_with_static_ip_and_without() {
        let mut with_static = device("nw-1");
        with_static.ip_addrs = vec!["192.168.1.2/32".to_string()];
        let spec = spec(vec![with_static, device("nw-2")]);
        assert!(is_waiting_for_static_allocation(&spec, &BTreeMap::new()));
    }

    #[test]
    fn test_static_wait_single_unconfigured_device() {
        let spec = spec(vec![device("nw-1")]);
        assert!(is_waiting_for_static_allocation(&spec, &BTreeMap::new()));
    }

    #[test]
    fn test_static_wait_multiple_unconfigured_devices() {
        let spec = spec(vec![device("nw-1"), device("nw-2")]);
        assert!(is_waiting_for_static_allocation(&spec, &BTreeMap::new()));
    }

    #[test]
    fn test_static_wait_unbound_pool_ref_blocks() {
        let spec = spec(vec![pool_device("nw-1")]);
        let bindings = BTreeMap::from([(
            0,
            vec![ClaimBinding {
                name: "foo-0-0".to_string(),
                address: None,
            }],
        )]);
        assert!(is_waiting_for_static_allocation(&spec, &bindings));
    }

    #[test]
    fn test_static_wait_bound_pool_ref_counts_as_static() {
        let spec = spec(vec![pool_device("nw-1")]);
        let bindings = BTreeMap::from([(
            0,
            vec![ClaimBinding {
                name: "foo-0-0".to_string(),
                address: Some("10.0.0.50/24".to_string()),
            }],
        )]);
        assert!(!is_waiting_for_static_allocation(&spec, &bindings));
    }

    #[test]
    fn test_static_wait_partially_bound_pool_refs_block() {
        let mut two_pools = pool_device("nw-1");
        two_pools
            .addresses_from_pools
            .push(PoolReference::new("some.ipam.api.group", "IPAMPool", "other-pool"));
        let spec = spec(vec![two_pools]);
        let bindings = BTreeMap::from([(
            0,
            vec![
                ClaimBinding {
                    name: "foo-0-0".to_string(),
                    address: Some("10.0.0.50/24".to_string()),
                },
                ClaimBinding {
                    name: "foo-0-1".to_string(),
                    address: None,
                },
            ],
        )]);
        assert!(is_waiting_for_static_allocation(&spec, &bindings));
    }

    #[test]
    fn test_verdict_static_wait_takes_priority_over_dhcp_wait() {
        // One fully-configured DHCP device plus one unconfigured device:
        // the whole machine waits for static allocation
        let spec = spec(vec![dhcp4_device("nw-1"), device("nw-2")]);
        let vm = ready_vm(vec![NetworkStatus {
            connected: true,
            ip_addrs: vec![],
            mac_addr: "blah-mac".to_string(),
            network_name: "nw-1".to_string(),
        }]);
        assert_eq!(
            evaluate(&spec, Some(&vm), &BTreeMap::new()),
            NetworkReadiness::WaitingForStaticAllocation
        );
    }

    #[test]
    fn test_verdict_dhcp_wait_when_connected_without_address() {
        let spec = spec(vec![dhcp4_device("nw-1")]);
        let vm = ready_vm(vec![NetworkStatus {
            connected: true,
            ip_addrs: vec![],
            mac_addr: "blah-mac".to_string(),
            network_name: "nw-1".to_string(),
        }]);
        assert_eq!(
            evaluate(&spec, Some(&vm), &BTreeMap::new()),
            NetworkReadiness::WaitingForDhcpAllocation
        );
    }

    #[test]
    fn test_verdict_dhcp4_wait_not_satisfied_by_ipv6_address() {
        let spec = spec(vec![dhcp4_device("nw-1")]);
        let vm = ready_vm(vec![NetworkStatus {
            connected: true,
            ip_addrs: vec!["fd00::2/64".to_string()],
            mac_addr: "blah-mac".to_string(),
            network_name: "nw-1".to_string(),
        }]);
        assert_eq!(
            evaluate(&spec, Some(&vm), &BTreeMap::new()),
            NetworkReadiness::WaitingForDhcpAllocation
        );
    }

    #[test]
    fn test_verdict_not_waiting_once_dhcp_address_observed() {
        let spec = spec(vec![dhcp4_device("nw-1")]);
        let vm = ready_vm(vec![NetworkStatus {
            connected: true,
            ip_addrs: vec!["192.168.1.10".to_string()],
            mac_addr: "blah-mac".to_string(),
            network_name: "nw-1".to_string(),
        }]);
        assert_eq!(
            evaluate(&spec, Some(&vm), &BTreeMap::new()),
            NetworkReadiness::NotWaiting
        );
    }

    #[test]
    fn test_verdict_no_dhcp_wait_before_machine_ready() {
        let spec = spec(vec![dhcp4_device("nw-1")]);
        let mut vm = ready_vm(vec![]);
        vm.state = VirtualMachineState::Creating;
        assert_eq!(
            evaluate(&spec, Some(&vm), &BTreeMap::new()),
            NetworkReadiness::NotWaiting
        );
        assert_eq!(
            evaluate(&spec, None, &BTreeMap::new()),
            NetworkReadiness::NotWaiting
        );
    }

    #[test]
    fn test_effective_spec_substitutes_bound_addresses() {
        let mut device = pool_device("nw-1");
        device.ip_addrs = vec!["192.168.1.2/24".to_string()];
        let spec = spec(vec![device]);
        let bindings = BTreeMap::from([(
            0,
            vec![ClaimBinding {
                name: "foo-0-0".to_string(),
                address: Some("10.0.0.50/24".to_string()),
            }],
        )]);

        let effective = effective_network_spec(&spec, &bindings);
        assert_eq!(
            effective.devices[0].ip_addrs,
            vec!["192.168.1.2/24".to_string(), "10.0.0.50/24".to_string()]
        );
        // Pool references are untouched; only addresses are substituted
        assert_eq!(effective.devices[0].addresses_from_pools.len(), 1);
    }

    #[test]
    fn test_machine_config_mirrors_effective_spec() {
        let mut device = dhcp4_device("nw-1");
        device.ip_addrs = vec!["192.168.1.2/24".to_string()];
        let effective = spec(vec![device]);

        let config = machine_config("foo", Some("ubuntu-template"), &effective);
        assert_eq!(config.name, "foo");
        assert_eq!(config.template.as_deref(), Some("ubuntu-template"));
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].network_name, "nw-1");
        assert!(config.devices[0].dhcp4);
        assert_eq!(config.devices[0].ip_addrs, vec!["192.168.1.2/24".to_string()]);
    }
}

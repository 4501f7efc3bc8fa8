//! Boot metadata codec
//!
//! Renders the guest network configuration document injected into the
//! machine's extra config under `guestinfo.metadata`. The guest-side
//! agent parses it by fixed schema, and the blob is persisted opaquely,
//! so output is a contract: identical inputs must produce byte-identical
//! documents. There is no decode side.
//!
//! Devices are keyed `id{i}`/`eth{i}` by their position in the spec, and
//! matched to the adapter by MAC address because the hypervisor's own
//! adapter ordering is not assumed stable.

use crate::error::ControllerError;
use crate::reconciler::network::has_family_addr;
use crds::{DhcpOverrides, NetworkSpec};
use hypervisor_client::NetworkStatus;

/// Extra config key the guest reads the metadata blob from.
pub(crate) const METADATA_EXTRA_CONFIG_KEY: &str = "guestinfo.metadata";

/// Extra config key declaring the blob encoding.
pub(crate) const METADATA_ENCODING_EXTRA_CONFIG_KEY: &str = "guestinfo.metadata.encoding";

/// Encoding applied to the metadata blob before injection.
pub(crate) const METADATA_ENCODING: &str = "base64";

/// Render the boot metadata document.
///
/// `spec` is the effective network spec (pool-bound addresses already
/// substituted in); `observed` supplies the MAC address per device,
/// matched by network name; `hostname` becomes both the instance id and
/// the local hostname.
pub fn encode(
    spec: &NetworkSpec,
    observed: &[NetworkStatus],
    hostname: &str,
) -> Result<String, ControllerError> {
    let wait_ipv4 = spec
        .devices
        .iter()
        .any(|d| d.dhcp4 || has_family_addr(&d.ip_addrs, false));
    let wait_ipv6 = spec
        .devices
        .iter()
        .any(|d| d.dhcp6 || has_family_addr(&d.ip_addrs, true));

    let mut doc = String::new();
    doc.push('\n');
    doc.push_str(&format!("instance-id: \"{}\"\n", hostname));
    doc.push_str(&format!("local-hostname: \"{}\"\n", hostname));
    doc.push_str("wait-on-network:\n");
    doc.push_str(&format!("  ipv4: {}\n", wait_ipv4));
    doc.push_str(&format!("  ipv6: {}\n", wait_ipv6));
    doc.push_str("network:\n");
    doc.push_str("  version: 2\n");
    doc.push_str("  ethernets:\n");

    for (index, device) in spec.devices.iter().enumerate() {
        let status = observed
            .iter()
            .find(|s| s.network_name == device.network_name)
            .ok_or_else(|| {
                ControllerError::MetadataGeneration(format!(
                    "no observed network status for device {}",
                    device.network_name
                ))
            })?;

        doc.push_str(&format!("    id{}:\n", index));
        doc.push_str("      match:\n");
        doc.push_str(&format!("        macaddress: \"{}\"\n", status.mac_addr));
        doc.push_str(&format!("      set-name: \"eth{}\"\n", index));
        doc.push_str("      wakeonlan: true\n");
        doc.push_str(&format!("      dhcp4: {}\n", device.dhcp4));
        if let Some(overrides) = &device.dhcp4_overrides {
            if !overrides.is_empty() {
                doc.push_str("      dhcp4-overrides:\n");
                push_overrides(&mut doc, overrides);
            }
        }
        doc.push_str(&format!("      dhcp6: {}\n", device.dhcp6));
        if let Some(overrides) = &device.dhcp6_overrides {
            if !overrides.is_empty() {
                doc.push_str("      dhcp6-overrides:\n");
                push_overrides(&mut doc, overrides);
            }
        }
        if !device.ip_addrs.is_empty() {
            doc.push_str("      addresses:\n");
            for addr in &device.ip_addrs {
                doc.push_str(&format!("        - \"{}\"\n", addr));
            }
        }
    }

    Ok(doc)
}

/// Emit only the explicitly-set override fields, in a fixed order so the
/// document stays byte-stable.
fn push_overrides(doc: &mut String, overrides: &DhcpOverrides) {
    if let Some(value) = overrides.send_hostname {
        doc.push_str(&format!("        send-hostname: {}\n", value));
    }
    if let Some(value) = overrides.use_dns {
        doc.push_str(&format!("        use-dns: {}\n", value));
    }
    if let Some(value) = overrides.use_domains {
        doc.push_str(&format!("        use-domains: {}\n", value));
    }
    if let Some(value) = overrides.use_hostname {
        doc.push_str(&format!("        use-hostname: {}\n", value));
    }
    if let Some(value) = overrides.use_mtu {
        doc.push_str(&format!("        use-mtu: {}\n", value));
    }
    if let Some(value) = overrides.use_ntp {
        doc.push_str(&format!("        use-ntp: {}\n", value));
    }
    if let Some(value) = overrides.use_routes {
        doc.push_str(&format!("        use-routes: {}\n", value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::NetworkDeviceSpec;

    fn status(network_name: &str, mac_addr: &str) -> NetworkStatus {
        NetworkStatus {
            connected: true,
            ip_addrs: vec![],
            mac_addr: mac_addr.to_string(),
            network_name: network_name.to_string(),
        }
    }

    #[test]
    fn test_encode_dhcp_overrides_document() {
        let spec = NetworkSpec {
            devices: vec![NetworkDeviceSpec {
                network_name: "nw-1".to_string(),
                dhcp4: true,
                dhcp4_overrides: Some(DhcpOverrides {
                    use_dns: Some(false),
                    ..DhcpOverrides::default()
                }),
                ..NetworkDeviceSpec::default()
            }],
        };
        let observed = vec![status("nw-1", "00:0c:29:33:34:38")];

        let doc = encode(&spec, &observed, "DC0_C0_RP0_VM0").unwrap();

        let expected = r#"
instance-id: "DC0_C0_RP0_VM0"
local-hostname: "DC0_C0_RP0_VM0"
wait-on-network:
  ipv4: true
  ipv6: false
network:
  version: 2
  ethernets:
    id0:
      match:
        macaddress: "00:0c:29:33:34:38"
      set-name: "eth0"
      wakeonlan: true
      dhcp4: true
      dhcp4-overrides:
        use-dns: false
      dhcp6: false
"#;
        assert_eq!(doc, expected);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let spec = NetworkSpec {
            devices: vec![
                NetworkDeviceSpec {
                    network_name: "nw-1".to_string(),
                    dhcp4: true,
                    ..NetworkDeviceSpec::default()
                },
                NetworkDeviceSpec {
                    network_name: "nw-2".to_string(),
                    ip_addrs: vec!["192.168.1.2/24".to_string()],
                    ..NetworkDeviceSpec::default()
                },
            ],
        };
        let observed = vec![
            status("nw-1", "00:00:00:00:00:01"),
            status("nw-2", "00:00:00:00:00:02"),
        ];

        let first = encode(&spec, &observed, "vm-0").unwrap();
        let second = encode(&spec, &observed, "vm-0").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_encode_matches_adapters_by_network_name_not_order() {
        let spec = NetworkSpec {
            devices: vec![
                NetworkDeviceSpec {
                    network_name: "nw-1".to_string(),
                    dhcp4: true,
                    ..NetworkDeviceSpec::default()
                },
                NetworkDeviceSpec {
                    network_name: "nw-2".to_string(),
                    dhcp4: true,
                    ..NetworkDeviceSpec::default()
                },
            ],
        };
        // Observed adapter order is reversed relative to the spec
        let observed = vec![
            status("nw-2", "00:00:00:00:00:02"),
            status("nw-1", "00:00:00:00:00:01"),
        ];

        let doc = encode(&spec, &observed, "vm-0").unwrap();
        let id0 = doc.find("id0:").unwrap();
        let id1 = doc.find("id1:").unwrap();
        let first_mac = doc.find("00:00:00:00:00:01").unwrap();
        let second_mac = doc.find("00:00:00:00:00:02").unwrap();
        assert!(id0 < first_mac && first_mac < id1);
        assert!(id1 < second_mac);
    }

    #[test]
    fn test_encode_static_addresses_emitted() {
        let spec = NetworkSpec {
            devices: vec![NetworkDeviceSpec {
                network_name: "nw-1".to_string(),
                ip_addrs: vec!["192.168.1.2/24".to_string(), "10.0.0.50/24".to_string()],
                ..NetworkDeviceSpec::default()
            }],
        };
        let observed = vec![status("nw-1", "00:00:00:00:00:01")];

        let doc = encode(&spec, &observed, "vm-0").unwrap();
        assert!(doc.contains("      addresses:\n        - \"192.168.1.2/24\"\n        - \"10.0.0.50/24\"\n"));
        assert!(doc.contains("  ipv4: true\n"));
        assert!(doc.contains("  ipv6: false\n"));
    }

    #[test]
    fn test_encode_ipv6_wait_flag_from_static_address() {
        let spec = NetworkSpec {
            devices: vec![NetworkDeviceSpec {
                network_name: "nw-1".to_string(),
                ip_addrs: vec!["fd00::2/64".to_string()],
                ..NetworkDeviceSpec::default()
            }],
        };
        let observed = vec![status("nw-1", "00:00:00:00:00:01")];

        let doc = encode(&spec, &observed, "vm-0").unwrap();
        assert!(doc.contains("  ipv4: false\n"));
        assert!(doc.contains("  ipv6: true\n"));
    }

    #[test]
    fn test_encode_empty_overrides_block_omitted() {
        let spec = NetworkSpec {
            devices: vec![NetworkDeviceSpec {
                network_name: "nw-1".to_string(),
                dhcp4: true,
                dhcp4_overrides: Some(DhcpOverrides::default()),
                ..NetworkDeviceSpec::default()
            }],
        };
        let observed = vec![status("nw-1", "00:00:00:00:00:01")];

        let doc = encode(&spec, &observed, "vm-0").unwrap();
        assert!(!doc.contains("dhcp4-overrides"));
    }

    #[test]
    fn test_encode_only_set_override_fields_emitted() {
        let spec = NetworkSpec {
            devices: vec![NetworkDeviceSpec {
                network_name: "nw-1".to_string(),
                dhcp6: true,
                dhcp6_overrides: Some(DhcpOverrides {
                    use_dns: Some(true),
                    use_routes: Some(false),
                    ..DhcpOverrides::default()
                }),
                ..NetworkDeviceSpec::default()
            }],
        };
        let observed = vec![status("nw-1", "00:00:00:00:00:01")];

        let doc = encode(&spec, &observed, "vm-0").unwrap();
        assert!(doc.contains("      dhcp6-overrides:\n        use-dns: true\n        use-routes: false\n"));
        assert!(!doc.contains("use-mtu"));
        assert!(!doc.contains("send-hostname"));
    }

    #[test]
    fn test_encode_missing_adapter_status_is_an_error() {
        let spec = NetworkSpec {
            devices: vec![NetworkDeviceSpec {
                network_name: "nw-1".to_string(),
                dhcp4: true,
                ..NetworkDeviceSpec::default()
            }],
        };

        let result = encode(&spec, &[], "vm-0");
        assert!(matches!(result, Err(ControllerError::MetadataGeneration(_))));
    }
}

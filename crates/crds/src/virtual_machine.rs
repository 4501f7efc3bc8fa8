//! VirtualMachine CRD
//!
//! Declarative specification of a hypervisor-hosted virtual machine.
//! The VM controller reconciles this resource against the hypervisor:
//! it creates the machine, waits for address allocation (static pools
//! and DHCP), injects boot-time network metadata, and releases address
//! claims on deletion.

use crate::conditions::Condition;
use crate::network::NetworkSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer placed on VirtualMachine objects.
///
/// Cleared by the controller only after every owned AddressClaim has had
/// its own release finalizer cleared, so a deleted VM can never leave an
/// address reservation behind.
pub const VM_FINALIZER: &str = "virtualmachine.vmops.microscaler.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmops.microscaler.io",
    version = "v1alpha1",
    kind = "VirtualMachine",
    namespaced,
    status = "VirtualMachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Name of the hypervisor template to clone the machine from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Desired network configuration
    #[serde(default)]
    pub network: NetworkSpec,
}

/// Observed state of a VirtualMachine.
///
/// Comparable so the controller can diff a desired status against the
/// last-read one and skip writes that would change nothing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// True once the machine exists and all requested addresses are allocated
    #[serde(default)]
    pub ready: bool,

    /// BIOS UUID assigned by the hypervisor, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_uuid: Option<String>,

    /// IP addresses observed on the machine's network devices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    /// Current service state of the machine
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

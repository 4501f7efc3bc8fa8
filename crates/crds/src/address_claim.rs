//! AddressClaim CRD
//!
//! Requests an IP address from an external pool for one (device, pool
//! reference) pair of a VirtualMachine. Claims are named
//! `{vmName}-{deviceIndex}-{poolRefIndex}`, owned by the VM so removal
//! cascades, and bound asynchronously by a pool allocator outside this
//! repository. The controller only polls the bound/unbound state.

use crate::references::PoolReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer placed on AddressClaim objects at creation.
///
/// Blocks claim deletion until the VM controller has confirmed the owning
/// machine is gone; cleared during VM deletion to let the cascade finish.
pub const ADDRESS_CLAIM_FINALIZER: &str = "virtualmachine.vmops.microscaler.io/address-claim-protection";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vmops.microscaler.io",
    version = "v1alpha1",
    kind = "AddressClaim",
    namespaced,
    status = "AddressClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AddressClaimSpec {
    /// Pool to request an address from
    pub pool_ref: PoolReference,
}

/// Observed state of an AddressClaim.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddressClaimStatus {
    /// Address bound by the allocator, in CIDR notation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Binding state
    #[serde(default)]
    pub state: BindState,
}

/// Claim binding state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum BindState {
    /// Waiting for the allocator to bind an address
    #[default]
    Pending,

    /// An address has been bound
    Bound,
}

impl AddressClaim {
    /// The bound address, if the allocator has bound one.
    #[must_use]
    pub fn bound_address(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.address.as_deref())
    }
}

//! AddressClaim lifecycle
//!
//! One claim exists per (device, pool reference) pair of a VirtualMachine,
//! created lazily under a deterministic name so creation is idempotent and
//! collision-free across concurrently reconciled VMs. Claims are owned by
//! the VM and carry a release finalizer; an external allocator binds
//! addresses into their status. This module only creates, reads, and
//! releases claims; it never allocates.

use super::Reconciler;
use crate::error::{is_already_exists, is_conflict, is_not_found, ControllerError};
use crds::{
    AddressClaim, AddressClaimSpec, PoolReference, VirtualMachine, ADDRESS_CLAIM_FINALIZER,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{ListParams, ObjectMeta, PostParams};
use kube::{Api, Resource};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Bound/unbound state of one claim, as input to the readiness evaluator.
#[derive(Debug, Clone)]
pub struct ClaimBinding {
    /// Claim object name
    pub name: String,
    /// Address bound by the allocator, if any
    pub address: Option<String>,
}

/// Deterministic claim name for a (device, pool reference) pair.
pub(crate) fn claim_name(vm_name: &str, device_index: usize, pool_ref_index: usize) -> String {
    format!("{}-{}-{}", vm_name, device_index, pool_ref_index)
}

/// Build a new claim owned by the VM, carrying the release finalizer.
pub(crate) fn new_address_claim(
    claim_name: &str,
    namespace: &str,
    vm: &VirtualMachine,
    pool_ref: &PoolReference,
) -> AddressClaim {
    AddressClaim {
        metadata: ObjectMeta {
            name: Some(claim_name.to_string()),
            namespace: Some(namespace.to_string()),
            finalizers: Some(vec![ADDRESS_CLAIM_FINALIZER.to_string()]),
            owner_references: Some(vec![vm_owner_reference(vm)]),
            ..ObjectMeta::default()
        },
        spec: AddressClaimSpec {
            pool_ref: pool_ref.clone(),
        },
        status: None,
    }
}

/// Owner reference back-link from a claim to its VM, used for reverse
/// lookup and for the store's cascade delete.
pub(crate) fn vm_owner_reference(vm: &VirtualMachine) -> OwnerReference {
    OwnerReference {
        api_version: VirtualMachine::api_version(&()).to_string(),
        kind: VirtualMachine::kind(&()).to_string(),
        name: vm.metadata.name.clone().unwrap_or_default(),
        uid: vm.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Whether the claim's owner references include the given VM.
///
/// Matched by UID when both sides carry one, otherwise by kind and name.
pub(crate) fn is_owned_by(claim: &AddressClaim, vm: &VirtualMachine) -> bool {
    let vm_name = vm.metadata.name.as_deref().unwrap_or_default();
    let vm_uid = vm.metadata.uid.as_deref().unwrap_or_default();
    claim
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|owner| {
            if owner.kind != VirtualMachine::kind(&()) {
                return false;
            }
            if !owner.uid.is_empty() && !vm_uid.is_empty() {
                return owner.uid == vm_uid;
            }
            owner.name == vm_name
        })
}

/// Whether the claim still carries the release finalizer.
pub(crate) fn has_release_finalizer(claim: &AddressClaim) -> bool {
    claim
        .metadata
        .finalizers
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|f| f == ADDRESS_CLAIM_FINALIZER)
}

/// The finalizer list with the release finalizer removed.
pub(crate) fn without_release_finalizer(finalizers: &[String]) -> Vec<String> {
    finalizers
        .iter()
        .filter(|f| *f != ADDRESS_CLAIM_FINALIZER)
        .cloned()
        .collect()
}

impl Reconciler {
    /// Create missing claims for every device that draws from address
    /// pools. No-op for devices without pool references; existing claims
    /// are never mutated: pool reference and owner are fixed at creation.
    pub(crate) async fn ensure_address_claims(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        let api = self.claim_api(namespace);
        for (device_index, device) in vm.spec.network.devices.iter().enumerate() {
            for (pool_ref_index, pool_ref) in device.addresses_from_pools.iter().enumerate() {
                let claim_name = claim_name(name, device_index, pool_ref_index);
                if api.get_opt(&claim_name).await?.is_some() {
                    debug!("AddressClaim {}/{} already exists", namespace, claim_name);
                    continue;
                }

                let claim = new_address_claim(&claim_name, namespace, vm, pool_ref);
                match api.create(&PostParams::default(), &claim).await {
                    Ok(_) => {
                        info!(
                            "Created AddressClaim {}/{} for VirtualMachine {} (device {}, pool ref {})",
                            namespace, claim_name, name, device_index, pool_ref_index
                        );
                    }
                    Err(e) if is_already_exists(&e) => {
                        debug!(
                            "AddressClaim {}/{} created concurrently, treating as success",
                            namespace, claim_name
                        );
                    }
                    Err(e) => {
                        error!("Failed to create AddressClaim {}/{}: {}", namespace, claim_name, e);
                        return Err(ControllerError::Kube(e));
                    }
                }
            }
        }
        Ok(())
    }

    /// Current bound/unbound state per device, keyed by device index.
    ///
    /// A claim the allocator has not bound yet (or that does not exist
    /// yet) reports no address.
    pub(crate) async fn address_claim_bindings(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<BTreeMap<usize, Vec<ClaimBinding>>, ControllerError> {
        let api = self.claim_api(namespace);
        let mut bindings = BTreeMap::new();
        for (device_index, device) in vm.spec.network.devices.iter().enumerate() {
            if device.addresses_from_pools.is_empty() {
                continue;
            }
            let mut claims = Vec::with_capacity(device.addresses_from_pools.len());
            for pool_ref_index in 0..device.addresses_from_pools.len() {
                let claim_name = claim_name(name, device_index, pool_ref_index);
                let address = api
                    .get_opt(&claim_name)
                    .await?
                    .as_ref()
                    .and_then(|claim| claim.bound_address().map(str::to_string));
                claims.push(ClaimBinding {
                    name: claim_name,
                    address,
                });
            }
            bindings.insert(device_index, claims);
        }
        Ok(bindings)
    }

    /// Clear the release finalizer on every claim owned by the VM.
    ///
    /// Listing by owner rather than by deterministic name also catches
    /// claims created for device indices the spec no longer declares.
    /// Each clear is independent: a failure on one claim does not prevent
    /// attempting the others, and already-cleared or already-removed
    /// claims count as released. Returns whether all claims are released.
    pub(crate) async fn release_address_claims(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<bool, ControllerError> {
        let api = self.claim_api(namespace);
        let claims = api.list(&ListParams::default()).await?;

        let mut all_released = true;
        for claim in claims.items.iter().filter(|claim| is_owned_by(claim, vm)) {
            if let Err(e) = self.release_claim(&api, claim).await {
                let claim_name = claim.metadata.name.as_deref().unwrap_or("<unknown>");
                error!(
                    "Failed to release AddressClaim {}/{} owned by {}: {}",
                    namespace, claim_name, name, e
                );
                all_released = false;
            }
        }
        Ok(all_released)
    }

    /// Clear the release finalizer on one claim.
    ///
    /// Clearing is monotonic and idempotent: an already-cleared finalizer
    /// or an already-removed claim is success. A stale-version conflict is
    /// resolved by one refetch-and-retry before surfacing.
    async fn release_claim(
        &self,
        api: &Api<AddressClaim>,
        claim: &AddressClaim,
    ) -> Result<(), ControllerError> {
        let claim_name = claim
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("AddressClaim missing name".to_string()))?;

        if !has_release_finalizer(claim) {
            debug!("AddressClaim {} release finalizer already cleared", claim_name);
            return Ok(());
        }

        match self.clear_release_finalizer(api, claim_name, claim).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("AddressClaim {} already removed", claim_name);
                Ok(())
            }
            Err(e) if is_conflict(&e) => {
                warn!(
                    "Stale resourceVersion releasing AddressClaim {}, refetching and retrying once",
                    claim_name
                );
                match api.get_opt(claim_name).await? {
                    None => Ok(()),
                    Some(fresh) if !has_release_finalizer(&fresh) => Ok(()),
                    Some(fresh) => self
                        .clear_release_finalizer(api, claim_name, &fresh)
                        .await
                        .map_err(ControllerError::Kube),
                }
            }
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }

    async fn clear_release_finalizer(
        &self,
        api: &Api<AddressClaim>,
        claim_name: &str,
        claim: &AddressClaim,
    ) -> Result<(), kube::Error> {
        let mut updated = claim.clone();
        let remaining = without_release_finalizer(claim.metadata.finalizers.as_deref().unwrap_or_default());
        updated.metadata.finalizers = if remaining.is_empty() { None } else { Some(remaining) };
        updated.metadata.managed_fields = None;

        api.replace(claim_name, &PostParams::default(), &updated).await?;
        info!("Cleared release finalizer on AddressClaim {}", claim_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_claim_name_is_deterministic() {
        assert_eq!(claim_name("foo", 0, 0), "foo-0-0");
        assert_eq!(claim_name("foo", 2, 1), "foo-2-1");
        assert_eq!(claim_name("foo", 0, 0), claim_name("foo", 0, 0));
    }

    #[test]
    fn test_new_address_claim_carries_finalizer_and_owner() {
        let vm = create_test_vm("foo", vec![]);
        let pool_ref = PoolReference::new("some.ipam.api.group", "IPAMPool", "my-ip-pool");

        let claim = new_address_claim("foo-0-0", "test", &vm, &pool_ref);

        assert_eq!(claim.metadata.name.as_deref(), Some("foo-0-0"));
        assert!(has_release_finalizer(&claim));
        assert_eq!(claim.spec.pool_ref, pool_ref);

        let owners = claim.metadata.owner_references.as_deref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "VirtualMachine");
        assert_eq!(owners[0].name, "foo");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn test_is_owned_by_matches_uid_when_present() {
        let vm = create_test_vm("foo", vec![]);
        let pool_ref = PoolReference::new("some.ipam.api.group", "IPAMPool", "my-ip-pool");
        let claim = new_address_claim("foo-0-0", "test", &vm, &pool_ref);

        assert!(is_owned_by(&claim, &vm));

        let mut other = create_test_vm("foo", vec![]);
        other.metadata.uid = Some("different-uid".to_string());
        assert!(!is_owned_by(&claim, &other));
    }

    #[test]
    fn test_is_owned_by_falls_back_to_kind_and_name() {
        let mut vm = create_test_vm("foo", vec![]);
        vm.metadata.uid = None;
        let pool_ref = PoolReference::new("some.ipam.api.group", "IPAMPool", "my-ip-pool");
        let claim = new_address_claim("foo-0-0", "test", &vm, &pool_ref);

        assert!(is_owned_by(&claim, &vm));

        let mut other = create_test_vm("bar", vec![]);
        other.metadata.uid = None;
        assert!(!is_owned_by(&claim, &other));
    }

    #[test]
    fn test_without_release_finalizer_keeps_foreign_finalizers() {
        let finalizers = vec![
            "allocator.example.com/address-binding".to_string(),
            ADDRESS_CLAIM_FINALIZER.to_string(),
        ];

        let remaining = without_release_finalizer(&finalizers);
        assert_eq!(remaining, vec!["allocator.example.com/address-binding".to_string()]);

        // Clearing twice is a no-op, not an error
        assert_eq!(without_release_finalizer(&remaining), remaining);
    }
}

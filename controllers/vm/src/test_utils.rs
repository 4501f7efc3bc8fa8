//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test resources and setting
//! up test scenarios.

use chrono::Utc;
use crds::{
    AddressClaim, AddressClaimStatus, BindState, NetworkDeviceSpec, NetworkSpec, PoolReference,
    VirtualMachine, VirtualMachineSpec, VM_FINALIZER,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;

/// Helper to create a test VirtualMachine with the given devices
pub fn create_test_vm(name: &str, devices: Vec<NetworkDeviceSpec>) -> VirtualMachine {
    VirtualMachine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("test".to_string()),
            uid: Some(format!("{}-uid", name)),
            resource_version: Some("1234".to_string()),
            finalizers: Some(vec![VM_FINALIZER.to_string()]),
            ..ObjectMeta::default()
        },
        spec: VirtualMachineSpec {
            template: None,
            network: NetworkSpec { devices },
        },
        status: None,
    }
}

/// Helper to create a test VirtualMachine with a deletion timestamp set
pub fn create_test_deleted_vm(name: &str, devices: Vec<NetworkDeviceSpec>) -> VirtualMachine {
    let mut vm = create_test_vm(name, devices);
    vm.metadata.deletion_timestamp = Some(Time(Utc::now()));
    vm
}

/// Helper to create a test AddressClaim bound to the given address
pub fn create_test_bound_claim(
    name: &str,
    owner: &VirtualMachine,
    pool_ref: PoolReference,
    address: &str,
) -> AddressClaim {
    let mut claim =
        crate::reconciler::claims::new_address_claim(name, "test", owner, &pool_ref);
    claim.status = Some(AddressClaimStatus {
        address: Some(address.to_string()),
        state: BindState::Bound,
    });
    claim
}

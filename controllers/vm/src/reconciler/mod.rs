//! Reconciliation logic for VirtualMachine resources.
//!
//! Each reconcile drives the machine one step closer to its declared
//! state: create claims, gate creation on satisfiable addressing, create
//! or converge the machine, wait out DHCP, inject boot metadata, report
//! conditions. A deletion timestamp switches to the teardown path
//! (destroy machine, release claims, clear the VM finalizer) from any
//! state. No failure is terminal: every error results in a requeued
//! re-attempt, since both the desired and the actual machine state can
//! change between attempts.

pub mod claims;
pub mod conditions;
pub mod metadata;
pub mod network;


use crate::backoff::FibonacciBackoff;
use crate::error::{is_not_found, ControllerError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crds::{
    set_condition, AddressClaim, ConditionStatus, VirtualMachine, CREATING_REASON,
    HYPERVISOR_AVAILABLE_CONDITION, HYPERVISOR_UNREACHABLE_REASON, PROVISIONED_CONDITION,
    VM_FINALIZER, WAITING_FOR_IP_ALLOCATION_REASON, WAITING_FOR_STATIC_IP_ALLOCATION_REASON,
};
use hypervisor_client::{HypervisorClientTrait, VirtualMachineState};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use kube_runtime::controller::Action;
use network::NetworkReadiness;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue interval while waiting on an external allocator. Claim binding
/// also re-triggers reconciliation through the claim watch, so this is a
/// safety net rather than the primary wake-up.
const WAITING_REQUEUE: Duration = Duration::from_secs(60);

/// Requeue interval while the hypervisor is still creating or destroying
/// the machine.
const TRANSITION_REQUEUE: Duration = Duration::from_secs(10);

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles VirtualMachine resources against the hypervisor.
///
/// One instance is shared by all worker tasks; per-VM serialization is
/// guaranteed by the controller runtime, which never reconciles the same
/// object key concurrently.
pub struct Reconciler {
    pub(crate) hypervisor: Box<dyn HypervisorClientTrait + Send + Sync>,
    client: Client,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        hypervisor: impl HypervisorClientTrait + Send + Sync + 'static,
        client: Client,
    ) -> Self {
        Self {
            hypervisor: Box::new(hypervisor),
            client,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn vm_api(&self, namespace: &str) -> Api<VirtualMachine> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub(crate) fn claim_api(&self, namespace: &str) -> Api<AddressClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Reconciles a VirtualMachine resource.
    pub async fn reconcile_vm(&self, vm: &VirtualMachine) -> Result<Action, ControllerError> {
        let name = vm.metadata.name.as_ref().ok_or_else(|| {
            ControllerError::InvalidConfig("VirtualMachine missing name".to_string())
        })?;
        let namespace = vm.metadata.namespace.as_deref().unwrap_or("default");
        let resource_key = format!("{}/{}", namespace, name);

        info!("Reconciling VirtualMachine {}/{}", namespace, name);

        let result = if vm.metadata.deletion_timestamp.is_some() {
            self.reconcile_delete(vm, name, namespace).await
        } else {
            self.reconcile_normal(vm, name, namespace).await
        };

        match &result {
            Ok(_) => self.reset_error(&resource_key),
            Err(e) => {
                error!("Reconciliation failed for VirtualMachine {}: {}", resource_key, e);
                self.increment_error(&resource_key);
            }
        }
        result
    }

    async fn reconcile_normal(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<Action, ControllerError> {
        self.ensure_vm_finalizer(vm, name, namespace).await?;

        let mut status = vm.status.clone().unwrap_or_default();

        // The hypervisor condition tracks only the session/credential
        // check, decoupled from network readiness
        if let Err(e) = self.hypervisor.validate_session().await {
            error!("Hypervisor session check failed for {}/{}: {}", namespace, name, e);
            set_condition(
                &mut status.conditions,
                HYPERVISOR_AVAILABLE_CONDITION,
                ConditionStatus::False,
                Some(HYPERVISOR_UNREACHABLE_REASON),
                Some(&e.to_string()),
            );
            self.persist_status(vm, name, namespace, status).await?;
            return Err(ControllerError::Hypervisor(e));
        }
        set_condition(
            &mut status.conditions,
            HYPERVISOR_AVAILABLE_CONDITION,
            ConditionStatus::True,
            None,
            None,
        );

        self.ensure_address_claims(vm, name, namespace).await?;
        let bindings = self.address_claim_bindings(vm, name, namespace).await?;

        // An unsatisfiable address requirement gates machine creation
        // itself: no hypervisor call until the allocator binds
        if network::evaluate(&vm.spec.network, None, &bindings)
            == NetworkReadiness::WaitingForStaticAllocation
        {
            info!("VirtualMachine {}/{} waiting for static IP allocation", namespace, name);
            status.ready = false;
            set_condition(
                &mut status.conditions,
                PROVISIONED_CONDITION,
                ConditionStatus::False,
                Some(WAITING_FOR_STATIC_IP_ALLOCATION_REASON),
                Some("a device has no DHCP, static address, or bound pool address"),
            );
            self.persist_status(vm, name, namespace, status).await?;
            return Ok(Action::requeue(WAITING_REQUEUE));
        }

        // Create or converge the machine with bound addresses substituted
        // in; the hypervisor never sees pool references
        let effective = network::effective_network_spec(&vm.spec.network, &bindings);
        let config = network::machine_config(name, vm.spec.template.as_deref(), &effective);
        let observed = self.hypervisor.create_or_update_vm(&config).await?;

        if !observed.bios_uuid.is_empty() {
            status.bios_uuid = Some(observed.bios_uuid.clone());
        }
        status.addresses = observed
            .network
            .iter()
            .flat_map(|s| s.ip_addrs.iter().cloned())
            .collect();

        match network::evaluate(&vm.spec.network, Some(&observed), &bindings) {
            NetworkReadiness::WaitingForStaticAllocation => {
                status.ready = false;
                set_condition(
                    &mut status.conditions,
                    PROVISIONED_CONDITION,
                    ConditionStatus::False,
                    Some(WAITING_FOR_STATIC_IP_ALLOCATION_REASON),
                    Some("a device has no DHCP, static address, or bound pool address"),
                );
                self.persist_status(vm, name, namespace, status).await?;
                Ok(Action::requeue(WAITING_REQUEUE))
            }
            NetworkReadiness::WaitingForDhcpAllocation => {
                info!("VirtualMachine {}/{} waiting for DHCP IP allocation", namespace, name);
                status.ready = false;
                set_condition(
                    &mut status.conditions,
                    PROVISIONED_CONDITION,
                    ConditionStatus::False,
                    Some(WAITING_FOR_IP_ALLOCATION_REASON),
                    Some("a DHCP device is connected but has not received an address yet"),
                );
                self.persist_status(vm, name, namespace, status).await?;
                Ok(Action::requeue(TRANSITION_REQUEUE))
            }
            NetworkReadiness::NotWaiting if !observed.is_ready() => {
                debug!("Machine {} is {:?}, waiting for it to become ready", name, observed.state);
                status.ready = false;
                set_condition(
                    &mut status.conditions,
                    PROVISIONED_CONDITION,
                    ConditionStatus::False,
                    Some(CREATING_REASON),
                    None,
                );
                self.persist_status(vm, name, namespace, status).await?;
                Ok(Action::requeue(TRANSITION_REQUEUE))
            }
            NetworkReadiness::NotWaiting => {
                // The metadata document is a pure function of its inputs;
                // recompute and push so the guest always boots with the
                // current network configuration
                let document = metadata::encode(&effective, &observed.network, name)?;
                let encoded = BASE64.encode(document.as_bytes());
                self.hypervisor
                    .set_extra_config(name, metadata::METADATA_EXTRA_CONFIG_KEY, &encoded)
                    .await?;
                self.hypervisor
                    .set_extra_config(
                        name,
                        metadata::METADATA_ENCODING_EXTRA_CONFIG_KEY,
                        metadata::METADATA_ENCODING,
                    )
                    .await?;

                status.ready = true;
                set_condition(
                    &mut status.conditions,
                    PROVISIONED_CONDITION,
                    ConditionStatus::True,
                    None,
                    None,
                );
                self.persist_status(vm, name, namespace, status).await?;
                info!("VirtualMachine {}/{} provisioned", namespace, name);
                Ok(Action::await_change())
            }
        }
    }

    async fn reconcile_delete(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<Action, ControllerError> {
        info!("Reconciling VirtualMachine {}/{} deletion", namespace, name);

        // Destroy first; on failure, check the observed state before
        // giving up so an already-gone machine still gets cleaned up
        let (observed, destroy_err) = match self.hypervisor.delete_vm(name).await {
            Ok(observed) => (observed, None),
            Err(e) => {
                warn!("Failed to destroy machine {}: {}", name, e);
                let observed = self.hypervisor.find_vm(name).await?;
                (observed, Some(e))
            }
        };

        if observed.state != VirtualMachineState::NotFound {
            debug!("Machine {} still {:?}, waiting for destroy to complete", name, observed.state);
            return Ok(Action::requeue(TRANSITION_REQUEUE));
        }

        // The machine is gone. Leaving address reservations attached to an
        // unreferenced VM is worse than a logged, retried error, so claims
        // are released and the VM finalizer cleared even when the destroy
        // call itself reported an error.
        let all_released = self.release_address_claims(vm, name, namespace).await?;
        if !all_released {
            return Err(ControllerError::ClaimRelease(format!(
                "not all address claims owned by {}/{} could be released",
                namespace, name
            )));
        }

        self.remove_vm_finalizer(vm, name, namespace).await?;
        info!("VirtualMachine {}/{} cleanup complete", namespace, name);

        match destroy_err {
            Some(e) => Err(ControllerError::Hypervisor(e)),
            None => Ok(Action::await_change()),
        }
    }

    async fn ensure_vm_finalizer(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        let finalizers = vm.metadata.finalizers.as_deref().unwrap_or_default();
        if finalizers.iter().any(|f| f == VM_FINALIZER) {
            return Ok(());
        }

        debug!("Adding finalizer to VirtualMachine {}/{}", namespace, name);
        let mut updated: Vec<String> = finalizers.to_vec();
        updated.push(VM_FINALIZER.to_string());
        let patch = serde_json::json!({"metadata": {"finalizers": updated}});
        self.vm_api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_vm_finalizer(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
    ) -> Result<(), ControllerError> {
        let finalizers = vm.metadata.finalizers.as_deref().unwrap_or_default();
        if !finalizers.iter().any(|f| f == VM_FINALIZER) {
            return Ok(());
        }

        let remaining: Vec<String> = finalizers
            .iter()
            .filter(|f| f.as_str() != VM_FINALIZER)
            .cloned()
            .collect();
        let patch = serde_json::json!({"metadata": {"finalizers": remaining}});
        match self
            .vm_api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => {
                info!("Cleared finalizer on VirtualMachine {}/{}", namespace, name);
                Ok(())
            }
            // The store may have finished removing the object already
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }

    /// Get the next backoff duration for a resource and advance its
    /// sequence; used by the watcher's error policy.
    pub fn error_backoff(&self, resource_key: &str) -> Duration {
        match self.backoff_states.lock() {
            Ok(mut states) => states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .backoff
                .next_backoff(),
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                Duration::from_secs(60)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            let state = states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new);
            state.increment_error();
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}

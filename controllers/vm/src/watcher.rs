//! Kubernetes resource watcher.
//!
//! This module handles watching VirtualMachine resources for changes and
//! triggering reconciliation using kube_runtime::Controller, which
//! handles automatic reconnection, retries, and per-object serialization
//! (the same VirtualMachine is never reconciled concurrently; distinct
//! ones are).

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{AddressClaim, VirtualMachine};
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig, Controller};
use kube_runtime::watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Watches VirtualMachine resources for changes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    vm_api: Api<VirtualMachine>,
    claim_api: Api<AddressClaim>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        vm_api: Api<VirtualMachine>,
        claim_api: Api<AddressClaim>,
    ) -> Self {
        Self {
            reconciler,
            vm_api,
            claim_api,
        }
    }

    /// Starts watching VirtualMachine resources. Runs until the watch
    /// stream ends.
    pub async fn watch_virtual_machines(self) -> Result<(), ControllerError> {
        info!("Starting VirtualMachine watcher");

        // Error policy: requeue with per-resource Fibonacci backoff
        let error_policy = |obj: Arc<VirtualMachine>, err: &ControllerError, ctx: Arc<Reconciler>| {
            let key = format!(
                "{}/{}",
                obj.namespace().unwrap_or_else(|| "default".to_string()),
                obj.name_any()
            );
            error!("Reconciliation error for VirtualMachine {}: {}", key, err);
            Action::requeue(ctx.error_backoff(&key))
        };

        let reconcile = |obj: Arc<VirtualMachine>, ctx: Arc<Reconciler>| async move {
            ctx.reconcile_vm(&obj).await
        };

        // Debounce waits 5 seconds after the last event before reconciling,
        // batching bursts of status updates together; concurrency bounds
        // the load placed on the hypervisor session
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(3);

        Controller::new(self.vm_api, watcher::Config::default())
            // Owned AddressClaims re-trigger the owner VM, so allocator-side
            // binding wakes the reconcile without polling
            .owns(self.claim_api, watcher::Config::default())
            .with_config(controller_config)
            .run(reconcile, error_policy, self.reconciler)
            .for_each(|res| async move {
                if let Err(e) = res {
                    error!("Controller error for VirtualMachine: {}", e);
                }
            })
            .await;

        Ok(())
    }
}

//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires together the
//! Kubernetes client, the hypervisor client, the reconciler, and the
//! resource watcher for the VM Controller.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::{AddressClaim, VirtualMachine};
use hypervisor_client::HypervisorClient;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for VirtualMachine management.
pub struct Controller {
    vm_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        hypervisor_url: String,
        hypervisor_username: String,
        hypervisor_password: String,
        namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing VM Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default().await.map_err(ControllerError::Kube)?;

        // Create hypervisor client
        let hypervisor = HypervisorClient::new(
            hypervisor_url,
            hypervisor_username,
            hypervisor_password,
        )?;

        // Create API clients for the watch scope
        let (vm_api, claim_api): (Api<VirtualMachine>, Api<AddressClaim>) = match namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(kube_client.clone(), ns),
                Api::namespaced(kube_client.clone(), ns),
            ),
            None => (Api::all(kube_client.clone()), Api::all(kube_client.clone())),
        };

        // Create reconciler and watcher
        let reconciler = Arc::new(Reconciler::new(hypervisor, kube_client));
        let watcher_instance = Watcher::new(reconciler, vm_api, claim_api);

        // Start the watcher in a background task
        let vm_watcher = tokio::spawn(async move {
            watcher_instance.watch_virtual_machines().await
        });

        Ok(Self { vm_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("VM Controller running");

        self.vm_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("VirtualMachine watcher panicked: {}", e)))?
            .map_err(|e| ControllerError::Watch(format!("VirtualMachine watcher error: {}", e)))?;

        Ok(())
    }
}

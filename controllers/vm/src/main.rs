//! VM Controller
//!
//! Reconciles VirtualMachine CRDs against the hypervisor:
//! - Creates machines once their network configuration is satisfiable
//! - Manages AddressClaim CRDs for devices drawing from address pools
//! - Waits for static-pool and DHCP address allocation
//! - Injects boot-time network metadata for guest consumption
//! - Releases address reservations when a VirtualMachine is deleted

mod backoff;
mod controller;
mod error;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use std::env;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting VM Controller");

    // Load configuration from environment variables
    let hypervisor_url = env::var("HYPERVISOR_URL")
        .unwrap_or_else(|_| "https://hypervisor.vmops:443".to_string());
    let hypervisor_username = env::var("HYPERVISOR_USERNAME")
        .map_err(|_| ControllerError::InvalidConfig(
            "HYPERVISOR_USERNAME environment variable is required".to_string()
        ))?;
    let hypervisor_password = env::var("HYPERVISOR_PASSWORD")
        .map_err(|_| ControllerError::InvalidConfig(
            "HYPERVISOR_PASSWORD environment variable is required".to_string()
        ))?;
    let namespace = env::var("WATCH_NAMESPACE").ok();

    info!("Configuration:");
    info!("  Hypervisor URL: {}", hypervisor_url);
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));

    // Initialize and run controller
    let controller = Controller::new(
        hypervisor_url,
        hypervisor_username,
        hypervisor_password,
        namespace,
    ).await?;
    controller.run().await?;

    Ok(())
}

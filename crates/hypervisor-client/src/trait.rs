//! HypervisorClient trait for mocking
//!
//! This trait abstracts the HypervisorClient to enable mocking in unit
//! tests. The concrete HypervisorClient implements this trait, and tests
//! can use mock implementations.

use crate::error::HypervisorError;
use crate::models::*;

/// Trait for hypervisor management API operations
///
/// This trait enables mocking of hypervisor calls for unit testing.
/// All async methods must be `Send` to work with Tokio's work-stealing
/// runtime.
#[async_trait::async_trait]
pub trait HypervisorClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the session credentials and connectivity
    async fn validate_session(&self) -> Result<(), HypervisorError>;

    /// Look up a machine by name.
    ///
    /// A missing machine is not an error: the returned state is
    /// `NotFound` so callers can distinguish "gone" from "unreachable".
    async fn find_vm(&self, name: &str) -> Result<VirtualMachine, HypervisorError>;

    /// Create the machine if absent, otherwise converge it toward the
    /// given configuration. Idempotent; returns the observed state after
    /// the call.
    async fn create_or_update_vm(&self, config: &MachineConfig) -> Result<VirtualMachine, HypervisorError>;

    /// Destroy a machine. Returns the observed state after the destroy
    /// was initiated; `NotFound` means the machine is fully gone.
    async fn delete_vm(&self, name: &str) -> Result<VirtualMachine, HypervisorError>;

    /// Set an extra-config key/value on the machine's runtime
    /// configuration, consumed by the guest at boot.
    async fn set_extra_config(&self, name: &str, key: &str, value: &str) -> Result<(), HypervisorError>;
}

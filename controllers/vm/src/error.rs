//! Controller-specific error types.
//!
//! This module defines error types specific to the VM Controller that are
//! not covered by upstream library errors, plus helpers for classifying
//! Kubernetes API failures the reconciler reacts to (conflicts are retried
//! after a refetch, not-found during cleanup is treated as success).

use hypervisor_client::HypervisorError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the VM Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Hypervisor API error
    #[error("Hypervisor error: {0}")]
    Hypervisor(#[from] HypervisorError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Boot metadata could not be generated
    #[error("Metadata generation failed: {0}")]
    MetadataGeneration(String),

    /// One or more address claims could not be released
    #[error("Address claim release failed: {0}")]
    ClaimRelease(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Whether a Kubernetes API error is a 404 NotFound.
pub(crate) fn is_not_found(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(ae) if ae.code == 404)
}

/// Whether a Kubernetes API error is an optimistic-concurrency conflict
/// (stale resourceVersion on a write).
pub(crate) fn is_conflict(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(ae) if ae.code == 409 && ae.reason == "Conflict")
}

/// Whether a Kubernetes API error reports the object already exists
/// (create raced with another writer; treated as idempotent success).
pub(crate) fn is_already_exists(err: &KubeError) -> bool {
    matches!(err, KubeError::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

//! VMops CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the VMops controllers.

pub mod address_claim;
pub mod conditions;
pub mod network;
pub mod references;
pub mod virtual_machine;

pub use address_claim::*;
pub use conditions::*;
pub use network::*;
pub use references::*;
pub use virtual_machine::*;

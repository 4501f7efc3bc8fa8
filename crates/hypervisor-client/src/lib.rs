//! Hypervisor management API client
//!
//! A Rust client library for the hypervisor management REST API used by
//! the VMops VM controller. Provides type-safe models for observed
//! machine state and methods for machine lifecycle and guest
//! configuration operations.
//!
//! # Example
//!
//! ```no_run
//! use hypervisor_client::{HypervisorClient, HypervisorClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create a client
//! let client = HypervisorClient::new(
//!     "https://hypervisor:443".to_string(),
//!     "operator".to_string(),
//!     "secret".to_string(),
//! )?;
//!
//! // Look up a machine
//! let vm = client.find_vm("worker-0").await?;
//! println!("machine state: {:?}", vm.state);
//!
//! // Inject guest boot metadata
//! client.set_extra_config("worker-0", "guestinfo.metadata", "bWV0YWRhdGE=").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Machine lifecycle**: find, create/update, delete
//! - **Guest configuration**: extra-config key/value injection
//! - **Session validation**: credential/connectivity checks

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod hypervisor_trait;
pub mod models;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::HypervisorClient;
pub use error::HypervisorError;
pub use hypervisor_trait::HypervisorClientTrait;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockHypervisorClient;

//! Typed object references for VMops CRDs
//!
//! Provides a Kubernetes-style typed reference for pointing at external
//! address pool resources. Follows the Kubernetes TypedLocalObjectReference
//! pattern with apiGroup, kind, and name; claims are namespace-local, so no
//! namespace field is carried.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to an external address pool resource.
///
/// The pool allocator watches claims carrying these references and binds
/// an address from the matching pool. The pool kind is opaque to VMops:
/// any (apiGroup, kind, name) triple an allocator understands is valid.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolReference {
    /// API group of the referenced pool resource (e.g., "ipam.cluster.x-k8s.io")
    pub api_group: String,

    /// Kind of the referenced pool resource (e.g., "InClusterIPPool")
    pub kind: String,

    /// Name of the referenced pool resource
    pub name: String,
}

impl PoolReference {
    /// Create a new pool reference.
    pub fn new(api_group: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_group: api_group.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for PoolReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.api_group, self.kind, self.name)
    }
}

//! Condition types for the VirtualMachine status
//!
//! Conditions follow the Kubernetes convention: one entry per type, with
//! a status, a machine-readable reason and a human-readable message.
//! `set_condition` is idempotent with respect to transition bookkeeping:
//! re-asserting the same (status, reason) pair never bumps the transition
//! timestamp, so repeated reconciles do not generate spurious updates.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition asserted when the machine exists and all requested network
/// addresses have been allocated.
pub const PROVISIONED_CONDITION: &str = "Provisioned";

/// Condition reporting whether the hypervisor session/credential check
/// succeeded. Independent of network readiness.
pub const HYPERVISOR_AVAILABLE_CONDITION: &str = "HypervisorAvailable";

/// Reason: a device has neither DHCP nor a static/bound address, so
/// machine creation is blocked until the pool allocator binds one.
pub const WAITING_FOR_STATIC_IP_ALLOCATION_REASON: &str = "WaitingForStaticIPAllocation";

/// Reason: a DHCP device is connected but has not yet reported an address
/// for the requested family.
pub const WAITING_FOR_IP_ALLOCATION_REASON: &str = "WaitingForIPAllocation";

/// Reason: the hypervisor has accepted the machine but it is not Ready yet.
pub const CREATING_REASON: &str = "Creating";

/// Reason: the hypervisor session/credential check failed.
pub const HYPERVISOR_UNREACHABLE_REASON: &str = "HypervisorUnreachable";

/// Condition status, mirroring `corev1.ConditionStatus`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The condition state cannot be determined
    Unknown,
}

/// One observed condition on a VirtualMachine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., "Provisioned")
    #[serde(rename = "type")]
    pub kind: String,

    /// Condition status
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message for the last transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the condition last changed status or reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Build a condition with the transition time set to now.
    #[must_use]
    pub fn new(
        kind: &str,
        status: ConditionStatus,
        reason: Option<&str>,
        message: Option<&str>,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            status,
            reason: reason.map(str::to_string),
            message: message.map(str::to_string),
            last_transition_time: Some(Utc::now()),
        }
    }
}

/// Set a condition on a condition list, adding it if absent.
///
/// If an entry of the same type already exists with the same status and
/// reason, only the message is refreshed and the transition timestamp is
/// left untouched. Any change to status or reason replaces the entry and
/// stamps a new transition time.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    kind: &str,
    status: ConditionStatus,
    reason: Option<&str>,
    message: Option<&str>,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.kind == kind) {
        if existing.status == status && existing.reason.as_deref() == reason {
            // Same (status, reason): no transition, keep the timestamp
            existing.message = message.map(str::to_string);
            return;
        }
        *existing = Condition::new(kind, status, reason, message);
        return;
    }
    conditions.push(Condition::new(kind, status, reason, message));
}

/// Get a condition by type.
#[must_use]
pub fn get_condition<'a>(conditions: &'a [Condition], kind: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.kind == kind)
}

/// Whether a condition of the given type is present.
#[must_use]
pub fn has_condition(conditions: &[Condition], kind: &str) -> bool {
    get_condition(conditions, kind).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_adds_when_absent() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            PROVISIONED_CONDITION,
            ConditionStatus::False,
            Some(WAITING_FOR_STATIC_IP_ALLOCATION_REASON),
            Some("waiting for static IP"),
        );

        assert_eq!(conditions.len(), 1);
        let c = get_condition(&conditions, PROVISIONED_CONDITION).unwrap();
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason.as_deref(), Some(WAITING_FOR_STATIC_IP_ALLOCATION_REASON));
        assert!(c.last_transition_time.is_some());
    }

    #[test]
    fn test_set_condition_same_status_reason_keeps_transition_time() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            PROVISIONED_CONDITION,
            ConditionStatus::False,
            Some(WAITING_FOR_IP_ALLOCATION_REASON),
            Some("first"),
        );
        let first_transition = conditions[0].last_transition_time;

        set_condition(
            &mut conditions,
            PROVISIONED_CONDITION,
            ConditionStatus::False,
            Some(WAITING_FOR_IP_ALLOCATION_REASON),
            Some("second"),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_transition);
        assert_eq!(conditions[0].message.as_deref(), Some("second"));
    }

    #[test]
    fn test_set_condition_status_change_replaces_entry() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            PROVISIONED_CONDITION,
            ConditionStatus::False,
            Some(WAITING_FOR_IP_ALLOCATION_REASON),
            None,
        );
        set_condition(&mut conditions, PROVISIONED_CONDITION, ConditionStatus::True, None, None);

        assert_eq!(conditions.len(), 1);
        let c = get_condition(&conditions, PROVISIONED_CONDITION).unwrap();
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.reason, None);
    }

    #[test]
    fn test_set_condition_reason_change_replaces_entry() {
        let mut conditions = Vec::new();
        set_condition(
            &mut conditions,
            PROVISIONED_CONDITION,
            ConditionStatus::False,
            Some(WAITING_FOR_STATIC_IP_ALLOCATION_REASON),
            None,
        );
        set_condition(
            &mut conditions,
            PROVISIONED_CONDITION,
            ConditionStatus::False,
            Some(WAITING_FOR_IP_ALLOCATION_REASON),
            None,
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(
            conditions[0].reason.as_deref(),
            Some(WAITING_FOR_IP_ALLOCATION_REASON)
        );
    }

    #[test]
    fn test_conditions_of_different_types_coexist() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, PROVISIONED_CONDITION, ConditionStatus::True, None, None);
        set_condition(
            &mut conditions,
            HYPERVISOR_AVAILABLE_CONDITION,
            ConditionStatus::True,
            None,
            None,
        );

        assert_eq!(conditions.len(), 2);
        assert!(has_condition(&conditions, PROVISIONED_CONDITION));
        assert!(has_condition(&conditions, HYPERVISOR_AVAILABLE_CONDITION));
    }
}

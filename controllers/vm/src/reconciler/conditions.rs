//! Status and condition persistence
//!
//! Conditions are mutated in memory (see `crds::conditions`), batched into
//! a full desired status, and written with a single optimistic-concurrency
//! `replace_status` call so intermediate condition combinations are never
//! visible. The write is diffed against the last-read status first, so
//! repeating a reconcile with an unchanged outcome issues no write at all.

use super::Reconciler;
use crate::error::{is_conflict, ControllerError};
use crds::{set_condition, VirtualMachine, VirtualMachineStatus};
use kube::api::PostParams;
use tracing::{debug, warn};

impl Reconciler {
    /// Persist the desired status using the original object's
    /// resourceVersion as the write precondition.
    ///
    /// On a stale-version conflict the object is refetched once, the
    /// desired conditions are re-applied on top of the fresh status, and
    /// the write is retried; a second conflict surfaces to the caller for
    /// a scheduled re-attempt.
    pub(crate) async fn persist_status(
        &self,
        vm: &VirtualMachine,
        name: &str,
        namespace: &str,
        desired: VirtualMachineStatus,
    ) -> Result<(), ControllerError> {
        if vm.status.as_ref() == Some(&desired) {
            debug!("VirtualMachine {}/{} status unchanged, skipping write", namespace, name);
            return Ok(());
        }

        let api = self.vm_api(namespace);
        let mut updated = vm.clone();
        updated.status = Some(desired.clone());
        updated.metadata.managed_fields = None;

        match api
            .replace_status(name, &PostParams::default(), serde_json::to_vec(&updated)?)
            .await
        {
            Ok(_) => {
                debug!("Updated VirtualMachine {}/{} status", namespace, name);
                Ok(())
            }
            Err(e) if is_conflict(&e) => {
                warn!(
                    "Stale resourceVersion writing VirtualMachine {}/{} status, refetching and retrying once",
                    namespace, name
                );
                let mut fresh = api.get(name).await?;

                let mut merged = fresh.status.clone().unwrap_or_default();
                merged.ready = desired.ready;
                merged.bios_uuid = desired.bios_uuid.clone();
                merged.addresses = desired.addresses.clone();
                for condition in &desired.conditions {
                    set_condition(
                        &mut merged.conditions,
                        &condition.kind,
                        condition.status,
                        condition.reason.as_deref(),
                        condition.message.as_deref(),
                    );
                }

                if fresh.status.as_ref() == Some(&merged) {
                    return Ok(());
                }
                fresh.status = Some(merged);
                fresh.metadata.managed_fields = None;
                api.replace_status(name, &PostParams::default(), serde_json::to_vec(&fresh)?)
                    .await?;
                debug!("Updated VirtualMachine {}/{} status after refetch", namespace, name);
                Ok(())
            }
            Err(e) => Err(ControllerError::Kube(e)),
        }
    }
}

//! Mock HypervisorClient for unit testing
//!
//! This module provides a mock implementation of HypervisorClientTrait
//! that can be used in unit tests without requiring a running hypervisor.
//!
//! The mock stores machines in memory and can be configured to return
//! specific observed states and failures for testing different scenarios.

use crate::error::HypervisorError;
use crate::hypervisor_trait::HypervisorClientTrait;
use crate::models::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock HypervisorClient for testing
#[derive(Clone)]
pub struct MockHypervisorClient {
    base_url: String,
    // In-memory storage for machines and their extra config
    vms: Arc<Mutex<HashMap<String, VirtualMachine>>>,
    extra_config: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
    // Failure injection
    session_valid: Arc<Mutex<bool>>,
    fail_delete: Arc<Mutex<bool>>,
    // State reported for machines created through create_or_update_vm
    state_after_create: Arc<Mutex<VirtualMachineState>>,
    // Record of configs applied through create_or_update_vm
    applied_configs: Arc<Mutex<Vec<MachineConfig>>>,
}

impl std::fmt::Debug for MockHypervisorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHypervisorClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MockHypervisorClient {
    /// Create a new mock client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            vms: Arc::new(Mutex::new(HashMap::new())),
            extra_config: Arc::new(Mutex::new(HashMap::new())),
            session_valid: Arc::new(Mutex::new(true)),
            fail_delete: Arc::new(Mutex::new(false)),
            state_after_create: Arc::new(Mutex::new(VirtualMachineState::Pending)),
            applied_configs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a machine to the mock store (for test setup)
    pub fn add_vm(&self, vm: VirtualMachine) {
        self.vms.lock().unwrap().insert(vm.name.clone(), vm);
    }

    /// Remove a machine from the mock store (for test setup)
    pub fn remove_vm(&self, name: &str) {
        self.vms.lock().unwrap().remove(name);
    }

    /// Make validate_session fail (for test setup)
    pub fn set_session_valid(&self, valid: bool) {
        *self.session_valid.lock().unwrap() = valid;
    }

    /// Make delete_vm return an error (for test setup)
    pub fn set_fail_delete(&self, fail: bool) {
        *self.fail_delete.lock().unwrap() = fail;
    }

    /// State reported for newly created machines (for test setup)
    pub fn set_state_after_create(&self, state: VirtualMachineState) {
        *self.state_after_create.lock().unwrap() = state;
    }

    /// Extra config value stored for a machine, if any
    pub fn extra_config_value(&self, name: &str, key: &str) -> Option<String> {
        self.extra_config
            .lock()
            .unwrap()
            .get(name)
            .and_then(|kv| kv.get(key))
            .cloned()
    }

    /// Machine configs applied through create_or_update_vm, in call order
    pub fn applied_configs(&self) -> Vec<MachineConfig> {
        self.applied_configs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HypervisorClientTrait for MockHypervisorClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_session(&self) -> Result<(), HypervisorError> {
        if *self.session_valid.lock().unwrap() {
            Ok(())
        } else {
            Err(HypervisorError::Authentication(
                "Invalid credentials: 401 - mock".to_string(),
            ))
        }
    }

    async fn find_vm(&self, name: &str) -> Result<VirtualMachine, HypervisorError> {
        Ok(self
            .vms
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| VirtualMachine {
                name: name.to_string(),
                state: VirtualMachineState::NotFound,
                ..VirtualMachine::default()
            }))
    }

    async fn create_or_update_vm(&self, config: &MachineConfig) -> Result<VirtualMachine, HypervisorError> {
        if config.name.is_empty() {
            return Err(HypervisorError::InvalidRequest(
                "machine config missing name".to_string(),
            ));
        }
        self.applied_configs.lock().unwrap().push(config.clone());

        let mut vms = self.vms.lock().unwrap();
        let vm = vms.entry(config.name.clone()).or_insert_with(|| VirtualMachine {
            name: config.name.clone(),
            bios_uuid: format!("mock-bios-{}", config.name),
            state: *self.state_after_create.lock().unwrap(),
            network: Vec::new(),
        });
        Ok(vm.clone())
    }

    async fn delete_vm(&self, name: &str) -> Result<VirtualMachine, HypervisorError> {
        if *self.fail_delete.lock().unwrap() {
            return Err(HypervisorError::Api(format!(
                "500 - failed to destroy machine {}",
                name
            )));
        }
        // Destroy is immediate in the mock
        self.vms.lock().unwrap().remove(name);
        Ok(VirtualMachine {
            name: name.to_string(),
            state: VirtualMachineState::NotFound,
            ..VirtualMachine::default()
        })
    }

    async fn set_extra_config(&self, name: &str, key: &str, value: &str) -> Result<(), HypervisorError> {
        if !self.vms.lock().unwrap().contains_key(name) {
            return Err(HypervisorError::NotFound(format!("machine {}", name)));
        }
        self.extra_config
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

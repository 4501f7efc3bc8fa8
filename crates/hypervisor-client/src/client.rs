//! Hypervisor API client
//!
//! Implements the hypervisor management REST API client for machine
//! lifecycle operations: /api/vms/ for lifecycle, /api/session for
//! credential validation.

use crate::error::HypervisorError;
use crate::hypervisor_trait::HypervisorClientTrait;
use crate::models::*;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Hypervisor management API client
///
/// Credentials are sent per request, so a single client can be shared
/// across concurrently reconciling workers without session affinity.
pub struct HypervisorClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for HypervisorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypervisorClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl HypervisorClient {
    /// Create a new hypervisor client
    ///
    /// # Arguments
    /// * `base_url` - Hypervisor API base URL (e.g., "https://hypervisor:443")
    /// * `username` - API username
    /// * `password` - API password
    pub fn new(base_url: String, username: String, password: String) -> Result<Self, HypervisorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(HypervisorError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
    }

    fn put(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .put(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
    }

    fn delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
    }

    async fn parse_vm(response: reqwest::Response, name: &str) -> Result<VirtualMachine, HypervisorError> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // A missing machine is observed state, not a failure
            return Ok(VirtualMachine {
                name: name.to_string(),
                state: VirtualMachineState::NotFound,
                ..VirtualMachine::default()
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Authentication(format!("{} - {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Api(format!("{} - {}", status, body)));
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text).map_err(|e| {
            HypervisorError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                response_text.chars().take(500).collect::<String>()
            ))
        })
    }
}

#[async_trait::async_trait]
impl HypervisorClientTrait for HypervisorClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_session(&self) -> Result<(), HypervisorError> {
        // The session endpoint is lightweight and requires authentication
        let url = format!("{}/api/session", self.base_url);
        debug!("Validating hypervisor credentials and connectivity");

        let response = self.get(&url).send().await.map_err(HypervisorError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Authentication(format!(
                "Invalid credentials: {} - {}",
                status, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Api(format!(
                "Failed to validate session: {} - {}",
                status, body
            )));
        }

        debug!("Hypervisor session validated successfully");
        Ok(())
    }

    async fn find_vm(&self, name: &str) -> Result<VirtualMachine, HypervisorError> {
        let url = format!("{}/api/vms/{}", self.base_url, urlencoding::encode(name));
        debug!("Fetching machine {} from hypervisor", name);

        let response = self.get(&url).send().await.map_err(HypervisorError::Http)?;
        Self::parse_vm(response, name).await
    }

    async fn create_or_update_vm(&self, config: &MachineConfig) -> Result<VirtualMachine, HypervisorError> {
        if config.name.is_empty() {
            return Err(HypervisorError::InvalidRequest(
                "machine config missing name".to_string(),
            ));
        }
        let url = format!("{}/api/vms/{}", self.base_url, urlencoding::encode(&config.name));
        debug!("Applying machine config for {} to hypervisor", config.name);

        let response = self
            .put(&url)
            .json(config)
            .send()
            .await
            .map_err(HypervisorError::Http)?;
        Self::parse_vm(response, &config.name).await
    }

    async fn delete_vm(&self, name: &str) -> Result<VirtualMachine, HypervisorError> {
        let url = format!("{}/api/vms/{}", self.base_url, urlencoding::encode(name));
        debug!("Destroying machine {} on hypervisor", name);

        let response = self.delete(&url).send().await.map_err(HypervisorError::Http)?;
        Self::parse_vm(response, name).await
    }

    async fn set_extra_config(&self, name: &str, key: &str, value: &str) -> Result<(), HypervisorError> {
        let url = format!(
            "{}/api/vms/{}/extra-config",
            self.base_url,
            urlencoding::encode(name)
        );
        debug!("Setting extra config {} on machine {}", key, name);

        let body = serde_json::json!({ "key": key, "value": value });
        let response = self
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(HypervisorError::Http)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HypervisorError::NotFound(format!("machine {}", name)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HypervisorError::Api(format!(
                "Failed to set extra config: {} - {}",
                status, body
            )));
        }
        Ok(())
    }
}

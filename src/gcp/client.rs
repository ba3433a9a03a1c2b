//! GCP Client
//!
//! Main client for interacting with GCP APIs, combining authentication
//! and HTTP functionality. Project and location are passed per call since
//! one client serves adapters for many scopes.

use super::auth::GcpCredentials;
use super::http::GcpHttpClient;
use anyhow::{Context, Result};
use serde_json::Value;

const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
const STORAGE_BASE_URL: &str = "https://storage.googleapis.com/storage/v1";
const RESOURCE_MANAGER_BASE_URL: &str = "https://cloudresourcemanager.googleapis.com/v3";

/// API base URLs, overridable for emulators and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub compute: String,
    pub storage: String,
    pub resource_manager: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            compute: COMPUTE_BASE_URL.to_string(),
            storage: STORAGE_BASE_URL.to_string(),
            resource_manager: RESOURCE_MANAGER_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Serve every API from one host, using the production path layout
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            compute: format!("{}/compute/v1", base),
            storage: format!("{}/storage/v1", base),
            resource_manager: format!("{}/v3", base),
        }
    }
}

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: GcpHttpClient,
    pub endpoints: Endpoints,
}

impl GcpClient {
    /// Create a new GCP client using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let credentials = GcpCredentials::new()
            .await
            .context("Failed to initialize GCP credentials")?;

        Self::with_credentials(credentials, Endpoints::default())
    }

    pub fn with_credentials(credentials: GcpCredentials, endpoints: Endpoints) -> Result<Self> {
        Ok(Self {
            credentials,
            http: GcpHttpClient::new()?,
            endpoints,
        })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.get_with_query(url, &[]).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, &token, query).await
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn compute_url(&self, project: &str, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.endpoints.compute,
            urlencoding::encode(project),
            path
        )
    }

    /// Build zonal Compute Engine API URL
    pub fn compute_zonal_url(&self, project: &str, zone: &str, resource: &str) -> String {
        self.compute_url(project, &format!("zones/{}/{}", urlencoding::encode(zone), resource))
    }

    /// Build global Compute Engine API URL
    pub fn compute_global_url(&self, project: &str, resource: &str) -> String {
        self.compute_url(project, &format!("global/{}", resource))
    }

    // =========================================================================
    // Cloud Storage API helpers
    // =========================================================================

    /// Build Cloud Storage API URL
    pub fn storage_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.storage, path)
    }

    /// Build Cloud Storage bucket URL
    pub fn storage_bucket_url(&self, bucket: &str) -> String {
        self.storage_url(&format!("b/{}", urlencoding::encode(bucket)))
    }

    // =========================================================================
    // Resource Manager API helpers
    // =========================================================================

    /// Build Resource Manager API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoints.resource_manager, path)
    }
}

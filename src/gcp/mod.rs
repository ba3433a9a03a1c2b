//! GCP API interaction module
//!
//! This module provides the REST plumbing the GCP adapters are built on.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Main GCP client and endpoint URL builders
//! - [`http`] - HTTP utilities and provider error classification
//!
//! # Example
//!
//! ```ignore
//! use blastscan::gcp::client::GcpClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::new().await?;
//!     let url = client.compute_zonal_url("my-project", "us-central1-a", "instances");
//!     let instances = client.get(&url).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;

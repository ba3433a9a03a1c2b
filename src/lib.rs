//! blastscan: cloud resource discovery and blast-radius linking
//!
//! [`discovery`] holds the provider-neutral framework, [`gcp`] the Google
//! Cloud REST plumbing and [`resource`] the adapters built on both.

pub mod config;
pub mod discovery;
pub mod gcp;
pub mod resource;

/// Version injected at compile time via BLASTSCAN_VERSION env var (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("BLASTSCAN_VERSION") {
    Some(v) => v,
    None => "dev",
};

//! Access-control and backend configuration.

use std::time::Duration;

/// Name of the reserved institution holding users who belong to no
/// organization.
pub const INDIVIDUAL_USERS_INSTITUTION: &str = "Individual Users";

/// Configuration for access decisions and the reconciler.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Display name of the individual-users institution.
    pub individual_institution_name: String,
    /// Period of the background reconciler (default: 300 s).
    pub reconcile_interval: Duration,
    /// Contracts ending within this many days carry an expiry warning
    /// in the session descriptor (default: 30).
    pub expiry_warning_days: i64,
    /// Optional pepper prepended to institution-admin passwords before
    /// Argon2id verification.
    pub pepper: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            individual_institution_name: INDIVIDUAL_USERS_INSTITUTION.into(),
            reconcile_interval: Duration::from_secs(300),
            expiry_warning_days: 30,
            pepper: None,
        }
    }
}

/// Where the hosted backend lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://project.example.co`.
    pub base_url: String,
    /// Public API key sent as `apikey` on every request.
    pub anon_key: String,
    /// Per-request timeout (default: 15 s).
    pub request_timeout: Duration,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

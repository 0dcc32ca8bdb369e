//! Server configuration from `CAMPUSGATE_*` environment variables.

use std::time::Duration;

use campusgate_auth::AccessConfig;
use campusgate_db::DbConfig;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid {key}: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub access: AccessConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads, on top of the database variables:
    /// `CAMPUSGATE_RECONCILE_INTERVAL_SECS`,
    /// `CAMPUSGATE_INDIVIDUAL_INSTITUTION`,
    /// `CAMPUSGATE_EXPIRY_WARNING_DAYS` and `CAMPUSGATE_ADMIN_PEPPER`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut access = AccessConfig::default();

        if let Some(raw) = lookup("CAMPUSGATE_RECONCILE_INTERVAL_SECS") {
            let secs: u64 = parse("CAMPUSGATE_RECONCILE_INTERVAL_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError {
                    key: "CAMPUSGATE_RECONCILE_INTERVAL_SECS",
                    message: "must be positive".into(),
                });
            }
            access.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(name) = lookup("CAMPUSGATE_INDIVIDUAL_INSTITUTION") {
            access.individual_institution_name = name;
        }
        if let Some(raw) = lookup("CAMPUSGATE_EXPIRY_WARNING_DAYS") {
            access.expiry_warning_days = parse("CAMPUSGATE_EXPIRY_WARNING_DAYS", &raw)?;
        }
        access.pepper = lookup("CAMPUSGATE_ADMIN_PEPPER");

        Ok(Self {
            db: DbConfig::from_lookup(&lookup),
            access,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        key,
        message: e.to_string(),
    })
}

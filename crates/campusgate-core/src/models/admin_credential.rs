//! Institution administrator credentials.
//!
//! Institution admins are not identity-provider users. Their credentials
//! are rows stored next to the institution they administer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionAdminCredential {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// An institution an admin credential unlocks, as reported by the
/// verifier. The flags are what the verifier saw; callers re-check them
/// live before trusting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionContext {
    pub institution_id: Uuid,
    pub institution_name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub contract_end_date: Option<NaiveDate>,
}

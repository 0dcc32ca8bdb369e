//! Membership domain model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Teacher,
    Student,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Teacher => "teacher",
            MembershipRole::Student => "student",
        }
    }
}

/// Links a user to an institution.
///
/// The `is_active` flag is independent of the institution's own flag: a
/// membership can be switched off while the institution stays active,
/// and the reconciler switches all of them off when the institution
/// lapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub institution_id: Uuid,
    pub role: MembershipRole,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMembership {
    pub user_id: Uuid,
    pub institution_id: Uuid,
    pub role: MembershipRole,
}

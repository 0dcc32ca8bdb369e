//! User profile and principal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Individual,
}

/// Role/profile row for an identity-provider user. The id is the
/// provider's user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub role: Role,
    pub display_name: String,
    pub email: String,
}

/// An authenticated user as seen by the access decision engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub display_name: String,
    pub email: String,
}

impl From<UserProfile> for Principal {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            role: profile.role,
            display_name: profile.display_name,
            email: profile.email,
        }
    }
}

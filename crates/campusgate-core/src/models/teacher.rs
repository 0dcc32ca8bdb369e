//! Teacher domain model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Teacher record. Institutions reference this id (not the user id) in
/// `guidance_teacher_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTeacher {
    pub user_id: Uuid,
    pub name: String,
    pub email: Option<String>,
}

//! Guidance-teacher data access.

use campusgate_core::models::user::Principal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::decision::{Grant, GrantBasis};
use crate::error::AccessError;
use crate::rpc::{RpcChannel, invoke_as};

pub const GUIDANCE_TEACHER_STUDENTS: &str = "get_guidance_teacher_students";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidedStudent {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Reads the students of a guidance teacher's institution. Only sessions
/// granted on the guidance basis may use it.
#[derive(Debug, Clone)]
pub struct GuidanceClient<R> {
    rpc: R,
}

impl<R: RpcChannel> GuidanceClient<R> {
    pub fn new(rpc: R) -> Self {
        Self { rpc }
    }

    pub async fn students(
        &self,
        principal: &Principal,
        grant: &Grant,
        auth_token: Option<&str>,
    ) -> Result<Vec<GuidedStudent>, AccessError> {
        let institution = match (&grant.basis, &grant.institution) {
            (GrantBasis::GuidanceTeacher, Some(institution)) => institution,
            _ => return Err(AccessError::NotPermitted),
        };
        let payload = json!({
            "teacher_user_id": principal.id,
            "institution_id": institution.id,
        });
        let students: Option<Vec<GuidedStudent>> =
            invoke_as(&self.rpc, GUIDANCE_TEACHER_STUDENTS, payload, auth_token).await?;
        Ok(students.unwrap_or_default())
    }
}

//! Session projection.
//!
//! After a successful decision, the client is handed a descriptor of
//! the session: who they are, through which institution, and until
//! when. Institution-admin descriptors are persisted locally under
//! [`DESCRIPTOR_KEY`] so the session can be restored, after
//! re-validation, on the next start.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use campusgate_core::contract::ContractWindow;
use campusgate_core::error::{CampusError, CampusResult};
use campusgate_core::models::institution::Institution;
use campusgate_core::models::user::{Principal, Role};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::config::AccessConfig;
use crate::decision::{Grant, GrantBasis};

pub const DESCRIPTOR_KEY: &str = "institution_admin_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Admin,
    InstitutionAdmin,
    GuidanceTeacher,
    Teacher,
    Student,
    Individual,
}

impl From<Role> for SessionRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => SessionRole::Admin,
            Role::Teacher => SessionRole::Teacher,
            Role::Student => SessionRole::Student,
            Role::Individual => SessionRole::Individual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub institution_id: Option<Uuid>,
    pub institution_name: Option<String>,
    pub role: SessionRole,
    pub login_time: DateTime<Utc>,
    pub contract_end_date: Option<NaiveDate>,
    pub is_active: bool,
    /// Days left on the contract, present only once it is within the
    /// configured warning threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_warning_days: Option<i64>,
}

fn expiry_warning(window: &ContractWindow, config: &AccessConfig) -> Option<i64> {
    window
        .days_remaining
        .filter(|days| (0..=config.expiry_warning_days).contains(days))
}

/// Descriptor for a user admitted by the decision engine.
pub fn project(
    principal: &Principal,
    grant: &Grant,
    login_time: DateTime<Utc>,
    config: &AccessConfig,
) -> SessionDescriptor {
    let role = match grant.basis {
        GrantBasis::GuidanceTeacher => SessionRole::GuidanceTeacher,
        _ => principal.role.into(),
    };
    match &grant.institution {
        Some(institution) => SessionDescriptor {
            institution_id: Some(institution.id),
            institution_name: Some(institution.name.clone()),
            role,
            login_time,
            contract_end_date: institution.contract_end_date,
            is_active: institution.is_active,
            expiry_warning_days: expiry_warning(&institution.window, config),
        },
        None => SessionDescriptor {
            institution_id: None,
            institution_name: None,
            role,
            login_time,
            contract_end_date: None,
            is_active: true,
            expiry_warning_days: None,
        },
    }
}

/// Descriptor for an institution admin of a validated institution.
pub fn project_institution_admin(
    institution: &Institution,
    window: &ContractWindow,
    login_time: DateTime<Utc>,
    config: &AccessConfig,
) -> SessionDescriptor {
    SessionDescriptor {
        institution_id: Some(institution.id),
        institution_name: Some(institution.name.clone()),
        role: SessionRole::InstitutionAdmin,
        login_time,
        contract_end_date: institution.contract_end_date,
        is_active: institution.is_active,
        expiry_warning_days: expiry_warning(window, config),
    }
}

/// Local persistence for the institution-admin descriptor. Nothing in
/// here is trusted without re-validation.
pub trait DescriptorStore: Send + Sync {
    fn load(&self) -> impl Future<Output = CampusResult<Option<SessionDescriptor>>> + Send;

    fn save(
        &self,
        descriptor: &SessionDescriptor,
    ) -> impl Future<Output = CampusResult<()>> + Send;

    fn clear(&self) -> impl Future<Output = CampusResult<()>> + Send;
}

/// JSON file at `<dir>/institution_admin_session.json`.
#[derive(Debug, Clone)]
pub struct FileDescriptorStore {
    path: PathBuf,
}

impl FileDescriptorStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{DESCRIPTOR_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_error(path: &Path, err: std::io::Error) -> CampusError {
    CampusError::Internal(format!("{}: {err}", path.display()))
}

impl DescriptorStore for FileDescriptorStore {
    async fn load(&self) -> CampusResult<Option<SessionDescriptor>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(descriptor) => Ok(Some(descriptor)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "discarding unreadable session descriptor"
                );
                Ok(None)
            }
        }
    }

    async fn save(&self, descriptor: &SessionDescriptor) -> CampusResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        let json = serde_json::to_vec_pretty(descriptor)
            .map_err(|e| CampusError::Internal(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| io_error(&self.path, e))
    }

    async fn clear(&self) -> CampusResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDescriptorStore {
    slot: Mutex<Option<SessionDescriptor>>,
}

impl MemoryDescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DescriptorStore for MemoryDescriptorStore {
    async fn load(&self) -> CampusResult<Option<SessionDescriptor>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, descriptor: &SessionDescriptor) -> CampusResult<()> {
        *self.slot.lock().await = Some(descriptor.clone());
        Ok(())
    }

    async fn clear(&self) -> CampusResult<()> {
        self.slot.lock().await.take();
        Ok(())
    }
}

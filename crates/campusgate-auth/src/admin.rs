//! Institution-admin credential verification.
//!
//! Institution admins sign in with a username and password stored next
//! to their institution, outside the identity provider. Two verifiers
//! share one contract: the remote procedure the hosted backend exposes,
//! and a direct Argon2id check against the credential collection.

use campusgate_core::models::admin_credential::InstitutionContext;
use campusgate_core::repository::{AdminCredentialRepository, InstitutionRepository};
use campusgate_core::store::RecordStore;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::AccessError;
use crate::password;
use crate::rpc::RpcChannel;

pub const VERIFY_ADMIN_LOGIN: &str = "verify_institution_admin_login";

pub trait AdminVerifier: Send + Sync {
    /// Institutions unlocked by these credentials; empty when the
    /// credentials are wrong.
    fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<Vec<InstitutionContext>, AccessError>> + Send;
}

/// Verifies through the `verify_institution_admin_login` procedure.
#[derive(Debug, Clone)]
pub struct RpcAdminVerifier<R> {
    rpc: R,
}

impl<R: RpcChannel> RpcAdminVerifier<R> {
    pub fn new(rpc: R) -> Self {
        Self { rpc }
    }
}

impl<R: RpcChannel> AdminVerifier for RpcAdminVerifier<R> {
    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Vec<InstitutionContext>, AccessError> {
        let payload = json!({ "username": username, "password": password });
        let value = match self.rpc.invoke(VERIFY_ADMIN_LOGIN, payload, None).await {
            Ok(value) => value,
            Err(e) if e.status == Some(401) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let rows = match value {
            Value::Null => Vec::new(),
            Value::Array(rows) => rows,
            single => vec![single],
        };
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    AccessError::transport(format!("malformed {VERIFY_ADMIN_LOGIN} row: {e}"))
                })
            })
            .collect()
    }
}

/// Verifies against Argon2id hashes in `institution_admin_credentials`.
#[derive(Debug, Clone)]
pub struct StoreAdminVerifier<S> {
    credentials: AdminCredentialRepository<S>,
    institutions: InstitutionRepository<S>,
    pepper: Option<String>,
}

impl<S: RecordStore + Clone> StoreAdminVerifier<S> {
    pub fn new(store: S, pepper: Option<String>) -> Self {
        Self {
            credentials: AdminCredentialRepository::new(store.clone()),
            institutions: InstitutionRepository::new(store),
            pepper,
        }
    }
}

impl<S: RecordStore + Clone> AdminVerifier for StoreAdminVerifier<S> {
    async fn verify(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Vec<InstitutionContext>, AccessError> {
        let mut contexts = Vec::new();
        for credential in self.credentials.active_by_username(username).await? {
            if !password::verify_password(
                password,
                &credential.password_hash,
                self.pepper.as_deref(),
            ) {
                continue;
            }
            match self.institutions.find(credential.institution_id).await? {
                Some(institution) => contexts.push(InstitutionContext {
                    institution_id: institution.id,
                    institution_name: institution.name,
                    is_active: institution.is_active,
                    contract_end_date: institution.contract_end_date,
                }),
                None => debug!(
                    institution_id = %credential.institution_id,
                    "admin credential points at a missing institution"
                ),
            }
        }
        Ok(contexts)
    }
}

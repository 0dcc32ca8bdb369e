//! Access decision engine.
//!
//! Decides whether an authenticated principal may use the system, and on
//! what basis. Contract windows are always evaluated live from the
//! institution's dates; the stored `is_active` flag is consulted
//! alongside, never instead. Any read failure denies.

use std::sync::Arc;

use campusgate_core::clock::Clock;
use campusgate_core::contract::{ContractStatus, ContractWindow};
use campusgate_core::error::CampusResult;
use campusgate_core::models::institution::Institution;
use campusgate_core::models::user::{Principal, Role};
use campusgate_core::repository::{
    InstitutionRepository, MembershipRepository, TeacherRepository,
};
use campusgate_core::store::RecordStore;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AccessConfig;
use crate::error::AccessError;
use crate::rpc::{RpcChannel, invoke_as};

pub const CHECK_INSTITUTION_ACCESS: &str = "check_institution_access";

/// Which rule admitted the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantBasis {
    Admin,
    GuidanceTeacher,
    TeacherMembership,
    InstitutionAccessCheck,
    IndividualUsers,
}

/// The institution a grant was issued through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantedInstitution {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub contract_end_date: Option<NaiveDate>,
    pub window: ContractWindow,
}

impl GrantedInstitution {
    fn new(institution: &Institution, window: ContractWindow) -> Self {
        Self {
            id: institution.id,
            name: institution.name.clone(),
            is_active: institution.is_active,
            contract_end_date: institution.contract_end_date,
            window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub basis: GrantBasis,
    pub institution: Option<GrantedInstitution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenyReason {
    InstitutionInactive,
    ContractExpired { days_ago: i64 },
    /// The decision could not be made; the principal is denied anyway.
    Unavailable { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn into_result(self) -> Result<Grant, AccessError> {
        match self {
            Decision::Allow(grant) => Ok(grant),
            Decision::Deny(DenyReason::InstitutionInactive) => {
                Err(AccessError::InstitutionInactive)
            }
            Decision::Deny(DenyReason::ContractExpired { days_ago }) => {
                Err(AccessError::ContractExpired { days_ago })
            }
            Decision::Deny(DenyReason::Unavailable { message }) => {
                Err(AccessError::transport(message))
            }
        }
    }
}

/// Tracks the most recent expiry among the institutions looked at, so a
/// denial can say how long ago the contract ran out.
#[derive(Debug, Default)]
struct Lapsed {
    days_ago: Option<i64>,
}

impl Lapsed {
    fn observe(&mut self, window: &ContractWindow) {
        if let Some(days) = window.expired_days_ago() {
            self.days_ago = Some(self.days_ago.map_or(days, |seen| seen.min(days)));
        }
    }
}

pub struct AccessDecisionEngine<S, R> {
    institutions: InstitutionRepository<S>,
    memberships: MembershipRepository<S>,
    teachers: TeacherRepository<S>,
    rpc: R,
    clock: Arc<dyn Clock>,
    config: AccessConfig,
}

impl<S: RecordStore + Clone, R: RpcChannel> AccessDecisionEngine<S, R> {
    pub fn new(store: S, rpc: R, clock: Arc<dyn Clock>, config: AccessConfig) -> Self {
        Self {
            institutions: InstitutionRepository::new(store.clone()),
            memberships: MembershipRepository::new(store.clone()),
            teachers: TeacherRepository::new(store),
            rpc,
            clock,
            config,
        }
    }

    /// Decide access for `principal`. `auth_token` is forwarded to the
    /// remote access check.
    pub async fn decide(&self, principal: &Principal, auth_token: Option<&str>) -> Decision {
        let decision = match self.evaluate(principal, auth_token).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(user_id = %principal.id, error = %e, "access evaluation failed, denying");
                Decision::Deny(DenyReason::Unavailable {
                    message: e.to_string(),
                })
            }
        };

        match &decision {
            Decision::Allow(grant) => info!(
                user_id = %principal.id,
                role = ?principal.role,
                basis = ?grant.basis,
                institution_id = ?grant.institution.as_ref().map(|i| i.id),
                "access granted"
            ),
            Decision::Deny(reason) => warn!(
                user_id = %principal.id,
                role = ?principal.role,
                reason = ?reason,
                "access denied"
            ),
        }
        decision
    }

    async fn evaluate(
        &self,
        principal: &Principal,
        auth_token: Option<&str>,
    ) -> CampusResult<Decision> {
        if principal.role == Role::Admin {
            return Ok(Decision::Allow(Grant {
                basis: GrantBasis::Admin,
                institution: None,
            }));
        }

        let today = self.clock.today();
        let mut lapsed = Lapsed::default();

        if principal.role == Role::Teacher {
            if let Some(grant) = self.guidance_grant(principal, today, &mut lapsed).await? {
                return Ok(Decision::Allow(grant));
            }
            if let Some(grant) = self.membership_grant(principal, today, &mut lapsed).await? {
                return Ok(Decision::Allow(grant));
            }
        }

        let mut unavailable = None;
        let payload = json!({ "user_id": principal.id });
        match invoke_as::<_, bool>(&self.rpc, CHECK_INSTITUTION_ACCESS, payload, auth_token).await {
            Ok(true) => {
                let institution = self.first_live_institution(principal, today).await?;
                return Ok(Decision::Allow(Grant {
                    basis: GrantBasis::InstitutionAccessCheck,
                    institution,
                }));
            }
            Ok(false) => debug!(user_id = %principal.id, "remote access check declined"),
            Err(e) => {
                warn!(user_id = %principal.id, error = %e, "remote access check failed");
                unavailable = Some(e.message);
            }
        }

        if let Some(grant) = self.individual_grant(principal, today, &mut lapsed).await? {
            return Ok(Decision::Allow(grant));
        }

        let reason = match (unavailable, lapsed.days_ago) {
            (Some(message), _) => DenyReason::Unavailable { message },
            (None, Some(days_ago)) => DenyReason::ContractExpired { days_ago },
            (None, None) => DenyReason::InstitutionInactive,
        };
        Ok(Decision::Deny(reason))
    }

    /// A guidance teacher is admitted through their guided institution
    /// alone, whatever their other memberships look like.
    async fn guidance_grant(
        &self,
        principal: &Principal,
        today: NaiveDate,
        lapsed: &mut Lapsed,
    ) -> CampusResult<Option<Grant>> {
        let Some(teacher) = self.teachers.get_by_user(principal.id).await? else {
            return Ok(None);
        };
        for institution in self.institutions.guided_by(teacher.id).await? {
            let window = institution.contract_window(today);
            match window.status {
                ContractStatus::Active => {
                    return Ok(Some(Grant {
                        basis: GrantBasis::GuidanceTeacher,
                        institution: Some(GrantedInstitution::new(&institution, window)),
                    }));
                }
                ContractStatus::Expired => lapsed.observe(&window),
                ContractStatus::NotYetStarted => debug!(
                    institution_id = %institution.id,
                    "guided institution contract has not started"
                ),
            }
        }
        Ok(None)
    }

    async fn membership_grant(
        &self,
        principal: &Principal,
        today: NaiveDate,
        lapsed: &mut Lapsed,
    ) -> CampusResult<Option<Grant>> {
        for membership in self.memberships.active_for_user(principal.id).await? {
            let Some(institution) = self.institutions.find(membership.institution_id).await?
            else {
                continue;
            };
            let window = institution.contract_window(today);
            lapsed.observe(&window);
            if institution.is_active && window.is_active() {
                return Ok(Some(Grant {
                    basis: GrantBasis::TeacherMembership,
                    institution: Some(GrantedInstitution::new(&institution, window)),
                }));
            }
        }
        Ok(None)
    }

    async fn individual_grant(
        &self,
        principal: &Principal,
        today: NaiveDate,
        lapsed: &mut Lapsed,
    ) -> CampusResult<Option<Grant>> {
        let Some(institution) = self
            .institutions
            .get_by_name(&self.config.individual_institution_name)
            .await?
        else {
            return Ok(None);
        };
        let member = self
            .memberships
            .active_for_user(principal.id)
            .await?
            .iter()
            .any(|m| m.institution_id == institution.id);
        if !member {
            return Ok(None);
        }

        let window = institution.contract_window(today);
        lapsed.observe(&window);
        if institution.is_active && window.is_active() {
            return Ok(Some(Grant {
                basis: GrantBasis::IndividualUsers,
                institution: Some(GrantedInstitution::new(&institution, window)),
            }));
        }
        Ok(None)
    }

    /// Context for a grant issued by the remote check, which does not
    /// say which institution it matched.
    async fn first_live_institution(
        &self,
        principal: &Principal,
        today: NaiveDate,
    ) -> CampusResult<Option<GrantedInstitution>> {
        for membership in self.memberships.active_for_user(principal.id).await? {
            if let Some(institution) = self.institutions.find(membership.institution_id).await? {
                let window = institution.contract_window(today);
                if institution.is_active && window.is_active() {
                    return Ok(Some(GrantedInstitution::new(&institution, window)));
                }
            }
        }
        Ok(None)
    }
}

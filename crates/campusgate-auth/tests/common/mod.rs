//! Shared fixtures: a seeded in-memory store, a scripted procedure
//! channel and a scripted identity provider.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use campusgate_auth::error::AccessError;
use campusgate_auth::identity::{AuthEvent, AuthEventKind, AuthSession, AuthUser, IdentityProvider};
use campusgate_auth::rpc::{RpcChannel, RpcError};
use campusgate_core::models::institution::{CreateInstitution, Institution};
use campusgate_core::models::membership::{CreateMembership, Membership, MembershipRole};
use campusgate_core::models::teacher::{CreateTeacher, Teacher};
use campusgate_core::models::user::{Principal, Role, UserProfile};
use campusgate_core::repository::{
    InstitutionRepository, MembershipRepository, ProfileRepository, TeacherRepository,
};
use campusgate_core::{Clock, Collection, FixedClock, Filter, MemoryRecordStore, RecordStore};
use chrono::NaiveDate;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use uuid::Uuid;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub const TODAY: &str = "2025-06-01";

pub fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::new(date(TODAY)))
}

pub fn clock_at(day: &str) -> Arc<dyn Clock> {
    Arc::new(FixedClock::new(date(day)))
}

// -----------------------------------------------------------------------
// Store seeding
// -----------------------------------------------------------------------

pub async fn institution(
    store: &MemoryRecordStore,
    name: &str,
    start: Option<&str>,
    end: Option<&str>,
    is_active: bool,
) -> Institution {
    InstitutionRepository::new(store.clone())
        .create(CreateInstitution {
            is_active,
            is_premium: is_active,
            contract_start_date: start.map(date),
            contract_end_date: end.map(date),
            ..CreateInstitution::named(name)
        })
        .await
        .unwrap()
}

pub async fn user(store: &MemoryRecordStore, role: Role, email: &str) -> Principal {
    let profile = ProfileRepository::new(store.clone())
        .create(UserProfile {
            id: Uuid::new_v4(),
            role,
            display_name: email.split('@').next().unwrap_or(email).into(),
            email: email.into(),
        })
        .await
        .unwrap();
    profile.into()
}

pub async fn profile_for(store: &MemoryRecordStore, id: Uuid, role: Role, email: &str) {
    ProfileRepository::new(store.clone())
        .create(UserProfile {
            id,
            role,
            display_name: email.into(),
            email: email.into(),
        })
        .await
        .unwrap();
}

pub async fn member(
    store: &MemoryRecordStore,
    user_id: Uuid,
    institution_id: Uuid,
    role: MembershipRole,
) -> Membership {
    MembershipRepository::new(store.clone())
        .create(CreateMembership {
            user_id,
            institution_id,
            role,
        })
        .await
        .unwrap()
}

pub async fn deactivate_membership(store: &MemoryRecordStore, membership_id: Uuid) {
    let mut patch = serde_json::Map::new();
    patch.insert("is_active".into(), Value::Bool(false));
    store
        .update(
            Collection::InstitutionMemberships,
            &Filter::by_id(membership_id),
            patch,
        )
        .await
        .unwrap();
}

pub async fn guidance_teacher(
    store: &MemoryRecordStore,
    principal: &Principal,
    institution_id: Uuid,
) -> Teacher {
    let teacher = TeacherRepository::new(store.clone())
        .create(CreateTeacher {
            user_id: principal.id,
            name: principal.display_name.clone(),
            email: Some(principal.email.clone()),
        })
        .await
        .unwrap();
    InstitutionRepository::new(store.clone())
        .assign_guidance_teacher(institution_id, teacher.id)
        .await
        .unwrap();
    teacher
}

pub async fn membership_flags(store: &MemoryRecordStore, institution_id: Uuid) -> Vec<bool> {
    MembershipRepository::new(store.clone())
        .for_institution(institution_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.is_active)
        .collect()
}

// -----------------------------------------------------------------------
// Procedure channel
// -----------------------------------------------------------------------

#[derive(Default)]
struct RpcScript {
    responses: HashMap<String, Result<Value, RpcError>>,
    calls: Vec<(String, Value)>,
}

/// Answers procedures from a script. Unscripted procedures answer
/// `false`.
#[derive(Clone, Default)]
pub struct FakeRpc {
    script: Arc<Mutex<RpcScript>>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, name: &str, result: Result<Value, RpcError>) {
        self.script
            .lock()
            .unwrap()
            .responses
            .insert(name.into(), result);
    }

    pub fn grant_access(&self, allowed: bool) {
        self.respond("check_institution_access", Ok(json!(allowed)));
    }

    pub fn fail(&self, name: &str, message: &str) {
        self.respond(name, Err(RpcError::new(message)));
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.script.lock().unwrap().calls.clone()
    }
}

impl RpcChannel for FakeRpc {
    async fn invoke(
        &self,
        name: &str,
        payload: Value,
        _auth_token: Option<&str>,
    ) -> Result<Value, RpcError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push((name.to_string(), payload));
        script
            .responses
            .get(name)
            .cloned()
            .unwrap_or(Ok(Value::Bool(false)))
    }
}

// -----------------------------------------------------------------------
// Identity provider
// -----------------------------------------------------------------------

pub struct FakeProvider {
    accounts: Mutex<HashMap<String, (String, AuthUser)>>,
    session: Mutex<Option<AuthSession>>,
    deleted: Mutex<HashSet<Uuid>>,
    sign_outs: AtomicUsize,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            deleted: Mutex::new(HashSet::new()),
            sign_outs: AtomicUsize::new(0),
            events,
        }
    }
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account for an existing user id.
    pub fn add_account(&self, id: Uuid, email: &str, password: &str) {
        let user = AuthUser {
            id,
            email: Some(email.into()),
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(email.into(), (password.into(), user));
    }

    /// Remove the user upstream; the local session lingers.
    pub fn delete_user(&self, id: Uuid) {
        self.deleted.lock().unwrap().insert(id);
    }

    pub fn emit(&self, kind: AuthEventKind) {
        let session = self.session.lock().unwrap().clone();
        let _ = self.events.send(AuthEvent { kind, session });
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().unwrap().is_some()
    }
}

impl IdentityProvider for FakeProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AccessError> {
        let user = match self.accounts.lock().unwrap().get(email) {
            Some((expected, user)) if expected == password => user.clone(),
            _ => return Err(AccessError::AuthenticationFailure),
        };
        let session = AuthSession {
            access_token: format!("token-{}", user.id),
            refresh_token: None,
            expires_in: Some(3600),
            user,
        };
        *self.session.lock().unwrap() = Some(session.clone());
        let _ = self.events.send(AuthEvent {
            kind: AuthEventKind::SignedIn,
            session: Some(session.clone()),
        });
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AccessError> {
        let id = Uuid::new_v4();
        self.add_account(id, email, password);
        Ok(AuthUser {
            id,
            email: Some(email.into()),
        })
    }

    async fn sign_out(&self) -> Result<(), AccessError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.session.lock().unwrap().take();
        let _ = self.events.send(AuthEvent {
            kind: AuthEventKind::SignedOut,
            session: None,
        });
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, AccessError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, AccessError> {
        let session = self.session.lock().unwrap().clone();
        let deleted = self.deleted.lock().unwrap();
        Ok(session
            .map(|s| s.user)
            .filter(|user| !deleted.contains(&user.id)))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

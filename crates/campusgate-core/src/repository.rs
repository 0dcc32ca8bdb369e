//! Typed repositories layered over a [`RecordStore`].
//!
//! Each repository owns one collection and speaks in domain models;
//! the store underneath only sees JSON rows and filters.

use chrono::NaiveDate;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::{CampusError, CampusResult};
use crate::models::admin_credential::InstitutionAdminCredential;
use crate::models::institution::{ContractEdit, CreateInstitution, Institution};
use crate::models::membership::{CreateMembership, Membership, MembershipRole};
use crate::models::teacher::{CreateTeacher, Teacher};
use crate::models::user::UserProfile;
use crate::store::{Collection, Filter, Record, RecordStore, from_record, to_record};

fn patch(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

fn date_value(date: Option<NaiveDate>) -> Value {
    date.map_or(Value::Null, |d| Value::String(d.to_string()))
}

/// Match a stored flag against the value the model decoded. A missing
/// flag decodes as `false`, so `false` is matched as "not `true`".
fn flag_guard(filter: Filter, field: &str, observed: bool) -> Filter {
    if observed {
        filter.eq(field, true)
    } else {
        filter.ne(field, true)
    }
}

async fn select_as<S, T>(store: &S, collection: Collection, filter: &Filter) -> CampusResult<Vec<T>>
where
    S: RecordStore,
    T: serde::de::DeserializeOwned,
{
    store
        .select(collection, filter)
        .await?
        .into_iter()
        .map(|row| from_record(collection, row))
        .collect()
}

async fn first_as<S, T>(
    store: &S,
    collection: Collection,
    filter: &Filter,
) -> CampusResult<Option<T>>
where
    S: RecordStore,
    T: serde::de::DeserializeOwned,
{
    Ok(select_as(store, collection, filter).await?.into_iter().next())
}

// ---------------------------------------------------------------------------
// Institutions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct InstitutionRepository<S> {
    store: S,
}

impl<S: RecordStore> InstitutionRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: CreateInstitution) -> CampusResult<Institution> {
        if input.name.trim().is_empty() {
            return Err(CampusError::validation("institution name is required"));
        }
        let mut row = to_record(&input)?;
        row.insert("guidance_teacher_id".into(), Value::Null);
        let stored = self.store.insert(Collection::Institutions, row).await?;
        from_record(Collection::Institutions, stored)
    }

    pub async fn find(&self, id: Uuid) -> CampusResult<Option<Institution>> {
        first_as(&self.store, Collection::Institutions, &Filter::by_id(id)).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> CampusResult<Institution> {
        self.find(id)
            .await?
            .ok_or_else(|| CampusError::not_found("institution", id))
    }

    pub async fn get_by_name(&self, name: &str) -> CampusResult<Option<Institution>> {
        first_as(
            &self.store,
            Collection::Institutions,
            &Filter::new().eq("name", name),
        )
        .await
    }

    pub async fn list(&self, filter: &Filter) -> CampusResult<Vec<Institution>> {
        select_as(&self.store, Collection::Institutions, filter).await
    }

    /// Active institutions naming `teacher_id` as their guidance teacher.
    pub async fn guided_by(&self, teacher_id: Uuid) -> CampusResult<Vec<Institution>> {
        self.list(
            &Filter::new()
                .eq("guidance_teacher_id", teacher_id.to_string())
                .eq("is_active", true),
        )
        .await
    }

    /// Institutions whose contract ended strictly before `today`.
    pub async fn expired_before(
        &self,
        today: NaiveDate,
        only_active: bool,
    ) -> CampusResult<Vec<Institution>> {
        let mut filter = Filter::new()
            .not_null("contract_end_date")
            .lt("contract_end_date", today.to_string());
        if only_active {
            filter = filter.eq("is_active", true);
        }
        self.list(&filter).await
    }

    /// Conditionally write both activation flags.
    ///
    /// The write only applies while the row still holds the `observed`
    /// flags, so a concurrent writer that got there first wins and this
    /// call reports `false`.
    pub async fn set_flags(
        &self,
        institution: &Institution,
        is_active: bool,
        is_premium: bool,
    ) -> CampusResult<bool> {
        let filter = flag_guard(
            flag_guard(Filter::by_id(institution.id), "is_active", institution.is_active),
            "is_premium",
            institution.is_premium,
        );
        let changed = self
            .store
            .update(
                Collection::Institutions,
                &filter,
                patch(json!({ "is_active": is_active, "is_premium": is_premium })),
            )
            .await?;
        Ok(changed > 0)
    }

    pub async fn update_contract(&self, id: Uuid, edit: ContractEdit) -> CampusResult<Institution> {
        let changed = self
            .store
            .update(
                Collection::Institutions,
                &Filter::by_id(id),
                patch(json!({
                    "contract_start_date": date_value(edit.contract_start_date),
                    "contract_end_date": date_value(edit.contract_end_date),
                })),
            )
            .await?;
        if changed == 0 {
            return Err(CampusError::not_found("institution", id));
        }
        self.get_by_id(id).await
    }

    /// Make `teacher_id` the guidance teacher of an institution. A
    /// teacher guides at most one institution.
    pub async fn assign_guidance_teacher(&self, id: Uuid, teacher_id: Uuid) -> CampusResult<()> {
        let elsewhere = self
            .store
            .count(
                Collection::Institutions,
                &Filter::new()
                    .eq("guidance_teacher_id", teacher_id.to_string())
                    .ne("id", id.to_string()),
            )
            .await?;
        if elsewhere > 0 {
            return Err(CampusError::AlreadyExists {
                entity: format!("guidance assignment for teacher {teacher_id}"),
            });
        }
        self.write_guidance_teacher(id, Value::String(teacher_id.to_string()))
            .await
    }

    pub async fn clear_guidance_teacher(&self, id: Uuid) -> CampusResult<()> {
        self.write_guidance_teacher(id, Value::Null).await
    }

    async fn write_guidance_teacher(&self, id: Uuid, value: Value) -> CampusResult<()> {
        let changed = self
            .store
            .update(
                Collection::Institutions,
                &Filter::by_id(id),
                patch(json!({ "guidance_teacher_id": value })),
            )
            .await?;
        if changed == 0 {
            return Err(CampusError::not_found("institution", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MembershipRepository<S> {
    store: S,
}

impl<S: RecordStore> MembershipRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: CreateMembership) -> CampusResult<Membership> {
        let mut row = to_record(&input)?;
        row.insert("is_active".into(), Value::Bool(true));
        let stored = self
            .store
            .insert(Collection::InstitutionMemberships, row)
            .await?;
        from_record(Collection::InstitutionMemberships, stored)
    }

    /// Add a member, refusing once the institution's limit for that role
    /// is reached.
    pub async fn add_within_capacity(
        &self,
        institution: &Institution,
        user_id: Uuid,
        role: MembershipRole,
    ) -> CampusResult<Membership> {
        let limit = match role {
            MembershipRole::Teacher => institution.max_teachers,
            MembershipRole::Student => institution.max_students,
        };
        if let Some(limit) = limit {
            let current = self.count_active(institution.id, role).await?;
            if current >= u64::from(limit) {
                return Err(CampusError::validation(format!(
                    "{} has reached its limit of {limit} {}s",
                    institution.name,
                    role.as_str()
                )));
            }
        }
        self.create(CreateMembership {
            user_id,
            institution_id: institution.id,
            role,
        })
        .await
    }

    pub async fn active_for_user(&self, user_id: Uuid) -> CampusResult<Vec<Membership>> {
        select_as(
            &self.store,
            Collection::InstitutionMemberships,
            &Filter::new()
                .eq("user_id", user_id.to_string())
                .eq("is_active", true),
        )
        .await
    }

    pub async fn for_institution(&self, institution_id: Uuid) -> CampusResult<Vec<Membership>> {
        select_as(
            &self.store,
            Collection::InstitutionMemberships,
            &Filter::new().eq("institution_id", institution_id.to_string()),
        )
        .await
    }

    pub async fn count_active(
        &self,
        institution_id: Uuid,
        role: MembershipRole,
    ) -> CampusResult<u64> {
        self.store
            .count(
                Collection::InstitutionMemberships,
                &Filter::new()
                    .eq("institution_id", institution_id.to_string())
                    .eq("role", role.as_str())
                    .eq("is_active", true),
            )
            .await
    }

    /// Flip every membership of an institution to `is_active`. Rows
    /// already in that state are not touched; returns how many changed.
    pub async fn set_active_for_institution(
        &self,
        institution_id: Uuid,
        is_active: bool,
    ) -> CampusResult<u64> {
        self.store
            .update(
                Collection::InstitutionMemberships,
                &Filter::new()
                    .eq("institution_id", institution_id.to_string())
                    .eq("is_active", !is_active),
                patch(json!({ "is_active": is_active })),
            )
            .await
    }

    /// Move a membership to another institution: the old row is deleted
    /// and a fresh active row is inserted.
    pub async fn transfer(
        &self,
        membership_id: Uuid,
        to_institution: Uuid,
    ) -> CampusResult<Membership> {
        let current: Membership = first_as(
            &self.store,
            Collection::InstitutionMemberships,
            &Filter::by_id(membership_id),
        )
        .await?
        .ok_or_else(|| CampusError::not_found("membership", membership_id))?;

        self.store
            .delete(
                Collection::InstitutionMemberships,
                &Filter::by_id(membership_id),
            )
            .await?;

        self.create(CreateMembership {
            user_id: current.user_id,
            institution_id: to_institution,
            role: current.role,
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Teachers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TeacherRepository<S> {
    store: S,
}

impl<S: RecordStore> TeacherRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: CreateTeacher) -> CampusResult<Teacher> {
        let stored = self
            .store
            .insert(Collection::Teachers, to_record(&input)?)
            .await?;
        from_record(Collection::Teachers, stored)
    }

    pub async fn get_by_user(&self, user_id: Uuid) -> CampusResult<Option<Teacher>> {
        first_as(
            &self.store,
            Collection::Teachers,
            &Filter::new().eq("user_id", user_id.to_string()),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// User profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProfileRepository<S> {
    store: S,
}

impl<S: RecordStore> ProfileRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn create(&self, profile: UserProfile) -> CampusResult<UserProfile> {
        let stored = self
            .store
            .insert(Collection::UserProfiles, to_record(&profile)?)
            .await?;
        from_record(Collection::UserProfiles, stored)
    }

    pub async fn get(&self, user_id: Uuid) -> CampusResult<Option<UserProfile>> {
        first_as(&self.store, Collection::UserProfiles, &Filter::by_id(user_id)).await
    }
}

// ---------------------------------------------------------------------------
// Institution admin credentials
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AdminCredentialRepository<S> {
    store: S,
}

impl<S: RecordStore> AdminCredentialRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Store a credential. `password_hash` must already be an Argon2id
    /// PHC string.
    pub async fn create(
        &self,
        institution_id: Uuid,
        username: &str,
        password_hash: &str,
    ) -> CampusResult<InstitutionAdminCredential> {
        let taken = self
            .store
            .count(
                Collection::InstitutionAdminCredentials,
                &Filter::new()
                    .eq("institution_id", institution_id.to_string())
                    .eq("username", username),
            )
            .await?;
        if taken > 0 {
            return Err(CampusError::AlreadyExists {
                entity: format!("institution admin {username}"),
            });
        }
        let stored = self
            .store
            .insert(
                Collection::InstitutionAdminCredentials,
                patch(json!({
                    "institution_id": institution_id.to_string(),
                    "username": username,
                    "password_hash": password_hash,
                    "is_active": true,
                })),
            )
            .await?;
        from_record(Collection::InstitutionAdminCredentials, stored)
    }

    /// Active credentials for a username. The same username may
    /// administer several institutions.
    pub async fn active_by_username(
        &self,
        username: &str,
    ) -> CampusResult<Vec<InstitutionAdminCredential>> {
        select_as(
            &self.store,
            Collection::InstitutionAdminCredentials,
            &Filter::new()
                .eq("username", username)
                .eq("is_active", true),
        )
        .await
    }
}

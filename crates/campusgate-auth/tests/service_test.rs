//! Integration tests for login orchestration and session projection.

mod common;

use std::sync::Arc;
use std::time::Duration;

use campusgate_auth::admin::{RpcAdminVerifier, StoreAdminVerifier};
use campusgate_auth::config::AccessConfig;
use campusgate_auth::decision::GrantBasis;
use campusgate_auth::error::AccessError;
use campusgate_auth::guidance::GuidanceClient;
use campusgate_auth::identity::AuthEventKind;
use campusgate_auth::password;
use campusgate_auth::projection::{
    DescriptorStore, FileDescriptorStore, MemoryDescriptorStore, SessionRole,
};
use campusgate_auth::rpc::RpcError;
use campusgate_auth::service::AccessService;
use campusgate_core::models::membership::MembershipRole;
use campusgate_core::models::user::Role;
use campusgate_core::repository::AdminCredentialRepository;
use campusgate_core::{Clock, Collection, Filter, MemoryRecordStore, RecordStore};
use serde_json::json;
use uuid::Uuid;

use common::*;

type Service<D> = AccessService<
    MemoryRecordStore,
    FakeRpc,
    Arc<FakeProvider>,
    StoreAdminVerifier<MemoryRecordStore>,
    D,
>;

fn service<D: DescriptorStore>(
    store: &MemoryRecordStore,
    rpc: &FakeRpc,
    provider: &Arc<FakeProvider>,
    descriptors: D,
    clock: Arc<dyn Clock>,
) -> Service<D> {
    AccessService::new(
        store.clone(),
        rpc.clone(),
        provider.clone(),
        StoreAdminVerifier::new(store.clone(), None),
        descriptors,
        clock,
        AccessConfig::default(),
    )
}

async fn admin_credential(
    store: &MemoryRecordStore,
    institution_id: Uuid,
    username: &str,
    pw: &str,
) {
    let hash = password::hash_password(pw, None).unwrap();
    AdminCredentialRepository::new(store.clone())
        .create(institution_id, username, &hash)
        .await
        .unwrap();
}

// -----------------------------------------------------------------------
// Identity-provider login
// -----------------------------------------------------------------------

#[tokio::test]
async fn teacher_login_projects_descriptor() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, Some("2025-06-21"), true).await;
    let teacher = user(&store, Role::Teacher, "t@example.edu").await;
    member(&store, teacher.id, school.id, MembershipRole::Teacher).await;
    provider.add_account(teacher.id, "t@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let (descriptor, grant) = svc.login("t@example.edu", "secret").await.unwrap();

    assert_eq!(grant.basis, GrantBasis::TeacherMembership);
    assert_eq!(descriptor.role, SessionRole::Teacher);
    assert_eq!(descriptor.institution_id, Some(school.id));
    assert_eq!(descriptor.institution_name.as_deref(), Some("North High"));
    assert_eq!(descriptor.expiry_warning_days, Some(20));
    assert!(provider.has_session());
}

#[tokio::test]
async fn wrong_password_is_an_authentication_failure() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let teacher = user(&store, Role::Teacher, "t@example.edu").await;
    provider.add_account(teacher.id, "t@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let err = svc.login("t@example.edu", "nope").await.unwrap_err();

    assert!(matches!(err, AccessError::AuthenticationFailure));
    assert!(!provider.has_session());
}

#[tokio::test]
async fn missing_profile_ends_the_provider_session() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let orphan = Uuid::new_v4();
    provider.add_account(orphan, "ghost@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let err = svc.login("ghost@example.edu", "secret").await.unwrap_err();

    assert!(matches!(err, AccessError::ProfileMissing { user_id } if user_id == orphan));
    assert!(!provider.has_session());
    assert_eq!(provider.sign_out_count(), 1);
}

#[tokio::test]
async fn denied_login_ends_the_provider_session() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, Some("2025-05-22"), true).await;
    let teacher = user(&store, Role::Teacher, "t@example.edu").await;
    member(&store, teacher.id, school.id, MembershipRole::Teacher).await;
    provider.add_account(teacher.id, "t@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let err = svc.login("t@example.edu", "secret").await.unwrap_err();

    assert!(matches!(err, AccessError::ContractExpired { days_ago: 10 }));
    assert!(err.user_message().contains("administrator"));
    assert!(!provider.has_session());
}

#[tokio::test]
async fn student_without_institution_access_is_denied_and_signed_out() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    rpc.grant_access(false);
    let provider = Arc::new(FakeProvider::new());
    institution(&store, "Individual Users", None, None, true).await;
    let student = user(&store, Role::Student, "s@example.edu").await;
    provider.add_account(student.id, "s@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let err = svc.login("s@example.edu", "secret").await.unwrap_err();

    assert!(matches!(err, AccessError::InstitutionInactive));
    assert!(err.is_inactive());
    assert!(!provider.has_session());
    assert_eq!(provider.sign_out_count(), 1);
}

#[tokio::test]
async fn guidance_teacher_login_and_student_listing() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, Some("2025-12-31"), true).await;
    let teacher = user(&store, Role::Teacher, "gt@example.edu").await;
    guidance_teacher(&store, &teacher, school.id).await;
    provider.add_account(teacher.id, "gt@example.edu", "secret");
    rpc.respond(
        "get_guidance_teacher_students",
        Ok(json!([{ "id": Uuid::new_v4(), "name": "Sam" }])),
    );

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let (descriptor, grant) = svc.login("gt@example.edu", "secret").await.unwrap();
    assert_eq!(descriptor.role, SessionRole::GuidanceTeacher);

    let guidance = GuidanceClient::new(rpc.clone());
    let students = guidance.students(&teacher, &grant, None).await.unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].name, "Sam");
}

#[tokio::test]
async fn guidance_listing_requires_guidance_grant() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, Some("2025-12-31"), true).await;
    let teacher = user(&store, Role::Teacher, "t@example.edu").await;
    member(&store, teacher.id, school.id, MembershipRole::Teacher).await;
    provider.add_account(teacher.id, "t@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    let (_, grant) = svc.login("t@example.edu", "secret").await.unwrap();

    let err = GuidanceClient::new(rpc.clone())
        .students(&teacher, &grant, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::NotPermitted));
    assert!(rpc.calls().iter().all(|(name, _)| name != "get_guidance_teacher_students"));
}

// -----------------------------------------------------------------------
// Institution-admin login
// -----------------------------------------------------------------------

#[tokio::test]
async fn institution_admin_session_is_persisted_and_restored() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, Some("2025-12-31"), true).await;
    admin_credential(&store, school.id, "principal", "hunter2").await;
    let dir = tempfile::tempdir().unwrap();
    let files = FileDescriptorStore::new(dir.path());

    let svc = service(&store, &rpc, &provider, files.clone(), clock());
    let descriptor = svc
        .institution_admin_login("principal", "hunter2")
        .await
        .unwrap();
    assert_eq!(descriptor.role, SessionRole::InstitutionAdmin);
    assert_eq!(descriptor.institution_id, Some(school.id));
    assert!(files.path().exists());

    // A later start on another day restores after re-validating.
    let later = service(&store, &rpc, &provider, files.clone(), clock_at("2025-06-15"));
    let restored = later.restore_institution_admin().await.unwrap().unwrap();
    assert_eq!(restored.institution_id, Some(school.id));
    assert_eq!(restored.login_time, descriptor.login_time);
}

#[tokio::test]
async fn institution_admin_wrong_password() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, None, true).await;
    admin_credential(&store, school.id, "principal", "hunter2").await;
    let descriptors = MemoryDescriptorStore::new();

    let svc = service(&store, &rpc, &provider, descriptors, clock());
    let err = svc
        .institution_admin_login("principal", "hunter3")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::AuthenticationFailure));
}

#[tokio::test]
async fn institution_admin_of_expired_institution_is_refused() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    // Flag still says active; the dates say otherwise.
    let school = institution(&store, "North High", None, Some("2025-05-31"), true).await;
    admin_credential(&store, school.id, "principal", "hunter2").await;
    let dir = tempfile::tempdir().unwrap();
    let files = FileDescriptorStore::new(dir.path());

    let svc = service(&store, &rpc, &provider, files.clone(), clock());
    let err = svc
        .institution_admin_login("principal", "hunter2")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::ContractExpired { days_ago: 1 }));
    assert!(!files.path().exists());
}

#[tokio::test]
async fn restore_discards_descriptor_once_contract_lapses() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, Some("2025-06-30"), true).await;
    admin_credential(&store, school.id, "principal", "hunter2").await;
    let dir = tempfile::tempdir().unwrap();
    let files = FileDescriptorStore::new(dir.path());

    service(&store, &rpc, &provider, files.clone(), clock())
        .institution_admin_login("principal", "hunter2")
        .await
        .unwrap();

    let later = service(&store, &rpc, &provider, files.clone(), clock_at("2025-07-05"));
    let err = later.restore_institution_admin().await.unwrap_err();
    assert!(matches!(err, AccessError::ContractExpired { days_ago: 5 }));
    assert!(files.load().await.unwrap().is_none());
}

#[tokio::test]
async fn rpc_admin_verifier_maps_rejection_and_rows() {
    let store = MemoryRecordStore::new();
    let school = institution(&store, "North High", None, None, true).await;
    let rpc = FakeRpc::new();
    let verifier = RpcAdminVerifier::new(rpc.clone());
    let provider = Arc::new(FakeProvider::new());
    let svc = AccessService::new(
        store.clone(),
        rpc.clone(),
        provider,
        verifier,
        MemoryDescriptorStore::new(),
        clock(),
        AccessConfig::default(),
    );

    rpc.respond(
        "verify_institution_admin_login",
        Err(RpcError {
            message: "Invalid credentials".into(),
            code: None,
            status: Some(401),
        }),
    );
    let err = svc.institution_admin_login("p", "x").await.unwrap_err();
    assert!(matches!(err, AccessError::AuthenticationFailure));

    rpc.respond(
        "verify_institution_admin_login",
        Ok(json!([{
            "institution_id": school.id,
            "institution_name": "North High",
            "is_active": true,
            "contract_end_date": null,
        }])),
    );
    let descriptor = svc.institution_admin_login("p", "x").await.unwrap();
    assert_eq!(descriptor.institution_id, Some(school.id));
}

// -----------------------------------------------------------------------
// Session lifecycle
// -----------------------------------------------------------------------

#[tokio::test]
async fn sign_out_clears_persisted_descriptor() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    let provider = Arc::new(FakeProvider::new());
    let school = institution(&store, "North High", None, None, true).await;
    admin_credential(&store, school.id, "principal", "hunter2").await;
    let descriptors = MemoryDescriptorStore::new();

    let svc = service(&store, &rpc, &provider, descriptors, clock());
    svc.institution_admin_login("principal", "hunter2")
        .await
        .unwrap();
    svc.sign_out().await.unwrap();
    assert!(svc.restore_institution_admin().await.unwrap().is_none());
}

async fn remove_profile(store: &MemoryRecordStore, id: Uuid) {
    store
        .delete(Collection::UserProfiles, &Filter::by_id(id))
        .await
        .unwrap();
}

#[tokio::test]
async fn revalidation_signs_out_user_without_profile() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    rpc.grant_access(true);
    let provider = Arc::new(FakeProvider::new());
    let student = user(&store, Role::Student, "s@example.edu").await;
    provider.add_account(student.id, "s@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    svc.login("s@example.edu", "secret").await.unwrap();
    assert!(svc.revalidate_session().await.unwrap());

    remove_profile(&store, student.id).await;
    assert!(!svc.revalidate_session().await.unwrap());
    assert!(!provider.has_session());
}

#[tokio::test]
async fn revalidation_signs_out_user_deleted_upstream() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    rpc.grant_access(true);
    let provider = Arc::new(FakeProvider::new());
    let student = user(&store, Role::Student, "s@example.edu").await;
    provider.add_account(student.id, "s@example.edu", "secret");

    let svc = service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock());
    svc.login("s@example.edu", "secret").await.unwrap();
    provider.delete_user(student.id);

    assert!(!svc.revalidate_session().await.unwrap());
    assert!(!provider.has_session());
}

#[tokio::test]
async fn auth_watch_revalidates_on_token_refresh() {
    let store = MemoryRecordStore::new();
    let rpc = FakeRpc::new();
    rpc.grant_access(true);
    let provider = Arc::new(FakeProvider::new());
    let student = user(&store, Role::Student, "s@example.edu").await;
    provider.add_account(student.id, "s@example.edu", "secret");

    let svc = Arc::new(service(&store, &rpc, &provider, MemoryDescriptorStore::new(), clock()));
    svc.login("s@example.edu", "secret").await.unwrap();
    let watch = svc.clone().spawn_auth_watch();

    remove_profile(&store, student.id).await;
    provider.emit(AuthEventKind::TokenRefreshed);

    let mut signed_out = false;
    for _ in 0..100 {
        if !provider.has_session() {
            signed_out = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(signed_out, "watch did not sign the orphaned user out");
    watch.abort();
}

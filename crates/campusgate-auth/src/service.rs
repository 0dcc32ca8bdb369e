//! Login orchestration.
//!
//! Ties the identity provider, the decision engine and session
//! projection together. A provider session only survives a login if the
//! decision engine admits the user; otherwise it is torn down before the
//! error is returned.

use std::sync::Arc;

use campusgate_core::clock::Clock;
use campusgate_core::models::user::Principal;
use campusgate_core::repository::{InstitutionRepository, ProfileRepository};
use campusgate_core::store::RecordStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admin::AdminVerifier;
use crate::config::AccessConfig;
use crate::decision::{AccessDecisionEngine, Grant};
use crate::error::AccessError;
use crate::identity::{AuthEventKind, AuthSession, IdentityProvider};
use crate::projection::{self, DescriptorStore, SessionDescriptor, SessionRole};
use crate::rpc::RpcChannel;

pub struct AccessService<S, R, P, A, D> {
    engine: AccessDecisionEngine<S, R>,
    profiles: ProfileRepository<S>,
    institutions: InstitutionRepository<S>,
    provider: P,
    admin_verifier: A,
    descriptors: D,
    clock: Arc<dyn Clock>,
    config: AccessConfig,
}

impl<S, R, P, A, D> AccessService<S, R, P, A, D>
where
    S: RecordStore + Clone,
    R: RpcChannel,
    P: IdentityProvider,
    A: AdminVerifier,
    D: DescriptorStore,
{
    pub fn new(
        store: S,
        rpc: R,
        provider: P,
        admin_verifier: A,
        descriptors: D,
        clock: Arc<dyn Clock>,
        config: AccessConfig,
    ) -> Self {
        Self {
            engine: AccessDecisionEngine::new(store.clone(), rpc, clock.clone(), config.clone()),
            profiles: ProfileRepository::new(store.clone()),
            institutions: InstitutionRepository::new(store),
            provider,
            admin_verifier,
            descriptors,
            clock,
            config,
        }
    }

    pub fn engine(&self) -> &AccessDecisionEngine<S, R> {
        &self.engine
    }

    /// Sign a user in through the identity provider and decide access.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(SessionDescriptor, Grant), AccessError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        match self.authorize(&session).await {
            Ok(admitted) => {
                info!(user_id = %session.user.id, role = ?admitted.0.role, "user logged in");
                Ok(admitted)
            }
            Err(e) => {
                self.end_provider_session().await;
                Err(e)
            }
        }
    }

    async fn authorize(
        &self,
        session: &AuthSession,
    ) -> Result<(SessionDescriptor, Grant), AccessError> {
        let principal = self.principal(session.user.id).await?;
        let grant = self
            .engine
            .decide(&principal, Some(&session.access_token))
            .await
            .into_result()?;
        let descriptor = projection::project(&principal, &grant, self.clock.now(), &self.config);
        Ok((descriptor, grant))
    }

    async fn principal(&self, user_id: Uuid) -> Result<Principal, AccessError> {
        match self.profiles.get(user_id).await? {
            Some(profile) => Ok(profile.into()),
            None => Err(AccessError::ProfileMissing { user_id }),
        }
    }

    async fn end_provider_session(&self) {
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "failed to end provider session");
        }
    }

    /// Sign an institution admin in with institution-scoped credentials.
    ///
    /// The verifier's view of the institution is not trusted; the
    /// institution is re-read and its window evaluated before the
    /// descriptor is issued and persisted.
    pub async fn institution_admin_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<SessionDescriptor, AccessError> {
        let contexts = self.admin_verifier.verify(username, password).await?;
        if contexts.is_empty() {
            debug!(username, "institution admin credentials rejected");
            return Err(AccessError::AuthenticationFailure);
        }

        let mut refusal = None;
        for context in contexts {
            match self
                .institution_admin_descriptor(context.institution_id)
                .await
            {
                Ok(descriptor) => {
                    self.descriptors.save(&descriptor).await?;
                    info!(
                        institution_id = %context.institution_id,
                        username,
                        "institution admin logged in"
                    );
                    return Ok(descriptor);
                }
                Err(e) if e.is_inactive() => {
                    refusal.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(refusal.unwrap_or(AccessError::InstitutionInactive))
    }

    async fn institution_admin_descriptor(
        &self,
        institution_id: Uuid,
    ) -> Result<SessionDescriptor, AccessError> {
        let Some(institution) = self.institutions.find(institution_id).await? else {
            return Err(AccessError::InstitutionInactive);
        };
        let window = institution.contract_window(self.clock.today());
        if let Some(days_ago) = window.expired_days_ago() {
            return Err(AccessError::ContractExpired { days_ago });
        }
        if !institution.is_active || !window.is_active() {
            return Err(AccessError::InstitutionInactive);
        }
        Ok(projection::project_institution_admin(
            &institution,
            &window,
            self.clock.now(),
            &self.config,
        ))
    }

    /// Restore a persisted institution-admin session after checking the
    /// institution again. A descriptor that no longer validates is
    /// discarded.
    pub async fn restore_institution_admin(
        &self,
    ) -> Result<Option<SessionDescriptor>, AccessError> {
        let Some(stored) = self.descriptors.load().await? else {
            return Ok(None);
        };
        let institution_id = match (stored.role, stored.institution_id) {
            (SessionRole::InstitutionAdmin, Some(id)) => id,
            _ => {
                self.descriptors.clear().await?;
                return Ok(None);
            }
        };

        match self.institution_admin_descriptor(institution_id).await {
            Ok(mut fresh) => {
                fresh.login_time = stored.login_time;
                self.descriptors.save(&fresh).await?;
                Ok(Some(fresh))
            }
            Err(e) if e.is_inactive() => {
                warn!(%institution_id, error = %e, "discarding institution admin session");
                self.descriptors.clear().await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sign_out(&self) -> Result<(), AccessError> {
        self.descriptors.clear().await?;
        self.provider.sign_out().await
    }

    /// Check that the signed-in user still has a profile. A session
    /// whose user lost their profile is signed out. Returns whether a
    /// valid session remains.
    pub async fn revalidate_session(&self) -> Result<bool, AccessError> {
        if self.provider.current_session().await?.is_none() {
            return Ok(false);
        }
        let profile = match self.provider.current_user().await? {
            Some(user) => self.profiles.get(user.id).await?,
            None => None,
        };
        if profile.is_none() {
            warn!("signed-in user has no profile, signing out");
            self.end_provider_session().await;
            return Ok(false);
        }
        Ok(true)
    }
}

impl<S, R, P, A, D> AccessService<S, R, P, A, D>
where
    S: RecordStore + Clone + 'static,
    R: RpcChannel + 'static,
    P: IdentityProvider + 'static,
    A: AdminVerifier + 'static,
    D: DescriptorStore + 'static,
{
    /// Revalidate the session whenever the provider reports a sign-in,
    /// token refresh or user update. Ends when the provider's event
    /// channel closes.
    pub fn spawn_auth_watch(self: Arc<Self>) -> JoinHandle<()> {
        let mut events = self.provider.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.kind == AuthEventKind::SignedOut => {}
                    Ok(event) => {
                        debug!(kind = ?event.kind, "auth state changed");
                        if let Err(e) = self.revalidate_session().await {
                            warn!(error = %e, "session revalidation failed");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "auth events lagged, revalidating");
                        if let Err(e) = self.revalidate_session().await {
                            warn!(error = %e, "session revalidation failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

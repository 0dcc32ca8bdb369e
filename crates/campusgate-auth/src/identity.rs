//! Identity provider surface.
//!
//! The hosted provider owns credentials and session tokens. The access
//! layer only needs to sign users in and out, ask who is signed in, and
//! hear about session changes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::AccessError;
use crate::rpc::{RpcError, normalize_response, transport_error};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<AuthSession>,
}

pub trait IdentityProvider: Send + Sync {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, AccessError>> + Send;

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AccessError>> + Send;

    /// End the current session. Succeeds when there is none.
    fn sign_out(&self) -> impl Future<Output = Result<(), AccessError>> + Send;

    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthSession>, AccessError>> + Send;

    /// The user behind the current session, as the provider sees it
    /// now. `None` when signed out or when the user no longer exists.
    fn current_user(&self) -> impl Future<Output = Result<Option<AuthUser>, AccessError>> + Send;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

impl<T: IdentityProvider> IdentityProvider for Arc<T> {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, AccessError>> + Send {
        (**self).sign_in_with_password(email, password)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AccessError>> + Send {
        (**self).sign_up(email, password)
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), AccessError>> + Send {
        (**self).sign_out()
    }

    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthSession>, AccessError>> + Send {
        (**self).current_session()
    }

    fn current_user(&self) -> impl Future<Output = Result<Option<AuthUser>, AccessError>> + Send {
        (**self).current_user()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        (**self).subscribe()
    }
}

/// GoTrue-style REST identity provider.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    config: BackendConfig,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpIdentityProvider {
    pub fn new(config: BackendConfig) -> Result<Self, AccessError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AccessError::transport(format!("http client: {e}")))?;
        let (events, _) = broadcast::channel(16);
        Ok(Self {
            client,
            config,
            session: RwLock::new(None),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.base_url)
    }

    fn publish(&self, kind: AuthEventKind, session: Option<AuthSession>) {
        // No subscribers is fine.
        let _ = self.events.send(AuthEvent { kind, session });
    }

    async fn post(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<(u16, String), RpcError> {
        let mut request = self
            .client
            .post(self.url(path))
            .header("apikey", &self.config.anon_key)
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| transport_error(&e))?;
        Ok((status, text))
    }
}

impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AccessError> {
        let (status, body) = self
            .post(
                "token?grant_type=password",
                None,
                &json!({ "email": email, "password": password }),
            )
            .await?;
        if matches!(status, 400 | 401) {
            debug!(status, "provider rejected credentials");
            return Err(AccessError::AuthenticationFailure);
        }
        let payload = normalize_response(status, &body)?;
        let session: AuthSession = serde_json::from_value(payload)
            .map_err(|e| AccessError::transport(format!("malformed session: {e}")))?;

        *self.session.write().await = Some(session.clone());
        self.publish(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AccessError> {
        let (status, body) = self
            .post(
                "signup",
                None,
                &json!({ "email": email, "password": password }),
            )
            .await?;
        let payload = normalize_response(status, &body)?;
        // Some deployments answer with a session, others with the user.
        let user = match payload {
            Value::Object(mut map) if map.contains_key("user") => {
                map.remove("user").unwrap_or(Value::Null)
            }
            other => other,
        };
        serde_json::from_value(user)
            .map_err(|e| AccessError::transport(format!("malformed user: {e}")))
    }

    async fn sign_out(&self) -> Result<(), AccessError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        // The local session is gone regardless of what the server says.
        match self
            .post("logout", Some(&session.access_token), &json!({}))
            .await
        {
            Ok((status, _)) if (200..300).contains(&status) => {}
            Ok((status, _)) => warn!(status, "provider sign-out was not acknowledged"),
            Err(e) => warn!(error = %e.message, "provider sign-out failed"),
        }
        self.publish(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<AuthSession>, AccessError> {
        Ok(self.session.read().await.clone())
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, AccessError> {
        let Some(session) = self.current_session().await? else {
            return Ok(None);
        };
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| AccessError::from(transport_error(&e)))?;
        let status = response.status().as_u16();
        if matches!(status, 401 | 403 | 404) {
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|e| AccessError::from(transport_error(&e)))?;
        let payload = normalize_response(status, &body)?;
        serde_json::from_value(payload)
            .map(Some)
            .map_err(|e| AccessError::transport(format!("malformed user: {e}")))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signed_out_provider_has_no_session_or_user() {
        let provider =
            HttpIdentityProvider::new(BackendConfig::new("http://127.0.0.1:9", "anon")).unwrap();
        let mut events = provider.subscribe();

        assert!(provider.current_session().await.unwrap().is_none());
        assert!(provider.current_user().await.unwrap().is_none());
        provider.sign_out().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn session_decodes_provider_payload() {
        let session: AuthSession = serde_json::from_value(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r",
            "user": {
                "id": "2f0c3c3e-8a43-4a57-9a57-0a5f3e1d9c11",
                "email": "a@b.c",
                "role": "authenticated"
            }
        }))
        .unwrap();
        assert_eq!(session.expires_in, Some(3600));
        assert_eq!(session.user.email.as_deref(), Some("a@b.c"));
    }
}

//! Remote procedure channel.
//!
//! Procedures answer with JSON that may be wrapped in one or more
//! `{data, error}` envelopes. Responses are unwrapped here, once, so
//! callers only ever see the innermost payload or a normalized
//! [`RpcError`].

use std::sync::Arc;

use campusgate_core::store::validate_field;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::BackendConfig;

/// Nesting limit when peeling envelopes.
pub const MAX_ENVELOPE_DEPTH: usize = 8;

/// Normalized procedure or transport error. Only string fields of the
/// provider error object survive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RpcError {
    pub message: String,
    pub code: Option<String>,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl RpcError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
        }
    }
}

pub trait RpcChannel: Send + Sync {
    /// Invoke procedure `name` with a JSON payload, optionally on behalf
    /// of a signed-in user.
    fn invoke(
        &self,
        name: &str,
        payload: Value,
        auth_token: Option<&str>,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

impl<T: RpcChannel> RpcChannel for Arc<T> {
    fn invoke(
        &self,
        name: &str,
        payload: Value,
        auth_token: Option<&str>,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send {
        (**self).invoke(name, payload, auth_token)
    }
}

/// Invoke and decode the payload.
pub async fn invoke_as<R, T>(
    channel: &R,
    name: &str,
    payload: Value,
    auth_token: Option<&str>,
) -> Result<T, RpcError>
where
    R: RpcChannel,
    T: DeserializeOwned,
{
    let value = channel.invoke(name, payload, auth_token).await?;
    serde_json::from_value(value)
        .map_err(|e| RpcError::new(format!("malformed {name} response: {e}")))
}

fn is_envelope(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.is_empty() && map.keys().all(|k| k == "data" || k == "error")
        }
        _ => false,
    }
}

/// Peel nested `{data, error}` envelopes down to the payload.
pub fn unwrap_envelope(mut value: Value) -> Result<Value, RpcError> {
    for _ in 0..MAX_ENVELOPE_DEPTH {
        if !is_envelope(&value) {
            break;
        }
        let Value::Object(mut map) = value else {
            break;
        };
        let error = map.remove("error").unwrap_or(Value::Null);
        if !error.is_null() {
            return Err(normalize_error(&error));
        }
        value = map.remove("data").unwrap_or(Value::Null);
    }
    Ok(value)
}

/// Extract `{message, code}` from whatever error shape the backend sent.
pub fn normalize_error(error: &Value) -> RpcError {
    extract_error(error, 0).unwrap_or_else(|| RpcError::new("unknown error"))
}

fn extract_error(error: &Value, depth: usize) -> Option<RpcError> {
    if depth > MAX_ENVELOPE_DEPTH {
        return None;
    }
    match error {
        Value::String(s) if !s.is_empty() => Some(RpcError::new(s.clone())),
        Value::Object(map) => {
            let code = map.get("code").and_then(|c| match c {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            let direct = ["message", "error_description", "msg", "details", "hint"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let message = direct.or_else(|| {
                map.get("error")
                    .and_then(|inner| extract_error(inner, depth + 1))
                    .map(|inner| inner.message)
            })?;
            Some(RpcError {
                message,
                code,
                status: None,
            })
        }
        _ => None,
    }
}

/// Generic message for a failed response that carried no body.
pub fn status_message(status: u16) -> &'static str {
    match status {
        401 => "Invalid credentials. Please check your username and password.",
        403 => "Access forbidden.",
        404 => "The requested resource was not found.",
        500 => "Server error. Please try again later.",
        400..=499 => "The request was rejected.",
        501..=599 => "The server is unavailable. Please try again later.",
        _ => "Unexpected response from the server.",
    }
}

/// Turn a raw HTTP status and body into a payload or an error.
pub fn normalize_response(status: u16, body: &str) -> Result<Value, RpcError> {
    let body = body.trim();
    let parsed = if body.is_empty() {
        None
    } else {
        serde_json::from_str::<Value>(body).ok()
    };

    if (200..300).contains(&status) {
        return match (body.is_empty(), parsed) {
            (true, _) => Ok(Value::Null),
            (false, Some(value)) => unwrap_envelope(value),
            (false, None) => Err(RpcError {
                message: "malformed response body".into(),
                code: None,
                status: Some(status),
            }),
        };
    }

    let mut error = match parsed {
        Some(value) => match unwrap_envelope(value) {
            Err(inner) => inner,
            Ok(payload) => extract_error(&payload, 0)
                .unwrap_or_else(|| RpcError::new(status_message(status))),
        },
        None => RpcError::new(status_message(status)),
    };
    error.status = Some(status);
    Err(error)
}

/// Remote procedures over the hosted backend's REST endpoint.
#[derive(Debug, Clone)]
pub struct HttpRpcChannel {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpRpcChannel {
    pub fn new(config: BackendConfig) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::new(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }
}

pub(crate) fn transport_error(err: &reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::new("request timed out")
    } else if err.is_connect() {
        RpcError::new("could not connect to the server")
    } else {
        RpcError::new("network error")
    }
}

impl RpcChannel for HttpRpcChannel {
    async fn invoke(
        &self,
        name: &str,
        payload: Value,
        auth_token: Option<&str>,
    ) -> Result<Value, RpcError> {
        validate_field(name).map_err(|e| RpcError::new(e.to_string()))?;
        let url = format!("{}/rest/v1/rpc/{name}", self.config.base_url);
        let bearer = auth_token.unwrap_or(&self.config.anon_key);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .json(&payload)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&e))?;
        debug!(procedure = name, status, "rpc response");
        normalize_response(status, &body)
    }
}

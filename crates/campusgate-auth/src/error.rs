//! Access error taxonomy.

use campusgate_core::error::CampusError;
use thiserror::Error;
use uuid::Uuid;

use crate::rpc::RpcError;

#[derive(Debug, Error)]
pub enum AccessError {
    /// Bad credentials. Retryable; no session was created.
    #[error("invalid credentials")]
    AuthenticationFailure,

    /// Signed in, but no role/profile row exists for the user.
    #[error("no profile for user {user_id}")]
    ProfileMissing { user_id: Uuid },

    #[error("institution is inactive")]
    InstitutionInactive,

    /// Inactive because the contract lapsed `days_ago` days ago.
    #[error("institution contract expired {days_ago} days ago")]
    ContractExpired { days_ago: i64 },

    /// The session's grant does not cover the requested operation.
    #[error("operation not permitted for this session")]
    NotPermitted,

    /// Store or remote procedure unreachable, or a malformed response.
    #[error("transport failure: {message}")]
    Transport {
        message: String,
        code: Option<String>,
    },
}

impl AccessError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code: None,
        }
    }

    /// Text shown to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AccessError::AuthenticationFailure => {
                "Incorrect username or password. Please try again.".into()
            }
            AccessError::ProfileMissing { .. } => {
                "Your account could not be loaded. Please contact support.".into()
            }
            AccessError::InstitutionInactive => {
                "Your institution's access is inactive. Please contact your system administrator."
                    .into()
            }
            AccessError::ContractExpired { days_ago } => format!(
                "Your institution's contract expired {days_ago} day(s) ago. \
                 Please contact your system administrator."
            ),
            AccessError::NotPermitted => "You do not have access to this information.".into(),
            AccessError::Transport { .. } => {
                "We could not reach the server. Check your connection and try again.".into()
            }
        }
    }

    /// Whether the user's institution blocked the login.
    pub fn is_inactive(&self) -> bool {
        matches!(
            self,
            AccessError::InstitutionInactive | AccessError::ContractExpired { .. }
        )
    }
}

impl From<RpcError> for AccessError {
    fn from(err: RpcError) -> Self {
        AccessError::Transport {
            message: err.message,
            code: err.code,
        }
    }
}

impl From<CampusError> for AccessError {
    fn from(err: CampusError) -> Self {
        match err {
            CampusError::Transport { message, code } => AccessError::Transport { message, code },
            other => AccessError::transport(other.to_string()),
        }
    }
}

impl From<AccessError> for CampusError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Transport { message, code } => CampusError::Transport { message, code },
            other => CampusError::AccessDenied {
                reason: other.to_string(),
            },
        }
    }
}

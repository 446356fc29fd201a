use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A login session for an end user.
///
/// `provider_token` and `access_token_plain` carry the upstream identity
/// provider's tokens; `metadata` is a free-form JSON object owned by the
/// caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionToken {
    pub id: Uuid,
    pub user_id: String,
    pub provider_token: Option<String>,
    pub access_token_plain: Option<String>,
    pub metadata: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived lifecycle state.
///
/// ```text
/// Active --expiry--> Expired
/// Active --revoke--> Revoked
/// Active --refresh-> Active
/// ```
///
/// Expired and Revoked are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
}

impl SessionToken {
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked_at.is_some() {
            SessionState::Revoked
        } else if self.expires_at <= now {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSessionToken {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    pub provider_token: Option<String>,
    pub access_token_plain: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

/// Rotation payload. Fields replace the stored ones in place.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshSessionToken {
    pub provider_token: Option<String>,
    pub access_token_plain: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// New expiry; the current one is kept when `None`.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Returned once on creation; `token` is the only copy of the raw secret.
#[derive(Debug, Clone)]
pub struct CreatedSessionToken {
    pub session: SessionToken,
    pub token: String,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// An API key as seen by the resolution path. The key hash never leaves
/// the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: String,
    /// First characters of the raw key, kept for display.
    pub key_prefix: String,
    pub name: String,
    /// Optional free-form scope hint forwarded to the caller.
    pub scope: Option<String>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Usability of a key at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyStatus {
    Active,
    Revoked,
    Expired,
}

impl ApiKey {
    /// Revocation wins over expiry.
    pub fn status(&self, now: DateTime<Utc>) -> ApiKeyStatus {
        if !self.is_active || self.revoked_at.is_some() {
            ApiKeyStatus::Revoked
        } else if self.expires_at.is_some_and(|exp| exp <= now) {
            ApiKeyStatus::Expired
        } else {
            ApiKeyStatus::Active
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateApiKey {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Number of leading characters of a raw key stored for display.
pub const API_KEY_DISPLAY_PREFIX_LEN: usize = 12;

/// Returned once on creation; `key` is the only copy of the raw secret.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    pub api_key: ApiKey,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn key() -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            user_id: "alice".into(),
            key_prefix: "gw_live_abcd".into(),
            name: "ci".into(),
            scope: None,
            is_active: true,
            revoked_at: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_active_without_expiry() {
        assert_eq!(key().status(Utc::now()), ApiKeyStatus::Active);
    }

    #[test]
    fn test_status_expired() {
        let now = Utc::now();
        let mut k = key();
        k.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(k.status(now), ApiKeyStatus::Expired);
        k.expires_at = Some(now);
        assert_eq!(k.status(now), ApiKeyStatus::Expired);
        k.expires_at = Some(now + Duration::seconds(1));
        assert_eq!(k.status(now), ApiKeyStatus::Active);
    }

    #[test]
    fn test_revoked_wins_over_expired() {
        let now = Utc::now();
        let mut k = key();
        k.expires_at = Some(now - Duration::hours(1));
        k.revoked_at = Some(now - Duration::hours(2));
        assert_eq!(k.status(now), ApiKeyStatus::Revoked);
    }

    #[test]
    fn test_inactive_is_revoked() {
        let mut k = key();
        k.is_active = false;
        assert_eq!(k.status(Utc::now()), ApiKeyStatus::Revoked);
    }
}

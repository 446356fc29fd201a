use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Token counts reported by a provider, normalized so that
/// `prompt_tokens` excludes tokens served from the prompt cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cache_tokens: i64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: i64, completion_tokens: i64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            cache_tokens: 0,
        }
    }

    pub fn with_cache_tokens(mut self, cache_tokens: i64) -> Self {
        self.cache_tokens = cache_tokens;
        self
    }

    pub fn total(&self) -> i64 {
        self.prompt_tokens
            .saturating_add(self.completion_tokens)
            .saturating_add(self.cache_tokens)
    }

    pub fn is_negative(&self) -> bool {
        self.prompt_tokens < 0 || self.completion_tokens < 0 || self.cache_tokens < 0
    }
}

/// One upstream call. `cost` is null until the ledger prices it and is
/// written at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: Uuid,
    pub user_id: String,
    pub api_key_id: Option<Uuid>,
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cache_tokens: i64,
    /// Microcents.
    pub cost: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl UsageLog {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            cache_tokens: self.cache_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUsageLog {
    #[validate(length(min = 1, max = 255))]
    pub user_id: String,
    pub api_key_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(min = 1, max = 255))]
    pub model: String,
    #[validate(length(min = 1, max = 255))]
    pub endpoint: String,
    #[validate(range(min = 0))]
    pub prompt_tokens: i64,
    #[validate(range(min = 0))]
    pub completion_tokens: i64,
    #[validate(range(min = 0))]
    pub cache_tokens: i64,
}

impl CreateUsageLog {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            cache_tokens: self.cache_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateUsageLog {
        CreateUsageLog {
            user_id: "alice".into(),
            api_key_id: None,
            provider: "openai".into(),
            model: "gpt-4o".into(),
            endpoint: "/v1/chat/completions".into(),
            prompt_tokens: 10,
            completion_tokens: 5,
            cache_tokens: 0,
        }
    }

    #[test]
    fn test_valid_usage() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn test_negative_tokens_rejected() {
        let bad = CreateUsageLog {
            completion_tokens: -1,
            ..input()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_empty_model_rejected() {
        let bad = CreateUsageLog {
            model: String::new(),
            ..input()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_token_total_saturates() {
        let usage = TokenUsage::new(i64::MAX, 1).with_cache_tokens(1);
        assert_eq!(usage.total(), i64::MAX);
    }
}

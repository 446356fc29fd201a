//! Decoding of provider usage blocks into [`TokenUsage`].
//!
//! Each provider family reports token counts under a different key and with
//! different semantics for cached prompt tokens. The decoders below are typed
//! serde structs; [`extract_usage`] picks one by [`ProviderFamily`] and
//! normalizes the result so that `prompt_tokens` never includes cache hits.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{error::ErrorResponse, models::TokenUsage};

/// Wire format family of an upstream provider's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    /// OpenAI and every OpenAI-compatible API (chat completions and responses).
    OpenAi,
    Gemini,
    Anthropic,
}

impl ProviderFamily {
    /// Guess the family from a provider name. Unknown providers are assumed
    /// to speak the OpenAI dialect.
    pub fn from_provider(provider: &str) -> Self {
        match provider.to_ascii_lowercase().as_str() {
            "gemini" | "google" | "vertex" | "vertexai" | "vertex_ai" => Self::Gemini,
            "anthropic" | "claude" => Self::Anthropic,
            _ => Self::OpenAi,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
        }
    }

    /// Keys the usage block may live under in a full response body.
    fn usage_keys(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi | Self::Anthropic => &["usage"],
            Self::Gemini => &["usageMetadata", "usage_metadata"],
        }
    }
}

impl std::fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{family} response carries no usage block")]
    MissingUsage { family: ProviderFamily },

    #[error("malformed {family} usage block: {message}")]
    Malformed {
        family: ProviderFamily,
        message: String,
    },

    #[error("{family} usage reports {cached} cached tokens out of {prompt} prompt tokens")]
    InconsistentCounts {
        family: ProviderFamily,
        prompt: i64,
        cached: i64,
    },
}

impl ExtractError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingUsage { .. } => "usage_missing",
            Self::Malformed { .. } => "usage_malformed",
            Self::InconsistentCounts { .. } => "usage_inconsistent",
        }
    }

    /// Bad upstream payloads are a known failure mode, never a kernel bug.
    pub fn is_expected(&self) -> bool {
        true
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::with_type("upstream_error", self.code(), self.to_string());
        (self.status(), Json(body)).into_response()
    }
}

/// A token count as providers actually send it: usually an integer,
/// occasionally a float such as `12.0`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum Count {
    Int(i64),
    Float(f64),
}

impl Count {
    fn value(self) -> Option<i64> {
        match self {
            Count::Int(v) => Some(v),
            Count::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
            Count::Float(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CachedDetails {
    #[serde(default)]
    cached_tokens: Option<Count>,
}

/// Chat completions (`prompt_tokens`) and the responses API (`input_tokens`).
/// `prompt_tokens` includes cache hits.
#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(alias = "input_tokens")]
    prompt_tokens: Count,
    #[serde(alias = "output_tokens", default)]
    completion_tokens: Option<Count>,
    #[serde(alias = "input_tokens_details", default)]
    prompt_tokens_details: Option<CachedDetails>,
}

/// `promptTokenCount` includes `cachedContentTokenCount`. Thinking tokens are
/// billed as output.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(alias = "prompt_token_count")]
    prompt_token_count: Count,
    #[serde(alias = "candidates_token_count", default)]
    candidates_token_count: Option<Count>,
    #[serde(alias = "cached_content_token_count", default)]
    cached_content_token_count: Option<Count>,
    #[serde(alias = "thoughts_token_count", default)]
    thoughts_token_count: Option<Count>,
}

/// `input_tokens` already excludes both cache reads and cache writes.
#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: Count,
    output_tokens: Count,
    #[serde(default)]
    cache_read_input_tokens: Option<Count>,
    #[serde(default)]
    cache_creation_input_tokens: Option<Count>,
}

/// One decoded usage block, tagged by the family that produced it.
#[derive(Debug)]
enum UsageBlock {
    OpenAi(OpenAiUsage),
    Gemini(GeminiUsage),
    Anthropic(AnthropicUsage),
}

impl UsageBlock {
    fn decode(family: ProviderFamily, value: &serde_json::Value) -> Result<Self, ExtractError> {
        let malformed = |e: serde_json::Error| ExtractError::Malformed {
            family,
            message: e.to_string(),
        };
        Ok(match family {
            ProviderFamily::OpenAi => {
                UsageBlock::OpenAi(OpenAiUsage::deserialize(value).map_err(malformed)?)
            }
            ProviderFamily::Gemini => {
                UsageBlock::Gemini(GeminiUsage::deserialize(value).map_err(malformed)?)
            }
            ProviderFamily::Anthropic => {
                UsageBlock::Anthropic(AnthropicUsage::deserialize(value).map_err(malformed)?)
            }
        })
    }

    fn normalize(self, family: ProviderFamily) -> Result<TokenUsage, ExtractError> {
        let count = |c: Option<Count>, field: &str| -> Result<i64, ExtractError> {
            let Some(c) = c else {
                return Ok(0);
            };
            match c.value() {
                Some(v) if v >= 0 => Ok(v),
                _ => Err(ExtractError::Malformed {
                    family,
                    message: format!("{field} must be a non-negative integer"),
                }),
            }
        };

        let (total_prompt, completion, cached, extra_prompt) = match self {
            UsageBlock::OpenAi(u) => (
                count(Some(u.prompt_tokens), "prompt_tokens")?,
                count(u.completion_tokens, "completion_tokens")?,
                count(
                    u.prompt_tokens_details.and_then(|d| d.cached_tokens),
                    "cached_tokens",
                )?,
                0,
            ),
            UsageBlock::Gemini(u) => (
                count(Some(u.prompt_token_count), "promptTokenCount")?,
                count(u.candidates_token_count, "candidatesTokenCount")?
                    .saturating_add(count(u.thoughts_token_count, "thoughtsTokenCount")?),
                count(u.cached_content_token_count, "cachedContentTokenCount")?,
                0,
            ),
            UsageBlock::Anthropic(u) => {
                let cached = count(u.cache_read_input_tokens, "cache_read_input_tokens")?;
                let input = count(Some(u.input_tokens), "input_tokens")?;
                // Cache writes are billed as ordinary input.
                let written =
                    count(u.cache_creation_input_tokens, "cache_creation_input_tokens")?;
                (
                    input.saturating_add(cached),
                    count(Some(u.output_tokens), "output_tokens")?,
                    cached,
                    written,
                )
            }
        };

        if cached > total_prompt {
            return Err(ExtractError::InconsistentCounts {
                family,
                prompt: total_prompt,
                cached,
            });
        }

        Ok(
            TokenUsage::new((total_prompt - cached).saturating_add(extra_prompt), completion)
                .with_cache_tokens(cached),
        )
    }
}

/// Decode the usage reported by an upstream response.
///
/// `value` may be the whole response body or just its usage block.
pub fn extract_usage(
    family: ProviderFamily,
    value: &serde_json::Value,
) -> Result<TokenUsage, ExtractError> {
    let block = family
        .usage_keys()
        .iter()
        .find_map(|key| value.get(*key))
        .unwrap_or(value);

    if !block.is_object() {
        return Err(ExtractError::MissingUsage { family });
    }

    let usage = UsageBlock::decode(family, block)
        .map_err(|e| match e {
            // A body without the block decodes as "missing field", which is
            // really an absent usage report.
            ExtractError::Malformed { .. } if block == value && !looks_like_usage(value) => {
                ExtractError::MissingUsage { family }
            }
            other => other,
        })?
        .normalize(family)?;

    tracing::trace!(
        family = %family,
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        cache_tokens = usage.cache_tokens,
        "Extracted provider usage"
    );
    Ok(usage)
}

fn looks_like_usage(value: &serde_json::Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.keys()
            .any(|k| k.contains("token") || k.contains("Token"))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_openai_chat_completion() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [],
            "usage": {
                "prompt_tokens": 1200,
                "completion_tokens": 300,
                "total_tokens": 1500,
                "prompt_tokens_details": { "cached_tokens": 200 }
            }
        });
        let usage = extract_usage(ProviderFamily::OpenAi, &body).unwrap();
        assert_eq!(usage, TokenUsage::new(1000, 300).with_cache_tokens(200));
    }

    #[test]
    fn test_openai_responses_api_and_float_counts() {
        let body = json!({
            "usage": {
                "input_tokens": 50.0,
                "output_tokens": 7,
                "input_tokens_details": { "cached_tokens": 0 }
            }
        });
        let usage = extract_usage(ProviderFamily::OpenAi, &body).unwrap();
        assert_eq!(usage, TokenUsage::new(50, 7));
    }

    #[test]
    fn test_openai_bare_usage_block() {
        let usage = extract_usage(
            ProviderFamily::OpenAi,
            &json!({ "prompt_tokens": 10, "completion_tokens": 2 }),
        )
        .unwrap();
        assert_eq!(usage, TokenUsage::new(10, 2));
    }

    #[test]
    fn test_gemini_camel_case() {
        let body = json!({
            "candidates": [],
            "usageMetadata": {
                "promptTokenCount": 900,
                "candidatesTokenCount": 100,
                "cachedContentTokenCount": 400,
                "thoughtsTokenCount": 25,
                "totalTokenCount": 1025
            }
        });
        let usage = extract_usage(ProviderFamily::Gemini, &body).unwrap();
        assert_eq!(usage, TokenUsage::new(500, 125).with_cache_tokens(400));
    }

    #[test]
    fn test_gemini_snake_case_without_candidates() {
        let body = json!({
            "usage_metadata": { "prompt_token_count": 12 }
        });
        let usage = extract_usage(ProviderFamily::Gemini, &body).unwrap();
        assert_eq!(usage, TokenUsage::new(12, 0));
    }

    #[test]
    fn test_anthropic_cache_read_and_write() {
        let body = json!({
            "type": "message",
            "usage": {
                "input_tokens": 40,
                "output_tokens": 60,
                "cache_read_input_tokens": 1000,
                "cache_creation_input_tokens": 10
            }
        });
        let usage = extract_usage(ProviderFamily::Anthropic, &body).unwrap();
        assert_eq!(usage, TokenUsage::new(50, 60).with_cache_tokens(1000));
    }

    #[test]
    fn test_missing_usage() {
        let err = extract_usage(ProviderFamily::OpenAi, &json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, ExtractError::MissingUsage { .. }));

        let err = extract_usage(ProviderFamily::Gemini, &json!("text")).unwrap_err();
        assert!(matches!(err, ExtractError::MissingUsage { .. }));
    }

    #[test]
    fn test_negative_count_is_malformed() {
        let body = json!({ "usage": { "prompt_tokens": -1, "completion_tokens": 2 } });
        let err = extract_usage(ProviderFamily::OpenAi, &body).unwrap_err();
        assert!(matches!(err, ExtractError::Malformed { .. }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_wrong_type_is_malformed() {
        let body = json!({ "usage": { "input_tokens": "many", "output_tokens": 2 } });
        let err = extract_usage(ProviderFamily::Anthropic, &body).unwrap_err();
        assert!(matches!(err, ExtractError::Malformed { .. }));
    }

    #[test]
    fn test_cached_exceeding_prompt_is_rejected() {
        let body = json!({
            "usage": {
                "prompt_tokens": 5,
                "completion_tokens": 1,
                "prompt_tokens_details": { "cached_tokens": 6 }
            }
        });
        let err = extract_usage(ProviderFamily::OpenAi, &body).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::InconsistentCounts {
                prompt: 5,
                cached: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_family_from_provider() {
        assert_eq!(ProviderFamily::from_provider("Gemini"), ProviderFamily::Gemini);
        assert_eq!(
            ProviderFamily::from_provider("anthropic"),
            ProviderFamily::Anthropic
        );
        assert_eq!(ProviderFamily::from_provider("groq"), ProviderFamily::OpenAi);
    }
}

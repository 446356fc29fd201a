use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// What a budget caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope_type", content = "scope_id", rename_all = "snake_case")]
pub enum BudgetScope {
    /// Every charge made by the user, whichever credential they used.
    User(String),
    /// Only charges made through one API key.
    ApiKey(Uuid),
}

impl BudgetScope {
    pub fn scope_type(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::ApiKey(_) => "api_key",
        }
    }

    pub fn scope_id(&self) -> String {
        match self {
            Self::User(user_id) => user_id.clone(),
            Self::ApiKey(id) => id.to_string(),
        }
    }

    /// Rebuild from the stored `(scope_type, scope_id)` pair.
    pub fn from_parts(scope_type: &str, scope_id: &str) -> Option<Self> {
        match scope_type {
            "user" => Some(Self::User(scope_id.to_string())),
            "api_key" => Uuid::parse_str(scope_id).ok().map(Self::ApiKey),
            _ => None,
        }
    }
}

/// How often a budget refills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "period", rename_all = "snake_case")]
pub enum BudgetPeriod {
    /// Key `YYYY-MM-DD` (UTC).
    Daily,
    /// Key `YYYY-Www` (ISO week, UTC).
    Weekly,
    /// Key `YYYY-MM` (UTC).
    Monthly,
    /// Fixed windows of `period_secs` anchored at the budget's creation
    /// time. Key `custom-<secs>-<index>`.
    Custom { period_secs: i64 },
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom { .. } => "custom",
        }
    }

    pub fn period_secs(&self) -> Option<i64> {
        match self {
            Self::Custom { period_secs } => Some(*period_secs),
            _ => None,
        }
    }

    /// Rebuild from the stored `(period, period_secs)` pair.
    pub fn from_parts(period: &str, period_secs: Option<i64>) -> Option<Self> {
        match (period, period_secs) {
            ("daily", _) => Some(Self::Daily),
            ("weekly", _) => Some(Self::Weekly),
            ("monthly", _) => Some(Self::Monthly),
            ("custom", Some(secs)) if secs > 0 => Some(Self::Custom { period_secs: secs }),
            _ => None,
        }
    }

    /// Key of the period containing `now`. `anchor` is only used by
    /// custom periods.
    pub fn key_at(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> String {
        match self {
            Self::Daily => now.format("%Y-%m-%d").to_string(),
            Self::Weekly => {
                let week = now.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Monthly => now.format("%Y-%m").to_string(),
            Self::Custom { period_secs } => {
                let elapsed = (now - anchor).num_seconds().max(0);
                let index = elapsed / (*period_secs).max(1);
                format!("custom-{}-{}", period_secs, index)
            }
        }
    }
}

impl fmt::Display for BudgetPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { period_secs } => write!(f, "custom({}s)", period_secs),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A spending cap that refills every period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub scope: BudgetScope,
    /// Refill amount in microcents.
    pub limit: i64,
    /// What is left in the current period, in microcents. Can go negative.
    pub remaining: i64,
    pub period: BudgetPeriod,
    /// Key of the period `remaining` belongs to.
    pub period_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn current_period_key(&self, now: DateTime<Utc>) -> String {
        self.period.key_at(self.created_at, now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining <= 0
    }

    /// True when `remaining` belongs to an earlier period than `now`.
    pub fn needs_reset(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.current_period_key(now) != self.period_key
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_create_budget"))]
pub struct CreateBudget {
    pub scope: BudgetScope,
    /// Limit in microcents.
    #[validate(range(min = 0))]
    pub limit: i64,
    pub period: BudgetPeriod,
}

fn validate_create_budget(input: &CreateBudget) -> Result<(), validator::ValidationError> {
    if let BudgetPeriod::Custom { period_secs } = input.period
        && period_secs <= 0
    {
        return Err(validator::ValidationError::new("period_secs_must_be_positive"));
    }
    match &input.scope {
        BudgetScope::User(user_id) if user_id.is_empty() => {
            Err(validator::ValidationError::new("empty_scope_id"))
        }
        _ => Ok(()),
    }
}

/// Immutable record of one refill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetResetLog {
    pub id: Uuid,
    pub budget_id: Uuid,
    pub period_key: String,
    pub previous_remaining: i64,
    pub new_remaining: i64,
    pub reset_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_calendar_keys() {
        let now = at(2024, 3, 7, 15);
        assert_eq!(BudgetPeriod::Daily.key_at(now, now), "2024-03-07");
        assert_eq!(BudgetPeriod::Monthly.key_at(now, now), "2024-03");
        assert_eq!(BudgetPeriod::Weekly.key_at(now, now), "2024-W10");
    }

    #[test]
    fn test_weekly_key_uses_iso_year() {
        // 2024-12-30 is a Monday in ISO week 1 of 2025.
        let now = at(2024, 12, 30, 0);
        assert_eq!(BudgetPeriod::Weekly.key_at(now, now), "2025-W01");
    }

    #[test]
    fn test_custom_key_is_anchored_at_creation() {
        let anchor = at(2024, 1, 1, 0);
        let period = BudgetPeriod::Custom { period_secs: 3600 };
        assert_eq!(period.key_at(anchor, anchor), "custom-3600-0");
        assert_eq!(
            period.key_at(anchor, anchor + Duration::minutes(59)),
            "custom-3600-0"
        );
        assert_eq!(
            period.key_at(anchor, anchor + Duration::minutes(60)),
            "custom-3600-1"
        );
        assert_eq!(
            period.key_at(anchor, anchor + Duration::hours(25)),
            "custom-3600-25"
        );
    }

    #[test]
    fn test_custom_key_before_anchor_clamps_to_first_window() {
        let anchor = at(2024, 1, 1, 0);
        let period = BudgetPeriod::Custom { period_secs: 60 };
        assert_eq!(
            period.key_at(anchor, anchor - Duration::hours(1)),
            "custom-60-0"
        );
    }

    #[test]
    fn test_period_from_parts() {
        assert_eq!(BudgetPeriod::from_parts("daily", None), Some(BudgetPeriod::Daily));
        assert_eq!(
            BudgetPeriod::from_parts("custom", Some(90)),
            Some(BudgetPeriod::Custom { period_secs: 90 })
        );
        assert_eq!(BudgetPeriod::from_parts("custom", None), None);
        assert_eq!(BudgetPeriod::from_parts("custom", Some(0)), None);
        assert_eq!(BudgetPeriod::from_parts("yearly", None), None);
    }

    #[test]
    fn test_scope_from_parts() {
        let id = Uuid::new_v4();
        assert_eq!(
            BudgetScope::from_parts("api_key", &id.to_string()),
            Some(BudgetScope::ApiKey(id))
        );
        assert_eq!(
            BudgetScope::from_parts("user", "alice"),
            Some(BudgetScope::User("alice".into()))
        );
        assert_eq!(BudgetScope::from_parts("api_key", "not-a-uuid"), None);
        assert_eq!(BudgetScope::from_parts("team", "x"), None);
    }

    #[test]
    fn test_needs_reset() {
        let created = at(2024, 3, 1, 0);
        let budget = Budget {
            id: Uuid::new_v4(),
            scope: BudgetScope::User("alice".into()),
            limit: 100,
            remaining: 0,
            period: BudgetPeriod::Daily,
            period_key: "2024-03-01".into(),
            is_active: true,
            created_at: created,
            updated_at: created,
        };
        assert!(!budget.needs_reset(at(2024, 3, 1, 23)));
        assert!(budget.needs_reset(at(2024, 3, 2, 0)));

        let inactive = Budget {
            is_active: false,
            ..budget
        };
        assert!(!inactive.needs_reset(at(2024, 3, 2, 0)));
    }

    #[test]
    fn test_create_budget_validation() {
        let ok = CreateBudget {
            scope: BudgetScope::User("alice".into()),
            limit: 1_000_000,
            period: BudgetPeriod::Monthly,
        };
        assert!(ok.validate().is_ok());

        let bad_period = CreateBudget {
            period: BudgetPeriod::Custom { period_secs: 0 },
            ..ok.clone()
        };
        assert!(bad_period.validate().is_err());

        let negative = CreateBudget { limit: -1, ..ok };
        assert!(negative.validate().is_err());
    }
}

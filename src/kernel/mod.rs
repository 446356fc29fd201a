//! The billing kernel every paid route calls.
//!
//! Per request, in order:
//!
//! 1. [`BillingKernel::resolve_actor`] turns the presented credential into
//!    the user being billed.
//! 2. [`BillingKernel::validate_credit`] refuses users with nothing left
//!    to spend.
//! 3. The route calls its upstream provider.
//! 4. [`BillingKernel::settle`] records usage and charges it, or the route
//!    drives `record_usage`, `resolve_price`, `compute_cost`,
//!    `set_usage_cost` and `add_user_spend` itself.

mod error;

use std::sync::Arc;

use chrono::Utc;
use http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

pub use error::KernelError;

use crate::{
    auth::{Actor, CredentialBundle, CredentialResolver},
    config::KernelConfig,
    db::DbPool,
    extract::{ProviderFamily, extract_usage},
    models::{CreateUsageLog, ModelPricing, TokenUsage},
    pricing::ModelRef,
    services::{ChargeOutcome, Services},
};

/// Usage of one completed upstream call, as reported to [`BillingKernel::settle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub model: ModelRef,
    /// Route that made the call, e.g. `/v1/chat/completions`.
    pub endpoint: String,
    pub usage: TokenUsage,
}

impl UsageReport {
    pub fn new(model: ModelRef, endpoint: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            model,
            endpoint: endpoint.into(),
            usage,
        }
    }
}

/// Result of [`BillingKernel::settle`]. The usage row exists whatever the
/// outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settlement {
    pub usage_id: Uuid,
    pub outcome: ChargeOutcome,
}

/// Explicit context for every billing call: the pool, the configuration,
/// the credential resolver and the services built on them.
#[derive(Clone)]
pub struct BillingKernel {
    db: Arc<DbPool>,
    config: Arc<KernelConfig>,
    resolver: Arc<CredentialResolver>,
    services: Services,
}

impl BillingKernel {
    pub fn new(db: Arc<DbPool>, config: KernelConfig) -> Self {
        let resolver = CredentialResolver::from_config(&config.auth, db.clone());
        let services = Services::new(db.clone(), &config.billing);
        Self {
            db,
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            services,
        }
    }

    /// Open the configured database and build a kernel on it.
    pub async fn from_config(config: KernelConfig) -> Result<Self, KernelError> {
        let db = DbPool::from_config(&config.database).await?;
        Ok(Self::new(Arc::new(db), config))
    }

    pub fn db(&self) -> &Arc<DbPool> {
        &self.db
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Pull the credential fields out of request headers.
    pub fn credentials_from_headers(
        &self,
        headers: &HeaderMap,
    ) -> Result<CredentialBundle, KernelError> {
        Ok(CredentialBundle::from_headers(headers, &self.config.auth)?)
    }

    pub async fn resolve_actor(
        &self,
        bundle: &CredentialBundle,
        explicit_user: Option<&str>,
    ) -> Result<Actor, KernelError> {
        Ok(self.resolver.resolve(bundle, explicit_user).await?)
    }

    pub async fn validate_credit(&self, actor: &Actor) -> Result<(), KernelError> {
        Ok(self
            .services
            .credit
            .validate_credit(&actor.user_id, actor.api_key_id)
            .await?)
    }

    /// Steps 1 and 2 plus a pricing check, everything a route needs before
    /// spending money upstream.
    pub async fn preflight(
        &self,
        bundle: &CredentialBundle,
        explicit_user: Option<&str>,
        model: &str,
    ) -> Result<(Actor, ModelRef), KernelError> {
        let actor = self.resolve_actor(bundle, explicit_user).await?;
        let model = self.services.pricing.parse_model(model)?;
        self.ensure_priced(&model).await?;
        self.validate_credit(&actor).await?;
        Ok((actor, model))
    }

    pub async fn ensure_priced(&self, model: &ModelRef) -> Result<(), KernelError> {
        Ok(self
            .services
            .pricing
            .ensure_priced(&model.provider, &model.model)
            .await?)
    }

    /// Insert the usage row with a null cost. Never retried.
    pub async fn record_usage(
        &self,
        actor: &Actor,
        report: &UsageReport,
    ) -> Result<Uuid, KernelError> {
        Ok(self
            .services
            .usage
            .record_usage(Self::usage_input(actor, report))
            .await?)
    }

    /// Price schedule currently in force.
    pub async fn resolve_price(
        &self,
        provider: &str,
        model: &str,
    ) -> Result<ModelPricing, KernelError> {
        Ok(self
            .services
            .pricing
            .resolve_price(provider, model, Utc::now())
            .await?)
    }

    /// Cost in microcents.
    pub fn compute_cost(
        &self,
        usage: &TokenUsage,
        price: &ModelPricing,
    ) -> Result<i64, KernelError> {
        Ok(self.services.ledger.compute_cost(usage, price)?)
    }

    pub async fn set_usage_cost(&self, usage_id: Uuid, amount: i64) -> Result<bool, KernelError> {
        Ok(self.services.ledger.set_usage_cost(usage_id, amount).await?)
    }

    pub async fn add_user_spend(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
        amount: i64,
    ) -> Result<(), KernelError> {
        Ok(self
            .services
            .ledger
            .add_user_spend(user_id, api_key_id, amount)
            .await?)
    }

    /// Record the usage, then price and charge it.
    ///
    /// Once the row is written it is never written again: a model without
    /// pricing yields [`ChargeOutcome::Unpriced`] and any later failure is
    /// returned with the row left at a null cost for reconciliation.
    pub async fn settle(
        &self,
        actor: &Actor,
        report: &UsageReport,
    ) -> Result<Settlement, KernelError> {
        let row = self
            .services
            .usage
            .record(Self::usage_input(actor, report))
            .await?;

        let outcome = self
            .services
            .ledger
            .settle_usage(&row)
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    usage_id = %row.id,
                    user_id = %row.user_id,
                    error = %e,
                    "Usage recorded but not charged"
                );
            })?;

        Ok(Settlement {
            usage_id: row.id,
            outcome,
        })
    }

    /// [`settle`](Self::settle) straight from an upstream response body.
    pub async fn settle_response(
        &self,
        actor: &Actor,
        model: ModelRef,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<Settlement, KernelError> {
        let family = ProviderFamily::from_provider(&model.provider);
        let usage = extract_usage(family, body)?;
        self.settle(actor, &UsageReport::new(model, endpoint, usage))
            .await
    }

    fn usage_input(actor: &Actor, report: &UsageReport) -> CreateUsageLog {
        CreateUsageLog {
            user_id: actor.user_id.clone(),
            api_key_id: actor.api_key_id,
            provider: report.model.provider.clone(),
            model: report.model.model.clone(),
            endpoint: report.endpoint.clone(),
            prompt_tokens: report.usage.prompt_tokens,
            completion_tokens: report.usage.completion_tokens,
            cache_tokens: report.usage.cache_tokens,
        }
    }
}

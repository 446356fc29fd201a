mod api_keys;
mod budgets;
mod credit;
mod ledger;
mod sessions;
mod usage;
mod users;

use std::sync::Arc;

pub use api_keys::ApiKeyService;
pub use budgets::BudgetService;
pub use credit::{CreditError, CreditGuard};
pub use ledger::{ChargeOutcome, CostLedger, ReconcileResult};
pub use sessions::SessionService;
pub use usage::UsageRecorder;
pub use users::UserService;

use crate::{config::BillingConfig, db::DbPool, pricing::PricingCatalog};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: UserService,
    pub api_keys: ApiKeyService,
    pub sessions: SessionService,
    pub budgets: BudgetService,
    pub pricing: PricingCatalog,
    pub credit: CreditGuard,
    pub usage: UsageRecorder,
    pub ledger: CostLedger,
}

impl Services {
    pub fn new(db: Arc<DbPool>, billing: &BillingConfig) -> Self {
        let pricing = PricingCatalog::new(db.clone(), billing.default_provider.clone());
        Self {
            users: UserService::new(db.clone()),
            api_keys: ApiKeyService::new(db.clone()),
            sessions: SessionService::new(db.clone()),
            budgets: BudgetService::new(db.clone()),
            credit: CreditGuard::new(db.clone()),
            usage: UsageRecorder::new(db.clone()),
            ledger: CostLedger::new(db, pricing.clone(), billing.currency_scale),
            pricing,
        }
    }
}

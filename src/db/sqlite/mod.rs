mod api_keys;
mod budgets;
mod common;
mod ledger;
mod model_pricing;
mod session_tokens;
mod usage;
mod users;

pub use api_keys::SqliteApiKeyRepo;
pub use budgets::SqliteBudgetRepo;
pub use ledger::SqliteLedgerRepo;
pub use model_pricing::SqliteModelPricingRepo;
pub use session_tokens::SqliteSessionTokenRepo;
pub use usage::SqliteUsageRepo;
pub use users::SqliteUserRepo;

mod api_keys;
mod budgets;
mod common;
mod ledger;
mod model_pricing;
mod session_tokens;
mod usage;
mod users;

pub use api_keys::PostgresApiKeyRepo;
pub use budgets::PostgresBudgetRepo;
pub use ledger::PostgresLedgerRepo;
pub use model_pricing::PostgresModelPricingRepo;
pub use session_tokens::PostgresSessionTokenRepo;
pub use usage::PostgresUsageRepo;
pub use users::PostgresUserRepo;

mod api_keys;
mod budgets;
mod ledger;
mod model_pricing;
mod session_tokens;
mod usage;
mod users;

pub use api_keys::*;
pub use budgets::*;
pub use ledger::*;
pub use model_pricing::*;
pub use session_tokens::*;
pub use usage::*;
pub use users::*;

//! Background jobs for the billing kernel.
//!
//! - **Budget reset**: refills budgets whose period has rolled over and
//!   appends one reset log per budget and period.
//!
//! Jobs follow a consistent pattern:
//! 1. Configuration under `[jobs]`
//! 2. Worker function that runs in a loop with configurable interval
//! 3. Run function that performs a single pass
//! 4. Structured result type for tracking state
//!
//! # Example
//!
//! ```toml
//! [jobs.budget_reset]
//! enabled = true
//! interval_secs = 60
//! batch_size = 500
//! ```

mod budget_reset;

pub use budget_reset::{BudgetResetRunResult, run_budget_reset, start_budget_reset_worker};

//! Shared database repository test infrastructure
//!
//! The same test logic runs against both SQLite and PostgreSQL:
//!
//! - **Unit tests (SQLite)**: in-memory databases with real migrations, run with every `cargo test`
//! - **Integration tests (PostgreSQL)**: testcontainers, run with `cargo test -- --ignored`
//!
//! Each repository has a module holding shared test functions that take
//! `&dyn XxxRepo` (or a `&DbPool` when several tables are involved), plus
//! `sqlite_tests` and `postgres_tests` submodules that wire them up.

mod api_keys;
mod budgets;
mod users;

//! Billing kernel for a multi-tenant LLM gateway: credential resolution,
//! pre-flight credit checks, usage recording, pricing and an idempotent
//! cost ledger, plus the worker that refills periodic budgets.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod kernel;
pub mod models;
pub mod observability;
pub mod pricing;
pub mod services;

#[cfg(test)]
mod tests;

pub use kernel::{BillingKernel, KernelError, Settlement, UsageReport};

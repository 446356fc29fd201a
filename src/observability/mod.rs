//! Structured logging for the billing kernel.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary (or the embedding gateway) via [`init_tracing`].

#[cfg(feature = "cli")]
mod tracing_init;

#[cfg(feature = "cli")]
pub use tracing_init::*;

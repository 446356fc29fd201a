//! Credential resolution.
//!
//! A request carries at most one of each credential kind in a
//! [`CredentialBundle`]; the [`CredentialResolver`] walks its strategies in
//! priority order and turns the first presented credential into an
//! [`Actor`].

mod credentials;
mod error;
pub mod jwt;
mod resolver;

pub use credentials::CredentialBundle;
pub use error::AuthError;
pub use resolver::{
    Actor, ApiKeyStrategy, BearerStrategy, CredentialKind, CredentialResolver, CredentialStrategy,
    MasterKeyStrategy, SessionTokenStrategy,
};

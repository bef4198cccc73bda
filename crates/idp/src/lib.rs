//! Federated identity providers.
//!
//! The command engine talks to external providers exclusively through the
//! [`Provider`] trait, produced by a [`ProviderFactory`]. Production wiring
//! uses HTTP-backed providers; tests inject stubs.

pub mod apple;
pub mod oauth;
pub mod oidc;
pub mod pkce;
pub mod provider;
pub mod saml;
pub mod user;

pub use pkce::{generate_nonce, generate_state, PkcePair};
pub use provider::{HttpProviderFactory, IdpCallback, Provider, ProviderFactory, Tokens};
pub use user::ExternalUser;

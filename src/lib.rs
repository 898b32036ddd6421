// Core modules
pub mod api;
pub mod auth;
pub mod drinks;
mod types;

#[cfg(test)]
mod test_support;

// Re-export key types and functions
pub use api::{ApiError, AppState, create_router};
pub use auth::{AuthConfig, AuthErrorKind, AuthorizationError, AuthorizationGate, ClaimSet};
pub use drinks::{Drink, DrinkStore};
pub use types::{KeyId, RawCredential};

use anyhow::Result;

/// Convenience function to build the application router from auth config.
///
/// Validates the config, sets up the key directory and an empty drink store.
pub fn create_app(config: &AuthConfig) -> Result<axum::Router> {
    let gate = AuthorizationGate::from_config(config)?;
    Ok(create_router(AppState::new(gate, DrinkStore::new())))
}

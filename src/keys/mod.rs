//! Access-token resolution.
//!
//! [`KeyStore`] is the async trait for resolving a reference into a plaintext secret.
//! [`SsmKeyStore`] reads AWS SSM Parameter Store, [`EnvKeyStore`] reads the
//! process environment (including values loaded from `.env`).
//! [`resolve_token`] walks the configured stores and falls back to anonymous access.

mod stores;

pub use stores::{EnvKeyStore, SsmKeyStore};

use anyhow::Result;
use tracing::{debug, warn};

/// Environment variable consulted when nothing else is configured.
pub const DEFAULT_TOKEN_ENV: &str = "HF_TOKEN";

/// Resolves a vault reference (an SSM parameter path, an env var name) into a plaintext secret.
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, reference: &str) -> Result<String>;
}

/// Where the access token may come from, in lookup order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSpec {
    pub explicit: Option<String>,
    pub ssm_parameter: Option<String>,
    pub env_var: Option<String>,
}

/// Returns the access token, or `None` for anonymous access.
///
/// A secret that is missing or cannot be read is logged as a warning, never
/// an error: the remote side decides whether anonymous access is enough.
pub async fn resolve_token(
    spec: &TokenSpec,
    ssm: Option<&dyn KeyStore>,
    env: &dyn KeyStore,
) -> Option<String> {
    if let Some(token) = spec.explicit.as_ref().filter(|t| !t.is_empty()) {
        debug!("Using explicitly configured access token");
        return Some(token.clone());
    }

    if let (Some(parameter), Some(store)) = (&spec.ssm_parameter, ssm) {
        match store.get(parameter).await {
            Ok(token) if !token.is_empty() => {
                debug!(parameter = %parameter, "Access token read from secret store");
                return Some(token);
            }
            Ok(_) => warn!(parameter = %parameter, "Secret store returned an empty token"),
            Err(e) => warn!(parameter = %parameter, error = %e, "Secret store lookup failed"),
        }
    }

    let var = spec.env_var.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
    match env.get(var).await {
        Ok(token) if !token.is_empty() => {
            debug!(var, "Access token read from environment");
            Some(token)
        }
        _ => {
            warn!(var, "No access token found, continuing with anonymous access");
            None
        }
    }
}

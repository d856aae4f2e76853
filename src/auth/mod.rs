//! Request authorization

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Supplies the `Authorization` header attached to every outgoing request
pub trait Authorizer: Send + Sync + std::fmt::Debug {
    /// Header value, or `None` for anonymous requests
    fn authorization_header(&self) -> Option<String>;
}

/// Bearer token authorizer
#[derive(Clone)]
pub struct AccessTokenAuthorizer {
    token: String,
}

impl AccessTokenAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for AccessTokenAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenAuthorizer")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Authorizer for AccessTokenAuthorizer {
    fn authorization_header(&self) -> Option<String> {
        Some(format!("Bearer {}", self.token))
    }
}

/// Sends requests without credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuthorizer;

impl Authorizer for NullAuthorizer {
    fn authorization_header(&self) -> Option<String> {
        None
    }
}

/// Build an authorizer from an environment variable or a token file
///
/// The environment variable wins; with neither available the authorizer is anonymous.
pub fn authorizer_from_env_or_file(
    env_var: &str,
    token_file: Option<&Path>,
) -> Result<Arc<dyn Authorizer>> {
    if let Ok(token) = std::env::var(env_var)
        && !token.trim().is_empty()
    {
        tracing::debug!(source = %env_var, "Using access token from environment");
        return Ok(Arc::new(AccessTokenAuthorizer::new(token.trim())));
    }

    if let Some(path) = token_file {
        let token = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file: {:?}", path))?;
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Token file {:?} is empty", path);
        }
        tracing::debug!(path = ?path, "Using access token from file");
        return Ok(Arc::new(AccessTokenAuthorizer::new(token)));
    }

    tracing::warn!(source = %env_var, "No access token configured, sending anonymous requests");
    Ok(Arc::new(NullAuthorizer))
}

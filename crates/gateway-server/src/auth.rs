//! Caller authentication.
//!
//! Authentication itself is an external collaborator; the gateway only needs
//! a stable caller identity to key the rate limiter and a yes/no on whether a
//! credential is acceptable. [`StaticKeyAuthenticator`] covers the common
//! deployment of a fixed key list.

use crate::error::ApiError;
use axum::http::{header, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Header carrying an API key as an alternative to `Authorization`
pub const API_KEY_HEADER: &str = "x-api-key";

/// How the caller presented its credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `X-API-Key: <key>`
    ApiKey,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Stable identifier, used as the rate-limit key
    pub id: String,
    /// Credential transport
    pub method: AuthMethod,
}

/// Authentication collaborator
pub trait Authenticator: Send + Sync {
    /// Identify the caller from request headers.
    ///
    /// Returns `Ok(None)` when no credential was presented.
    ///
    /// # Errors
    /// Returns 401 when a credential is presented but not accepted
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<ClientIdentity>, ApiError>;
}

/// Validates keys against a fixed list stored as SHA-256 hashes.
///
/// With an empty list every non-empty credential is accepted and its hash
/// becomes the identity.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyAuthenticator {
    key_hashes: HashSet<String>,
}

impl StaticKeyAuthenticator {
    /// Create from plaintext keys
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a SecretString>) -> Self {
        Self {
            key_hashes: keys
                .into_iter()
                .map(|k| k.expose_secret().trim())
                .filter(|k| !k.is_empty())
                .map(hash_api_key)
                .collect(),
        }
    }

    /// Accept any non-empty credential
    pub fn open() -> Self {
        Self::default()
    }

    /// Whether keys are enforced
    pub fn is_enforcing(&self) -> bool {
        !self.key_hashes.is_empty()
    }
}

impl Authenticator for StaticKeyAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<ClientIdentity>, ApiError> {
        let Some((key, method)) = extract_credential(headers)? else {
            return Ok(None);
        };

        let hash = hash_api_key(key);
        if self.is_enforcing() && !self.key_hashes.contains(&hash) {
            warn!(method = ?method, "Rejected unknown API key");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }

        debug!(method = ?method, "Request authenticated");
        Ok(Some(ClientIdentity {
            id: format!("key:{}", &hash[..16]),
            method,
        }))
    }
}

fn extract_credential(headers: &HeaderMap) -> Result<Option<(&str, AuthMethod)>, ApiError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| {
                ApiError::unauthorized("Invalid Authorization format. Expected: Bearer <token>")
            })?;
        if token.is_empty() {
            return Err(ApiError::unauthorized("Empty bearer token"));
        }
        return Ok(Some((token, AuthMethod::Bearer)));
    }

    if let Some(value) = headers.get(API_KEY_HEADER) {
        let key = value
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid X-API-Key header"))?
            .trim();
        if key.is_empty() {
            return Err(ApiError::unauthorized("Empty API key"));
        }
        return Ok(Some((key, AuthMethod::ApiKey)));
    }

    Ok(None)
}

/// Hash an API key for comparison at rest
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

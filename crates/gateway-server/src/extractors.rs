//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{auth::ClientIdentity, error::ApiError, state::AppState};

/// Caller identity when a credential was presented
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Option<ClientIdentity>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state.authenticator.authenticate(&parts.headers).map(Self)
    }
}

/// Caller identity; rejects with 401 when no credential was presented
#[derive(Debug, Clone)]
pub struct Identity(pub ClientIdentity);

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .authenticator
            .authenticate(&parts.headers)?
            .map(Self)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Extract client IP address
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| {
                parts
                    .headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            });

        Ok(Self(ip))
    }
}

/// JSON body extractor with better error handling
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        let value: T = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(error = %e, "JSON parse error");
            ApiError::bad_request(format!("Invalid JSON: {e}"))
        })?;

        Ok(Self(value))
    }
}

/// Key the local rate limiter counts against: identity, then client IP, then
/// a shared anonymous bucket
pub fn rate_limit_key(identity: Option<&ClientIdentity>, ip: Option<&str>) -> String {
    identity.map_or_else(
        || ip.map_or_else(|| "anonymous".to_string(), |ip| format!("ip:{ip}")),
        |identity| identity.id.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use axum::http::Request;

    #[tokio::test]
    async fn test_client_ip_prefers_forwarded_for() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("x-real-ip", "10.0.0.2")
            .body(())
            .expect("valid request");
        let (mut parts, _body) = req.into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.expect("ip");
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_client_ip_falls_back_to_real_ip() {
        let req = Request::builder()
            .header("x-real-ip", "10.0.0.2")
            .body(())
            .expect("valid request");
        let (mut parts, _body) = req.into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.expect("ip");
        assert_eq!(ip.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_rate_limit_key_precedence() {
        let identity = ClientIdentity {
            id: "key:abc".to_string(),
            method: AuthMethod::Bearer,
        };
        assert_eq!(rate_limit_key(Some(&identity), Some("1.2.3.4")), "key:abc");
        assert_eq!(rate_limit_key(None, Some("1.2.3.4")), "ip:1.2.3.4");
        assert_eq!(rate_limit_key(None, None), "anonymous");
    }
}

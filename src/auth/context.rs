//! The authentication collaborator seam.

use async_trait::async_trait;

use super::models::{CacheEntry, UserCodeResponse};
use crate::error::AuthError;

/// Performs the token-endpoint handshake against an authority URL.
///
/// Implementations own the wire protocol and typically consult a
/// [`TokenCache`](super::TokenCache) as a side effect of each acquisition;
/// this crate only drives them. `authority` always carries the tenant as its
/// last path segment, built via
/// [`Environment::authority_url`](crate::config::Environment::authority_url).
///
/// Token-endpoint failures must be reported as
/// [`ProviderError`](crate::error::ProviderError) values built with
/// `from_message` so the raw `AADSTS` code survives for classification.
#[async_trait]
pub trait AuthenticationContext: Send + Sync {
    /// Silent acquisition for an already-known user (cache or refresh path).
    async fn acquire_token(
        &self,
        authority: &str,
        resource: &str,
        user_id: &str,
        client_id: &str,
    ) -> Result<CacheEntry, AuthError>;

    async fn acquire_token_with_username_password(
        &self,
        authority: &str,
        resource: &str,
        username: &str,
        password: &str,
        client_id: &str,
    ) -> Result<CacheEntry, AuthError>;

    /// Client-credentials grant for service principals.
    async fn acquire_token_with_client_secret(
        &self,
        authority: &str,
        resource: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<CacheEntry, AuthError>;

    /// Start a device-code flow: request the short code the user completes
    /// out-of-band.
    async fn acquire_user_code(
        &self,
        authority: &str,
        resource: &str,
        client_id: &str,
    ) -> Result<UserCodeResponse, AuthError>;

    /// Poll the device-code flow to completion.
    async fn acquire_token_with_device_code(
        &self,
        authority: &str,
        resource: &str,
        client_id: &str,
        user_code: &UserCodeResponse,
    ) -> Result<CacheEntry, AuthError>;
}

//! The directory-listing collaborator seam.

use async_trait::async_trait;

use super::models::{CacheEntry, SubscriptionRecord};
use crate::error::AuthError;

/// Lists tenants and subscriptions visible to an authenticated credential.
///
/// Implementations own the REST calls. `list_subscriptions` returns records
/// without `tenant_id`/`username`/`user_type` tags; the resolver fills those
/// in during aggregation.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Tenant IDs the credential's identity belongs to, in provider order.
    async fn list_tenants(&self, credential: &CacheEntry) -> Result<Vec<String>, AuthError>;

    /// Subscriptions in the credential's tenant, in provider order.
    async fn list_subscriptions(
        &self,
        credential: &CacheEntry,
    ) -> Result<Vec<SubscriptionRecord>, AuthError>;
}

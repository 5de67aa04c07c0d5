//! Data model for the account core: cached token records, login requests,
//! tenant pairings and subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::constants::COMMON_TENANT;

/// A cached token record as issued by the identity provider.
///
/// `user_id` is always stored lower-cased. Provider fields this crate does
/// not interpret are kept losslessly in `extra` and round-trip through the
/// persisted format unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// URL identifying the issuing authority, with the tenant as its last
    /// path segment (e.g. `https://login.microsoftonline.com/common`).
    pub authority: String,
    pub client_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub resource: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_on: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheEntry {
    /// Lower-case the stored identity. Idempotent.
    pub fn normalize(&mut self) {
        self.user_id = self.user_id.to_lowercase();
    }

    /// Duplicate key: every field equal except `expires_on`. Two entries
    /// matching this predicate are the same token record, re-issued.
    pub fn same_except_expiry(&self, other: &CacheEntry) -> bool {
        self.same_identity(other)
            && self.access_token == other.access_token
            && self.refresh_token == other.refresh_token
    }

    /// Identity key: every field equal except `expires_on` and the token
    /// material itself. An incoming entry matching a cached one on this
    /// predicate but not on [`same_except_expiry`](Self::same_except_expiry)
    /// is a refresh and supersedes the cached entry.
    pub fn same_identity(&self, other: &CacheEntry) -> bool {
        self.authority == other.authority
            && self.client_id == other.client_id
            && self.user_id == other.user_id
            && self.tenant_id == other.tenant_id
            && self.resource == other.resource
            && self.extra == other.extra
    }

    /// Structural subset match: every populated query field must equal the
    /// corresponding entry field.
    pub fn matches(&self, query: &CacheQuery) -> bool {
        fn field(query: &Option<String>, entry: &str) -> bool {
            query.as_deref().is_none_or(|q| q == entry)
        }
        field(&query.authority, &self.authority)
            && field(&query.client_id, &self.client_id)
            && field(&query.user_id, &self.user_id)
            && field(&query.tenant_id, &self.tenant_id)
            && field(&query.resource, &self.resource)
    }

    /// Whether the access token is past its expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_on
    }

    /// Device-code flows authenticate against the common endpoint and only
    /// learn the real tenant afterwards; retarget the cached authority from
    /// `/common` to the resolved tenant segment.
    pub(crate) fn retarget_common_authority(&mut self) {
        if self.tenant_id.is_empty() {
            return;
        }
        let common_segment = format!("/{COMMON_TENANT}");
        let retargeted = self
            .authority
            .strip_suffix(&common_segment)
            .map(|base| format!("{}/{}", base, self.tenant_id));
        if let Some(authority) = retargeted {
            self.authority = authority;
        }
    }
}

/// Query over cached entries; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct CacheQuery {
    pub authority: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub resource: Option<String>,
}

/// Which authentication strategy a login uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    /// Username/password, non-interactive.
    User,
    /// Application identity with a client secret.
    ServicePrincipal,
    /// Interactive device-code flow, for MFA-protected users.
    MfaUser,
}

impl LoginKind {
    /// Tag recorded on aggregated subscriptions.
    pub fn user_type(&self) -> &'static str {
        match self {
            LoginKind::ServicePrincipal => "servicePrincipal",
            LoginKind::User | LoginKind::MfaUser => "user",
        }
    }
}

/// Input to [`SubscriptionResolver::load`](super::SubscriptionResolver::load).
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// UPN for user logins, application id for service principals.
    pub username: String,
    /// Password or client secret. Not required for the device-code flow.
    pub secret: Option<String>,
    /// Explicit tenant to log into; defaults to the common tenant.
    pub tenant: Option<String>,
    pub kind: LoginKind,
}

/// Outcome of a successful login: every reachable subscription, plus the
/// tenants that were considered, both in enumeration order.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub subscriptions: Vec<SubscriptionRecord>,
    pub tenant_ids: Vec<String>,
}

/// A directory tenant paired with the credential valid for querying it.
/// Built during tenant-list construction, consumed once, never persisted.
#[derive(Debug, Clone)]
pub struct TenantInfo {
    pub tenant_id: String,
    pub credential: CacheEntry,
}

/// One cloud subscription, tagged with the tenant and identity it was
/// reached through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub display_name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Device-code challenge returned by
/// [`acquire_user_code`](super::AuthenticationContext::acquire_user_code).
/// The `message` is provider text ready to show to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserCodeResponse {
    pub user_code: String,
    pub device_code: String,
    pub verification_url: String,
    pub message: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Canonicalize a supplied username. Service-principal identities bypass
/// this; directory UPNs are matched case-insensitively everywhere.
pub fn normalize_user_name(name: &str) -> String {
    name.trim().to_lowercase()
}

//! Account and credential core: deduplicated token caching and multi-tenant
//! subscription resolution.
//!
//! [`TokenCache`] is the lazily-loaded, deduplicating view over a
//! [`TokenStore`]; [`SubscriptionResolver`] turns a [`LoginRequest`] into the
//! subscriptions that identity can reach. The network-facing pieces —
//! [`AuthenticationContext`] and [`DirectoryClient`] — are traits the
//! embedding application implements.

pub mod cache;
pub mod constants;
pub mod context;
pub mod directory;
pub mod models;
pub mod resolver;
pub mod store;

pub use cache::TokenCache;
pub use context::AuthenticationContext;
pub use directory::DirectoryClient;
pub use models::{
    CacheEntry, CacheQuery, LoginKind, LoginRequest, LoginResult, SubscriptionRecord, TenantInfo,
    UserCodeResponse, normalize_user_name,
};
pub use resolver::SubscriptionResolver;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

//! Credential caching and multi-tenant subscription resolution for Azure
//! management CLIs.
//!
//! The embedding CLI supplies the wire-protocol collaborators
//! ([`AuthenticationContext`], [`DirectoryClient`], and optionally a secure
//! [`TokenStore`]); this crate owns the cache semantics and the login
//! orchestration.

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{
    AuthenticationContext, CacheEntry, CacheQuery, DirectoryClient, FileTokenStore, LoginKind,
    LoginRequest, LoginResult, MemoryTokenStore, SubscriptionRecord, SubscriptionResolver,
    TenantInfo, TokenCache, TokenStore, UserCodeResponse,
};
pub use config::{Config, Environment};
pub use error::{AuthError, ConfigError, ProviderError, Result, StoreError};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::auth::constants::{MFA_REQUIRED_CODES, USER_NOT_IN_DIRECTORY_CODES};

/// Errors surfaced by the account core.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The directory demands multi-factor authentication for this login.
    /// Callers should retry the same request with `LoginKind::MfaUser`.
    #[error(
        "multi-factor authentication is required for '{user}'; retry with an interactive login ({detail})"
    )]
    MfaRequired { user: String, detail: String },

    #[error(
        "this account type cannot be used here ({detail}); log in with an organizational (work or school) account, or use a service principal"
    )]
    UnsupportedAccountType { detail: String },

    /// The identity provider signed us in as someone other than the
    /// requested user (typically a canonicalized UPN that doesn't match).
    #[error("signed in as '{actual}', but '{expected}' was requested")]
    IdentityMismatch { expected: String, actual: String },

    #[error("invalid login request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AuthError {
    /// Machine-checkable marker for the MFA retry path.
    pub fn is_mfa_required(&self) -> bool {
        matches!(self, AuthError::MfaRequired { .. })
    }
}

/// Errors from the durable token store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token store entry format error: {0}")]
    Format(#[from] serde_json::Error),

    /// Known signature from OS-keychain backends. Callers surface
    /// remediation guidance (unlock the keychain) instead of the raw error.
    #[error("the OS keychain is locked; unlock it and try again")]
    KeychainLocked,

    #[error("token store error: {0}")]
    Other(String),
}

/// Errors for the environment configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,

    #[error("config file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

static AADSTS_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AADSTS(\d+)").expect("static error-code pattern"));

/// A failure reported by the identity provider's token endpoint.
///
/// Carries the raw message unchanged plus the parsed `AADSTS` error code when
/// one is present, so callers can branch on the code without re-parsing text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<String>,
    pub message: String,
}

impl ProviderError {
    /// Build from raw token-endpoint error text, extracting the `AADSTS`
    /// code if the message carries one.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let code = AADSTS_CODE
            .captures(&message)
            .map(|caps| caps[1].to_string());
        Self { code, message }
    }

    /// The user has no presence in the directory tenant being tried.
    /// During tenant enumeration this tenant is skipped, not fatal.
    pub fn user_not_in_directory(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| USER_NOT_IN_DIRECTORY_CODES.contains(&code))
    }

    /// The directory tenant demands multi-factor authentication.
    pub fn mfa_required(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| MFA_REQUIRED_CODES.contains(&code))
    }

    /// Consumer / live-id accounts the token endpoint cannot serve here.
    pub fn unsupported_account_type(&self) -> bool {
        self.message.contains("unknown AccountType")
            || self.message.contains("Unsupported_AccountType")
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

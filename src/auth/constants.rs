//! Identity and management endpoint constants.

/// Well-known pseudo-tenant that authenticates a user without pinning them to
/// one organization. Tokens issued against it cannot cross directory-tenant
/// boundaries and must be resolved to real tenants before use.
pub const COMMON_TENANT: &str = "common";

/// First-party client id used for user logins when none is configured.
pub const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";

/// Token-endpoint error codes meaning the user has no presence in the
/// directory tenant being tried. Skipped during tenant enumeration.
pub const USER_NOT_IN_DIRECTORY_CODES: [&str; 2] = ["50034", "50000"];

/// Token-endpoint error codes meaning the directory tenant demands
/// multi-factor authentication. Skipped during tenant enumeration; fatal on
/// the primary authentication.
pub const MFA_REQUIRED_CODES: [&str; 6] = ["50072", "50074", "50076", "50077", "50078", "50079"];

/// Environment variable overrides for endpoint resolution.
pub mod env_vars {
    pub const ACTIVE_DIRECTORY_ENDPOINT: &str = "AZURE_ACTIVE_DIRECTORY_ENDPOINT";
    pub const RESOURCE_MANAGER_ENDPOINT: &str = "AZURE_RESOURCE_MANAGER_ENDPOINT";
    pub const MANAGEMENT_RESOURCE: &str = "AZURE_MANAGEMENT_RESOURCE";
    pub const CLIENT_ID: &str = "AZURE_CLIENT_ID";
}

/// Built-in endpoint defaults for the public cloud.
pub mod defaults {
    pub const ACTIVE_DIRECTORY_ENDPOINT: &str = "https://login.microsoftonline.com";
    pub const RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
    pub const MANAGEMENT_RESOURCE: &str = "https://management.core.windows.net/";
}

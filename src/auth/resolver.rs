//! Turns a login request into the flat list of subscriptions that identity
//! can reach, tolerating individual tenant failures.
//!
//! Per-tenant authentication and per-tenant subscription listing both run
//! strictly sequentially: the directory and token endpoints throttle
//! aggressively, and fully resolving one tenant before the next keeps the
//! skip/abort policy unambiguous. Tenants are processed in the order
//! `list_tenants` returns them, and the aggregate preserves that order.

use log::{debug, info, warn};

use super::constants::COMMON_TENANT;
use super::context::AuthenticationContext;
use super::directory::DirectoryClient;
use super::models::{
    CacheEntry, LoginKind, LoginRequest, LoginResult, SubscriptionRecord, TenantInfo,
    UserCodeResponse, normalize_user_name,
};
use crate::config::Environment;
use crate::error::{AuthError, Result};

type UserCodePrompt = Box<dyn Fn(&UserCodeResponse) + Send + Sync>;

/// Resolves a login identity to its reachable subscriptions.
///
/// One execution per [`load`](Self::load) call; no state survives between
/// calls. The collaborators own all network I/O.
pub struct SubscriptionResolver<A, D> {
    environment: Environment,
    context: A,
    directory: D,
    user_code_prompt: Option<UserCodePrompt>,
}

impl<A: AuthenticationContext, D: DirectoryClient> SubscriptionResolver<A, D> {
    pub fn new(environment: Environment, context: A, directory: D) -> Self {
        Self {
            environment,
            context,
            directory,
            user_code_prompt: None,
        }
    }

    /// Install a handler that surfaces the device-code challenge to the
    /// user. Without one, the provider's instruction message is logged.
    pub fn on_user_code(mut self, prompt: impl Fn(&UserCodeResponse) + Send + Sync + 'static) -> Self {
        self.user_code_prompt = Some(Box::new(prompt));
        self
    }

    /// Authenticate `request` and aggregate every subscription its identity
    /// can reach, together with the tenant IDs considered.
    pub async fn load(&self, request: &LoginRequest) -> Result<LoginResult> {
        let tenants = match request.kind {
            LoginKind::ServicePrincipal => self.service_principal_tenants(request).await?,
            LoginKind::MfaUser => self.device_flow_tenants(request).await?,
            LoginKind::User => self.password_tenants(request).await?,
        };

        let tenant_ids: Vec<String> = tenants.iter().map(|t| t.tenant_id.clone()).collect();
        let subscriptions = self.aggregate_subscriptions(&tenants, request).await?;
        info!(
            "login resolved {} subscriptions across {} tenants",
            subscriptions.len(),
            tenant_ids.len()
        );

        Ok(LoginResult {
            subscriptions,
            tenant_ids,
        })
    }

    /// Service principals authenticate once with a client secret; the token's
    /// tenant is the complete tenant list, with no enumeration.
    async fn service_principal_tenants(&self, request: &LoginRequest) -> Result<Vec<TenantInfo>> {
        let secret = request.secret.as_deref().ok_or_else(|| {
            AuthError::InvalidRequest("a service principal login requires a client secret".into())
        })?;
        let tenant = request.tenant.as_deref().unwrap_or(COMMON_TENANT);
        let authority = self.environment.authority_url(tenant);

        info!(
            "authenticating service principal '{}' against tenant '{}'",
            request.username, tenant
        );
        let credential = self
            .context
            .acquire_token_with_client_secret(
                &authority,
                &self.environment.management_resource(),
                &request.username,
                secret,
            )
            .await?;

        Ok(vec![Self::single_tenant(credential, tenant)])
    }

    /// Interactive device-code flow. The exchange yields exactly one
    /// authenticated context, so the returned token's tenant is authoritative
    /// and no enumeration happens.
    async fn device_flow_tenants(&self, request: &LoginRequest) -> Result<Vec<TenantInfo>> {
        let tenant = request.tenant.as_deref().unwrap_or(COMMON_TENANT);
        let authority = self.environment.authority_url(tenant);
        let resource = self.environment.management_resource();
        let client_id = self.environment.client_id();

        let user_code = self
            .context
            .acquire_user_code(&authority, &resource, &client_id)
            .await?;
        self.surface_user_code(&user_code);

        let credential = self
            .context
            .acquire_token_with_device_code(&authority, &resource, &client_id, &user_code)
            .await?;
        self.cross_check_identity(&request.username, &credential)?;

        Ok(vec![Self::single_tenant(credential, tenant)])
    }

    /// Username/password flow. An explicit tenant is used as-is; a common
    /// login is resolved by enumerating the identity's directory tenants and
    /// re-authenticating against each one, because a common token cannot
    /// cross directory-tenant boundaries.
    async fn password_tenants(&self, request: &LoginRequest) -> Result<Vec<TenantInfo>> {
        let username = normalize_user_name(&request.username);
        let password = request.secret.as_deref().ok_or_else(|| {
            AuthError::InvalidRequest("a username/password login requires a password".into())
        })?;
        let tenant = request.tenant.as_deref().unwrap_or(COMMON_TENANT);
        let authority = self.environment.authority_url(tenant);
        let resource = self.environment.management_resource();
        let client_id = self.environment.client_id();

        info!("authenticating '{}' against tenant '{}'", username, tenant);
        let credential = match self
            .context
            .acquire_token_with_username_password(
                &authority, &resource, &username, password, &client_id,
            )
            .await
        {
            Ok(credential) => credential,
            Err(err) => return Err(self.classify_primary_failure(&username, err)),
        };
        self.cross_check_identity(&username, &credential)?;

        if request.tenant.is_some() {
            return Ok(vec![Self::single_tenant(credential, tenant)]);
        }
        self.enumerate_tenants(&username, password, &client_id, &resource, &credential)
            .await
    }

    /// Re-authenticate against every directory tenant the identity belongs
    /// to, one at a time. Not-a-member and MFA-demanding tenants are skipped
    /// with a warning; any other failure aborts the whole login.
    async fn enumerate_tenants(
        &self,
        username: &str,
        password: &str,
        client_id: &str,
        resource: &str,
        common_credential: &CacheEntry,
    ) -> Result<Vec<TenantInfo>> {
        let tenant_ids = self.directory.list_tenants(common_credential).await?;
        debug!("'{}' belongs to {} directory tenants", username, tenant_ids.len());

        let mut tenants = Vec::with_capacity(tenant_ids.len());
        for tenant_id in tenant_ids {
            let authority = self.environment.authority_url(&tenant_id);
            match self
                .context
                .acquire_token_with_username_password(
                    &authority, resource, username, password, client_id,
                )
                .await
            {
                Ok(credential) => {
                    self.cross_check_identity(username, &credential)?;
                    tenants.push(TenantInfo {
                        tenant_id,
                        credential,
                    });
                }
                Err(AuthError::Provider(ref provider)) if provider.user_not_in_directory() => {
                    warn!(
                        "'{}' has no presence in tenant '{}', skipping it",
                        username, tenant_id
                    );
                }
                Err(AuthError::Provider(ref provider)) if provider.mfa_required() => {
                    warn!(
                        "tenant '{}' requires multi-factor authentication and was skipped; \
                         to include it, log in again with --tenant {}",
                        tenant_id, tenant_id
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(tenants)
    }

    /// List subscriptions for each tenant credential, one tenant at a time,
    /// tagging each record with the tenant and identity it was reached
    /// through. Unlike tenant enumeration, any failure here is fatal.
    async fn aggregate_subscriptions(
        &self,
        tenants: &[TenantInfo],
        request: &LoginRequest,
    ) -> Result<Vec<SubscriptionRecord>> {
        let username = match request.kind {
            LoginKind::ServicePrincipal => request.username.clone(),
            _ if !request.username.is_empty() => normalize_user_name(&request.username),
            // device-code logins may not know the identity up front
            _ => tenants
                .first()
                .map(|t| t.credential.user_id.clone())
                .unwrap_or_default(),
        };
        let user_type = request.kind.user_type();

        let mut all = Vec::new();
        for tenant in tenants {
            debug!("listing subscriptions in tenant '{}'", tenant.tenant_id);
            let mut subscriptions = self.directory.list_subscriptions(&tenant.credential).await?;
            for subscription in &mut subscriptions {
                subscription.tenant_id = tenant.tenant_id.clone();
                subscription.username = username.clone();
                subscription.user_type = user_type.to_string();
            }
            info!(
                "found {} subscriptions in tenant '{}'",
                subscriptions.len(),
                tenant.tenant_id
            );
            all.extend(subscriptions);
        }
        Ok(all)
    }

    /// The provider may canonicalize the UPN; a mismatch with the requested
    /// user means we'd silently operate as the wrong account, which is fatal.
    fn cross_check_identity(&self, expected: &str, credential: &CacheEntry) -> Result<()> {
        if expected.is_empty() || credential.user_id.is_empty() {
            return Ok(());
        }
        if credential.user_id.to_lowercase() != expected.to_lowercase() {
            return Err(AuthError::IdentityMismatch {
                expected: expected.to_string(),
                actual: credential.user_id.clone(),
            });
        }
        Ok(())
    }

    /// On the primary authentication there is no tenant list to fall back
    /// on, so MFA demands and unusable account types become their dedicated
    /// error classes; everything else passes through unchanged.
    fn classify_primary_failure(&self, user: &str, err: AuthError) -> AuthError {
        let AuthError::Provider(provider) = &err else {
            return err;
        };
        if provider.mfa_required() {
            return AuthError::MfaRequired {
                user: user.to_string(),
                detail: provider.message.clone(),
            };
        }
        if provider.unsupported_account_type() {
            return AuthError::UnsupportedAccountType {
                detail: provider.message.clone(),
            };
        }
        err
    }

    fn surface_user_code(&self, user_code: &UserCodeResponse) {
        info!("device code issued: {}", user_code.user_code);
        match &self.user_code_prompt {
            Some(prompt) => prompt(user_code),
            None => info!("{}", user_code.message),
        }
    }

    fn single_tenant(credential: CacheEntry, requested_tenant: &str) -> TenantInfo {
        // prefer the tenant the token was actually issued for
        let tenant_id = if credential.tenant_id.is_empty() {
            requested_tenant.to_string()
        } else {
            credential.tenant_id.clone()
        };
        TenantInfo {
            tenant_id,
            credential,
        }
    }
}

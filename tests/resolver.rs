//! Integration tests for subscription resolution.
//!
//! Collaborators are scripted per tenant: the token endpoint and directory
//! client replay configured outcomes, recording call order so the sequential
//! processing guarantees can be asserted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::Map;

use azure_account::{
    AuthError, AuthenticationContext, CacheEntry, DirectoryClient, Environment, LoginKind,
    LoginRequest, ProviderError, SubscriptionRecord, SubscriptionResolver, UserCodeResponse,
};

fn entry(user: &str, tenant: &str) -> CacheEntry {
    CacheEntry {
        authority: format!("https://login.microsoftonline.com/{tenant}"),
        client_id: "c1".into(),
        user_id: user.into(),
        tenant_id: tenant.into(),
        resource: "https://management.core.windows.net/".into(),
        access_token: format!("token-{tenant}"),
        refresh_token: None,
        expires_on: Utc.timestamp_opt(4_000_000_000, 0).unwrap(),
        extra: Map::new(),
    }
}

fn subscription(id: &str, name: &str) -> SubscriptionRecord {
    SubscriptionRecord {
        subscription_id: id.into(),
        display_name: name.into(),
        tenant_id: String::new(),
        username: String::new(),
        user_type: String::new(),
        state: Some("Enabled".into()),
    }
}

fn tenant_of(authority: &str) -> String {
    authority.rsplit('/').next().unwrap_or_default().to_string()
}

/// Scripted token endpoint. Per-tenant outcomes are keyed by the authority's
/// tenant segment; an `Err` value is raw provider error text. Tenants with
/// no script succeed with a token for the authenticated user.
#[derive(Default)]
struct ScriptedContext {
    outcomes: HashMap<String, std::result::Result<CacheEntry, String>>,
    device_token: Option<std::result::Result<CacheEntry, String>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedContext {
    fn resolve(
        &self,
        tenant: &str,
        fallback: impl FnOnce() -> CacheEntry,
    ) -> std::result::Result<CacheEntry, AuthError> {
        self.calls.lock().unwrap().push(tenant.to_string());
        match self.outcomes.get(tenant) {
            Some(Ok(credential)) => Ok(credential.clone()),
            Some(Err(message)) => Err(ProviderError::from_message(message.clone()).into()),
            None => Ok(fallback()),
        }
    }
}

#[async_trait]
impl AuthenticationContext for ScriptedContext {
    async fn acquire_token(
        &self,
        authority: &str,
        _resource: &str,
        user_id: &str,
        _client_id: &str,
    ) -> std::result::Result<CacheEntry, AuthError> {
        let tenant = tenant_of(authority);
        self.resolve(&tenant, || entry(user_id, &tenant))
    }

    async fn acquire_token_with_username_password(
        &self,
        authority: &str,
        _resource: &str,
        username: &str,
        _password: &str,
        _client_id: &str,
    ) -> std::result::Result<CacheEntry, AuthError> {
        let tenant = tenant_of(authority);
        self.resolve(&tenant, || entry(username, &tenant))
    }

    async fn acquire_token_with_client_secret(
        &self,
        authority: &str,
        _resource: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> std::result::Result<CacheEntry, AuthError> {
        let tenant = tenant_of(authority);
        // service-principal tokens carry no UPN claim
        self.resolve(&tenant, || entry("", &tenant))
    }

    async fn acquire_user_code(
        &self,
        _authority: &str,
        _resource: &str,
        _client_id: &str,
    ) -> std::result::Result<UserCodeResponse, AuthError> {
        Ok(UserCodeResponse {
            user_code: "ABC123".into(),
            device_code: "device-code-1".into(),
            verification_url: "https://microsoft.com/devicelogin".into(),
            message: "enter ABC123 at https://microsoft.com/devicelogin".into(),
            expires_in: Some(900),
            interval: Some(5),
        })
    }

    async fn acquire_token_with_device_code(
        &self,
        _authority: &str,
        _resource: &str,
        _client_id: &str,
        user_code: &UserCodeResponse,
    ) -> std::result::Result<CacheEntry, AuthError> {
        assert_eq!(user_code.device_code, "device-code-1");
        match self.device_token.as_ref().expect("device token scripted") {
            Ok(credential) => Ok(credential.clone()),
            Err(message) => Err(ProviderError::from_message(message.clone()).into()),
        }
    }
}

/// Scripted directory: a fixed tenant list and per-tenant subscription
/// outcomes, keyed by the credential's tenant.
#[derive(Default)]
struct ScriptedDirectory {
    tenants: Vec<String>,
    subscriptions: HashMap<String, std::result::Result<Vec<SubscriptionRecord>, String>>,
    tenant_list_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DirectoryClient for ScriptedDirectory {
    async fn list_tenants(
        &self,
        _credential: &CacheEntry,
    ) -> std::result::Result<Vec<String>, AuthError> {
        self.tenant_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tenants.clone())
    }

    async fn list_subscriptions(
        &self,
        credential: &CacheEntry,
    ) -> std::result::Result<Vec<SubscriptionRecord>, AuthError> {
        match self.subscriptions.get(&credential.tenant_id) {
            Some(Ok(subscriptions)) => Ok(subscriptions.clone()),
            Some(Err(message)) => Err(ProviderError::from_message(message.clone()).into()),
            None => Ok(Vec::new()),
        }
    }
}

fn resolver(
    context: ScriptedContext,
    directory: ScriptedDirectory,
) -> SubscriptionResolver<ScriptedContext, ScriptedDirectory> {
    let _ = env_logger::builder().is_test(true).try_init();
    SubscriptionResolver::new(Environment::public_cloud(), context, directory)
}

fn user_login(username: &str, tenant: Option<&str>) -> LoginRequest {
    LoginRequest {
        username: username.into(),
        secret: Some("hunter2".into()),
        tenant: tenant.map(String::from),
        kind: LoginKind::User,
    }
}

#[tokio::test]
async fn explicit_tenant_login_skips_enumeration() -> Result<()> {
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into()],
        subscriptions: HashMap::from([("t1".into(), Ok(vec![subscription("s1", "Production")]))]),
        ..Default::default()
    };
    let tenant_list_calls = directory.tenant_list_calls.clone();

    let result = resolver(ScriptedContext::default(), directory)
        .load(&user_login("a@x.com", Some("t1")))
        .await?;

    assert_eq!(result.tenant_ids, vec!["t1"]);
    assert_eq!(result.subscriptions.len(), 1);
    assert_eq!(result.subscriptions[0].tenant_id, "t1");
    assert_eq!(result.subscriptions[0].username, "a@x.com");
    assert_eq!(result.subscriptions[0].user_type, "user");
    assert_eq!(tenant_list_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn common_login_aggregates_across_all_tenants_in_order() -> Result<()> {
    let context = ScriptedContext::default();
    let calls = context.calls.clone();
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into(), "t3".into()],
        subscriptions: HashMap::from([
            (
                "t1".into(),
                Ok(vec![subscription("s1", "One"), subscription("s2", "Two")]),
            ),
            ("t2".into(), Ok(vec![subscription("s3", "Three")])),
            ("t3".into(), Ok(vec![subscription("s4", "Four")])),
        ]),
        ..Default::default()
    };

    let result = resolver(context, directory)
        .load(&user_login("A@X.com", None))
        .await?;

    assert_eq!(result.tenant_ids, vec!["t1", "t2", "t3"]);
    let ids: Vec<&str> = result
        .subscriptions
        .iter()
        .map(|s| s.subscription_id.as_str())
        .collect();
    // all of tenant i's subscriptions come before tenant i+1's
    assert_eq!(ids, vec!["s1", "s2", "s3", "s4"]);
    assert!(result.subscriptions.iter().all(|s| s.username == "a@x.com"));

    // the common authentication first, then one per tenant, in list order
    assert_eq!(*calls.lock().unwrap(), vec!["common", "t1", "t2", "t3"]);
    Ok(())
}

#[tokio::test]
async fn mfa_locked_tenant_is_skipped_not_fatal() -> Result<()> {
    let context = ScriptedContext {
        outcomes: HashMap::from([(
            "t2".into(),
            Err("AADSTS50076: multi-factor authentication required".into()),
        )]),
        ..Default::default()
    };
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into(), "t3".into()],
        subscriptions: HashMap::from([
            ("t1".into(), Ok(vec![subscription("s1", "One")])),
            ("t2".into(), Ok(vec![subscription("s2", "Locked")])),
            ("t3".into(), Ok(vec![subscription("s3", "Three")])),
        ]),
        ..Default::default()
    };

    let result = resolver(context, directory)
        .load(&user_login("a@x.com", None))
        .await?;

    assert_eq!(result.tenant_ids, vec!["t1", "t3"]);
    let ids: Vec<&str> = result
        .subscriptions
        .iter()
        .map(|s| s.subscription_id.as_str())
        .collect();
    assert_eq!(ids, vec!["s1", "s3"]);
    Ok(())
}

#[tokio::test]
async fn unknown_directory_member_is_skipped_silently() -> Result<()> {
    let context = ScriptedContext {
        outcomes: HashMap::from([(
            "external".into(),
            Err("AADSTS50034: the user account does not exist in the external directory".into()),
        )]),
        ..Default::default()
    };
    let directory = ScriptedDirectory {
        tenants: vec!["home".into(), "external".into()],
        subscriptions: HashMap::from([("home".into(), Ok(vec![subscription("s1", "Home")]))]),
        ..Default::default()
    };

    let result = resolver(context, directory)
        .load(&user_login("a@x.com", None))
        .await?;

    assert_eq!(result.tenant_ids, vec!["home"]);
    assert_eq!(result.subscriptions.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unclassified_tenant_failure_aborts_the_login() {
    let context = ScriptedContext {
        outcomes: HashMap::from([("t2".into(), Err("connection timed out".into()))]),
        ..Default::default()
    };
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into(), "t3".into()],
        subscriptions: HashMap::from([("t1".into(), Ok(vec![subscription("s1", "One")]))]),
        ..Default::default()
    };

    let err = resolver(context, directory)
        .load(&user_login("a@x.com", None))
        .await
        .unwrap_err();

    match err {
        AuthError::Provider(provider) => {
            assert_eq!(provider.message, "connection timed out");
            assert_eq!(provider.code, None);
        }
        other => panic!("expected pass-through provider error, got {other:?}"),
    }
}

#[tokio::test]
async fn subscription_listing_failure_is_always_fatal() {
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into()],
        subscriptions: HashMap::from([
            ("t1".into(), Ok(vec![subscription("s1", "One")])),
            ("t2".into(), Err("AADSTS50076: mfa required".into())),
        ]),
        ..Default::default()
    };

    // the permissive skip policy applies to tenant enumeration only
    let err = resolver(ScriptedContext::default(), directory)
        .load(&user_login("a@x.com", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Provider(_)));
}

#[tokio::test]
async fn identity_mismatch_is_fatal() {
    let context = ScriptedContext {
        outcomes: HashMap::from([("common".into(), Ok(entry("a@x.com", "common")))]),
        ..Default::default()
    };

    let err = resolver(context, ScriptedDirectory::default())
        .load(&user_login("b@x.com", None))
        .await
        .unwrap_err();

    match err {
        AuthError::IdentityMismatch { expected, actual } => {
            assert_eq!(expected, "b@x.com");
            assert_eq!(actual, "a@x.com");
        }
        other => panic!("expected identity mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn canonicalized_upn_case_is_not_a_mismatch() -> Result<()> {
    let context = ScriptedContext {
        outcomes: HashMap::from([("t1".into(), Ok(entry("a@x.com", "t1")))]),
        ..Default::default()
    };

    let result = resolver(context, ScriptedDirectory::default())
        .load(&user_login("A@X.COM", Some("t1")))
        .await?;
    assert_eq!(result.tenant_ids, vec!["t1"]);
    Ok(())
}

#[tokio::test]
async fn mfa_on_primary_authentication_is_machine_checkable() {
    let context = ScriptedContext {
        outcomes: HashMap::from([(
            "common".into(),
            Err("AADSTS50079: the user must enroll for multi-factor authentication".into()),
        )]),
        ..Default::default()
    };

    let err = resolver(context, ScriptedDirectory::default())
        .load(&user_login("a@x.com", None))
        .await
        .unwrap_err();

    assert!(err.is_mfa_required());
}

#[tokio::test]
async fn consumer_account_gets_actionable_error() {
    let context = ScriptedContext {
        outcomes: HashMap::from([(
            "common".into(),
            Err("Server returned an unknown AccountType: undefined".into()),
        )]),
        ..Default::default()
    };

    let err = resolver(context, ScriptedDirectory::default())
        .load(&user_login("someone@live.com", None))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UnsupportedAccountType { .. }));
    assert!(err.to_string().contains("organizational"));
    assert!(err.to_string().contains("service principal"));
}

#[tokio::test]
async fn service_principal_authenticates_once_without_enumeration() -> Result<()> {
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into()],
        subscriptions: HashMap::from([(
            "sp-tenant".into(),
            Ok(vec![subscription("s1", "App Subscription")]),
        )]),
        ..Default::default()
    };
    let tenant_list_calls = directory.tenant_list_calls.clone();

    let request = LoginRequest {
        username: "11111111-2222-3333-4444-555555555555".into(),
        secret: Some("sp-secret".into()),
        tenant: Some("sp-tenant".into()),
        kind: LoginKind::ServicePrincipal,
    };
    let result = resolver(ScriptedContext::default(), directory)
        .load(&request)
        .await?;

    assert_eq!(result.tenant_ids, vec!["sp-tenant"]);
    assert_eq!(result.subscriptions[0].user_type, "servicePrincipal");
    assert_eq!(
        result.subscriptions[0].username,
        "11111111-2222-3333-4444-555555555555"
    );
    assert_eq!(tenant_list_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn service_principal_without_secret_is_rejected() {
    let request = LoginRequest {
        username: "app-id".into(),
        secret: None,
        tenant: Some("t1".into()),
        kind: LoginKind::ServicePrincipal,
    };
    let err = resolver(ScriptedContext::default(), ScriptedDirectory::default())
        .load(&request)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRequest(_)));
}

#[tokio::test]
async fn device_code_flow_uses_the_resolved_tenant_only() -> Result<()> {
    let context = ScriptedContext {
        device_token: Some(Ok(entry("user@x.com", "home-tenant"))),
        ..Default::default()
    };
    let directory = ScriptedDirectory {
        tenants: vec!["home-tenant".into(), "other-tenant".into()],
        subscriptions: HashMap::from([(
            "home-tenant".into(),
            Ok(vec![subscription("s1", "Home")]),
        )]),
        ..Default::default()
    };
    let tenant_list_calls = directory.tenant_list_calls.clone();

    let surfaced = Arc::new(Mutex::new(None));
    let sink = surfaced.clone();
    let request = LoginRequest {
        username: "User@X.com".into(),
        secret: None,
        tenant: None,
        kind: LoginKind::MfaUser,
    };
    let result = SubscriptionResolver::new(Environment::public_cloud(), context, directory)
        .on_user_code(move |code| {
            *sink.lock().unwrap() = Some(code.message.clone());
        })
        .load(&request)
        .await?;

    // the device-code exchange yields one authenticated context; its tenant
    // is authoritative and no per-tenant re-authentication happens
    assert_eq!(result.tenant_ids, vec!["home-tenant"]);
    assert_eq!(result.subscriptions[0].username, "user@x.com");
    assert_eq!(tenant_list_calls.load(Ordering::SeqCst), 0);

    let message = surfaced.lock().unwrap().clone().expect("code surfaced");
    assert!(message.contains("ABC123"));
    Ok(())
}

#[tokio::test]
async fn device_code_identity_mismatch_is_fatal() {
    let context = ScriptedContext {
        device_token: Some(Ok(entry("other@x.com", "home-tenant"))),
        ..Default::default()
    };
    let request = LoginRequest {
        username: "user@x.com".into(),
        secret: None,
        tenant: None,
        kind: LoginKind::MfaUser,
    };
    let err = resolver(context, ScriptedDirectory::default())
        .load(&request)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::IdentityMismatch { .. }));
}

#[tokio::test]
async fn tenants_without_subscriptions_still_count_as_considered() -> Result<()> {
    let directory = ScriptedDirectory {
        tenants: vec!["t1".into(), "t2".into()],
        subscriptions: HashMap::from([("t1".into(), Ok(vec![subscription("s1", "One")]))]),
        ..Default::default()
    };

    let result = resolver(ScriptedContext::default(), directory)
        .load(&user_login("a@x.com", None))
        .await?;

    assert_eq!(result.tenant_ids, vec!["t1", "t2"]);
    assert_eq!(result.subscriptions.len(), 1);
    Ok(())
}

//! Cloud environment configuration.
//!
//! Endpoint fields on [`Environment`] are raw overrides; use the accessor
//! methods, which resolve *override → process environment variable →
//! built-in default*. Environments persist to a TOML config file under the
//! platform config directory.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::auth::constants::{COMMON_TENANT, DEFAULT_CLIENT_ID, defaults, env_vars};
use crate::error::ConfigError;

/// A named cloud environment and its endpoint set.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_directory_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_manager_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl Environment {
    /// The public cloud, with all endpoints at their defaults.
    pub fn public_cloud() -> Self {
        Self {
            name: "AzureCloud".into(),
            ..Default::default()
        }
    }

    fn resolve(override_value: &Option<String>, env_var: &str, default: &str) -> String {
        if let Some(value) = override_value {
            return value.clone();
        }
        std::env::var(env_var).unwrap_or_else(|_| default.to_string())
    }

    pub fn active_directory_endpoint(&self) -> String {
        Self::resolve(
            &self.active_directory_endpoint,
            env_vars::ACTIVE_DIRECTORY_ENDPOINT,
            defaults::ACTIVE_DIRECTORY_ENDPOINT,
        )
    }

    pub fn resource_manager_endpoint(&self) -> String {
        Self::resolve(
            &self.resource_manager_endpoint,
            env_vars::RESOURCE_MANAGER_ENDPOINT,
            defaults::RESOURCE_MANAGER_ENDPOINT,
        )
    }

    /// Resource URI tokens are requested for.
    pub fn management_resource(&self) -> String {
        Self::resolve(
            &self.management_resource,
            env_vars::MANAGEMENT_RESOURCE,
            defaults::MANAGEMENT_RESOURCE,
        )
    }

    pub fn client_id(&self) -> String {
        Self::resolve(&self.client_id, env_vars::CLIENT_ID, DEFAULT_CLIENT_ID)
    }

    /// Authority URL for a tenant: the directory endpoint with the tenant as
    /// the last path segment.
    pub fn authority_url(&self, tenant: &str) -> String {
        format!(
            "{}/{}",
            self.active_directory_endpoint().trim_end_matches('/'),
            tenant
        )
    }

    pub fn common_authority(&self) -> String {
        self.authority_url(COMMON_TENANT)
    }
}

/// Persisted environment configuration.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub current_environment: Option<String>,
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
}

impl Config {
    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = if cfg!(target_os = "linux") {
            dirs::config_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join("azure-account")
        } else {
            dirs::home_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join(".azure-account")
        };

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
            info!("created config directory: {:?}", config_dir);
        }

        Ok(config_dir.join("config.toml"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        debug!("loading config from: {:?}", config_path);

        if !config_path.exists() {
            info!("config file doesn't exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        debug!("loaded config with {} environments", config.environments.len());
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::get_config_path()?;
        debug!("saving config to: {:?}", config_path);

        let content = toml::to_string_pretty(self)?;
        fs::write(&config_path, content)?;

        info!("config saved successfully");
        Ok(())
    }

    pub fn add_environment(&mut self, environment: Environment) {
        info!("adding environment: {}", environment.name);
        let name = environment.name.clone();
        self.environments.insert(name.clone(), environment);

        if self.current_environment.is_none() {
            self.current_environment = Some(name);
        }
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }

    /// The configured current environment, falling back to the public cloud.
    pub fn current_environment(&self) -> Environment {
        self.current_environment
            .as_ref()
            .and_then(|name| self.environments.get(name))
            .cloned()
            .unwrap_or_else(Environment::public_cloud)
    }
}

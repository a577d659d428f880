//! Environment configuration.
//!
//! Serialized per environment inside the state note, and read from
//! `.container-use/environment.json` under the source repository when a new
//! environment has no state yet. Env and secret maps are insertion-ordered
//! (display order matches declaration order); last write wins per key.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::ContainerUseError;

/// Default container image for new environments.
pub const DEFAULT_BASE_IMAGE: &str = "ubuntu:24.04";

/// Default working directory inside the container.
pub const DEFAULT_WORKDIR: &str = "/workdir";

/// Relative path of the on-disk defaults file under the source repository.
pub const CONFIG_FILE_PATH: &str = ".container-use/environment.json";

/// Configuration of one environment's container and sidecars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Container image reference the base container is built from
    #[serde(default = "default_base_image")]
    pub base_image: String,

    /// Absolute path inside the container where the source tree is mounted
    #[serde(default = "default_workdir")]
    pub workdir: String,

    /// Shell commands run before the source tree is mounted (cacheable)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup_commands: Vec<String>,

    /// Shell commands run after the source tree is mounted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install_commands: Vec<String>,

    /// Environment variables, insertion-ordered
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Secret URIs (`file://path`, `env://NAME`, `op://vault/item/field`),
    /// resolved into protected variables at container-construction time
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, String>,

    /// Sidecar services started with the environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceConfig>,
}

fn default_base_image() -> String {
    DEFAULT_BASE_IMAGE.to_string()
}

fn default_workdir() -> String {
    DEFAULT_WORKDIR.to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            workdir: default_workdir(),
            setup_commands: Vec::new(),
            install_commands: Vec::new(),
            env: IndexMap::new(),
            secrets: IndexMap::new(),
            services: Vec::new(),
        }
    }
}

impl EnvironmentConfig {
    /// Load defaults for a source repository.
    ///
    /// Reads `.container-use/environment.json` when present; otherwise the
    /// built-in defaults. Only consulted when an environment has no state
    /// note yet.
    pub fn load_defaults(source_repo: &Path) -> Result<Self> {
        let path = source_repo.join(CONFIG_FILE_PATH);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate secret URIs and service name uniqueness.
    pub fn validate(&self) -> Result<()> {
        for (name, uri) in &self.secrets {
            validate_secret_uri(name, uri)?;
        }
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            for (name, uri) in &service.secrets {
                validate_secret_uri(name, uri)?;
            }
            if !seen.insert(service.name.as_str()) {
                return Err(ContainerUseError::ConfigError {
                    message: format!("duplicate service name '{}'", service.name),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Replace the env map from a list of `KEY=VALUE` strings.
    ///
    /// The list replaces the map wholesale; a variable omitted from the list
    /// is gone. Last write wins for duplicate keys.
    pub fn set_env_list(&mut self, envs: &[String]) -> Result<()> {
        self.env = parse_key_values(envs)?;
        Ok(())
    }

    /// Replace the secrets map from a list of `KEY=uri` strings.
    pub fn set_secret_list(&mut self, secrets: &[String]) -> Result<()> {
        let parsed = parse_key_values(secrets)?;
        for (name, uri) in &parsed {
            validate_secret_uri(name, uri)?;
        }
        self.secrets = parsed;
        Ok(())
    }
}

/// Configuration of one sidecar service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name; unique per environment; also the hostname the service
    /// is bound under inside the environment's network
    pub name: String,

    /// Container image reference
    pub image: String,

    /// Shell command to run instead of the image's default command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// TCP ports the service exposes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,

    /// Environment variables, insertion-ordered
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Secret URIs resolved into protected variables
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, String>,
}

/// Validate a single service configuration (name and secret URIs).
pub fn validate_service(service: &ServiceConfig) -> Result<()> {
    if service.name.is_empty() {
        return Err(ContainerUseError::ConfigError {
            message: "service name must not be empty".to_string(),
        }
        .into());
    }
    for (name, uri) in &service.secrets {
        validate_secret_uri(name, uri)?;
    }
    Ok(())
}

/// Parse `KEY=VALUE` strings into an insertion-ordered map.
pub fn parse_key_values(entries: &[String]) -> Result<IndexMap<String, String>> {
    let mut map = IndexMap::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(ContainerUseError::ConfigError {
                message: format!("expected KEY=VALUE, got '{entry}'"),
            }
            .into());
        };
        if key.is_empty() {
            return Err(ContainerUseError::ConfigError {
                message: format!("empty key in '{entry}'"),
            }
            .into());
        }
        // IndexMap keeps the first insertion position; re-inserting updates
        // the value in place, which is exactly last-write-wins.
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

/// Check that a secret URI uses one of the supported schemes.
pub fn validate_secret_uri(name: &str, uri: &str) -> Result<()> {
    let valid = uri.strip_prefix("file://").is_some_and(|rest| !rest.is_empty())
        || uri.strip_prefix("env://").is_some_and(|rest| !rest.is_empty())
        || uri.strip_prefix("op://").is_some_and(|rest| rest.split('/').count() >= 3);
    if valid {
        Ok(())
    } else {
        Err(ContainerUseError::InvalidSecret {
            name: name.to_string(),
            reason: format!(
                "'{uri}' is not a supported secret reference (file://path, env://NAME, op://vault/item/field)"
            ),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EnvironmentConfig::default();
        assert_eq!(config.base_image, "ubuntu:24.04");
        assert_eq!(config.workdir, "/workdir");
        assert!(config.env.is_empty());
    }

    #[test]
    fn test_load_defaults_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".container-use")).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_PATH),
            r#"{"base_image": "python:3.12", "setup_commands": ["pip install uv"]}"#,
        )
        .unwrap();

        let config = EnvironmentConfig::load_defaults(dir.path()).unwrap();
        assert_eq!(config.base_image, "python:3.12");
        assert_eq!(config.setup_commands, vec!["pip install uv"]);
        // Unspecified fields fall back to the built-in defaults.
        assert_eq!(config.workdir, "/workdir");
    }

    #[test]
    fn test_load_defaults_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EnvironmentConfig::load_defaults(dir.path()).unwrap();
        assert_eq!(config, EnvironmentConfig::default());
    }

    #[test]
    fn test_env_list_is_ordered_and_last_write_wins() {
        let mut config = EnvironmentConfig::default();
        config
            .set_env_list(&[
                "B=2".to_string(),
                "A=1".to_string(),
                "B=3".to_string(),
            ])
            .unwrap();
        let keys: Vec<_> = config.env.keys().cloned().collect();
        assert_eq!(keys, vec!["B", "A"]);
        assert_eq!(config.env["B"], "3");
    }

    #[test]
    fn test_env_list_replaces_previous_values() {
        let mut config = EnvironmentConfig::default();
        config.set_env_list(&["API_URL=https://api.example.com".to_string()]).unwrap();
        config.set_env_list(&[]).unwrap();
        assert!(config.env.get("API_URL").is_none());
    }

    #[test]
    fn test_invalid_env_entry() {
        let mut config = EnvironmentConfig::default();
        assert!(config.set_env_list(&["NO_EQUALS".to_string()]).is_err());
    }

    #[test]
    fn test_secret_uri_validation() {
        assert!(validate_secret_uri("token", "env://GITHUB_TOKEN").is_ok());
        assert!(validate_secret_uri("key", "file:///home/user/.ssh/id_ed25519").is_ok());
        assert!(validate_secret_uri("db", "op://vault/item/password").is_ok());
        assert!(validate_secret_uri("bad", "vault://nope").is_err());
        assert!(validate_secret_uri("bad", "env://").is_err());
    }

    #[test]
    fn test_duplicate_service_names_rejected() {
        let service = ServiceConfig {
            name: "postgres".to_string(),
            image: "postgres:16".to_string(),
            command: None,
            ports: vec![5432],
            env: IndexMap::new(),
            secrets: IndexMap::new(),
        };
        let config = EnvironmentConfig {
            services: vec![service.clone(), service],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

//! Controller configuration
//!
//! Configuration is JSON. Several files may be given; list sections are
//! concatenated in order and scalar settings from later files win.

pub mod access;
pub mod vault;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backends::ServiceConfig;
use crate::error::EyeError;
use crate::query::ValidationRequest;

pub use access::{Access, AccessFinder, StaticAccess};
pub use vault::{VaultClient, VaultConfig};

/// Liveness check over a set of services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingCheckConfig {
    pub name: String,
    pub services: Vec<String>,
}

/// Validation (or comparison) over a set of services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateCheckConfig {
    pub name: String,
    pub services: Vec<String>,
    #[serde(default)]
    pub request: ValidationRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsExporterConfig {
    pub name: String,
    pub services: Vec<String>,
    pub query: String,
    #[serde(default, alias = "evalExpr")]
    pub eval_expr: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub name: String,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub export_folder: PathBuf,
    pub services: Vec<ServiceConfig>,
    pub access: HashMap<String, Access>,
    /// Read access data from Vault on top of `access`
    pub vault: Option<VaultConfig>,

    pub ping_any: Vec<PingCheckConfig>,
    pub ping_all: Vec<PingCheckConfig>,
    pub validate: Vec<ValidateCheckConfig>,
    pub validate_any: Vec<ValidateCheckConfig>,
    pub validate_all: Vec<ValidateCheckConfig>,
    pub validate_running: Vec<ValidateCheckConfig>,
    pub compare_all: Vec<ValidateCheckConfig>,
    pub compare_running: Vec<ValidateCheckConfig>,
    pub fields_exporter: Vec<FieldsExporterConfig>,
    pub executor: Vec<ExecutorConfig>,

    /// Capacity of the ad-hoc check cache
    pub live_checks: u64,
}

impl Default for EyeConfig {
    fn default() -> Self {
        Self {
            name: "eye".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            export_folder: PathBuf::from("./export"),
            services: Vec::new(),
            access: HashMap::new(),
            vault: None,
            ping_any: Vec::new(),
            ping_all: Vec::new(),
            validate: Vec::new(),
            validate_any: Vec::new(),
            validate_all: Vec::new(),
            validate_running: Vec::new(),
            compare_all: Vec::new(),
            compare_running: Vec::new(),
            fields_exporter: Vec::new(),
            executor: Vec::new(),
            live_checks: 1000,
        }
    }
}

impl EyeConfig {
    pub fn from_json(json: &str) -> Result<Self, EyeError> {
        serde_json::from_str(json).map_err(|e| EyeError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EyeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EyeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text).map_err(|e| EyeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load and merge several files in order
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self, EyeError> {
        let mut config = Self::default();
        for (idx, path) in paths.iter().enumerate() {
            let next = Self::load(path)?;
            if idx == 0 {
                config = next;
            } else {
                config.merge(next);
            }
        }
        Ok(config)
    }

    /// Fold another file's settings into this one
    pub fn merge(&mut self, other: EyeConfig) {
        let defaults = EyeConfig::default();
        if other.name != defaults.name {
            self.name = other.name;
        }
        if other.host != defaults.host {
            self.host = other.host;
        }
        if other.port != defaults.port {
            self.port = other.port;
        }
        if other.export_folder != defaults.export_folder {
            self.export_folder = other.export_folder;
        }
        if other.live_checks != defaults.live_checks {
            self.live_checks = other.live_checks;
        }
        self.services.extend(other.services);
        self.access.extend(other.access);
        if other.vault.is_some() {
            self.vault = other.vault;
        }
        self.ping_any.extend(other.ping_any);
        self.ping_all.extend(other.ping_all);
        self.validate.extend(other.validate);
        self.validate_any.extend(other.validate_any);
        self.validate_all.extend(other.validate_all);
        self.validate_running.extend(other.validate_running);
        self.compare_all.extend(other.compare_all);
        self.compare_running.extend(other.compare_running);
        self.fields_exporter.extend(other.fields_exporter);
        self.executor.extend(other.executor);
    }

    /// Apply `EYE_HOST`, `EYE_PORT`, `EYE_EXPORT_FOLDER`, and Vault's own
    /// `VAULT_ADDR` / `VAULT_TOKEN`
    pub fn with_env_overrides(mut self) -> Result<Self, EyeError> {
        if let Ok(host) = std::env::var("EYE_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("EYE_PORT") {
            self.port = port
                .parse()
                .map_err(|_| EyeError::Config(format!("EYE_PORT is not a port: {}", port)))?;
        }
        if let Ok(folder) = std::env::var("EYE_EXPORT_FOLDER") {
            self.export_folder = PathBuf::from(folder);
        }
        if let Ok(address) = std::env::var("VAULT_ADDR") {
            self.vault.get_or_insert_with(VaultConfig::default).address = address;
        }
        if let (Some(vault), Ok(token)) = (self.vault.as_mut(), std::env::var("VAULT_TOKEN")) {
            vault.token = token;
        }
        Ok(self)
    }

    /// Access keys named by services or the `access` section
    pub fn access_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .services
            .iter()
            .filter_map(|s| s.backend.access_key().map(String::from))
            .chain(self.access.keys().cloned())
            .filter(|key| !key.is_empty())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Configured credentials with env overrides
    pub fn access_finder(&self) -> StaticAccess {
        let keys = self.access_keys();
        StaticAccess::new(self.access.clone()).with_env_overrides(keys.iter().map(String::as_str))
    }

    /// Configured credentials, then Vault data when a Vault is configured,
    /// then env overrides
    pub async fn resolve_access(&self) -> Result<StaticAccess, EyeError> {
        let keys = self.access_keys();
        let mut access = StaticAccess::new(self.access.clone());
        if let Some(vault) = &self.vault {
            access = VaultClient::new(vault.clone())?
                .fill(&self.name, &keys, access)
                .await?;
        }
        Ok(access.with_env_overrides(keys.iter().map(String::as_str)))
    }
}

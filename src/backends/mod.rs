//! Backend drivers and their configuration

pub mod elastic;
pub mod fs;
pub mod http;
pub mod memory;
pub mod process;
pub mod sql;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AccessFinder;
use crate::error::EyeError;
use crate::service::{Backend, Service, Timeouts};

pub use elastic::{ElasticBackend, ElasticConfig};
pub use fs::{FsBackend, FsConfig};
pub use http::{HttpBackend, HttpConfig};
pub use memory::{MemoryBackend, MemoryConfig};
pub use process::{ProcessBackend, PsConfig};
pub use sql::MySqlConfig;

/// Backend selection, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Http(HttpConfig),
    Elastic(ElasticConfig),
    Fs(FsConfig),
    Ps(PsConfig),
    Memory(MemoryConfig),
    Mysql(MySqlConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Http(_) => "http",
            BackendConfig::Elastic(_) => "elastic",
            BackendConfig::Fs(_) => "fs",
            BackendConfig::Ps(_) => "ps",
            BackendConfig::Memory(_) => "memory",
            BackendConfig::Mysql(_) => "mysql",
        }
    }

    /// Access key whose credentials the backend needs, if any
    pub fn access_key(&self) -> Option<&str> {
        match self {
            BackendConfig::Http(c) => c.access_key.as_deref(),
            BackendConfig::Elastic(c) => c.access_key.as_deref(),
            BackendConfig::Mysql(c) => Some(c.access_key.as_str()),
            _ => None,
        }
    }

    pub fn build(&self, access: &dyn AccessFinder) -> Result<Arc<dyn Backend>, EyeError> {
        let credentials = self
            .access_key()
            .filter(|key| !key.is_empty())
            .map(|key| access.find_access(key))
            .transpose()?;

        let backend: Arc<dyn Backend> = match self {
            BackendConfig::Http(c) => Arc::new(HttpBackend::new(c.clone(), credentials)?),
            BackendConfig::Elastic(c) => Arc::new(ElasticBackend::new(c.clone(), credentials)?),
            BackendConfig::Fs(c) => Arc::new(FsBackend::new(c.clone())),
            BackendConfig::Ps(c) => Arc::new(ProcessBackend::new(c.clone())),
            BackendConfig::Memory(c) => Arc::new(MemoryBackend::new(c.clone())),
            BackendConfig::Mysql(c) => sql::build(c.clone(), credentials)?,
        };
        Ok(backend)
    }
}

/// One configured service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(flatten)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub ping_timeout_ms: u64,
    #[serde(default)]
    pub query_timeout_ms: u64,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            name: name.into(),
            backend,
            ping_timeout_ms: 0,
            query_timeout_ms: 0,
        }
    }

    pub fn with_timeouts(mut self, ping_ms: u64, query_ms: u64) -> Self {
        self.ping_timeout_ms = ping_ms;
        self.query_timeout_ms = query_ms;
        self
    }

    pub fn build(&self, access: &dyn AccessFinder) -> Result<Service, EyeError> {
        if self.name.trim().is_empty() {
            return Err(EyeError::Config("service name must not be empty".into()));
        }
        let backend = self.backend.build(access)?;
        Ok(Service::with_timeouts(
            self.name.clone(),
            backend,
            Timeouts::from_millis(self.ping_timeout_ms, self.query_timeout_ms),
        ))
    }
}

//! Static in-memory datasets, queried by name

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::data::QueryResult;
use crate::error::EyeError;
use crate::service::Backend;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub datasets: HashMap<String, Vec<serde_json::Value>>,
}

impl MemoryConfig {
    pub fn with_dataset(mut self, name: impl Into<String>, records: Vec<serde_json::Value>) -> Self {
        self.datasets.insert(name.into(), records);
        self
    }
}

pub struct MemoryBackend {
    config: MemoryConfig,
}

impl MemoryBackend {
    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<(), EyeError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), EyeError> {
        Ok(())
    }

    fn prepare_query(&self, query: &str) -> Result<String, EyeError> {
        let name = query.trim();
        if self.config.datasets.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(EyeError::InvalidRequest(format!("unknown dataset '{}'", name)))
        }
    }

    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
        self.config
            .datasets
            .get(query)
            .map(|records| records.iter().cloned().map(QueryResult::new).collect())
            .ok_or_else(|| EyeError::Backend(format!("unknown dataset '{}'", query)))
    }
}

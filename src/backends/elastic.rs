//! Elasticsearch backend over its REST API

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Access;
use crate::data::QueryResult;
use crate::error::EyeError;
use crate::service::Backend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub access_key: Option<String>,
    /// Hits returned per search
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_size() -> usize {
    5
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            index: String::new(),
            access_key: None,
            size: default_size(),
        }
    }
}

pub struct ElasticBackend {
    config: ElasticConfig,
    base_url: String,
    access: Option<Access>,
    client: RwLock<Option<reqwest::Client>>,
}

impl ElasticBackend {
    pub fn new(config: ElasticConfig, access: Option<Access>) -> Result<Self, EyeError> {
        if config.host.is_empty() {
            return Err(EyeError::Config("elastic host must not be empty".into()));
        }
        let base_url = format!("http://{}:{}", config.host, config.port);
        Ok(Self {
            config,
            base_url,
            access,
            client: RwLock::new(None),
        })
    }

    fn client(&self) -> Result<reqwest::Client, EyeError> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| EyeError::Connection("elastic client not connected".into()))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access.as_ref().filter(|a| !a.is_empty()) {
            Some(access) => builder.basic_auth(&access.user, Some(&access.password)),
            None => builder,
        }
    }

    fn health_url(&self) -> String {
        if self.config.index.is_empty() {
            format!("{}/_cluster/health", self.base_url)
        } else {
            format!("{}/_cluster/health/{}", self.base_url, self.config.index)
        }
    }

    fn search_url(&self) -> String {
        if self.config.index.is_empty() {
            format!("{}/_search", self.base_url)
        } else {
            format!("{}/{}/_search", self.base_url, self.config.index)
        }
    }

    async fn health(&self) -> Result<(), EyeError> {
        let client = self.client()?;
        let response = self.authorize(client.get(self.health_url())).send().await?;
        if !response.status().is_success() {
            return Err(EyeError::Backend(format!(
                "Status {}",
                response.status().as_u16()
            )));
        }
        let body: serde_json::Value = response.json().await?;
        check_health(&body)
    }
}

/// Cluster is usable unless its health status is red
pub(crate) fn check_health(body: &serde_json::Value) -> Result<(), EyeError> {
    match body.get("status").and_then(|s| s.as_str()) {
        Some(status) if status.eq_ignore_ascii_case("red") => Err(EyeError::Backend(
            "Cluster health status is [RED]".to_string(),
        )),
        Some(_) => Ok(()),
        None => Err(EyeError::Backend("health response has no status".into())),
    }
}

/// Raw query DSL when the query is a JSON object, a `query_string` search
/// otherwise
pub(crate) fn search_body(query: &str, size: usize) -> Result<serde_json::Value, EyeError> {
    let trimmed = query.trim();
    if trimmed.starts_with('{') {
        let mut body: serde_json::Value = serde_json::from_str(trimmed)
            .map_err(|e| EyeError::InvalidRequest(format!("invalid query DSL: {}", e)))?;
        if let Some(map) = body.as_object_mut() {
            map.entry("size").or_insert(json!(size));
        }
        Ok(body)
    } else {
        Ok(json!({
            "query": {"query_string": {"query": trimmed}},
            "size": size,
        }))
    }
}

/// `_source` of every hit
pub(crate) fn hits(body: &serde_json::Value) -> Vec<QueryResult> {
    body.pointer("/hits/hits")
        .and_then(|h| h.as_array())
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.get("_source").cloned())
                .map(QueryResult::new)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Backend for ElasticBackend {
    fn kind(&self) -> &'static str {
        "elastic"
    }

    async fn connect(&self) -> Result<(), EyeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EyeError::Config(e.to_string()))?;
        *self.client.write() = Some(client);
        self.health().await.map_err(|e| {
            *self.client.write() = None;
            match e {
                EyeError::Backend(msg) => EyeError::Connection(msg),
                other => other,
            }
        })
    }

    async fn ping(&self) -> Result<(), EyeError> {
        self.health().await
    }

    async fn disconnect(&self) {
        *self.client.write() = None;
    }

    fn prepare_query(&self, query: &str) -> Result<String, EyeError> {
        search_body(query, self.config.size)?;
        Ok(query.to_string())
    }

    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
        let client = self.client()?;
        let body = search_body(query, self.config.size)?;
        let response = self
            .authorize(client.post(self.search_url()))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EyeError::Backend(format!("Status {}: {}", status.as_u16(), text)));
        }
        let result: serde_json::Value = response.json().await?;
        Ok(hits(&result))
    }
}

//! HTTP endpoint backend
//!
//! Queries are paths appended to the base URL. JSON array bodies become one
//! record per element, JSON objects a single record and anything else a single
//! string record.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::Access;
use crate::data::{Params, QueryResult};
use crate::error::EyeError;
use crate::service::Backend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub url: String,
    #[serde(default)]
    pub access_key: Option<String>,
    /// Path requested by the liveness probe
    #[serde(default)]
    pub ping_path: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_key: None,
            ping_path: String::new(),
            headers: HashMap::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

pub struct HttpBackend {
    config: HttpConfig,
    access: Option<Access>,
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpBackend {
    pub fn new(config: HttpConfig, access: Option<Access>) -> Result<Self, EyeError> {
        reqwest::Url::parse(&config.url)
            .map_err(|e| EyeError::Config(format!("invalid url '{}': {}", config.url, e)))?;
        Ok(Self {
            config,
            access,
            client: RwLock::new(None),
        })
    }

    fn client(&self) -> Result<reqwest::Client, EyeError> {
        self.client
            .read()
            .clone()
            .ok_or_else(|| EyeError::Connection("http client not connected".into()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url, path)
    }

    fn request(
        &self,
        client: &reqwest::Client,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        let mut builder = client.request(method, self.url(path));
        for (name, value) in &self.config.headers {
            builder = builder.header(name, value);
        }
        if let Some(access) = self.access.as_ref().filter(|a| !a.is_empty()) {
            builder = builder.basic_auth(&access.user, Some(&access.password));
        }
        builder
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn connect(&self) -> Result<(), EyeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .build()
            .map_err(|e| EyeError::Config(e.to_string()))?;
        *self.client.write() = Some(client);
        Ok(())
    }

    async fn ping(&self) -> Result<(), EyeError> {
        let client = self.client()?;
        let response = self
            .request(&client, reqwest::Method::GET, &self.config.ping_path)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EyeError::Backend(format!("Status {}", response.status().as_u16())))
        }
    }

    async fn disconnect(&self) {
        *self.client.write() = None;
    }

    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
        let client = self.client()?;
        let response = self
            .request(&client, reqwest::Method::GET, query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EyeError::Backend(format!("Status {}", status.as_u16())));
        }
        Ok(parse_body(&body))
    }

    fn supports_execute(&self) -> bool {
        true
    }

    /// Params: `method` (GET by default), `path`, `body`
    async fn execute(&self, params: &Params) -> Result<(), EyeError> {
        let method = params.opt_str("method")?.unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| EyeError::InvalidParams(format!("invalid method '{}'", method)))?;
        let path = params.opt_str("path")?.unwrap_or("");

        let client = self.client()?;
        let mut request = self.request(&client, method, path);
        if let Some(body) = params.opt_str("body")? {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EyeError::Backend(format!("Status {}", response.status().as_u16())))
        }
    }
}

pub(crate) fn parse_body(body: &str) -> Vec<QueryResult> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(items)) => items.into_iter().map(QueryResult::new).collect(),
        Ok(value) => vec![QueryResult::new(value)],
        Err(_) => vec![QueryResult::new(serde_json::Value::String(body.to_string()))],
    }
}

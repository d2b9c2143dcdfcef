//! Credentials read from a HashiCorp Vault KV (v1) mount.
//!
//! Each access key is stored at `<mount>/eye/<eye name>/<key>` with `user`
//! and `password` fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::access::{Access, StaticAccess};
use crate::error::EyeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Server address, e.g. `http://127.0.0.1:8200`
    pub address: String,
    pub token: String,
    pub mount: String,
    pub request_timeout_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            token: String::new(),
            mount: "secret".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            ..Default::default()
        }
    }
}

#[derive(Deserialize)]
struct SecretResponse {
    data: Access,
}

pub struct VaultClient {
    config: VaultConfig,
    client: reqwest::Client,
}

impl VaultClient {
    pub fn new(config: VaultConfig) -> Result<Self, EyeError> {
        if config.address.trim().is_empty() {
            return Err(EyeError::Config("vault address is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| EyeError::Config(format!("vault client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn secret_url(&self, eye_name: &str, key: &str) -> String {
        format!(
            "{}/v1/{}/eye/{}/{}",
            self.config.address.trim_end_matches('/'),
            self.config.mount.trim_matches('/'),
            eye_name.to_lowercase(),
            key
        )
    }

    /// Access data stored for `key`; `None` when Vault has nothing there
    pub async fn read_access(&self, eye_name: &str, key: &str) -> Result<Option<Access>, EyeError> {
        let url = self.secret_url(eye_name, key);
        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.config.token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(EyeError::Backend(format!(
                "Vault answered {} for access key '{}'",
                status.as_u16(),
                key
            )));
        }
        let secret: SecretResponse = response.json().await?;
        Ok(Some(secret.data))
    }

    /// Add the Vault data of every key to `access`
    pub async fn fill(
        &self,
        eye_name: &str,
        keys: &[String],
        mut access: StaticAccess,
    ) -> Result<StaticAccess, EyeError> {
        for key in keys {
            match self.read_access(eye_name, key).await? {
                Some(found) => {
                    tracing::debug!(access_key = %key, "Access read from Vault");
                    access = access.with(key.clone(), found);
                }
                None => tracing::info!(access_key = %key, "No access data in Vault"),
            }
        }
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessFinder;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::json;

    async fn spawn_vault() -> String {
        async fn secret(
            Path((eye, key)): Path<(String, String)>,
            headers: HeaderMap,
        ) -> axum::response::Response {
            if headers.get("X-Vault-Token").and_then(|v| v.to_str().ok()) != Some("root") {
                return StatusCode::FORBIDDEN.into_response();
            }
            match (eye.as_str(), key.as_str()) {
                ("ops", "orders") => {
                    let body = json!({"data": {"user": "app", "password": "s3cret"}});
                    axum::Json(body).into_response()
                }
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }

        let app = axum::Router::new()
            .route("/v1/secret/eye/:eye/:key", axum::routing::get(secret));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_secret_url() {
        let client = VaultClient::new(VaultConfig::new("http://vault:8200/", "t")).unwrap();
        assert_eq!(
            client.secret_url("Ops", "orders"),
            "http://vault:8200/v1/secret/eye/ops/orders"
        );
    }

    #[test]
    fn test_empty_address() {
        assert!(matches!(
            VaultClient::new(VaultConfig::default()),
            Err(EyeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fill_from_vault() {
        let address = spawn_vault().await;
        let client = VaultClient::new(VaultConfig::new(address, "root")).unwrap();

        let keys = vec!["orders".to_string(), "missing".to_string()];
        let access = StaticAccess::default().with("missing", Access::new("cfg", "pw"));
        let access = client.fill("Ops", &keys, access).await.unwrap();

        assert_eq!(access.find_access("orders").unwrap(), Access::new("app", "s3cret"));
        assert_eq!(access.find_access("missing").unwrap().user, "cfg");
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let address = spawn_vault().await;
        let client = VaultClient::new(VaultConfig::new(address, "wrong")).unwrap();

        let result = client.read_access("ops", "orders").await;
        assert!(matches!(result, Err(EyeError::Backend(_))));
    }
}

//! Eye Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - EYE_CONFIG: Comma-separated list of JSON configuration files
//! - EYE_HOST: Bind address (default: 0.0.0.0)
//! - EYE_PORT: Port number (default: 3000)
//! - EYE_EXPORT_FOLDER: Folder receiving exporter output (default: ./export)
//! - EYE_ACCESS_<KEY>_USER / EYE_ACCESS_<KEY>_PASSWORD: Credential overrides
//! - RUST_LOG: Log level (default: eye=info,tower_http=info)

use std::sync::Arc;

use eye::api::{run_server, ServerConfig};
use eye::{Eye, EyeConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eye=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let files: Vec<String> = std::env::var("EYE_CONFIG")
        .ok()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let config = if files.is_empty() {
        tracing::warn!("EYE_CONFIG not set, starting without services");
        EyeConfig::default()
    } else {
        EyeConfig::load_all(&files)?
    }
    .with_env_overrides()?;

    tracing::info!("Eye configuration:");
    tracing::info!("  Name: {}", config.name);
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Export folder: {}", config.export_folder.display());
    tracing::info!("  Config files: {}", files.join(", "));
    tracing::info!("  Services: {}", config.services.len());

    let server_config = ServerConfig::from(&config);
    let eye = Arc::new(Eye::new(config).await);

    println!(
        r#"
  ___ _   _  ___
 / _ \ | | |/ _ \
|  __/ |_| |  __/
 \___|\__, |\___|
       __/ |
      |___/

 Validation and monitoring engine
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(server_config, eye).await
}

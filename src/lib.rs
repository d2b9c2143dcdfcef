//! Eye: backend-agnostic validation and monitoring engine
//!
//! Services wrap heterogeneous data sources (HTTP endpoints, Elasticsearch,
//! the filesystem, the process table, MySQL, in-memory datasets) behind one
//! lifecycle-managed handle. Each service manufactures checks that run a
//! query and judge the returned records against an expression and/or a
//! pattern; composite checks aggregate many of them.
//!
//! # Features
//!
//! - **Services**: lazy connect, liveness probes, per-service timeouts
//! - **Checks**: SQL-expression and regex rules, `all`/`any` semantics
//! - **MultiCheck**: parallel fan-out with `all`, `any` and running-only modes
//! - **CompareCheck**: cross-service comparison of first records
//! - **Exporters / Executors**: write filtered records to files, run commands
//! - **REST API**: ping, validate, query, named checks, export and execute
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use eye::backends::{BackendConfig, ServiceConfig};
//! use eye::backends::memory::MemoryConfig;
//! use eye::config::StaticAccess;
//! use eye::query::{Check, ValidationRequest};
//!
//! # async fn run() -> Result<(), eye::EyeError> {
//! let memory = MemoryConfig::default()
//!     .with_dataset("events", vec![serde_json::json!({"v": 1}), serde_json::json!({"v": 2})]);
//! let service = ServiceConfig::new("events", BackendConfig::Memory(memory))
//!     .build(&StaticAccess::default())?;
//!
//! let check = service.new_check(ValidationRequest::new("events").with_eval("v > 0").with_all(true))?;
//! let verdict = check.validate().await?;
//! println!("{}: {}", verdict.info, verdict.detail);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backends;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod multi;
pub mod query;
pub mod service;

// Re-export commonly used types
pub use config::EyeConfig;
pub use data::{ParamValue, Params, QueryResult, Value};
pub use engine::{Eye, MultiMode};
pub use error::EyeError;
pub use multi::{CompareCheck, MultiCheck};
pub use query::{Check, Query, ValidationRequest, Verdict};
pub use service::{Service, ServiceFactory};

//! Lifecycle-managed handles over backends.
//!
//! A [`Service`] composes a [`Backend`] driver with lifecycle state
//! (Uninitialized → Ready → Closed). Checks, exporters and executors created
//! by a service share that state, so closing the service invalidates them.

pub mod check;
pub mod executor;
pub mod exporter;
pub mod factory;
#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::{Params, QueryResult};
use crate::error::EyeError;
use crate::query::{
    Check, CommandRequest, Executor, ExportRequest, Exporter, Rule, ValidationRequest,
};

pub use check::{ServiceCheck, ServicePing};
pub use executor::ServiceExecutor;
pub use exporter::ServiceExporter;
pub use factory::ServiceFactory;

/// Backend driver behind a service.
///
/// Implementations must be safe for concurrent `fetch`/`execute` calls: a
/// single service may back several checks running at the same time.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Open connections / validate configuration
    async fn connect(&self) -> Result<(), EyeError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), EyeError>;

    /// Release connections
    async fn disconnect(&self) {}

    /// Validate and normalize query text when a check or exporter is created
    fn prepare_query(&self, query: &str) -> Result<String, EyeError> {
        Ok(query.to_string())
    }

    /// Run a read
    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError>;

    fn supports_execute(&self) -> bool {
        false
    }

    /// Backend-specific side effect
    async fn execute(&self, _params: &Params) -> Result<(), EyeError> {
        Err(EyeError::InvalidRequest(format!(
            "{} backends do not support executors",
            self.kind()
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Ready,
    Closed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Uninitialized => write!(f, "uninitialized"),
            ServiceState::Ready => write!(f, "ready"),
            ServiceState::Closed => write!(f, "closed"),
        }
    }
}

/// Timeouts applied around backend calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub ping: Option<Duration>,
    pub query: Option<Duration>,
}

impl Timeouts {
    pub fn from_millis(ping_ms: u64, query_ms: u64) -> Self {
        Self {
            ping: (ping_ms > 0).then(|| Duration::from_millis(ping_ms)),
            query: (query_ms > 0).then(|| Duration::from_millis(query_ms)),
        }
    }
}

pub(crate) struct ServiceInner {
    name: String,
    backend: Arc<dyn Backend>,
    state: RwLock<ServiceState>,
    init_lock: tokio::sync::Mutex<()>,
    timeouts: Timeouts,
}

impl ServiceInner {
    fn state(&self) -> ServiceState {
        *self.state.read()
    }

    fn ensure_open(&self) -> Result<(), EyeError> {
        if self.state() == ServiceState::Closed {
            Err(EyeError::Closed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    async fn init(&self) -> Result<(), EyeError> {
        let _guard = self.init_lock.lock().await;
        match self.state() {
            ServiceState::Ready => return Ok(()),
            ServiceState::Closed => return Err(EyeError::Closed(self.name.clone())),
            ServiceState::Uninitialized => {}
        }

        self.backend.connect().await.map_err(|e| {
            tracing::debug!(service = %self.name, error = %e, "Service init failed");
            e
        })?;

        let closed = {
            let mut state = self.state.write();
            if *state == ServiceState::Closed {
                true
            } else {
                *state = ServiceState::Ready;
                false
            }
        };
        // close() ran while connecting and had nothing to disconnect yet
        if closed {
            self.backend.disconnect().await;
            return Err(EyeError::Closed(self.name.clone()));
        }
        tracing::debug!(service = %self.name, kind = self.backend.kind(), "Service ready");
        Ok(())
    }

    /// Lazily initialize before a child invocation
    async fn ensure_ready(&self) -> Result<(), EyeError> {
        match self.state() {
            ServiceState::Ready => Ok(()),
            ServiceState::Closed => Err(EyeError::Closed(self.name.clone())),
            ServiceState::Uninitialized => self.init().await,
        }
    }

    async fn probe(&self) -> Result<(), EyeError> {
        match self.timeouts.ping {
            Some(limit) => tokio::time::timeout(limit, self.backend.ping())
                .await
                .map_err(|_| EyeError::Timeout(limit.as_millis() as u64))?,
            None => self.backend.ping().await,
        }
    }

    async fn is_running(&self) -> bool {
        if self.state() != ServiceState::Ready {
            return false;
        }
        match self.probe().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(service = %self.name, error = %e, "Service can't be reached");
                false
            }
        }
    }

    /// Liveness for running-only filters; connects first when needed
    async fn probe_running(&self) -> bool {
        if let Err(e) = self.ensure_ready().await {
            tracing::debug!(service = %self.name, error = %e, "Service is not running");
            return false;
        }
        self.is_running().await
    }

    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
        self.ensure_ready().await?;
        let records = match self.timeouts.query {
            Some(limit) => tokio::time::timeout(limit, self.backend.fetch(query))
                .await
                .map_err(|_| EyeError::Timeout(limit.as_millis() as u64))??,
            None => self.backend.fetch(query).await?,
        };
        // The service may have been closed while the read was in flight
        self.ensure_open()?;
        tracing::debug!(service = %self.name, records = records.len(), "Query executed");
        Ok(records)
    }

    async fn execute(&self, params: &Params) -> Result<(), EyeError> {
        self.ensure_ready().await?;
        match self.timeouts.query {
            Some(limit) => tokio::time::timeout(limit, self.backend.execute(params))
                .await
                .map_err(|_| EyeError::Timeout(limit.as_millis() as u64))?,
            None => self.backend.execute(params).await,
        }
    }
}

/// Cloneable handle to one backend and its lifecycle
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Service {
    pub fn new(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self::with_timeouts(name, backend, Timeouts::default())
    }

    pub fn with_timeouts(
        name: impl Into<String>,
        backend: Arc<dyn Backend>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                name: name.into(),
                backend,
                state: RwLock::new(ServiceState::Uninitialized),
                init_lock: tokio::sync::Mutex::new(()),
                timeouts,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> &'static str {
        self.inner.backend.kind()
    }

    pub fn state(&self) -> ServiceState {
        self.inner.state()
    }

    /// Connect the backend. Ready services return immediately; a failure
    /// leaves the service Uninitialized for the caller to retry.
    pub async fn init(&self) -> Result<(), EyeError> {
        self.inner.init().await
    }

    /// Liveness without changing state: false unless Ready and reachable
    pub async fn ping(&self) -> bool {
        self.inner.is_running().await
    }

    /// Liveness after a connect attempt: an Uninitialized service is
    /// initialized first and counts as down when that fails
    pub async fn probe_running(&self) -> bool {
        self.inner.probe_running().await
    }

    /// Close the service; later calls are no-ops
    pub async fn close(&self) {
        let previous = {
            let mut state = self.inner.state.write();
            std::mem::replace(&mut *state, ServiceState::Closed)
        };
        if previous == ServiceState::Closed {
            return;
        }
        if previous == ServiceState::Ready {
            self.inner.backend.disconnect().await;
        }
        tracing::debug!(service = %self.inner.name, "Service closed");
    }

    pub fn new_check(&self, req: ValidationRequest) -> Result<Arc<dyn Check>, EyeError> {
        Ok(Arc::new(self.new_service_check(req)?))
    }

    pub fn new_service_check(&self, req: ValidationRequest) -> Result<ServiceCheck, EyeError> {
        self.inner.ensure_open()?;
        let query = self.prepare(&req.query)?;
        let rule = Rule::compile(&req.reg_expr, &req.eval_expr);
        if let Err(e) = &rule {
            tracing::debug!(service = %self.inner.name, error = %e, "Check rule does not compile");
        }
        Ok(ServiceCheck::new(
            req.check_key(&self.inner.name),
            query,
            req.all,
            rule,
            Arc::clone(&self.inner),
        ))
    }

    pub fn new_exporter(&self, req: ExportRequest) -> Result<Arc<dyn Exporter>, EyeError> {
        self.inner.ensure_open()?;
        let query = self.prepare(&req.query)?;
        let filter = Rule::compile("", &req.eval_expr)
            .map_err(|e| EyeError::InvalidRequest(format!("export filter: {}", e)))?;
        Ok(Arc::new(ServiceExporter::new(
            req.export_key(&self.inner.name),
            query,
            filter,
            Arc::clone(&self.inner),
        )))
    }

    pub fn new_executor(&self, _req: CommandRequest) -> Result<Arc<dyn Executor>, EyeError> {
        self.inner.ensure_open()?;
        if !self.inner.backend.supports_execute() {
            return Err(EyeError::InvalidRequest(format!(
                "{} backends do not support executors",
                self.kind()
            )));
        }
        Ok(Arc::new(ServiceExecutor::new(
            format!("{}.execute", self.inner.name),
            Arc::clone(&self.inner),
        )))
    }

    /// Check that only probes the service
    pub fn new_ping(&self) -> Arc<dyn Check> {
        Arc::new(ServicePing::new(Arc::clone(&self.inner)))
    }

    fn prepare(&self, query: &str) -> Result<String, EyeError> {
        if query.trim().is_empty() {
            return Err(EyeError::InvalidRequest("query must not be empty".into()));
        }
        self.inner
            .backend
            .prepare_query(query)
            .map_err(|e| match e {
                EyeError::InvalidRequest(_) => e,
                other => EyeError::InvalidRequest(other.to_string()),
            })
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.backend.kind())
            .field("state", &self.state())
            .finish()
    }
}

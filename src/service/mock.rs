//! In-process backend for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::Backend;
use crate::data::{Params, QueryResult};
use crate::error::EyeError;

#[derive(Default)]
pub(crate) struct MockBackend {
    records: Mutex<Vec<serde_json::Value>>,
    alive: AtomicBool,
    connect_fails: AtomicBool,
    fetch_error: Mutex<Option<EyeError>>,
    fetch_delay: Mutex<Option<Duration>>,
    ping_delay: Mutex<Option<Duration>>,
    connect_delay: Mutex<Option<Duration>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    executed: Mutex<Vec<Params>>,
    executor: bool,
}

impl MockBackend {
    pub fn new(records: Vec<serde_json::Value>) -> Self {
        Self {
            records: Mutex::new(records),
            alive: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn with_executor(mut self) -> Self {
        self.executor = true;
        self
    }

    pub fn set_records(&self, records: Vec<serde_json::Value>) {
        *self.records.lock() = records;
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_connect_fails(&self, fails: bool) {
        self.connect_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_fetch_error(&self, error: Option<EyeError>) {
        *self.fetch_error.lock() = error;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    pub fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock() = Some(delay);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = Some(delay);
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<Params> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self) -> Result<(), EyeError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.connect_fails.load(Ordering::SeqCst) {
            return Err(EyeError::Connection("refused".into()));
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn ping(&self) -> Result<(), EyeError> {
        let delay = *self.ping_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EyeError::Connection("no answer".into()))
        }
    }

    async fn fetch(&self, _query: &str) -> Result<Vec<QueryResult>, EyeError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.fetch_error.lock().clone() {
            return Err(e);
        }
        Ok(self
            .records
            .lock()
            .iter()
            .cloned()
            .map(QueryResult::new)
            .collect())
    }

    fn supports_execute(&self) -> bool {
        self.executor
    }

    async fn execute(&self, params: &Params) -> Result<(), EyeError> {
        self.executed.lock().push(params.clone());
        Ok(())
    }
}

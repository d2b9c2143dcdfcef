//! Operation traits implemented by service-bound objects and composites

use async_trait::async_trait;

use super::verdict::Verdict;
use crate::data::{Params, QueryResult};
use crate::error::EyeError;

/// Named read operation producing an ordered sequence of records.
///
/// Results are never cached: every call re-executes the read.
#[async_trait]
pub trait Query: Send + Sync {
    fn info(&self) -> &str;

    async fn query(&self) -> Result<Vec<QueryResult>, EyeError>;

    /// Whether the backend behind this query is Ready and answering pings
    async fn is_running(&self) -> bool;
}

/// A query with a pass/fail judgement over its results.
///
/// Backend, timeout and evaluation problems come back as a failing verdict;
/// only structural errors (closed service, invalid request) are `Err`.
#[async_trait]
pub trait Check: Query {
    async fn validate(&self) -> Result<Verdict, EyeError>;
}

/// Side-effecting export of query results
#[async_trait]
pub trait Exporter: Send + Sync {
    fn info(&self) -> &str;

    async fn export(&self, params: &Params) -> Result<(), EyeError>;
}

/// Side-effecting command execution against a backend
#[async_trait]
pub trait Executor: Send + Sync {
    fn info(&self) -> &str;

    async fn execute(&self, params: &Params) -> Result<(), EyeError>;
}

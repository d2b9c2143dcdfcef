//! Checks bound to a single service

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::ServiceInner;
use crate::data::QueryResult;
use crate::error::EyeError;
use crate::query::{Check, EvalError, Query, Rule, Verdict};

/// Query plus rule against one service.
///
/// The rule is compiled when the check is built; a compile error is kept and
/// reported by every `validate` call as a failing verdict.
pub struct ServiceCheck {
    info: String,
    query: String,
    all: bool,
    rule: Result<Rule, EvalError>,
    service: Arc<ServiceInner>,
}

impl ServiceCheck {
    pub(crate) fn new(
        info: String,
        query: String,
        all: bool,
        rule: Result<Rule, EvalError>,
        service: Arc<ServiceInner>,
    ) -> Self {
        Self {
            info,
            query,
            all,
            rule,
            service,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service.name
    }
}

#[async_trait]
impl Query for ServiceCheck {
    fn info(&self) -> &str {
        &self.info
    }

    async fn query(&self) -> Result<Vec<QueryResult>, EyeError> {
        self.service.fetch(&self.query).await
    }

    async fn is_running(&self) -> bool {
        self.service.probe_running().await
    }
}

#[async_trait]
impl Check for ServiceCheck {
    async fn validate(&self) -> Result<Verdict, EyeError> {
        let started = Instant::now();

        let rule = match &self.rule {
            Ok(rule) => rule,
            Err(e) => {
                let error = EyeError::Evaluation(e.clone());
                return Ok(Verdict::from_error(&self.info, &error).with_elapsed(started));
            }
        };

        let records = match self.query().await {
            Ok(records) => records,
            Err(e) if e.is_structural() => return Err(e),
            Err(e) => {
                tracing::debug!(check = %self.info, error = %e, "Check query failed");
                return Ok(Verdict::from_error(&self.info, &e).with_elapsed(started));
            }
        };

        let evaluation = rule.apply(&records, self.all);
        Ok(
            Verdict::from_bool(&self.info, evaluation.passed, evaluation.describe())
                .with_records(records.len())
                .with_elapsed(started),
        )
    }
}

/// Check whose verdict is the service's liveness
pub struct ServicePing {
    info: String,
    service: Arc<ServiceInner>,
}

impl ServicePing {
    pub(crate) fn new(service: Arc<ServiceInner>) -> Self {
        Self {
            info: format!("{}.ping", service.name),
            service,
        }
    }
}

#[async_trait]
impl Query for ServicePing {
    fn info(&self) -> &str {
        &self.info
    }

    /// Pings have no records
    async fn query(&self) -> Result<Vec<QueryResult>, EyeError> {
        self.service.ensure_ready().await?;
        Ok(Vec::new())
    }

    async fn is_running(&self) -> bool {
        self.service.probe_running().await
    }
}

#[async_trait]
impl Check for ServicePing {
    async fn validate(&self) -> Result<Verdict, EyeError> {
        let started = Instant::now();
        if let Err(e) = self.service.ensure_ready().await {
            if e.is_structural() {
                return Err(e);
            }
            return Ok(Verdict::from_error(&self.info, &e).with_elapsed(started));
        }
        let verdict = match self.service.probe().await {
            Ok(()) => Verdict::pass(&self.info, "service is running"),
            Err(e) => Verdict::from_error(&self.info, &e),
        };
        Ok(verdict.with_elapsed(started))
    }
}

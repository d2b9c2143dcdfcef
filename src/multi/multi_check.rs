//! Composite check over a list of children
//!
//! Children run concurrently on their own tasks and are joined before the
//! verdicts are reduced under `all`/`any`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::data::{Params, QueryResult};
use crate::error::EyeError;
use crate::query::{Check, Query, Verdict};

/// A member of a MultiCheck
#[derive(Clone)]
pub enum Child {
    /// Contributes Pass when its query succeeds
    Query(Arc<dyn Query>),
    Check(Arc<dyn Check>),
}

impl Child {
    pub fn info(&self) -> &str {
        match self {
            Child::Query(q) => q.info(),
            Child::Check(c) => c.info(),
        }
    }

    async fn is_running(&self) -> bool {
        match self {
            Child::Query(q) => q.is_running().await,
            Child::Check(c) => c.is_running().await,
        }
    }

    async fn records(&self) -> Result<Vec<QueryResult>, EyeError> {
        match self {
            Child::Query(q) => q.query().await,
            Child::Check(c) => c.query().await,
        }
    }

    async fn verdict(&self) -> Result<Verdict, EyeError> {
        match self {
            Child::Check(c) => c.validate().await,
            Child::Query(q) => {
                let started = Instant::now();
                match q.query().await {
                    Ok(records) => Ok(Verdict::pass(q.info(), "query succeeded")
                        .with_records(records.len())
                        .with_elapsed(started)),
                    Err(e) if e.is_structural() => Err(e),
                    Err(e) => Ok(Verdict::from_error(q.info(), &e).with_elapsed(started)),
                }
            }
        }
    }
}

impl From<Arc<dyn Check>> for Child {
    fn from(check: Arc<dyn Check>) -> Self {
        Child::Check(check)
    }
}

impl From<Arc<dyn Query>> for Child {
    fn from(query: Arc<dyn Query>) -> Self {
        Child::Query(query)
    }
}

pub struct MultiCheck {
    info: String,
    children: Vec<Child>,
    all: bool,
    only_running: bool,
    child_timeout: Option<Duration>,
}

impl MultiCheck {
    pub fn new(info: impl Into<String>, children: Vec<Child>, all: bool, only_running: bool) -> Self {
        Self {
            info: info.into(),
            children,
            all,
            only_running,
            child_timeout: None,
        }
    }

    pub fn with_child_timeout(mut self, timeout: Duration) -> Self {
        self.child_timeout = Some(timeout);
        self
    }

    /// Children taking part in this run, by position
    async fn active(&self) -> Vec<bool> {
        if !self.only_running {
            return vec![true; self.children.len()];
        }
        join_all(self.children.iter().map(|c| c.is_running())).await
    }

    /// Run every active child and reduce their verdicts.
    ///
    /// Cancelling the token aborts outstanding children and waits for them to
    /// wind down before returning `Cancelled`.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        child_timeout: Option<Duration>,
    ) -> Result<Verdict, EyeError> {
        let started = Instant::now();
        let active = self.active().await;
        let timeout = child_timeout.or(self.child_timeout);

        let mut slots: Vec<Option<Verdict>> = vec![None; self.children.len()];
        let mut tasks = JoinSet::new();
        for (idx, child) in self.children.iter().enumerate() {
            if !active[idx] {
                slots[idx] = Some(Verdict::skipped(child.info(), "service is not running"));
                continue;
            }
            let child = child.clone();
            tasks.spawn(async move {
                let verdict = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, child.verdict()).await {
                        Ok(result) => result,
                        Err(_) => Ok(Verdict::from_error(
                            child.info(),
                            &EyeError::Timeout(limit.as_millis() as u64),
                        )),
                    },
                    None => child.verdict().await,
                };
                (idx, verdict)
            });
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    drain(&mut tasks).await;
                    tracing::debug!(check = %self.info, "Run cancelled");
                    return Err(EyeError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, Ok(verdict)))) => slots[idx] = Some(verdict),
                    Some(Ok((_, Err(e)))) => {
                        drain(&mut tasks).await;
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        // A child task panicked; the remaining slots are still
                        // collected and the missing one reported below
                        tracing::warn!(check = %self.info, error = %e, "Child task failed");
                    }
                },
            }
        }

        let children: Vec<Verdict> = slots
            .into_iter()
            .zip(&self.children)
            .map(|(slot, child)| {
                slot.unwrap_or_else(|| Verdict::fail(child.info(), "child task did not complete"))
            })
            .collect();

        Ok(self.reduce(children).with_elapsed(started))
    }

    fn reduce(&self, children: Vec<Verdict>) -> Verdict {
        let considered: Vec<&Verdict> = children.iter().filter(|v| !v.is_skipped()).collect();
        let passed = considered.iter().filter(|v| v.passed()).count();
        let skipped = children.len() - considered.len();

        for failed in considered.iter().filter(|v| !v.passed()) {
            tracing::warn!(
                check = %self.info,
                child = %failed.info,
                detail = %failed.detail,
                "Child check failed"
            );
        }

        let ok = if self.all {
            passed == considered.len()
        } else {
            passed > 0
        };
        let mode = if self.all { "all" } else { "any" };
        let detail = format!(
            "{} of {} checks passed ({}), {} skipped",
            passed,
            considered.len(),
            mode,
            skipped
        );
        let records = considered.len();
        Verdict::from_bool(&self.info, ok, detail)
            .with_records(records)
            .with_children(children)
    }

    /// Aggregate run with an optional `timeout_ms` param overriding the
    /// per-child timeout
    pub async fn execute(&self, params: &Params) -> Result<Verdict, EyeError> {
        let timeout = params.opt_u64("timeout_ms")?.map(Duration::from_millis);
        self.run(&CancellationToken::new(), timeout).await
    }
}

async fn drain<T: 'static>(tasks: &mut JoinSet<T>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

#[async_trait]
impl Query for MultiCheck {
    fn info(&self) -> &str {
        &self.info
    }

    /// Records of the active children, in order
    async fn query(&self) -> Result<Vec<QueryResult>, EyeError> {
        let active = self.active().await;
        let results = join_all(
            self.children
                .iter()
                .zip(active)
                .filter(|(_, active)| *active)
                .map(|(child, _)| child.records()),
        )
        .await;

        let mut records = Vec::new();
        for result in results {
            records.extend(result?);
        }
        Ok(records)
    }

    async fn is_running(&self) -> bool {
        if self.children.is_empty() {
            return true;
        }
        join_all(self.children.iter().map(|c| c.is_running()))
            .await
            .into_iter()
            .any(|running| running)
    }
}

#[async_trait]
impl Check for MultiCheck {
    async fn validate(&self) -> Result<Verdict, EyeError> {
        self.run(&CancellationToken::new(), None).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::service::mock::MockBackend;
    use crate::service::Service;
    use crate::query::ValidationRequest;
    use serde_json::json;

    /// Check with a fixed outcome and optional delay
    struct FixedCheck {
        info: String,
        pass: bool,
        running: bool,
        delay: Option<Duration>,
        finished: Arc<AtomicBool>,
    }

    impl FixedCheck {
        fn new(info: &str, pass: bool) -> Self {
            Self {
                info: info.to_string(),
                pass,
                running: true,
                delay: None,
                finished: Arc::new(AtomicBool::new(false)),
            }
        }

        fn stopped(mut self) -> Self {
            self.running = false;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn child(self) -> Child {
            Child::Check(Arc::new(self))
        }
    }

    #[async_trait]
    impl Query for FixedCheck {
        fn info(&self) -> &str {
            &self.info
        }

        async fn query(&self) -> Result<Vec<QueryResult>, EyeError> {
            Ok(vec![QueryResult::new(json!({"check": self.info}))])
        }

        async fn is_running(&self) -> bool {
            self.running
        }
    }

    #[async_trait]
    impl Check for FixedCheck {
        async fn validate(&self) -> Result<Verdict, EyeError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.finished.store(true, Ordering::SeqCst);
            Ok(Verdict::from_bool(&self.info, self.pass, "fixed"))
        }
    }

    #[tokio::test]
    async fn test_all_and_any_reduction() {
        let children = || vec![FixedCheck::new("a", true).child(), FixedCheck::new("b", false).child()];

        let any = MultiCheck::new("any", children(), false, false);
        assert!(any.validate().await.unwrap().passed());

        let all = MultiCheck::new("all", children(), true, false);
        let verdict = all.validate().await.unwrap();
        assert!(!verdict.passed());
        assert_eq!(verdict.children.len(), 2);
        assert_eq!(verdict.children[0].info, "a");
        assert_eq!(verdict.children[1].info, "b");
    }

    #[tokio::test]
    async fn test_empty_active_set_is_vacuous() {
        let all = MultiCheck::new("all", vec![], true, false);
        assert!(all.validate().await.unwrap().passed());

        let any = MultiCheck::new("any", vec![], false, false);
        assert!(!any.validate().await.unwrap().passed());

        let stopped = vec![FixedCheck::new("a", false).stopped().child()];
        let all_running = MultiCheck::new("running", stopped, true, true);
        let verdict = all_running.validate().await.unwrap();
        assert!(verdict.passed());
        assert!(verdict.children[0].is_skipped());
    }

    #[tokio::test]
    async fn test_only_running_ignores_stopped_children() {
        let children = vec![
            FixedCheck::new("up", true).child(),
            FixedCheck::new("down", false).stopped().child(),
        ];
        let running = MultiCheck::new("running", children.clone(), true, true);
        assert!(running.validate().await.unwrap().passed());

        // Without the filter the stopped child counts
        let all = MultiCheck::new("all", children, true, false);
        assert!(!all.validate().await.unwrap().passed());
    }

    #[tokio::test]
    async fn test_backend_error_is_isolated() {
        let broken = Arc::new(MockBackend::new(vec![]));
        broken.set_fetch_error(Some(EyeError::Backend("disk full".into())));
        let healthy = Arc::new(MockBackend::new(vec![json!({"v": 1})]));

        let broken = Service::new("broken", broken);
        let healthy = Service::new("healthy", healthy);
        let req = ValidationRequest::new("select").with_eval("v = 1");
        let children = vec![
            Child::Check(broken.new_check(req.clone()).unwrap()),
            Child::Check(healthy.new_check(req).unwrap()),
        ];

        let multi = MultiCheck::new("any", children, false, false);
        let verdict = multi.validate().await.unwrap();
        assert!(verdict.passed());
        assert!(!verdict.children[0].passed());
        assert!(verdict.children[0].detail.contains("disk full"));
        assert!(verdict.children[1].passed());
    }

    #[tokio::test]
    async fn test_structural_error_propagates() {
        let backend = Arc::new(MockBackend::new(vec![json!({"v": 1})]));
        let service = Service::new("db", backend);
        let check = service.new_check(ValidationRequest::new("select")).unwrap();
        service.close().await;

        let multi = MultiCheck::new(
            "all",
            vec![Child::Check(check), FixedCheck::new("ok", true).child()],
            true,
            false,
        );
        assert!(matches!(multi.validate().await, Err(EyeError::Closed(_))));
    }

    #[tokio::test]
    async fn test_query_children() {
        let backend = Arc::new(MockBackend::new(vec![json!({"v": 1}), json!({"v": 2})]));
        let service = Service::new("db", backend.clone());
        let check = service.new_service_check(ValidationRequest::new("select")).unwrap();
        let query: Arc<dyn Query> = Arc::new(check);

        let multi = MultiCheck::new("all", vec![Child::Query(query.clone())], true, false);
        let verdict = multi.validate().await.unwrap();
        assert!(verdict.passed());
        assert_eq!(verdict.children[0].records, 2);

        backend.set_fetch_error(Some(EyeError::Backend("gone".into())));
        assert!(!multi.validate().await.unwrap().passed());
    }

    #[tokio::test]
    async fn test_query_concatenates_active_children() {
        let multi = MultiCheck::new(
            "running",
            vec![
                FixedCheck::new("a", true).child(),
                FixedCheck::new("b", true).stopped().child(),
                FixedCheck::new("c", true).child(),
            ],
            true,
            true,
        );
        let records = multi.query().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value(&["check"]).as_str(), Some("a"));
        assert_eq!(records[1].value(&["check"]).as_str(), Some("c"));
    }

    #[tokio::test]
    async fn test_child_timeout_fails_child() {
        let multi = MultiCheck::new(
            "any",
            vec![
                FixedCheck::new("slow", true).slow(Duration::from_secs(5)).child(),
                FixedCheck::new("fast", false).child(),
            ],
            false,
            false,
        );

        let params = Params::new().with("timeout_ms", 20);
        let verdict = multi.execute(&params).await.unwrap();
        assert!(!verdict.passed());
        assert!(verdict.children[0].detail.contains("Timeout"));
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_timeout() {
        let multi = MultiCheck::new("any", vec![], false, false);
        let params = Params::new().with("timeout_ms", "soon");
        assert!(matches!(
            multi.execute(&params).await,
            Err(EyeError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_cancellation_stops_children() {
        let slow = FixedCheck::new("slow", true).slow(Duration::from_secs(5));
        let finished = slow.finished.clone();
        let multi = MultiCheck::new("all", vec![slow.child()], true, false);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = multi.run(&cancel, None).await;
        assert!(matches!(result, Err(EyeError::Cancelled)));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_nested_multi_check() {
        let inner = MultiCheck::new(
            "inner",
            vec![FixedCheck::new("a", true).child(), FixedCheck::new("b", false).child()],
            false,
            false,
        );
        let outer = MultiCheck::new(
            "outer",
            vec![Child::Check(Arc::new(inner)), FixedCheck::new("c", true).child()],
            true,
            false,
        );

        let verdict = outer.validate().await.unwrap();
        assert!(verdict.passed());
        assert_eq!(verdict.children[0].children.len(), 2);
        assert!(outer.is_running().await);
    }

    #[tokio::test]
    async fn test_is_running() {
        let empty = MultiCheck::new("empty", vec![], true, false);
        assert!(empty.is_running().await);

        let stopped = MultiCheck::new(
            "stopped",
            vec![FixedCheck::new("a", true).stopped().child()],
            true,
            false,
        );
        assert!(!stopped.is_running().await);
    }
}

//! Cross-service comparison
//!
//! The first record of each child is merged into one record whose fields are
//! suffixed with the child's 1-based position, so an expression such as
//! `C1_1 = C1_2` compares column `C1` of the first and second service.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;

use crate::data::QueryResult;
use crate::error::EyeError;
use crate::query::{Check, EvalError, Query, Rule, Verdict};

pub struct CompareCheck {
    info: String,
    children: Vec<Arc<dyn Query>>,
    rule: Result<Rule, EvalError>,
    only_running: bool,
}

impl CompareCheck {
    pub fn new(
        info: impl Into<String>,
        children: Vec<Arc<dyn Query>>,
        rule: Result<Rule, EvalError>,
        only_running: bool,
    ) -> Self {
        Self {
            info: info.into(),
            children,
            rule,
            only_running,
        }
    }

    /// First record of each child, by 1-based position.
    ///
    /// Children that are down or fail are left out when `only_running` is
    /// set; otherwise the first failure is returned as the diagnostic.
    async fn collect(&self) -> Result<Result<Vec<(usize, QueryResult)>, String>, EyeError> {
        let runs = join_all(self.children.iter().map(|child| async move {
            if self.only_running && !child.is_running().await {
                return None;
            }
            Some(child.query().await)
        }))
        .await;

        let mut firsts = Vec::new();
        for (idx, (run, child)) in runs.into_iter().zip(&self.children).enumerate() {
            let position = idx + 1;
            match run {
                None => {}
                Some(Ok(records)) => match records.into_iter().next() {
                    Some(record) => firsts.push((position, record)),
                    None if self.only_running => {}
                    None => return Ok(Err(format!("{} returned no records", child.info()))),
                },
                Some(Err(e)) if e.is_structural() => return Err(e),
                Some(Err(_)) if self.only_running => {}
                Some(Err(e)) => return Ok(Err(format!("{} failed: {}", child.info(), e))),
            }
        }
        Ok(Ok(firsts))
    }
}

/// Merge records into one, suffixing every field with its position
pub fn compose(records: &[(usize, QueryResult)]) -> QueryResult {
    let mut merged = serde_json::Map::new();
    for (position, record) in records {
        match record.as_object() {
            Some(fields) => {
                for (name, value) in fields {
                    merged.insert(format!("{}_{}", name, position), value.clone());
                }
            }
            None => {
                merged.insert(format!("value_{}", position), record.info().clone());
            }
        }
    }
    QueryResult::from_map(merged)
}

#[async_trait]
impl Query for CompareCheck {
    fn info(&self) -> &str {
        &self.info
    }

    /// The composed record
    async fn query(&self) -> Result<Vec<QueryResult>, EyeError> {
        match self.collect().await? {
            Ok(firsts) if firsts.is_empty() => Ok(Vec::new()),
            Ok(firsts) => Ok(vec![compose(&firsts)]),
            Err(diagnostic) => Err(EyeError::Backend(diagnostic)),
        }
    }

    async fn is_running(&self) -> bool {
        join_all(self.children.iter().map(|c| c.is_running()))
            .await
            .into_iter()
            .any(|running| running)
    }
}

#[async_trait]
impl Check for CompareCheck {
    async fn validate(&self) -> Result<Verdict, EyeError> {
        let started = Instant::now();
        let rule = match &self.rule {
            Ok(rule) => rule,
            Err(e) => {
                let error = EyeError::Evaluation(e.clone());
                return Ok(Verdict::from_error(&self.info, &error).with_elapsed(started));
            }
        };

        let firsts = match self.collect().await? {
            Ok(firsts) => firsts,
            Err(diagnostic) => {
                return Ok(Verdict::fail(&self.info, diagnostic).with_elapsed(started));
            }
        };
        if firsts.is_empty() {
            return Ok(Verdict::fail(&self.info, "nothing to compare").with_elapsed(started));
        }

        let verdict = if rule.is_empty() {
            // Without a rule the records themselves must be equal
            let first = firsts[0].1.info();
            let equal = firsts.iter().all(|(_, r)| r.info() == first);
            Verdict::from_bool(
                &self.info,
                equal,
                if equal { "records are equal" } else { "records differ" },
            )
        } else {
            let composed = compose(&firsts);
            match rule.satisfied(&composed) {
                Ok(ok) => Verdict::from_bool(
                    &self.info,
                    ok,
                    format!("compared {} of {} services", firsts.len(), self.children.len()),
                ),
                Err(e) => Verdict::from_error(&self.info, &EyeError::Evaluation(e)),
            }
        };
        Ok(verdict.with_records(firsts.len()).with_elapsed(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ValidationRequest;
    use crate::service::mock::MockBackend;
    use crate::service::Service;
    use serde_json::json;

    async fn check(
        name: &str,
        records: Vec<serde_json::Value>,
    ) -> (Arc<dyn Query>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new(records));
        let service = Service::new(name, backend.clone());
        service.init().await.unwrap();
        let check = service
            .new_service_check(ValidationRequest::new("select count(*) C1"))
            .unwrap();
        (Arc::new(check), backend)
    }

    #[test]
    fn test_compose_suffixes_fields() {
        let composed = compose(&[
            (1, QueryResult::new(json!({"C1": 10}))),
            (2, QueryResult::new(json!({"C1": 12}))),
            (3, QueryResult::new(json!("text"))),
        ]);
        assert_eq!(
            composed.info(),
            &json!({"C1_1": 10, "C1_2": 12, "value_3": "text"})
        );
    }

    #[tokio::test]
    async fn test_compare_with_expression() {
        let (a, _) = check("a", vec![json!({"C1": 10})]).await;
        let (b, _) = check("b", vec![json!({"C1": 12})]).await;

        let rule = Rule::compile("", "C1_2 - C1_1 <= 2");
        let compare = CompareCheck::new("cmp", vec![a.clone(), b.clone()], rule, false);
        assert!(compare.validate().await.unwrap().passed());

        let rule = Rule::compile("", "C1_1 = C1_2");
        let compare = CompareCheck::new("cmp", vec![a, b], rule, false);
        assert!(!compare.validate().await.unwrap().passed());
    }

    #[tokio::test]
    async fn test_compare_equality_without_rule() {
        let (a, _) = check("a", vec![json!({"C1": 10})]).await;
        let (b, _) = check("b", vec![json!({"C1": 10})]).await;
        let compare = CompareCheck::new("cmp", vec![a, b], Ok(Rule::default()), false);
        assert!(compare.validate().await.unwrap().passed());
    }

    #[tokio::test]
    async fn test_failed_child_fails_compare_all() {
        let (a, _) = check("a", vec![json!({"C1": 10})]).await;
        let (b, backend) = check("b", vec![json!({"C1": 10})]).await;
        backend.set_fetch_error(Some(EyeError::Backend("down".into())));

        let compare = CompareCheck::new("cmp", vec![a.clone(), b.clone()], Ok(Rule::default()), false);
        let verdict = compare.validate().await.unwrap();
        assert!(!verdict.passed());
        assert!(verdict.detail.contains("down"));

        // Running mode leaves the failed child out
        let compare = CompareCheck::new("cmp", vec![a, b], Ok(Rule::default()), true);
        let verdict = compare.validate().await.unwrap();
        assert!(verdict.passed());
        assert_eq!(verdict.records, 1);
    }

    #[tokio::test]
    async fn test_query_returns_composed_record() {
        let (a, _) = check("a", vec![json!({"C1": 1})]).await;
        let (b, _) = check("b", vec![json!({"C1": 2})]).await;
        let compare = CompareCheck::new("cmp", vec![a, b], Ok(Rule::default()), false);

        let records = compare.query().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value(&["C1_2"]).as_i64(), Some(2));
    }
}

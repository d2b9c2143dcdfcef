//! Per-record rules and their reduction over a result set

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use super::parser::{EvalError, Expression};
use crate::data::QueryResult;

/// Evaluation contract: one record in, a boolean (or an error) out
pub trait Evaluator: Send + Sync + fmt::Debug {
    fn evaluate(&self, record: &QueryResult) -> Result<bool, EvalError>;
}

impl Evaluator for Expression {
    fn evaluate(&self, record: &QueryResult) -> Result<bool, EvalError> {
        Expression::evaluate(self, record)
    }
}

/// Pattern and expression a record must both satisfy.
///
/// Unset parts are ignored; a rule with neither part accepts every record.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pattern: Option<Regex>,
    expr: Option<Arc<dyn Evaluator>>,
}

impl Rule {
    /// Compile a rule from request strings (empty strings mean "not set")
    pub fn compile(reg_expr: &str, eval_expr: &str) -> Result<Self, EvalError> {
        let pattern = if reg_expr.is_empty() {
            None
        } else {
            Some(Regex::new(reg_expr).map_err(|e| EvalError::Pattern(e.to_string()))?)
        };

        let rule = Self { pattern, expr: None };
        if eval_expr.trim().is_empty() {
            Ok(rule)
        } else {
            Ok(rule.with_evaluator(Arc::new(Expression::compile(eval_expr)?)))
        }
    }

    /// Rule with a caller-supplied evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.expr = Some(evaluator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none() && self.expr.is_none()
    }

    /// Whether a record satisfies every configured part
    pub fn satisfied(&self, record: &QueryResult) -> Result<bool, EvalError> {
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&record.to_text()) {
                return Ok(false);
            }
        }
        match &self.expr {
            Some(expr) => expr.evaluate(record),
            None => Ok(true),
        }
    }

    /// Apply the rule to a result set.
    ///
    /// `all=true` requires every record to satisfy the rule (vacuously true for
    /// no records), `all=false` requires at least one witness. A record whose
    /// evaluation errors counts as not satisfying; the first error is kept for
    /// diagnostics.
    pub fn apply(&self, records: &[QueryResult], all: bool) -> Evaluation {
        let mut satisfied = 0;
        let mut first_error = None;
        let mut errors = 0;

        for record in records {
            match self.satisfied(record) {
                Ok(true) => satisfied += 1,
                Ok(false) => {}
                Err(e) => {
                    errors += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let passed = if all {
            satisfied == records.len()
        } else {
            satisfied > 0
        };

        Evaluation {
            passed,
            all,
            records: records.len(),
            satisfied,
            errors,
            first_error,
        }
    }
}

impl Evaluator for Rule {
    fn evaluate(&self, record: &QueryResult) -> Result<bool, EvalError> {
        self.satisfied(record)
    }
}

/// Outcome of applying a rule to a result set
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub passed: bool,
    pub all: bool,
    pub records: usize,
    pub satisfied: usize,
    pub errors: usize,
    pub first_error: Option<EvalError>,
}

impl Evaluation {
    pub fn describe(&self) -> String {
        let mode = if self.all { "all" } else { "any" };
        let mut message = format!(
            "{} of {} records satisfy the rule ({})",
            self.satisfied, self.records, mode
        );
        if let Some(e) = &self.first_error {
            message.push_str(&format!("; {} record(s) failed to evaluate: {}", self.errors, e));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<serde_json::Value>) -> Vec<QueryResult> {
        values.into_iter().map(QueryResult::new).collect()
    }

    #[test]
    fn test_all_requires_every_record() {
        let rule = Rule::compile("", "v > 0").unwrap();
        let data = records(vec![json!({"v": 1}), json!({"v": 2})]);
        assert!(rule.apply(&data, true).passed);

        let rule = Rule::compile("", "v > 1").unwrap();
        let evaluation = rule.apply(&data, true);
        assert!(!evaluation.passed);
        assert_eq!(evaluation.satisfied, 1);
    }

    #[test]
    fn test_any_requires_one_witness() {
        let rule = Rule::compile("", "v > 1").unwrap();
        let data = records(vec![json!({"v": 1}), json!({"v": 2})]);
        assert!(rule.apply(&data, false).passed);

        let rule = Rule::compile("", "v > 5").unwrap();
        assert!(!rule.apply(&data, false).passed);
    }

    #[test]
    fn test_empty_result_set_is_vacuous() {
        let rule = Rule::compile("", "v > 0").unwrap();
        assert!(rule.apply(&[], true).passed);
        assert!(!rule.apply(&[], false).passed);
    }

    #[test]
    fn test_pattern_and_expression_are_combined_with_and() {
        let rule = Rule::compile("running", "pid > 100").unwrap();

        let both = QueryResult::new(json!({"state": "running", "pid": 200}));
        let only_pattern = QueryResult::new(json!({"state": "running", "pid": 50}));
        let only_expr = QueryResult::new(json!({"state": "stopped", "pid": 200}));

        assert!(rule.satisfied(&both).unwrap());
        assert!(!rule.satisfied(&only_pattern).unwrap());
        assert!(!rule.satisfied(&only_expr).unwrap());
    }

    #[test]
    fn test_empty_rule_accepts_everything() {
        let rule = Rule::compile("", "").unwrap();
        assert!(rule.is_empty());
        let data = records(vec![json!({"v": 1})]);
        assert!(rule.apply(&data, true).passed);
        assert!(rule.apply(&data, false).passed);
    }

    #[test]
    fn test_invalid_pattern_is_compile_error() {
        let err = Rule::compile("(unclosed", "").unwrap_err();
        assert!(matches!(err, EvalError::Pattern(_)));
    }

    #[test]
    fn test_runtime_error_counts_as_unsatisfied() {
        let rule = Rule::compile("", "v > 1").unwrap();
        let data = records(vec![json!({"v": "text"}), json!({"v": 2})]);

        let evaluation = rule.apply(&data, false);
        assert!(evaluation.passed);
        assert_eq!(evaluation.errors, 1);

        let evaluation = rule.apply(&data, true);
        assert!(!evaluation.passed);
        assert!(evaluation.describe().contains("failed to evaluate"));
    }
}

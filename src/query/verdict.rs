use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EyeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    /// Left out of an aggregate because its service was not running
    Skipped,
}

/// Outcome of a validation plus its diagnostic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub info: String,
    pub outcome: Outcome,
    pub detail: String,
    /// Number of records (or active children, for composites) evaluated
    pub records: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Verdict>,
    pub checked_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl Verdict {
    fn new(info: impl Into<String>, outcome: Outcome, detail: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            outcome,
            detail: detail.into(),
            records: 0,
            children: Vec::new(),
            checked_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    pub fn pass(info: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(info, Outcome::Pass, detail)
    }

    pub fn fail(info: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(info, Outcome::Fail, detail)
    }

    pub fn skipped(info: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(info, Outcome::Skipped, detail)
    }

    pub fn from_bool(info: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        if passed {
            Self::pass(info, detail)
        } else {
            Self::fail(info, detail)
        }
    }

    /// Failing verdict carrying an error as its diagnostic
    pub fn from_error(info: impl Into<String>, error: &EyeError) -> Self {
        Self::fail(info, error.to_string())
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    pub fn with_children(mut self, children: Vec<Verdict>) -> Self {
        self.children = children;
        self
    }

    pub fn with_elapsed(mut self, started: Instant) -> Self {
        self.elapsed_ms = started.elapsed().as_millis() as u64;
        self
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::fail("db", "down")
            .with_children(vec![Verdict::skipped("child", "not running")]);
        let json = serde_json::to_value(&verdict).unwrap();

        assert_eq!(json["outcome"], "fail");
        assert_eq!(json["children"][0]["outcome"], "skipped");
        assert!(!verdict.passed());
    }

    #[test]
    fn test_from_error() {
        let verdict = Verdict::from_error("web", &EyeError::Timeout(500));
        assert!(!verdict.passed());
        assert!(verdict.detail.contains("500"));
    }
}

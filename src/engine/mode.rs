use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EyeError;

/// Aggregate over several services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiMode {
    /// Every service must validate
    All,
    /// One service validating is enough
    Any,
    /// Every running service must validate
    Running,
    PingAll,
    PingAny,
    CompareAll,
    CompareRunning,
}

impl MultiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultiMode::All => "all",
            MultiMode::Any => "any",
            MultiMode::Running => "running",
            MultiMode::PingAll => "ping_all",
            MultiMode::PingAny => "ping_any",
            MultiMode::CompareAll => "compare_all",
            MultiMode::CompareRunning => "compare_running",
        }
    }

    pub fn is_ping(&self) -> bool {
        matches!(self, MultiMode::PingAll | MultiMode::PingAny)
    }

    pub fn is_compare(&self) -> bool {
        matches!(self, MultiMode::CompareAll | MultiMode::CompareRunning)
    }

    /// Whether every active child must pass
    pub fn requires_all(&self) -> bool {
        !matches!(self, MultiMode::Any | MultiMode::PingAny)
    }

    /// Whether services that are down are left out
    pub fn only_running(&self) -> bool {
        matches!(self, MultiMode::Running | MultiMode::CompareRunning)
    }
}

impl fmt::Display for MultiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MultiMode {
    type Err = EyeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(MultiMode::All),
            "any" => Ok(MultiMode::Any),
            "running" => Ok(MultiMode::Running),
            "ping_all" => Ok(MultiMode::PingAll),
            "ping_any" => Ok(MultiMode::PingAny),
            "compare_all" => Ok(MultiMode::CompareAll),
            "compare_running" => Ok(MultiMode::CompareRunning),
            other => Err(EyeError::InvalidRequest(format!("unknown mode '{}'", other))),
        }
    }
}

//! Local process table backend
//!
//! Queries are regular expressions matched against each process's name and
//! command line. The process table is snapshotted with `ps` and reused for a
//! short TTL so that concurrent checks share one listing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::data::{Params, QueryResult};
use crate::error::EyeError;
use crate::service::Backend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsConfig {
    /// How long a process table snapshot is reused
    #[serde(default = "default_snapshot_ttl_ms")]
    pub snapshot_ttl_ms: u64,
}

fn default_snapshot_ttl_ms() -> u64 {
    1000
}

impl Default for PsConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_ms: default_snapshot_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proc {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub cmdline: String,
}

pub struct ProcessBackend {
    snapshots: Cache<(), Arc<Vec<Proc>>>,
}

impl ProcessBackend {
    pub fn new(config: PsConfig) -> Self {
        Self {
            snapshots: Cache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_millis(config.snapshot_ttl_ms.max(1)))
                .build(),
        }
    }

    async fn processes(&self) -> Result<Arc<Vec<Proc>>, EyeError> {
        if let Some(snapshot) = self.snapshots.get(&()) {
            return Ok(snapshot);
        }
        let output = tokio::process::Command::new("ps")
            .args(["-eo", "pid=,stat=,args="])
            .output()
            .await
            .map_err(|e| EyeError::Backend(format!("can't run ps: {}", e)))?;
        if !output.status.success() {
            return Err(EyeError::Backend(format!("ps exited with {}", output.status)));
        }
        let snapshot = Arc::new(parse_ps_output(&String::from_utf8_lossy(&output.stdout)));
        tracing::debug!(processes = snapshot.len(), "Process table refreshed");
        self.snapshots.insert((), Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

/// Parse `ps -eo pid=,stat=,args=` lines
pub(crate) fn parse_ps_output(output: &str) -> Vec<Proc> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse::<u32>().ok()?;
            let status = parts.next()?.to_string();
            let cmdline = parts.collect::<Vec<_>>().join(" ");
            let program = cmdline.split_whitespace().next().unwrap_or("");
            let name = program.rsplit('/').next().unwrap_or(program).to_string();
            Some(Proc {
                pid,
                name,
                status,
                cmdline,
            })
        })
        .collect()
}

fn compile_query(query: &str) -> Result<Regex, EyeError> {
    Regex::new(query.trim()).map_err(|e| EyeError::InvalidRequest(format!("invalid pattern: {}", e)))
}

#[async_trait]
impl Backend for ProcessBackend {
    fn kind(&self) -> &'static str {
        "ps"
    }

    async fn connect(&self) -> Result<(), EyeError> {
        self.processes()
            .await
            .map(|_| ())
            .map_err(|e| EyeError::Config(e.to_string()))
    }

    async fn ping(&self) -> Result<(), EyeError> {
        self.processes().await.map(|_| ())
    }

    fn prepare_query(&self, query: &str) -> Result<String, EyeError> {
        compile_query(query)?;
        Ok(query.trim().to_string())
    }

    async fn fetch(&self, query: &str) -> Result<Vec<QueryResult>, EyeError> {
        let pattern = compile_query(query)?;
        let processes = self.processes().await?;
        processes
            .iter()
            .filter(|p| pattern.is_match(&p.name) || pattern.is_match(&p.cmdline))
            .map(|p| {
                serde_json::to_value(p)
                    .map(QueryResult::new)
                    .map_err(|e| EyeError::Backend(e.to_string()))
            })
            .collect()
    }

    fn supports_execute(&self) -> bool {
        true
    }

    /// Params: `command` (required), `args` (list or comma separated)
    async fn execute(&self, params: &Params) -> Result<(), EyeError> {
        let command = params.require_str("command")?;
        let args = params.opt_str_list("args")?.unwrap_or_default();

        let output = tokio::process::Command::new(command)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EyeError::Backend(format!("can't run '{}': {}", command, e)))?;

        if output.status.success() {
            self.snapshots.invalidate_all();
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(EyeError::Backend(format!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ps_output() {
        let output = "    1 Ss   /sbin/init splash\n  812 Sl   /usr/bin/mysqld --user=mysql\n garbage\n";
        let procs = parse_ps_output(output);

        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].pid, 1);
        assert_eq!(procs[0].name, "init");
        assert_eq!(procs[1].status, "Sl");
        assert_eq!(procs[1].cmdline, "/usr/bin/mysqld --user=mysql");
    }

    #[test]
    fn test_invalid_pattern() {
        let backend = ProcessBackend::new(PsConfig::default());
        assert!(matches!(
            backend.prepare_query("(unclosed"),
            Err(EyeError::InvalidRequest(_))
        ));
        assert_eq!(backend.prepare_query(" mysqld ").unwrap(), "mysqld");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_reports_exit_status() {
        let backend = ProcessBackend::new(PsConfig::default());
        backend
            .execute(&Params::new().with("command", "true"))
            .await
            .unwrap();

        let err = backend
            .execute(&Params::new().with("command", "false"))
            .await
            .unwrap_err();
        assert!(matches!(err, EyeError::Backend(_)));

        let err = backend.execute(&Params::new()).await.unwrap_err();
        assert!(matches!(err, EyeError::InvalidParams(_)));
    }
}

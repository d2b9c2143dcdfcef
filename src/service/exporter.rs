//! File exporter over a service query

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::ServiceInner;
use crate::data::{Params, QueryResult};
use crate::error::EyeError;
use crate::query::{Exporter, Rule};

const DEFAULT_SEPARATOR: &str = "\t";

/// Writes the records satisfying an optional filter to a file.
///
/// Params:
/// - `file` (required): output path
/// - `fields`: columns to write, joined by `separator`; JSON lines otherwise
/// - `separator`: column separator, tab by default
pub struct ServiceExporter {
    info: String,
    query: String,
    filter: Rule,
    service: Arc<ServiceInner>,
}

impl ServiceExporter {
    pub(crate) fn new(
        info: String,
        query: String,
        filter: Rule,
        service: Arc<ServiceInner>,
    ) -> Self {
        Self {
            info,
            query,
            filter,
            service,
        }
    }
}

#[async_trait]
impl Exporter for ServiceExporter {
    fn info(&self) -> &str {
        &self.info
    }

    async fn export(&self, params: &Params) -> Result<(), EyeError> {
        // Validate params before touching the backend
        let path = params.require_str("file")?;
        let fields = params.opt_str_list("fields")?;
        let separator = params.opt_str("separator")?.unwrap_or(DEFAULT_SEPARATOR);

        let records = self.service.fetch(&self.query).await?;
        let (kept, unevaluated) = filter_records(&self.filter, &records);
        if unevaluated > 0 {
            tracing::debug!(
                exporter = %self.info,
                records = unevaluated,
                "Records left out, filter failed to evaluate"
            );
        }

        let mut out = String::new();
        for record in &kept {
            match &fields {
                Some(fields) if !fields.is_empty() => {
                    out.push_str(&render_fields(record, fields, separator));
                }
                _ => out.push_str(&record.info().to_string()),
            }
            out.push('\n');
        }

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;

        tracing::info!(
            exporter = %self.info,
            file = %path,
            records = kept.len(),
            total = records.len(),
            unevaluated,
            "Export written"
        );
        Ok(())
    }
}

/// Records satisfying the filter, plus the number it could not evaluate
fn filter_records<'a>(filter: &Rule, records: &'a [QueryResult]) -> (Vec<&'a QueryResult>, usize) {
    let mut unevaluated = 0;
    let kept = records
        .iter()
        .filter(|record| match filter.satisfied(record) {
            Ok(ok) => ok,
            Err(_) => {
                unevaluated += 1;
                false
            }
        })
        .collect();
    (kept, unevaluated)
}

fn render_fields(record: &QueryResult, fields: &[String], separator: &str) -> String {
    fields
        .iter()
        .map(|field| {
            let path: Vec<&str> = field.split('.').collect();
            match record.field(&path) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

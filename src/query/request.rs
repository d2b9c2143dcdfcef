use serde::{Deserialize, Serialize};

/// Request for a check: the query to run and the rules its records must meet
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Backend-specific query text (SQL statement, HTTP path, directory, ...)
    #[serde(default)]
    pub query: String,
    /// Boolean expression over record fields
    #[serde(default, alias = "evalExpr")]
    pub eval_expr: String,
    /// Pattern matched against the serialized record
    #[serde(default, alias = "regExpr")]
    pub reg_expr: String,
    /// Every record must satisfy the rules (otherwise one witness is enough)
    #[serde(default)]
    pub all: bool,
}

impl ValidationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_eval(mut self, eval_expr: impl Into<String>) -> Self {
        self.eval_expr = eval_expr.into();
        self
    }

    pub fn with_regex(mut self, reg_expr: impl Into<String>) -> Self {
        self.reg_expr = reg_expr.into();
        self
    }

    pub fn with_all(mut self, all: bool) -> Self {
        self.all = all;
        self
    }

    /// Cache key identifying a check of this request on a service
    pub fn check_key(&self, service_name: &str) -> String {
        format!(
            "{}.q({}).e({}).r({}).a({})",
            service_name, self.query, self.eval_expr, self.reg_expr, self.all
        )
    }

    /// Key for composites over several services
    pub fn checks_key(&self, mode: &str, service_names: &[String]) -> String {
        format!(
            "{}[{}].q({}).e({}).r({}).a({})",
            mode,
            service_names.join(","),
            self.query,
            self.eval_expr,
            self.reg_expr,
            self.all
        )
    }

    pub fn as_export(&self) -> ExportRequest {
        ExportRequest {
            query: self.query.clone(),
            eval_expr: self.eval_expr.clone(),
        }
    }
}

/// Request for an exporter: the query whose records are exported and an
/// optional filter expression
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, alias = "evalExpr")]
    pub eval_expr: String,
}

impl ExportRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            eval_expr: String::new(),
        }
    }

    pub fn with_eval(mut self, eval_expr: impl Into<String>) -> Self {
        self.eval_expr = eval_expr.into();
        self
    }

    pub fn export_key(&self, service_name: &str) -> String {
        format!("{}.export.q({}).e({})", service_name, self.query, self.eval_expr)
    }
}

impl From<ValidationRequest> for ExportRequest {
    fn from(req: ValidationRequest) -> Self {
        req.as_export()
    }
}

/// Request for an executor. Everything it needs arrives as params at
/// execution time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {}

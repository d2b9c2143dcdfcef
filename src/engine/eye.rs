//! The controller tying services, named checks, exporters and executors
//! together

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use moka::sync::Cache;

use super::mode::MultiMode;
use crate::config::{EyeConfig, FieldsExporterConfig, ValidateCheckConfig};
use crate::data::{ParamValue, Params, QueryResult};
use crate::error::EyeError;
use crate::multi::{Child, CompareCheck, MultiCheck};
use crate::query::{
    Check, CommandRequest, Executor, ExportRequest, Exporter, Query, Rule, ValidationRequest,
    Verdict,
};
use crate::service::{Service, ServiceFactory};

/// Exporter plus the column layout it was configured with
#[derive(Clone)]
struct NamedExporter {
    exporter: Arc<dyn Exporter>,
    fields: Vec<String>,
    separator: Option<String>,
}

pub struct Eye {
    name: String,
    export_folder: PathBuf,
    factory: ServiceFactory,
    checks: DashMap<String, Arc<dyn Check>>,
    exporters: DashMap<String, NamedExporter>,
    executors: DashMap<String, Arc<dyn Executor>>,
    live_checks: Cache<String, Arc<dyn Check>>,
    live_multis: Cache<String, Arc<MultiCheck>>,
}

impl Eye {
    /// Build services from the configuration, then register named items.
    /// Items that can't be built are logged and skipped.
    pub async fn new(config: EyeConfig) -> Self {
        let access = match config.resolve_access().await {
            Ok(access) => access,
            Err(e) => {
                tracing::warn!(error = %e, "Can't read access data from Vault, using configured access");
                config.access_finder()
            }
        };
        let factory = ServiceFactory::new();
        for service_config in &config.services {
            match service_config.build(&access) {
                Ok(service) => factory.add(service).await,
                Err(e) => tracing::warn!(
                    service = %service_config.name,
                    kind = service_config.backend.kind(),
                    error = %e,
                    "Can't build service"
                ),
            }
        }
        Self::with_factory(config, factory)
    }

    /// Register named items over an existing factory
    pub fn with_factory(config: EyeConfig, factory: ServiceFactory) -> Self {
        let capacity = config.live_checks.max(1);
        let eye = Self {
            name: config.name.clone(),
            export_folder: config.export_folder.clone(),
            factory,
            checks: DashMap::new(),
            exporters: DashMap::new(),
            executors: DashMap::new(),
            live_checks: Cache::builder().max_capacity(capacity).build(),
            live_multis: Cache::builder().max_capacity(capacity).build(),
        };
        eye.register(&config);
        tracing::info!(
            eye = %eye.name,
            services = eye.factory.len(),
            checks = eye.checks.len(),
            exporters = eye.exporters.len(),
            executors = eye.executors.len(),
            "Controller ready"
        );
        eye
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory(&self) -> &ServiceFactory {
        &self.factory
    }

    fn register(&self, config: &EyeConfig) {
        for item in &config.validate {
            for (full_name, service) in per_service(&item.name, &item.services) {
                match self.service_check(service, &item.request) {
                    Ok(check) => self.add_check(full_name, check),
                    Err(e) => skip("check", &full_name, &e),
                }
            }
        }

        let multis = [
            (&config.validate_all, MultiMode::All),
            (&config.validate_any, MultiMode::Any),
            (&config.validate_running, MultiMode::Running),
            (&config.compare_all, MultiMode::CompareAll),
            (&config.compare_running, MultiMode::CompareRunning),
        ];
        for (items, mode) in multis {
            for item in items {
                self.register_multi(item, mode);
            }
        }

        let pings = [
            (&config.ping_all, MultiMode::PingAll),
            (&config.ping_any, MultiMode::PingAny),
        ];
        for (items, mode) in pings {
            for item in items {
                let built = self.build_multi(mode, &item.services, &ValidationRequest::default());
                match built {
                    Ok(multi) => self.add_check(item.name.clone(), multi),
                    Err(e) => skip("check", &item.name, &e),
                }
            }
        }

        for item in &config.fields_exporter {
            self.register_exporter(item);
        }

        for item in &config.executor {
            for (full_name, service) in per_service(&item.name, &item.services) {
                let built = self
                    .factory
                    .get(service)
                    .and_then(|s| s.new_executor(CommandRequest::default()));
                match built {
                    Ok(executor) => {
                        self.executors.insert(full_name, executor);
                    }
                    Err(e) => skip("executor", &full_name, &e),
                }
            }
        }
    }

    fn register_multi(&self, item: &ValidateCheckConfig, mode: MultiMode) {
        let built = if mode.is_compare() {
            self.build_compare(mode, &item.services, &item.request)
        } else {
            self.build_multi(mode, &item.services, &item.request)
                .map(|m| m as Arc<dyn Check>)
        };
        match built {
            Ok(check) => self.add_check(item.name.clone(), check),
            Err(e) => skip("check", &item.name, &e),
        }
    }

    fn register_exporter(&self, item: &FieldsExporterConfig) {
        let request = ExportRequest::new(item.query.clone()).with_eval(item.eval_expr.clone());
        for (full_name, service) in per_service(&item.name, &item.services) {
            let built = self
                .factory
                .get(service)
                .and_then(|s| s.new_exporter(request.clone()));
            match built {
                Ok(exporter) => {
                    self.exporters.insert(
                        full_name,
                        NamedExporter {
                            exporter,
                            fields: item.fields.clone(),
                            separator: item.separator.clone(),
                        },
                    );
                }
                Err(e) => skip("exporter", &full_name, &e),
            }
        }
    }

    fn add_check(&self, name: String, check: Arc<dyn Check>) {
        tracing::debug!(check = %name, info = %check.info(), "Check registered");
        self.checks.insert(name, check);
    }

    /// Check of one service; an empty query means a ping
    fn service_check(
        &self,
        service: &str,
        req: &ValidationRequest,
    ) -> Result<Arc<dyn Check>, EyeError> {
        let service = self.factory.get(service)?;
        if req.query.trim().is_empty() {
            Ok(service.new_ping())
        } else {
            service.new_check(req.clone())
        }
    }

    fn live_check(&self, service: &str, req: &ValidationRequest) -> Result<Arc<dyn Check>, EyeError> {
        self.live_checks
            .try_get_with(req.check_key(service), || self.service_check(service, req))
            .map_err(|e| (*e).clone())
    }

    fn build_multi(
        &self,
        mode: MultiMode,
        services: &[String],
        req: &ValidationRequest,
    ) -> Result<Arc<MultiCheck>, EyeError> {
        let children = services
            .iter()
            .map(|name| {
                if mode.is_ping() {
                    self.factory.get(name).map(|s| Child::Check(s.new_ping()))
                } else {
                    self.service_check(name, req).map(Child::Check)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(MultiCheck::new(
            req.checks_key(mode.as_str(), services),
            children,
            mode.requires_all(),
            mode.only_running(),
        )))
    }

    fn build_compare(
        &self,
        mode: MultiMode,
        services: &[String],
        req: &ValidationRequest,
    ) -> Result<Arc<dyn Check>, EyeError> {
        let children = services
            .iter()
            .map(|name| {
                let service: Service = self.factory.get(name)?;
                let check = service.new_service_check(req.clone())?;
                Ok(Arc::new(check) as Arc<dyn Query>)
            })
            .collect::<Result<Vec<_>, EyeError>>()?;
        Ok(Arc::new(CompareCheck::new(
            req.checks_key(mode.as_str(), services),
            children,
            Rule::compile(&req.reg_expr, &req.eval_expr),
            mode.only_running(),
        )))
    }

    /// Liveness of one service as a verdict
    pub async fn ping(&self, service: &str) -> Result<Verdict, EyeError> {
        let ping = self.factory.get(service)?.new_ping();
        ping.validate().await
    }

    /// Ad-hoc validation; an empty query falls back to a ping
    pub async fn validate(&self, service: &str, req: &ValidationRequest) -> Result<Verdict, EyeError> {
        if req.query.trim().is_empty() {
            tracing::debug!(service = %service, "No query, pinging instead");
            return self.ping(service).await;
        }
        self.live_check(service, req)?.validate().await
    }

    pub async fn query(&self, service: &str, req: &ValidationRequest) -> Result<Vec<QueryResult>, EyeError> {
        if req.query.trim().is_empty() {
            return Err(EyeError::InvalidRequest("query must not be empty".into()));
        }
        self.live_check(service, req)?.query().await
    }

    /// Run a named check
    pub async fn check(&self, name: &str) -> Result<Verdict, EyeError> {
        let check = self
            .checks
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EyeError::NotFound(format!("check '{}'", name)))?;
        check.validate().await
    }

    /// Ad-hoc aggregate over several services.
    ///
    /// `params` may carry `timeout_ms` bounding each child.
    pub async fn run_multi(
        &self,
        mode: MultiMode,
        services: &[String],
        req: &ValidationRequest,
        params: &Params,
    ) -> Result<Verdict, EyeError> {
        if services.is_empty() {
            return Err(EyeError::InvalidRequest("no services given".into()));
        }
        let key = req.checks_key(mode.as_str(), services);

        if mode.is_compare() {
            let check = self
                .live_checks
                .try_get_with(key, || self.build_compare(mode, services, req))
                .map_err(|e| (*e).clone())?;
            return check.validate().await;
        }

        let multi = self
            .live_multis
            .try_get_with(key, || self.build_multi(mode, services, req))
            .map_err(|e| (*e).clone())?;
        multi.execute(params).await
    }

    pub async fn validate_all(&self, services: &[String], req: &ValidationRequest) -> Result<Verdict, EyeError> {
        self.run_multi(MultiMode::All, services, req, &Params::new()).await
    }

    pub async fn validate_any(&self, services: &[String], req: &ValidationRequest) -> Result<Verdict, EyeError> {
        self.run_multi(MultiMode::Any, services, req, &Params::new()).await
    }

    pub async fn validate_running(
        &self,
        services: &[String],
        req: &ValidationRequest,
    ) -> Result<Verdict, EyeError> {
        self.run_multi(MultiMode::Running, services, req, &Params::new()).await
    }

    pub async fn ping_all(&self, services: &[String]) -> Result<Verdict, EyeError> {
        let req = ValidationRequest::default();
        self.run_multi(MultiMode::PingAll, services, &req, &Params::new()).await
    }

    pub async fn ping_any(&self, services: &[String]) -> Result<Verdict, EyeError> {
        let req = ValidationRequest::default();
        self.run_multi(MultiMode::PingAny, services, &req, &Params::new()).await
    }

    pub async fn compare_all(&self, services: &[String], req: &ValidationRequest) -> Result<Verdict, EyeError> {
        self.run_multi(MultiMode::CompareAll, services, req, &Params::new()).await
    }

    pub async fn compare_running(
        &self,
        services: &[String],
        req: &ValidationRequest,
    ) -> Result<Verdict, EyeError> {
        self.run_multi(MultiMode::CompareRunning, services, req, &Params::new()).await
    }

    /// Run a named exporter into the export folder; returns the written file
    pub async fn export(&self, name: &str, params: &Params) -> Result<PathBuf, EyeError> {
        let named = self
            .exporters
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EyeError::NotFound(format!("exporter '{}'", name)))?;

        let mut effective = Params::new();
        if !named.fields.is_empty() {
            let fields = named.fields.iter().cloned().map(ParamValue::String).collect();
            effective.insert("fields", ParamValue::List(fields));
        }
        if let Some(separator) = &named.separator {
            effective.insert("separator", separator.clone());
        }
        for (key, value) in params.iter().filter(|(k, _)| k.as_str() != "file") {
            effective.insert(key.clone(), value.clone());
        }

        let file = self.export_path(name, params)?;
        effective.insert("file", file.to_string_lossy().to_string());
        named.exporter.export(&effective).await?;
        Ok(file)
    }

    /// Sanitized file name inside the export folder
    fn export_path(&self, name: &str, params: &Params) -> Result<PathBuf, EyeError> {
        let file_name = match params.opt_str("file")? {
            Some(file) => file
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(file)
                .to_string(),
            None => {
                let mut file_name = name.to_string();
                for (_, value) in params.iter() {
                    file_name.push('_');
                    file_name.push_str(&value.to_string());
                }
                file_name.push_str(".txt");
                file_name
            }
        };
        let file_name = sanitize_file_name(&file_name);
        if file_name.is_empty() || file_name.chars().all(|c| c == '.') {
            return Err(EyeError::InvalidParams(format!(
                "invalid file name '{}'",
                file_name
            )));
        }
        Ok(self.export_folder.join(file_name))
    }

    pub async fn execute(&self, name: &str, params: &Params) -> Result<(), EyeError> {
        let executor = self
            .executors
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EyeError::NotFound(format!("executor '{}'", name)))?;
        executor.execute(params).await
    }

    pub fn check_names(&self) -> Vec<String> {
        sorted_keys(self.checks.iter().map(|e| e.key().clone()))
    }

    pub fn exporter_names(&self) -> Vec<String> {
        sorted_keys(self.exporters.iter().map(|e| e.key().clone()))
    }

    pub fn executor_names(&self) -> Vec<String> {
        sorted_keys(self.executors.iter().map(|e| e.key().clone()))
    }

    pub fn service_names(&self) -> Vec<String> {
        self.factory.names()
    }

    /// Close every service and drop ad-hoc checks
    pub async fn close(&self) {
        self.factory.close().await;
        self.live_checks.invalidate_all();
        self.live_multis.invalidate_all();
        tracing::info!(eye = %self.name, "Controller closed");
    }
}

/// `(full name, service)` pairs; names are prefixed with the service when an
/// item spans several services
fn per_service<'a>(name: &str, services: &'a [String]) -> Vec<(String, &'a str)> {
    if services.len() > 1 {
        services
            .iter()
            .map(|s| (format!("{}-{}", s, name), s.as_str()))
            .collect()
    } else {
        services.iter().map(|s| (name.to_string(), s.as_str())).collect()
    }
}

fn skip(what: &str, name: &str, error: &EyeError) {
    tracing::warn!(item = what, name = %name, error = %error, "Registration skipped");
}

fn sorted_keys(keys: impl Iterator<Item = String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.collect();
    keys.sort();
    keys
}

/// Keep `[a-zA-Z0-9.-]`, collapsing every other run of characters into `_`
fn sanitize_file_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            sanitized.push(c);
        } else if !sanitized.ends_with('_') {
            sanitized.push('_');
        }
    }
    sanitized
}

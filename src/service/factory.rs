//! Name-keyed registry of services

use dashmap::DashMap;

use super::Service;
use crate::error::EyeError;

/// Registry resolving service names (case-insensitive) to live services
#[derive(Default)]
pub struct ServiceFactory {
    services: DashMap<String, Service>,
}

impl ServiceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, closing any previous one under the same name
    pub async fn add(&self, service: Service) {
        let key = service.name().to_lowercase();
        tracing::info!(service = %service.name(), kind = service.kind(), "Service registered");
        if let Some(previous) = self.services.insert(key, service) {
            previous.close().await;
        }
    }

    /// Registered handle, without initializing it
    pub fn get(&self, name: &str) -> Result<Service, EyeError> {
        self.services
            .get(&name.to_lowercase())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EyeError::NotFound(format!("service '{}'", name)))
    }

    /// Initialized and reachable service
    pub async fn find(&self, name: &str) -> Result<Service, EyeError> {
        let service = self.get(name)?;
        if let Err(e) = service.init().await {
            return Err(match e {
                EyeError::Closed(_) => e,
                other => EyeError::Unavailable(format!("{}: {}", name, other)),
            });
        }
        if !service.ping().await {
            return Err(EyeError::Unavailable(format!(
                "{}: liveness probe failed",
                name
            )));
        }
        Ok(service)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(&name.to_lowercase())
    }

    /// Registered service names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .services
            .iter()
            .map(|entry| entry.value().name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Close every registered service and empty the registry
    pub async fn close(&self) {
        let keys: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, service)) = self.services.remove(&key) {
                service.close().await;
            }
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use super::ServiceInner;
use crate::data::Params;
use crate::error::EyeError;
use crate::query::Executor;

/// Runs the backend's side effect with the caller's params
pub struct ServiceExecutor {
    info: String,
    service: Arc<ServiceInner>,
}

impl ServiceExecutor {
    pub(crate) fn new(info: String, service: Arc<ServiceInner>) -> Self {
        Self { info, service }
    }
}

#[async_trait]
impl Executor for ServiceExecutor {
    fn info(&self) -> &str {
        &self.info
    }

    async fn execute(&self, params: &Params) -> Result<(), EyeError> {
        self.service.execute(params).await.map_err(|e| {
            tracing::warn!(executor = %self.info, error = %e, "Execution failed");
            e
        })?;
        tracing::info!(executor = %self.info, "Executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::MockBackend;
    use super::super::Service;
    use super::*;
    use crate::query::CommandRequest;

    #[tokio::test]
    async fn test_execute_passes_params_through() {
        let backend = Arc::new(MockBackend::new(vec![]).with_executor());
        let service = Service::new("cmd", backend.clone());
        let executor = service.new_executor(CommandRequest::default()).unwrap();
        assert_eq!(executor.info(), "cmd.execute");

        let params = Params::new().with("command", "true");
        executor.execute(&params).await.unwrap();
        assert_eq!(backend.executed(), vec![params]);
    }

    #[tokio::test]
    async fn test_execute_after_close() {
        let backend = Arc::new(MockBackend::new(vec![]).with_executor());
        let service = Service::new("cmd", backend);
        let executor = service.new_executor(CommandRequest::default()).unwrap();
        service.close().await;

        let err = executor.execute(&Params::new()).await.unwrap_err();
        assert!(matches!(err, EyeError::Closed(_)));
    }
}

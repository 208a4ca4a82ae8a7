//! The dispatcher boundary: a capability lookup plus invocation over every
//! registered operation. Agnostic to what the operations do.

use crate::error::{Result, ToolError};
use crate::traits::{OutstandingOperation, Tool, ToolSpec};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.spec().name;
        if self.tools.contains_key(&name) {
            return Err(ToolError::InvalidArguments(format!(
                "operation {name} is already registered"
            )));
        }
        tracing::debug!(operation = %name, "operation registered");
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn has_operation(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    pub fn spec(&self, id: &str) -> Option<ToolSpec> {
        self.tools.get(id).map(|tool| tool.spec())
    }

    pub fn operation_ids(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    #[tracing::instrument(level = "info", skip(self, arguments), fields(operation = %id))]
    pub async fn execute(&self, id: &str, arguments: serde_json::Value) -> Result<serde_json::Value> {
        let tool = self
            .tools
            .get(id)
            .ok_or_else(|| ToolError::UnknownOperation(id.to_string()))?;
        let started = Instant::now();
        let result = tool.execute(arguments).await;
        match &result {
            Ok(_) => tracing::info!(
                latency_ms = started.elapsed().as_millis() as u64,
                "operation completed"
            ),
            Err(error) => tracing::warn!(
                latency_ms = started.elapsed().as_millis() as u64,
                %error,
                "operation failed"
            ),
        }
        result
    }

    pub async fn outstanding(
        &self,
        id: &str,
        arguments: &serde_json::Value,
    ) -> Result<Option<OutstandingOperation>> {
        let tool = self
            .tools
            .get(id)
            .ok_or_else(|| ToolError::UnknownOperation(id.to_string()))?;
        tool.outstanding(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use og_intent::OperationClass;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "download_logs".to_string(),
                description: "echo".to_string(),
                parameters_schema: json!({ "type": "object" }),
                operation_class: Some(OperationClass::Download),
            }
        }

        async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value> {
            Ok(json!({ "echo": arguments }))
        }
    }

    #[tokio::test]
    async fn executes_registered_operation() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert!(registry.has_operation("download_logs"));
        assert!(!registry.has_operation("download_blobs"));
        let out = registry
            .execute("download_logs", json!({ "project_id": "p1" }))
            .await
            .unwrap();
        assert_eq!(out["echo"]["project_id"], "p1");
        assert_eq!(
            registry.outstanding("download_logs", &json!({})).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("drop_tables", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownOperation(ref id) if id == "drop_tables"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.operation_ids(), vec!["download_logs".to_string()]);
    }
}

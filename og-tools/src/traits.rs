use crate::error::{Result, ToolError};
use async_trait::async_trait;
use og_intent::OperationClass;
use serde::{Deserialize, Serialize};

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    /// `None` for read-only operations that dispatch without confirmation.
    pub operation_class: Option<OperationClass>,
}

/// A previously started instance of an operation that has not finished yet,
/// as reported by the operation itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingOperation {
    pub reference: String,
    pub status: String,
    #[serde(default)]
    pub started_at: Option<String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value>;

    /// Instance of this operation still in flight for the same target, if the
    /// operation can tell. Staleness of the answer is the operation's concern.
    async fn outstanding(
        &self,
        _arguments: &serde_json::Value,
    ) -> Result<Option<OutstandingOperation>> {
        Ok(None)
    }
}

pub fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        serde_json::Value::String(_) => Err(ToolError::InvalidArguments(format!(
            "key {key} must not be empty"
        ))),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

//! Runs one logical operation across a set of project targets.
//!
//! Targets are processed strictly one after another, in the order given.
//! A failing or panicking target is recorded and the loop moves on.
//! Sub-calls never pass through the confirmation gate; the batch as a whole
//! was confirmed once by the caller.

use crate::targets::ProjectTarget;
use futures_util::FutureExt;
use og_intent::{Environment, ErrorKind, catalog};
use og_tools::{OutstandingOperation, ToolRegistry};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

/// Keys that select targets or talk to the gate; replaced or dropped before
/// a per-target call.
const BATCH_ONLY_KEYS: &[&str] = &[
    "projects",
    "all_projects",
    "confirmation_token",
    "confirm",
    "confirmed",
    "preview_only",
    "preview",
    "duplicate_policy",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
    Ok { value: serde_json::Value },
    Err { error: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    pub target: String,
    pub outcome: TargetOutcome,
}

impl TargetResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, TargetOutcome::Ok { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub per_target: Vec<TargetResult>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl BatchResult {
    fn record(&mut self, result: TargetResult) {
        if result.is_ok() {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.per_target.push(result);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetEstimate {
    pub target: String,
    pub environment: Option<String>,
    /// False when the target does not list the environment the request names.
    pub environment_available: bool,
    pub estimated_size_mb: u64,
    pub estimated_minutes: u64,
}

/// Static sizing guess for a multi-target preview. Nothing is probed and
/// nothing runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEstimate {
    pub operation: String,
    pub informational_only: bool,
    pub per_target: Vec<TargetEstimate>,
    pub total_size_mb: u64,
    pub total_minutes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchRun {
    /// Exactly one target: the bare outcome, no aggregate.
    Single(TargetResult),
    Completed(BatchResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("no target projects specified")]
    NoTargetsSpecified,

    #[error("operation {0} is not registered")]
    UnknownOperation(String),
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoTargetsSpecified => ErrorKind::NoTargetsSpecified,
            Self::UnknownOperation(_) => ErrorKind::UnrecognizedCommand,
        }
    }
}

pub struct BatchOrchestrator {
    registry: Arc<ToolRegistry>,
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn run(
        &self,
        operation: &str,
        targets: &[ProjectTarget],
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<BatchRun, BatchError> {
        self.run_reusing(operation, targets, arguments, &HashMap::new())
            .await
    }

    /// Like [`run`](Self::run), but targets named in `reused` are recorded
    /// with their outstanding instance instead of being run again.
    #[tracing::instrument(level = "info", skip(self, targets, arguments, reused), fields(targets = targets.len(), reused = reused.len()))]
    pub async fn run_reusing(
        &self,
        operation: &str,
        targets: &[ProjectTarget],
        arguments: &serde_json::Map<String, serde_json::Value>,
        reused: &HashMap<String, OutstandingOperation>,
    ) -> Result<BatchRun, BatchError> {
        if targets.is_empty() {
            return Err(BatchError::NoTargetsSpecified);
        }
        if !self.registry.has_operation(operation) {
            return Err(BatchError::UnknownOperation(operation.to_string()));
        }

        if let [target] = targets {
            return Ok(BatchRun::Single(
                self.run_or_reuse(operation, target, arguments, reused).await,
            ));
        }

        let total = targets.len();
        let mut result = BatchResult::default();
        for (index, target) in targets.iter().enumerate() {
            tracing::info!(target_name = %target.name, index = index + 1, total, "batch target started");
            let outcome = self.run_or_reuse(operation, target, arguments, reused).await;
            tracing::info!(
                target_name = %target.name,
                index = index + 1,
                total,
                ok = outcome.is_ok(),
                "batch target finished"
            );
            result.record(outcome);
        }
        tracing::info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            "batch completed"
        );
        Ok(BatchRun::Completed(result))
    }

    async fn run_or_reuse(
        &self,
        operation: &str,
        target: &ProjectTarget,
        arguments: &serde_json::Map<String, serde_json::Value>,
        reused: &HashMap<String, OutstandingOperation>,
    ) -> TargetResult {
        match reused.get(&target.name) {
            Some(existing) => {
                tracing::info!(target_name = %target.name, operation, reference = %existing.reference, "reusing outstanding instance");
                reused_result(&target.name, existing)
            }
            None => self.run_one(operation, target, arguments).await,
        }
    }

    async fn run_one(
        &self,
        operation: &str,
        target: &ProjectTarget,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> TargetResult {
        let args = target_arguments(target, arguments);
        let call = self.registry.execute(operation, args);
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => TargetOutcome::Ok { value },
            Ok(Err(error)) => failure(error.to_string()),
            Err(panic) => failure(format!(
                "operation panicked: {}",
                panic_message(panic.as_ref())
            )),
        };
        if let TargetOutcome::Err { message, .. } = &outcome {
            tracing::warn!(target_name = %target.name, operation, %message, "target failed");
        }
        TargetResult {
            target: target.name.clone(),
            outcome,
        }
    }

    pub fn estimate(
        &self,
        operation: &str,
        targets: &[ProjectTarget],
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<BatchEstimate, BatchError> {
        if targets.is_empty() {
            return Err(BatchError::NoTargetsSpecified);
        }
        let (size_mb, minutes) = typical_cost(operation);
        let environment = requested_environment(arguments);
        let factor = environment
            .as_deref()
            .and_then(Environment::from_alias)
            .map_or(1.0, environment_factor);

        let per_target: Vec<TargetEstimate> = targets
            .iter()
            .map(|target| TargetEstimate {
                target: target.name.clone(),
                environment: environment.clone(),
                environment_available: environment
                    .as_deref()
                    .is_none_or(|env| target.has_environment(env)),
                estimated_size_mb: (size_mb as f64 * factor).round() as u64,
                estimated_minutes: ((minutes as f64 * factor).ceil() as u64).max(1),
            })
            .collect();
        Ok(BatchEstimate {
            operation: operation.to_string(),
            informational_only: true,
            total_size_mb: per_target.iter().map(|t| t.estimated_size_mb).sum(),
            total_minutes: per_target.iter().map(|t| t.estimated_minutes).sum(),
            per_target,
        })
    }
}

/// The caller's arguments with this target's identity and credentials
/// substituted in.
pub fn target_arguments(
    target: &ProjectTarget,
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let mut args = arguments.clone();
    for key in BATCH_ONLY_KEYS {
        args.remove(*key);
    }
    args.insert("project".to_string(), serde_json::json!(target.name));
    args.insert("project_id".to_string(), serde_json::json!(target.project_id));
    args.insert(
        "credentials_ref".to_string(),
        serde_json::json!(target.credentials.as_str()),
    );
    serde_json::Value::Object(args)
}

/// Successful outcome for a target whose outstanding instance is reused
/// instead of starting a new one.
pub fn reused_result(target: &str, existing: &OutstandingOperation) -> TargetResult {
    TargetResult {
        target: target.to_string(),
        outcome: TargetOutcome::Ok {
            value: serde_json::json!({ "reused_existing": true, "existing": existing }),
        },
    }
}

fn failure(cause: String) -> TargetOutcome {
    TargetOutcome::Err {
        message: cause.clone(),
        error: ErrorKind::UnderlyingOperationFailed { cause },
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Typical (size in MB, duration in minutes) for one run on production.
fn typical_cost(operation: &str) -> (u64, u64) {
    match operation {
        catalog::EXPORT_DATABASE => (2048, 30),
        catalog::DOWNLOAD_DATABASE => (2048, 20),
        catalog::DOWNLOAD_BLOBS => (5120, 45),
        catalog::DOWNLOAD_LOGS => (256, 5),
        catalog::COPY_CONTENT => (4096, 60),
        catalog::START_DEPLOYMENT => (0, 25),
        catalog::RESET_DEPLOYMENT => (0, 10),
        catalog::COMPLETE_DEPLOYMENT => (0, 5),
        _ => (0, 1),
    }
}

fn environment_factor(environment: Environment) -> f64 {
    match environment {
        Environment::Production => 1.0,
        Environment::Preproduction => 0.6,
        Environment::Integration => 0.3,
    }
}

fn requested_environment(
    arguments: &serde_json::Map<String, serde_json::Value>,
) -> Option<String> {
    ["environment", "target_environment", "source_environment"]
        .iter()
        .find_map(|key| arguments.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::tests::target;
    use async_trait::async_trait;
    use og_intent::OperationClass;
    use og_tools::{Tool, ToolError, ToolSpec};
    use serde_json::json;
    use std::sync::Mutex;

    /// Fails for one project, panics for another, records call order.
    struct FlakyExport {
        calls: Mutex<Vec<String>>,
        fail_for: &'static str,
        panic_for: Option<&'static str>,
    }

    #[async_trait]
    impl Tool for FlakyExport {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: catalog::EXPORT_DATABASE.to_string(),
                description: "test export".to_string(),
                parameters_schema: json!({ "type": "object" }),
                operation_class: Some(OperationClass::Export),
            }
        }

        async fn execute(&self, arguments: serde_json::Value) -> og_tools::Result<serde_json::Value> {
            let project = arguments["project"].as_str().unwrap_or_default().to_string();
            self.calls.lock().unwrap().push(project.clone());
            if Some(project.as_str()) == self.panic_for {
                panic!("remote client exploded");
            }
            if project == self.fail_for {
                return Err(ToolError::ExecutionFailed("quota exceeded".to_string()));
            }
            Ok(json!({ "export_id": format!("exp-{project}"), "args": arguments }))
        }
    }

    fn orchestrator(tool: Arc<FlakyExport>) -> BatchOrchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(tool).unwrap();
        BatchOrchestrator::new(Arc::new(registry))
    }

    fn flaky(fail_for: &'static str, panic_for: Option<&'static str>) -> Arc<FlakyExport> {
        Arc::new(FlakyExport {
            calls: Mutex::new(Vec::new()),
            fail_for,
            panic_for,
        })
    }

    #[tokio::test]
    async fn zero_targets_is_an_error() {
        let err = orchestrator(flaky("none", None))
            .run(catalog::EXPORT_DATABASE, &[], &serde_json::Map::new())
            .await
            .unwrap_err();
        assert_eq!(err, BatchError::NoTargetsSpecified);
        assert_eq!(err.kind(), ErrorKind::NoTargetsSpecified);
    }

    #[tokio::test]
    async fn one_failing_target_does_not_abort_the_rest() {
        let tool = flaky("beta", None);
        let targets = vec![target("alpha"), target("beta"), target("gamma"), target("delta")];
        let run = orchestrator(tool.clone())
            .run(catalog::EXPORT_DATABASE, &targets, &serde_json::Map::new())
            .await
            .unwrap();
        let BatchRun::Completed(result) = run else {
            panic!("expected a completed batch");
        };
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.success_count, 3);
        let order: Vec<&str> = result.per_target.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(order, vec!["alpha", "beta", "gamma", "delta"]);
        assert_eq!(*tool.calls.lock().unwrap(), vec!["alpha", "beta", "gamma", "delta"]);
        let failed: Vec<&str> = result
            .per_target
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| r.target.as_str())
            .collect();
        assert_eq!(failed, vec!["beta"]);
        assert!(matches!(
            &result.per_target[1].outcome,
            TargetOutcome::Err { error: ErrorKind::UnderlyingOperationFailed { .. }, message }
                if message.contains("quota exceeded")
        ));
    }

    #[tokio::test]
    async fn panicking_target_is_recorded_as_failure() {
        let targets = vec![target("alpha"), target("beta"), target("gamma")];
        let run = orchestrator(flaky("none", Some("alpha")))
            .run(catalog::EXPORT_DATABASE, &targets, &serde_json::Map::new())
            .await
            .unwrap();
        let BatchRun::Completed(result) = run else {
            panic!("expected a completed batch");
        };
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.success_count, 2);
        assert!(matches!(
            &result.per_target[0].outcome,
            TargetOutcome::Err { message, .. } if message.contains("remote client exploded")
        ));
    }

    #[tokio::test]
    async fn reused_targets_are_reported_in_order_without_running() {
        let tool = flaky("none", None);
        let targets = vec![target("alpha"), target("beta"), target("gamma")];
        let mut reused = HashMap::new();
        reused.insert(
            "beta".to_string(),
            OutstandingOperation {
                reference: "exp-9".to_string(),
                status: "InProgress".to_string(),
                started_at: None,
            },
        );
        let run = orchestrator(tool.clone())
            .run_reusing(catalog::EXPORT_DATABASE, &targets, &serde_json::Map::new(), &reused)
            .await
            .unwrap();
        let BatchRun::Completed(result) = run else {
            panic!("expected a completed batch");
        };
        assert_eq!(result.success_count, 3);
        let order: Vec<&str> = result.per_target.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(order, vec!["alpha", "beta", "gamma"]);
        assert_eq!(*tool.calls.lock().unwrap(), vec!["alpha", "gamma"]);
        let TargetOutcome::Ok { value } = &result.per_target[1].outcome else {
            panic!("expected the reused instance");
        };
        assert_eq!(value["reused_existing"], true);
        assert_eq!(value["existing"]["reference"], "exp-9");
    }

    #[tokio::test]
    async fn single_target_is_unwrapped() {
        let run = orchestrator(flaky("none", None))
            .run(catalog::EXPORT_DATABASE, &[target("alpha")], &serde_json::Map::new())
            .await
            .unwrap();
        assert!(matches!(run, BatchRun::Single(ref r) if r.target == "alpha" && r.is_ok()));
    }

    #[tokio::test]
    async fn sub_calls_get_per_target_identity_and_no_gate_keys() {
        let mut args = serde_json::Map::new();
        args.insert("environment".to_string(), json!("Production"));
        args.insert("projects".to_string(), json!(["alpha", "beta"]));
        args.insert("confirmation_token".to_string(), json!("tok"));
        let run = orchestrator(flaky("none", None))
            .run(catalog::EXPORT_DATABASE, &[target("alpha"), target("beta")], &args)
            .await
            .unwrap();
        let BatchRun::Completed(result) = run else {
            panic!("expected a completed batch");
        };
        let TargetOutcome::Ok { value } = &result.per_target[1].outcome else {
            panic!("expected success");
        };
        assert_eq!(
            value["args"],
            json!({
                "environment": "Production",
                "project": "beta",
                "project_id": "p-beta",
                "credentials_ref": "beta",
            })
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_up_front() {
        let err = orchestrator(flaky("none", None))
            .run("drop_tables", &[target("alpha")], &serde_json::Map::new())
            .await
            .unwrap_err();
        assert_eq!(err, BatchError::UnknownOperation("drop_tables".to_string()));
    }

    #[test]
    fn estimate_scales_by_environment_and_runs_nothing() {
        let tool = flaky("none", None);
        let orchestrator = orchestrator(tool.clone());
        let mut args = serde_json::Map::new();
        args.insert("environment".to_string(), json!("Integration"));
        let estimate = orchestrator
            .estimate(catalog::EXPORT_DATABASE, &[target("alpha"), target("beta")], &args)
            .unwrap();
        assert!(estimate.informational_only);
        assert_eq!(estimate.per_target.len(), 2);
        assert_eq!(estimate.per_target[0].estimated_size_mb, 614);
        assert_eq!(estimate.per_target[0].estimated_minutes, 9);
        assert_eq!(estimate.total_size_mb, 1228);
        assert!(tool.calls.lock().unwrap().is_empty());
    }
}

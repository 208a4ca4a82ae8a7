//! Caller-facing command surface: instruction in, structured decision out.
//!
//! Ties the intent parser, the target registry, the confirmation gate and the
//! batch orchestrator together. Parse and gate failures come back as
//! [`CommandResponse::Error`]; nothing here returns `Err` to the caller.

use crate::batch::{
    BatchEstimate, BatchOrchestrator, BatchResult, BatchRun, TargetOutcome, TargetResult,
    reused_result, target_arguments,
};
use crate::gate::{ConfirmationGate, DuplicatePolicy, GateDecision};
use crate::session::{PendingRequest, SessionManager};
use crate::targets::{ProjectTarget, TargetRegistry, TargetSelector, resolve_all, select_targets};
use chrono::{DateTime, Utc};
use og_intent::{CommandError, ErrorKind, IntentParser, ParseContext, ParsedCommand, catalog};
use og_tools::{OutstandingOperation, ToolRegistry};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Keys that only make sense on the call that carried them.
const TRANSIENT_KEYS: &[&str] = &["confirmation_token", "preview_only", "preview"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    pub target_context: Option<String>,
    pub confirmation_token: Option<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub targets: TargetSelector,
    pub operation: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResponse {
    Executed {
        operation: String,
        target: String,
        result: Value,
    },
    BatchCompleted {
        operation: String,
        result: BatchResult,
    },
    AwaitingConfirmation {
        operation: String,
        targets: Vec<String>,
        confirmation_token: String,
        expires_at: DateTime<Utc>,
        preview_args: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        estimate: Option<BatchEstimate>,
        /// Targets that will report their outstanding instance instead of
        /// starting a new one.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        reused: Vec<TargetResult>,
    },
    /// The confirmation window lapsed before the confirming call.
    PreviewExpired {
        operation: String,
        preview_args: Value,
    },
    ReusedExisting {
        operation: String,
        target: String,
        existing: OutstandingOperation,
    },
    /// Confidence too low to act on without the caller agreeing to the
    /// interpretation. Accepted with [`CommandEngine::accept_interpretation`].
    ConfirmInterpretation {
        parsed: ParsedCommand,
    },
    Ambiguous {
        candidates: Vec<String>,
        message: String,
        arguments: Map<String, Value>,
    },
    Informational {
        operation: String,
        data: Value,
    },
    Error {
        error: CommandError,
    },
}

impl CommandResponse {
    fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            error: CommandError::new(kind, message),
        }
    }

    pub fn error_kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Error { error } => Some(&error.kind),
            _ => None,
        }
    }
}

pub struct CommandEngine {
    parser: IntentParser,
    registry: Arc<ToolRegistry>,
    targets: Arc<dyn TargetRegistry>,
    gate: ConfirmationGate,
    batch: BatchOrchestrator,
    sessions: SessionManager,
    default_project: Option<String>,
}

impl CommandEngine {
    pub fn new(
        registry: Arc<ToolRegistry>,
        targets: Arc<dyn TargetRegistry>,
        gate: ConfirmationGate,
    ) -> Self {
        Self {
            parser: IntentParser::new(targets.names()),
            batch: BatchOrchestrator::new(registry.clone()),
            registry,
            targets,
            gate,
            sessions: SessionManager::new(),
            default_project: None,
        }
    }

    pub fn with_default_project(mut self, project: Option<String>) -> Self {
        self.default_project = project;
        self
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.parser = IntentParser::new(self.targets.names()).with_max_suggestions(max);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[tracing::instrument(level = "info", skip(self, request), fields(command = %request.command))]
    pub async fn handle(&self, scope: &str, request: CommandRequest) -> CommandResponse {
        let session = self.sessions.get_or_create(scope);
        let context = request
            .target_context
            .clone()
            .or(session.current_project)
            .or_else(|| self.default_project.clone())
            .map(ParseContext::with_target)
            .unwrap_or_default();

        let parsed = self.parser.parse_with_context(&request.command, &context);
        if let Some(error) = parsed.error.clone() {
            if parsed.ambiguous {
                return CommandResponse::Ambiguous {
                    candidates: parsed.candidates,
                    message: error.message,
                    arguments: parsed.arguments,
                };
            }
            return CommandResponse::Error { error };
        }
        let Some(operation) = parsed.operation.clone() else {
            return CommandResponse::error(ErrorKind::UnrecognizedCommand, "No operation matched.");
        };
        if parsed.needs_interpretation_confirmation() {
            tracing::info!(operation = %operation, confidence = parsed.confidence, "interpretation needs confirmation");
            self.sessions.set_interpretation(scope, Some(parsed.clone()));
            return CommandResponse::ConfirmInterpretation { parsed };
        }
        self.sessions.set_interpretation(scope, None);

        let mut arguments = parsed.arguments;
        if let Some(token) = request.confirmation_token {
            arguments.insert("confirmation_token".to_string(), json!(token));
        }
        self.dispatch(scope, operation.as_str(), arguments).await
    }

    /// Batch entry point: explicit or natural-language target selection for
    /// one named operation. Gated exactly like `handle`.
    #[tracing::instrument(level = "info", skip(self, request), fields(operation = %request.operation))]
    pub async fn run_batch(&self, scope: &str, request: BatchRequest) -> CommandResponse {
        if catalog::lookup(&request.operation).is_none() || !catalog::is_remote(&request.operation) {
            return CommandResponse::error(
                ErrorKind::UnrecognizedCommand,
                format!("{} cannot run as a batch operation.", request.operation),
            );
        }
        let targets = match select_targets(self.targets.as_ref(), &request.targets) {
            Ok(targets) => targets,
            Err(e) => return target_error(&e),
        };
        self.execute_plan(scope, &request.operation, request.arguments, targets)
            .await
    }

    /// Runs the interpretation held back by the last low-confidence command,
    /// as if it had been stated outright. Gated operations still preview.
    pub async fn accept_interpretation(&self, scope: &str) -> CommandResponse {
        let held = self.sessions.update(scope, |session| session.interpretation.take());
        let Some((operation, arguments)) = held.and_then(|p| p.operation.map(|op| (op, p.arguments))) else {
            return CommandResponse::error(
                ErrorKind::NoPendingConfirmation,
                "No interpretation is waiting to be accepted.",
            );
        };
        tracing::info!(operation = %operation, "interpretation accepted");
        self.dispatch(scope, operation.as_str(), arguments).await
    }

    /// Replays the session's pending request with `token` attached.
    pub async fn confirm_pending(&self, scope: &str, token: &str) -> CommandResponse {
        let Some(pending) = self.sessions.get_or_create(scope).pending else {
            return CommandResponse::error(
                ErrorKind::NoPendingConfirmation,
                "Nothing is awaiting confirmation in this session.",
            );
        };
        let targets = match resolve_all(self.targets.as_ref(), &pending.targets) {
            Ok(targets) => targets,
            Err(e) => return target_error(&e),
        };
        let mut arguments = pending.arguments;
        arguments.insert("confirmation_token".to_string(), json!(token.trim()));
        self.execute_plan(scope, &pending.operation, arguments, targets)
            .await
    }

    pub async fn switch_project(&self, scope: &str, name: &str) -> CommandResponse {
        let mut arguments = Map::new();
        arguments.insert("project".to_string(), json!(name));
        self.dispatch(scope, catalog::SWITCH_PROJECT, arguments).await
    }

    pub fn list_projects(&self, scope: &str) -> CommandResponse {
        let current = self.sessions.get_or_create(scope).current_project;
        let projects: Vec<Value> = self
            .targets
            .list_targets()
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "project_id": t.project_id,
                    "environments": t.environments,
                    "current": current.as_deref() == Some(t.name.as_str()),
                })
            })
            .collect();
        CommandResponse::Informational {
            operation: catalog::LIST_PROJECTS.to_string(),
            data: json!(projects),
        }
    }

    async fn dispatch(
        &self,
        scope: &str,
        operation: &str,
        arguments: Map<String, Value>,
    ) -> CommandResponse {
        match operation {
            catalog::LIST_PROJECTS => return self.list_projects(scope),
            catalog::SWITCH_PROJECT => {
                let Some(name) = arguments.get("project").and_then(Value::as_str) else {
                    return CommandResponse::error(
                        ErrorKind::NoTargetsSpecified,
                        "Say which project to switch to.",
                    );
                };
                return match self.targets.resolve_target(name) {
                    Ok(target) => {
                        self.sessions.set_current_project(scope, &target.name);
                        CommandResponse::Informational {
                            operation: catalog::SWITCH_PROJECT.to_string(),
                            data: json!({ "current_project": target.name }),
                        }
                    }
                    Err(e) => target_error(&e),
                };
            }
            _ => {}
        }

        let targets = match self.targets_for(&arguments) {
            Ok(targets) => targets,
            Err(response) => return response,
        };
        self.execute_plan(scope, operation, arguments, targets).await
    }

    fn targets_for(&self, arguments: &Map<String, Value>) -> Result<Vec<ProjectTarget>, CommandResponse> {
        let names: Vec<String> = if arguments.get("all_projects").and_then(Value::as_bool) == Some(true) {
            self.targets.names()
        } else if let Some(list) = arguments.get("projects").and_then(Value::as_array) {
            list.iter().filter_map(Value::as_str).map(str::to_string).collect()
        } else if let Some(name) = arguments.get("project").and_then(Value::as_str) {
            vec![name.to_string()]
        } else {
            Vec::new()
        };
        resolve_all(self.targets.as_ref(), &names).map_err(|e| target_error(&e))
    }

    async fn execute_plan(
        &self,
        scope: &str,
        operation: &str,
        arguments: Map<String, Value>,
        targets: Vec<ProjectTarget>,
    ) -> CommandResponse {
        let Some(spec) = self.registry.spec(operation) else {
            return CommandResponse::error(
                ErrorKind::UnrecognizedCommand,
                format!("Operation {operation} is not available."),
            );
        };
        let Some(class) = spec.operation_class else {
            return self
                .execute(scope, operation, &targets, &arguments, &HashMap::new())
                .await;
        };

        let gate_target = gate_target(&targets);
        let request = Value::Object(arguments.clone());
        let confirming = arguments.contains_key("confirmation_token");
        let reuse_per_target = targets.len() > 1
            && DuplicatePolicy::from_arguments(&request) == Some(DuplicatePolicy::ReuseExisting);
        // Reuse in a batch is settled per target on both calls; otherwise only the preview looks.
        let outstanding = if class.requires_duplicate_guard() && (!confirming || reuse_per_target) {
            match self.find_outstanding(operation, &targets, &arguments).await {
                Ok(found) => found,
                Err(error) => return CommandResponse::Error { error },
            }
        } else {
            Vec::new()
        };

        let reused: HashMap<String, OutstandingOperation> = if reuse_per_target {
            outstanding.iter().cloned().collect()
        } else {
            HashMap::new()
        };
        if !confirming && !reused.is_empty() && reused.len() == targets.len() {
            tracing::info!(operation, targets = targets.len(), "every target reuses its outstanding instance");
            return self.execute(scope, operation, &targets, &arguments, &reused).await;
        }
        let guard = if reuse_per_target {
            None
        } else {
            combined_outstanding(&outstanding)
        };

        let decision = self
            .gate
            .check_and_advance(class, &gate_target, &request, guard.as_ref());
        match decision {
            Err(rejection) => CommandResponse::Error {
                error: CommandError::new(rejection.kind, rejection.message)
                    .with_suggestions(rejection.choices),
            },
            Ok(GateDecision::AwaitingConfirmation {
                token,
                preview_args,
                expires_at,
                ..
            }) => {
                let fresh: Vec<ProjectTarget> = targets
                    .iter()
                    .filter(|t| !reused.contains_key(&t.name))
                    .cloned()
                    .collect();
                let estimate = if targets.len() > 1 {
                    self.batch.estimate(operation, &fresh, &arguments).ok()
                } else {
                    None
                };
                let reused: Vec<TargetResult> = targets
                    .iter()
                    .filter_map(|t| reused.get(&t.name).map(|existing| reused_result(&t.name, existing)))
                    .collect();
                let mut replay = arguments;
                for key in TRANSIENT_KEYS {
                    replay.remove(*key);
                }
                let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
                self.sessions.set_pending(
                    scope,
                    Some(PendingRequest {
                        token: token.to_string(),
                        operation: operation.to_string(),
                        arguments: replay,
                        targets: names.clone(),
                        expires_at,
                    }),
                );
                CommandResponse::AwaitingConfirmation {
                    operation: operation.to_string(),
                    targets: names,
                    confirmation_token: token.to_string(),
                    expires_at,
                    preview_args,
                    estimate,
                    reused,
                }
            }
            Ok(GateDecision::NeedsPreview { preview_args }) => {
                self.sessions.set_pending(scope, None);
                CommandResponse::PreviewExpired {
                    operation: operation.to_string(),
                    preview_args,
                }
            }
            Ok(GateDecision::ReuseExisting { existing }) => CommandResponse::ReusedExisting {
                operation: operation.to_string(),
                target: gate_target,
                existing,
            },
            Ok(GateDecision::Proceed { fingerprint }) => {
                let token = arguments
                    .get("confirmation_token")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                self.sessions.update(scope, |session| {
                    if session.pending.as_ref().is_some_and(|p| p.token == token) {
                        session.pending = None;
                    }
                });
                tracing::info!(operation, %fingerprint, targets = targets.len(), "dispatching confirmed operation");
                self.execute(scope, operation, &targets, &arguments, &reused).await
            }
        }
    }

    async fn execute(
        &self,
        scope: &str,
        operation: &str,
        targets: &[ProjectTarget],
        arguments: &Map<String, Value>,
        reused: &HashMap<String, OutstandingOperation>,
    ) -> CommandResponse {
        match self
            .batch
            .run_reusing(operation, targets, arguments, reused)
            .await
        {
            Err(e) => CommandResponse::error(e.kind(), e.to_string()),
            Ok(BatchRun::Single(result)) => match result.outcome {
                TargetOutcome::Ok { value } => {
                    self.sessions.set_current_project(scope, &result.target);
                    CommandResponse::Executed {
                        operation: operation.to_string(),
                        target: result.target,
                        result: value,
                    }
                }
                TargetOutcome::Err { error, message } => CommandResponse::Error {
                    error: CommandError::new(error, message),
                },
            },
            Ok(BatchRun::Completed(result)) => CommandResponse::BatchCompleted {
                operation: operation.to_string(),
                result,
            },
        }
    }

    /// Every target's outstanding instance of `operation`, in target order.
    async fn find_outstanding(
        &self,
        operation: &str,
        targets: &[ProjectTarget],
        arguments: &Map<String, Value>,
    ) -> Result<Vec<(String, OutstandingOperation)>, CommandError> {
        let mut found = Vec::new();
        for target in targets {
            let args = target_arguments(target, arguments);
            match self.registry.outstanding(operation, &args).await {
                Ok(Some(existing)) => found.push((target.name.clone(), existing)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(operation, target_name = %target.name, error = %e, "outstanding lookup failed");
                    return Err(CommandError::new(
                        ErrorKind::UnderlyingOperationFailed {
                            cause: e.to_string(),
                        },
                        format!("Could not check for an outstanding {operation} on {}.", target.name),
                    ));
                }
            }
        }
        Ok(found)
    }
}

/// What the gate's duplicate guard sees: the single target's instance, or
/// every outstanding instance of a batch labelled with its target.
fn combined_outstanding(found: &[(String, OutstandingOperation)]) -> Option<OutstandingOperation> {
    match found {
        [] => None,
        [(_, only)] => Some(only.clone()),
        many => Some(OutstandingOperation {
            reference: many
                .iter()
                .map(|(name, op)| format!("{name}:{}", op.reference))
                .collect::<Vec<_>>()
                .join(", "),
            status: many
                .iter()
                .map(|(name, op)| format!("{name}:{}", op.status))
                .collect::<Vec<_>>()
                .join(", "),
            started_at: None,
        }),
    }
}

/// The identity the gate binds a confirmation to: one project, or the
/// sorted set of projects for a batch.
fn gate_target(targets: &[ProjectTarget]) -> String {
    match targets {
        [single] => single.name.clone(),
        many => {
            let mut names: Vec<&str> = many.iter().map(|t| t.name.as_str()).collect();
            names.sort_unstable();
            format!("batch:{}", names.join(","))
        }
    }
}

fn target_error(error: &crate::targets::TargetError) -> CommandResponse {
    CommandResponse::Error {
        error: CommandError::new(error.kind(), error.to_string()).with_suggestions(error.suggestions()),
    }
}

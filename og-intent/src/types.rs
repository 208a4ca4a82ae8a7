use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog id of a parsed operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Classes of destructive or costly operations that must pass the
/// confirmation gate before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Download,
    Export,
    Deploy,
    ContentCopy,
}

impl OperationClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Export => "export",
            Self::Deploy => "deploy",
            Self::ContentCopy => "content_copy",
        }
    }

    /// Classes that create a new remote resource and must not silently start a
    /// second one while a previous instance is outstanding.
    pub fn requires_duplicate_guard(self) -> bool {
        matches!(self, Self::Export | Self::Deploy)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    Integration,
    Preproduction,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integration => "Integration",
            Self::Preproduction => "Preproduction",
            Self::Production => "Production",
        }
    }

    pub fn from_alias(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "int" | "integration" | "dev" | "development" => Some(Self::Integration),
            "prep" | "preprod" | "preproduction" | "pre-production" | "staging" | "stage"
            | "uat" => Some(Self::Preproduction),
            "prod" | "production" | "live" => Some(Self::Production),
            _ => None,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit per-session state the parser may consult. Replaces any notion of
/// a process-wide "active project".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseContext {
    pub current_target: Option<String>,
}

impl ParseContext {
    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            current_target: Some(target.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl CommandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

/// Confidence below this value means the caller should confirm the
/// interpretation with a human before acting on it.
pub const INTERPRETATION_CONFIDENCE_MIN: u8 = 50;

/// Result of interpreting one instruction. Built once per call and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub operation: Option<OperationId>,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub confidence: u8,
    pub ambiguous: bool,
    #[serde(default)]
    pub candidates: Vec<String>,
    pub error: Option<CommandError>,
}

impl ParsedCommand {
    pub(crate) fn matched(
        operation: OperationId,
        arguments: serde_json::Map<String, serde_json::Value>,
        confidence: u8,
    ) -> Self {
        Self {
            operation: Some(operation),
            arguments,
            confidence,
            ambiguous: false,
            candidates: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn ambiguous(
        candidates: Vec<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
        confidence: u8,
        message: String,
    ) -> Self {
        Self {
            operation: None,
            arguments,
            confidence,
            ambiguous: true,
            error: Some(
                CommandError::new(ErrorKind::AmbiguousCommand, message)
                    .with_suggestions(candidates.clone()),
            ),
            candidates,
        }
    }

    pub(crate) fn failed(error: CommandError) -> Self {
        Self {
            operation: None,
            arguments: serde_json::Map::new(),
            confidence: 0,
            ambiguous: false,
            candidates: Vec::new(),
            error: Some(error),
        }
    }

    pub fn needs_interpretation_confirmation(&self) -> bool {
        self.confidence < INTERPRETATION_CONFIDENCE_MIN
    }

    pub fn error_kind(&self) -> Option<&ErrorKind> {
        self.error.as_ref().map(|e| &e.kind)
    }
}

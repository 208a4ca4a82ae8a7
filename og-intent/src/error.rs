use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure kinds shared by the parser, the confirmation gate and the batch
/// orchestrator. Every one of them is carried as data in a structured result;
/// none is meant to unwind past the component that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("empty command")]
    EmptyCommand,

    #[error("unrecognized command")]
    UnrecognizedCommand,

    #[error("ambiguous command")]
    AmbiguousCommand,

    #[error("no pending confirmation")]
    NoPendingConfirmation,

    #[error("confirmation fingerprint mismatch")]
    ConfirmationFingerprintMismatch,

    #[error("duplicate operation detected")]
    DuplicateOperationDetected,

    #[error("target not found")]
    TargetNotFound,

    #[error("no targets specified")]
    NoTargetsSpecified,

    #[error("underlying operation failed: {cause}")]
    UnderlyingOperationFailed { cause: String },
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyCommand => "empty_command",
            Self::UnrecognizedCommand => "unrecognized_command",
            Self::AmbiguousCommand => "ambiguous_command",
            Self::NoPendingConfirmation => "no_pending_confirmation",
            Self::ConfirmationFingerprintMismatch => "confirmation_fingerprint_mismatch",
            Self::DuplicateOperationDetected => "duplicate_operation_detected",
            Self::TargetNotFound => "target_not_found",
            Self::NoTargetsSpecified => "no_targets_specified",
            Self::UnderlyingOperationFailed { .. } => "underlying_operation_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;

    #[test]
    fn underlying_failure_keeps_cause_in_message() {
        let kind = ErrorKind::UnderlyingOperationFailed {
            cause: "http 503".to_string(),
        };
        assert_eq!(kind.to_string(), "underlying operation failed: http 503");
        assert_eq!(kind.as_str(), "underlying_operation_failed");
    }

    #[test]
    fn serializes_with_snake_case_tag() {
        let value = serde_json::to_value(ErrorKind::NoTargetsSpecified).expect("serialize");
        assert_eq!(value["kind"], "no_targets_specified");
    }
}

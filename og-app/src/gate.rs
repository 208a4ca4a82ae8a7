//! Confirmation gate for destructive operations.
//!
//! Every gated request goes through two calls. The first (a preview) records
//! an `AwaitingConfirmation` entry keyed by the request fingerprint and mints
//! a [`ConfirmationToken`]. The second must carry that token verbatim and
//! hash to the same fingerprint; it consumes the record and is told to
//! proceed. Records are removed atomically, so of any number of racing
//! confirmations exactly one wins.
//!
//! Boolean `confirm`/`confirmed` arguments are never a confirmation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use og_intent::{ErrorKind, OperationClass};
use og_tools::OutstandingOperation;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use ulid::Ulid;

/// Argument keys that express intent about the gate itself rather than
/// about the operation. Excluded from the fingerprint.
const CONFIRMATION_KEYS: &[&str] = &[
    "confirmation_token",
    "confirm",
    "confirmed",
    "preview_only",
    "preview",
];

const TOKEN_PREFIX_LEN: usize = 16;

pub const DEFAULT_CONFIRMATION_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn prefix(&self) -> &str {
        &self.0[..TOKEN_PREFIX_LEN]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic hash binding a confirmation to one exact request.
pub fn fingerprint(
    class: OperationClass,
    target: &str,
    arguments: &serde_json::Value,
) -> Fingerprint {
    let mut canonical = String::new();
    write_canonical(&strip_confirmation_keys(arguments), &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(class.as_str());
    hasher.update([0u8]);
    hasher.update(target.trim());
    hasher.update([0u8]);
    hasher.update(canonical);
    Fingerprint(format!("{:x}", hasher.finalize()))
}

fn strip_confirmation_keys(arguments: &serde_json::Value) -> serde_json::Value {
    match arguments {
        serde_json::Value::Object(map) => {
            let mut map = map.clone();
            for key in CONFIRMATION_KEYS {
                map.remove(*key);
            }
            serde_json::Value::Object(map)
        }
        other => other.clone(),
    }
}

/// Key-sorted JSON with trimmed strings, independent of map ordering.
fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::String(s) => {
            out.push_str(&serde_json::Value::String(s.trim().to_string()).to_string());
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Minted only by the preview step. Rendered as `<ulid>.<fingerprint prefix>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationToken {
    id: Ulid,
    fingerprint_prefix: String,
}

impl ConfirmationToken {
    fn mint(fingerprint: &Fingerprint) -> Self {
        Self {
            id: Ulid::new(),
            fingerprint_prefix: fingerprint.prefix().to_string(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (id, prefix) = raw.trim().split_once('.')?;
        let id = Ulid::from_string(id).ok()?;
        if prefix.len() != TOKEN_PREFIX_LEN || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            id,
            fingerprint_prefix: prefix.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for ConfirmationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.id, self.fingerprint_prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    NeedsPreview,
    AwaitingConfirmation,
    Confirmed,
}

#[derive(Debug, Clone)]
struct ConfirmationState {
    class: OperationClass,
    stage: Stage,
    fingerprint: Fingerprint,
    target: String,
    token_id: Ulid,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    preview_args: serde_json::Value,
}

impl ConfirmationState {
    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "gate stages only move forward");
        tracing::debug!(
            class = %self.class,
            gate_target = %self.target,
            fingerprint = %self.fingerprint,
            from = ?self.stage,
            to = ?next,
            "confirmation stage advanced"
        );
        self.stage = next;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed {
        fingerprint: Fingerprint,
    },
    /// The pending record expired; the caller must preview again.
    NeedsPreview {
        preview_args: serde_json::Value,
    },
    AwaitingConfirmation {
        token: ConfirmationToken,
        fingerprint: Fingerprint,
        preview_args: serde_json::Value,
        expires_at: DateTime<Utc>,
    },
    /// The caller chose to reuse an outstanding instance instead of starting
    /// a new one.
    ReuseExisting {
        existing: OutstandingOperation,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GateRejection {
    pub kind: ErrorKind,
    pub message: String,
    /// Explicit options offered to the caller, if any.
    pub choices: Vec<String>,
}

impl GateRejection {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            choices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    ReuseExisting,
    ForceNew,
}

impl DuplicatePolicy {
    pub const REUSE_EXISTING: &'static str = "reuse_existing";
    pub const FORCE_NEW: &'static str = "force_new";

    /// `duplicate_policy`, falling back to the `force` flag.
    pub(crate) fn from_arguments(arguments: &serde_json::Value) -> Option<Self> {
        match arguments.get("duplicate_policy").and_then(|v| v.as_str()) {
            Some(Self::REUSE_EXISTING) | Some("reuse") => return Some(Self::ReuseExisting),
            Some(Self::FORCE_NEW) | Some("new") => return Some(Self::ForceNew),
            _ => {}
        }
        is_truthy(arguments.get("force")).then_some(Self::ForceNew)
    }
}

pub struct ConfirmationGate {
    records: DashMap<Fingerprint, ConfirmationState>,
    ttl: chrono::Duration,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(chrono::Duration::seconds(DEFAULT_CONFIRMATION_TTL_SECONDS))
    }
}

impl ConfirmationGate {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.records.len()
    }

    /// Decides what a gated request may do next. `outstanding` is a still
    /// running instance of the same operation on the same target, as
    /// observed by the caller; it only matters for classes with a duplicate
    /// guard.
    pub fn check_and_advance(
        &self,
        class: OperationClass,
        target: &str,
        arguments: &serde_json::Value,
        outstanding: Option<&OutstandingOperation>,
    ) -> Result<GateDecision, GateRejection> {
        let fingerprint = fingerprint(class, target, arguments);
        let token = arguments
            .get("confirmation_token")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let preview_requested =
            is_truthy(arguments.get("preview_only")) || is_truthy(arguments.get("preview"));

        match token {
            Some(raw) if !preview_requested => self.confirm(class, target, &fingerprint, raw),
            _ => {
                if !preview_requested
                    && (is_truthy(arguments.get("confirm")) || is_truthy(arguments.get("confirmed")))
                {
                    tracing::warn!(
                        %class,
                        gate_target = target,
                        "confirmation flag presented without a confirmation token"
                    );
                    return Err(GateRejection::new(
                        ErrorKind::NoPendingConfirmation,
                        "Confirmation flags are not accepted. Preview the operation first and \
                         confirm with the token it returns.",
                    ));
                }
                self.preview(class, target, fingerprint, arguments, outstanding)
            }
        }
    }

    fn preview(
        &self,
        class: OperationClass,
        target: &str,
        fingerprint: Fingerprint,
        arguments: &serde_json::Value,
        outstanding: Option<&OutstandingOperation>,
    ) -> Result<GateDecision, GateRejection> {
        if let (true, Some(existing)) = (class.requires_duplicate_guard(), outstanding) {
            match DuplicatePolicy::from_arguments(arguments) {
                None => {
                    tracing::info!(%class, gate_target = target, reference = %existing.reference, "outstanding instance blocks a new one");
                    return Err(GateRejection {
                        kind: ErrorKind::DuplicateOperationDetected,
                        message: format!(
                            "A {class} operation for {target} is already outstanding \
                             ({}, status {}). Choose whether to reuse it or start a new one.",
                            existing.reference, existing.status
                        ),
                        choices: vec![
                            DuplicatePolicy::REUSE_EXISTING.to_string(),
                            DuplicatePolicy::FORCE_NEW.to_string(),
                        ],
                    });
                }
                Some(DuplicatePolicy::ReuseExisting) => {
                    return Ok(GateDecision::ReuseExisting {
                        existing: existing.clone(),
                    });
                }
                Some(DuplicatePolicy::ForceNew) => {
                    tracing::info!(%class, gate_target = target, reference = %existing.reference, "starting a new instance despite outstanding one");
                }
            }
        }

        let now = Utc::now();
        self.records.retain(|_, record| now < record.expires_at);

        let token = ConfirmationToken::mint(&fingerprint);
        let preview_args = strip_confirmation_keys(arguments);
        let mut record = ConfirmationState {
            class,
            stage: Stage::NeedsPreview,
            fingerprint: fingerprint.clone(),
            target: target.to_string(),
            token_id: token.id,
            issued_at: now,
            expires_at: now + self.ttl,
            preview_args: preview_args.clone(),
        };
        record.advance(Stage::AwaitingConfirmation);
        let expires_at = record.expires_at;
        if self.records.insert(fingerprint.clone(), record).is_some() {
            tracing::debug!(%fingerprint, "earlier preview superseded");
        }
        tracing::info!(%class, gate_target = target, %fingerprint, %expires_at, "awaiting confirmation");

        Ok(GateDecision::AwaitingConfirmation {
            token,
            fingerprint,
            preview_args,
            expires_at,
        })
    }

    fn confirm(
        &self,
        class: OperationClass,
        target: &str,
        fingerprint: &Fingerprint,
        raw_token: &str,
    ) -> Result<GateDecision, GateRejection> {
        let Some(token) = ConfirmationToken::parse(raw_token) else {
            return Err(GateRejection::new(
                ErrorKind::NoPendingConfirmation,
                format!("{raw_token:?} is not a confirmation token."),
            ));
        };

        let consumed = self.records.remove_if(fingerprint, |_, record| {
            record.token_id == token.id
                && record.class == class
                && token.fingerprint_prefix == record.fingerprint.prefix()
        });
        if let Some((_, mut record)) = consumed {
            if Utc::now() >= record.expires_at {
                tracing::info!(
                    %class,
                    gate_target = target,
                    %fingerprint,
                    issued_at = %record.issued_at,
                    "confirmation expired"
                );
                return Ok(GateDecision::NeedsPreview {
                    preview_args: record.preview_args,
                });
            }
            record.advance(Stage::Confirmed);
            tracing::info!(%class, gate_target = target, %fingerprint, "confirmation consumed");
            return Ok(GateDecision::Proceed {
                fingerprint: record.fingerprint,
            });
        }

        let issued_for_other_request = self
            .records
            .iter()
            .any(|entry| entry.value().token_id == token.id);
        if issued_for_other_request {
            tracing::warn!(%class, gate_target = target, %fingerprint, "confirmation token belongs to a different request");
            return Err(GateRejection::new(
                ErrorKind::ConfirmationFingerprintMismatch,
                "The confirmation token was issued for a different request. Preview this \
                 request to get its own token.",
            ));
        }
        tracing::warn!(%class, gate_target = target, %fingerprint, "no pending confirmation for token");
        Err(GateRejection::new(
            ErrorKind::NoPendingConfirmation,
            "Nothing is awaiting confirmation for this request; it may already have run. \
             Preview it again.",
        ))
    }
}

fn is_truthy(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "y" | "1")
        }
        _ => false,
    }
}

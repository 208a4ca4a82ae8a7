//! Structured parameter extraction from normalized instruction text.

use crate::fuzzy::{self, SCORE_CONTAINS};
use crate::types::Environment;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static FROM_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfrom\s+([a-z-]+)(?:\s+environment)?\s+(?:to|into|->)\s+([a-z-]+)\b")
        .expect("from/to pattern compiles")
});
static TO_ENV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:to|into)\s+([a-z-]+)\b").expect("to pattern compiles"));
static WINDOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:last|past|previous)\s+(\d+)?\s*(hours?|hrs?|h|days?|d|weeks?|w)\b")
        .expect("window pattern compiles")
});
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("date pattern compiles"));
static CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bcontainer\s+([a-z0-9][a-z0-9_-]*)\b").expect("container pattern compiles")
});
static EXPORT_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:export\s+(?:id\s+)?|id\s+)([0-9a-f][0-9a-f-]{7,})\b")
        .expect("export id pattern compiles")
});

/// Words that belong to the command vocabulary and must never be read as a
/// project name.
const VOCABULARY: &[&str] = &[
    "all", "and", "any", "app", "application", "approve", "assets", "backup", "bacpac", "blob",
    "blobs", "cdn", "change", "check", "clone", "cms", "commerce", "complete", "container",
    "content", "copy", "current", "data", "database", "day", "days", "db", "deploy",
    "deployment", "deployments", "download", "dry", "dry-run", "each", "environment", "epicms", "epicommerce", "every",
    "export", "exports", "fetch", "files", "finalize", "finish", "for", "force", "from", "get",
    "grab", "history", "hour", "hours", "into", "last", "latest", "list", "log", "logs", "media",
    "my", "new", "now", "of", "on", "past", "please", "preview", "previous", "project",
    "projects", "promote", "pull", "push", "recent", "redeploy", "refresh", "release", "reset",
    "revert", "rollback", "run", "show", "start", "status", "switch", "sync", "the", "this",
    "to", "today", "undo", "use", "verify", "week", "weeks", "web", "what", "which", "with",
    "yesterday",
];

/// Lowercased, punctuation-stripped view of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    pub tokens: Vec<String>,
}

impl Normalized {
    pub fn new(raw: &str) -> Self {
        let lowered: String = raw
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/') {
                    c
                } else {
                    ' '
                }
            })
            .collect();
        let tokens: Vec<String> = lowered
            .split_whitespace()
            .map(|t| t.trim_matches(|c| matches!(c, '.' | ':' | '/')).to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let text = tokens.join(" ");
        Self { text, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn has_any(&self, tokens: &[&str]) -> bool {
        tokens.iter().any(|t| self.has_token(t))
    }

    /// Whole-word phrase containment.
    pub fn has_phrase(&self, phrase: &str) -> bool {
        let padded = format!(" {} ", self.text);
        padded.contains(&format!(" {phrase} "))
    }

    pub fn has_any_phrase(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.has_phrase(p))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentMention {
    pub source: Option<Environment>,
    pub target: Option<Environment>,
    /// Every environment alias in order of appearance, deduplicated.
    pub mentioned: Vec<Environment>,
}

impl EnvironmentMention {
    pub fn single(&self) -> Option<Environment> {
        self.mentioned.first().copied()
    }
}

pub fn environments(input: &Normalized) -> EnvironmentMention {
    let mut mention = EnvironmentMention::default();
    for token in &input.tokens {
        if let Some(env) = Environment::from_alias(token) {
            if !mention.mentioned.contains(&env) {
                mention.mentioned.push(env);
            }
        }
    }

    if let Some(caps) = FROM_TO.captures(&input.text) {
        let source = Environment::from_alias(&caps[1]);
        let target = Environment::from_alias(&caps[2]);
        if source.is_some() && target.is_some() {
            mention.source = source;
            mention.target = target;
            return mention;
        }
    }

    if mention.mentioned.len() >= 2 {
        mention.source = mention.mentioned.first().copied();
        mention.target = mention.mentioned.get(1).copied();
        return mention;
    }

    if let Some(caps) = TO_ENV.captures(&input.text) {
        mention.target = Environment::from_alias(&caps[1]);
    }
    mention
}

/// Relative window in hours. Kept relative so parsing stays a pure function
/// of the text.
pub fn time_window_hours(input: &Normalized) -> Option<u32> {
    if let Some(caps) = WINDOW.captures(&input.text) {
        // "last week" has no count; digits too long for u32 saturate.
        let count: u32 = caps
            .get(1)
            .map_or(1, |m| m.as_str().parse().unwrap_or(u32::MAX));
        let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("h");
        let per_unit = match unit.chars().next() {
            Some('d') => 24,
            Some('w') => 24 * 7,
            _ => 1,
        };
        return Some(count.saturating_mul(per_unit));
    }
    if input.has_token("today") {
        return Some(24);
    }
    if input.has_token("yesterday") {
        return Some(48);
    }
    None
}

/// Explicit calendar dates, in order of appearance. Strings that look like
/// dates but are not real calendar days are dropped.
pub fn dates(input: &Normalized) -> Vec<String> {
    ISO_DATE
        .captures_iter(&input.text)
        .filter_map(|caps| {
            let raw = caps.get(1)?.as_str();
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
            Some(raw.to_string())
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub force: bool,
    pub dry_run: bool,
    pub preview_only: bool,
}

pub fn flags(input: &Normalized) -> Flags {
    Flags {
        force: input.has_any(&["force", "--force", "forced"]),
        dry_run: input.has_any(&["dry-run", "--dry-run", "dryrun"]) || input.has_phrase("dry run"),
        preview_only: input.has_any(&["preview", "--preview", "estimate"])
            || input.has_phrase("what would"),
    }
}

pub fn database_name(input: &Normalized) -> Option<&'static str> {
    if input.has_any(&["commerce", "epicommerce"]) {
        return Some("epicommerce");
    }
    if input.has_any(&["cms", "epicms"]) {
        return Some("epicms");
    }
    None
}

pub fn log_type(input: &Normalized) -> Option<&'static str> {
    if input.has_any(&["application", "app"]) {
        return Some("application");
    }
    if input.has_token("web") {
        return Some("web");
    }
    if input.has_token("cdn") {
        return Some("cdn");
    }
    None
}

pub fn container(input: &Normalized) -> Option<String> {
    CONTAINER
        .captures(&input.text)
        .map(|caps| caps[1].to_string())
}

pub fn export_id(input: &Normalized) -> Option<String> {
    EXPORT_ID
        .captures(&input.text)
        .map(|caps| caps[1].to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectMention {
    None,
    All,
    Named(Vec<String>),
}

/// Project names mentioned in the text, resolved to their canonical spelling
/// from `known`. Typos are accepted down to the contains tier.
pub fn projects(input: &Normalized, known: &[String]) -> ProjectMention {
    if input.has_any_phrase(&[
        "all projects",
        "every project",
        "each project",
        "all my projects",
        "all of my projects",
        "all of the projects",
    ]) {
        return ProjectMention::All;
    }
    if known.is_empty() {
        return ProjectMention::None;
    }

    let mut named: Vec<String> = Vec::new();
    for token in &input.tokens {
        if token.chars().count() < 3
            || VOCABULARY.contains(&token.as_str())
            || Environment::from_alias(token).is_some()
            || token.chars().all(|c| c.is_ascii_digit() || c == '-')
        {
            continue;
        }
        if let Some(name) = fuzzy::best_match(token, known, SCORE_CONTAINS) {
            if !named.iter().any(|n| n == name) {
                named.push(name.to_string());
            }
        }
    }
    if named.is_empty() {
        ProjectMention::None
    } else {
        ProjectMention::Named(named)
    }
}

//! Rule-ordered intent parser.
//!
//! An instruction is tested against an ordered list of `(trigger, action)`
//! rules and the first trigger that fires decides the operation. Order is the
//! contract, so more specific triggers sit in front of the general ones that
//! would also fire:
//!
//! - `check_export_status` before `export_database` (both see "export").
//! - `download_database`, `download_blobs`, `download_logs` before
//!   `ambiguous_download`, which only fires on a bare download verb.
//! - `complete_deployment`, `reset_deployment`, `list_deployments` before
//!   `start_deployment` and `ambiguous_deployment`.
//! - `switch_project` before `list_projects`.
//! - `fallback_status` last.

use crate::catalog::{self, EXAMPLE_COMMANDS};
use crate::error::ErrorKind;
use crate::extract::{self, Normalized, ProjectMention};
use crate::fuzzy::{self, DEFAULT_MAX_SUGGESTIONS};
use crate::types::{CommandError, OperationId, ParseContext, ParsedCommand};
use serde_json::{Map, Value, json};

/// How distinctive the matched trigger phrase was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStrength {
    /// The operation's own keyword ("export the database").
    Exact,
    /// A keyword shared by a category of operations ("backup", "release").
    Category,
    /// Last-resort guess from a weak word ("status").
    Fallback,
}

impl TriggerStrength {
    fn base_confidence(self) -> u32 {
        match self {
            Self::Exact => 60,
            Self::Category => 40,
            Self::Fallback => 20,
        }
    }
}

const PARAM_CONFIDENCE_SPAN: u32 = 40;

#[derive(Debug, Clone, Copy)]
enum RuleAction {
    Operation(&'static str),
    Ambiguous {
        category: &'static str,
        candidates: &'static [&'static str],
    },
}

#[derive(Clone, Copy)]
struct Rule {
    name: &'static str,
    trigger: fn(&Normalized) -> Option<TriggerStrength>,
    action: RuleAction,
}

const DOWNLOAD_VERBS: &[&str] = &["download", "downloads", "fetch", "pull", "grab"];
const DATABASE_WORDS: &[&str] = &["database", "databases", "db", "backup", "bacpac"];
const BLOB_WORDS: &[&str] = &[
    "blob", "blobs", "media", "files", "assets", "container", "images",
];
const LOG_WORDS: &[&str] = &["log", "logs"];
const DEPLOYMENT_NOUNS: &[&str] = &["deployment", "deployments"];

fn mentions_deploy(input: &Normalized) -> bool {
    input.tokens.iter().any(|t| t.starts_with("deploy"))
}

fn is_download(input: &Normalized) -> bool {
    input.has_any(DOWNLOAD_VERBS)
}

fn trigger_switch_project(input: &Normalized) -> Option<TriggerStrength> {
    if input.has_any_phrase(&[
        "switch to",
        "switch project",
        "switch projects",
        "change project",
        "change to project",
        "use project",
        "set project",
    ]) {
        return Some(TriggerStrength::Exact);
    }
    input.has_token("switch").then_some(TriggerStrength::Category)
}

fn trigger_check_export_status(input: &Normalized) -> Option<TriggerStrength> {
    let export = input.has_any(&["export", "exports"]);
    let status = input.has_any(&["status", "progress", "done", "finished", "ready"]);
    ((export && status) || input.has_phrase("check export")).then_some(TriggerStrength::Exact)
}

fn trigger_download_database(input: &Normalized) -> Option<TriggerStrength> {
    (is_download(input) && input.has_any(DATABASE_WORDS)).then_some(TriggerStrength::Exact)
}

fn trigger_download_blobs(input: &Normalized) -> Option<TriggerStrength> {
    (is_download(input) && input.has_any(BLOB_WORDS)).then_some(TriggerStrength::Exact)
}

fn trigger_download_logs(input: &Normalized) -> Option<TriggerStrength> {
    (is_download(input) && input.has_any(LOG_WORDS)).then_some(TriggerStrength::Exact)
}

fn trigger_ambiguous_download(input: &Normalized) -> Option<TriggerStrength> {
    is_download(input).then_some(TriggerStrength::Category)
}

fn trigger_export_database(input: &Normalized) -> Option<TriggerStrength> {
    if input.has_any(&["export", "exports"]) {
        if input.has_any(DATABASE_WORDS) {
            return Some(TriggerStrength::Exact);
        }
        return Some(TriggerStrength::Category);
    }
    input
        .has_any(&["backup", "bacpac"])
        .then_some(TriggerStrength::Category)
}

fn trigger_complete_deployment(input: &Normalized) -> Option<TriggerStrength> {
    let verb = input.has_any(&["complete", "finish", "finalize", "approve", "verify", "accept"]);
    (verb && mentions_deploy(input)).then_some(TriggerStrength::Exact)
}

fn trigger_reset_deployment(input: &Normalized) -> Option<TriggerStrength> {
    let rollback = input.has_any(&["rollback", "revert"]) || input.has_phrase("roll back");
    let verb = rollback || input.has_any(&["reset", "undo", "abort"]);
    if verb && mentions_deploy(input) {
        return Some(TriggerStrength::Exact);
    }
    rollback.then_some(TriggerStrength::Category)
}

fn trigger_list_deployments(input: &Normalized) -> Option<TriggerStrength> {
    let verb = input.has_any(&["list", "show", "recent", "history", "status"]);
    (verb && input.has_any(DEPLOYMENT_NOUNS)).then_some(TriggerStrength::Exact)
}

fn trigger_copy_content(input: &Normalized) -> Option<TriggerStrength> {
    if !input.has_any(&["copy", "sync", "clone", "refresh", "mirror"]) {
        return None;
    }
    if input.has_any(&["content", "database", "db", "blobs", "data", "assets"]) {
        return Some(TriggerStrength::Exact);
    }
    Some(TriggerStrength::Category)
}

fn trigger_start_deployment(input: &Normalized) -> Option<TriggerStrength> {
    if input.has_any(&["deploy", "redeploy"]) {
        return Some(TriggerStrength::Exact);
    }
    input
        .has_any(&["promote", "release", "push"])
        .then_some(TriggerStrength::Category)
}

fn trigger_ambiguous_deployment(input: &Normalized) -> Option<TriggerStrength> {
    input
        .has_any(DEPLOYMENT_NOUNS)
        .then_some(TriggerStrength::Category)
}

fn trigger_list_projects(input: &Normalized) -> Option<TriggerStrength> {
    if !input.has_any(&["projects", "project"]) {
        return None;
    }
    if input.has_any(&["list", "show", "which", "what"]) {
        return Some(TriggerStrength::Exact);
    }
    input
        .has_token("projects")
        .then_some(TriggerStrength::Category)
}

fn trigger_fallback_status(input: &Normalized) -> Option<TriggerStrength> {
    input.has_token("status").then_some(TriggerStrength::Fallback)
}

const DOWNLOAD_CANDIDATES: &[&str] = &[
    catalog::DOWNLOAD_BLOBS,
    catalog::DOWNLOAD_LOGS,
    catalog::DOWNLOAD_DATABASE,
];

const DEPLOYMENT_CANDIDATES: &[&str] = &[
    catalog::LIST_DEPLOYMENTS,
    catalog::START_DEPLOYMENT,
    catalog::COMPLETE_DEPLOYMENT,
    catalog::RESET_DEPLOYMENT,
];

fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "switch_project",
            trigger: trigger_switch_project,
            action: RuleAction::Operation(catalog::SWITCH_PROJECT),
        },
        Rule {
            name: "check_export_status",
            trigger: trigger_check_export_status,
            action: RuleAction::Operation(catalog::CHECK_EXPORT_STATUS),
        },
        Rule {
            name: "download_database",
            trigger: trigger_download_database,
            action: RuleAction::Operation(catalog::DOWNLOAD_DATABASE),
        },
        Rule {
            name: "download_blobs",
            trigger: trigger_download_blobs,
            action: RuleAction::Operation(catalog::DOWNLOAD_BLOBS),
        },
        Rule {
            name: "download_logs",
            trigger: trigger_download_logs,
            action: RuleAction::Operation(catalog::DOWNLOAD_LOGS),
        },
        Rule {
            name: "ambiguous_download",
            trigger: trigger_ambiguous_download,
            action: RuleAction::Ambiguous {
                category: "download",
                candidates: DOWNLOAD_CANDIDATES,
            },
        },
        Rule {
            name: "export_database",
            trigger: trigger_export_database,
            action: RuleAction::Operation(catalog::EXPORT_DATABASE),
        },
        Rule {
            name: "complete_deployment",
            trigger: trigger_complete_deployment,
            action: RuleAction::Operation(catalog::COMPLETE_DEPLOYMENT),
        },
        Rule {
            name: "reset_deployment",
            trigger: trigger_reset_deployment,
            action: RuleAction::Operation(catalog::RESET_DEPLOYMENT),
        },
        Rule {
            name: "list_deployments",
            trigger: trigger_list_deployments,
            action: RuleAction::Operation(catalog::LIST_DEPLOYMENTS),
        },
        Rule {
            name: "copy_content",
            trigger: trigger_copy_content,
            action: RuleAction::Operation(catalog::COPY_CONTENT),
        },
        Rule {
            name: "start_deployment",
            trigger: trigger_start_deployment,
            action: RuleAction::Operation(catalog::START_DEPLOYMENT),
        },
        Rule {
            name: "ambiguous_deployment",
            trigger: trigger_ambiguous_deployment,
            action: RuleAction::Ambiguous {
                category: "deployment",
                candidates: DEPLOYMENT_CANDIDATES,
            },
        },
        Rule {
            name: "list_projects",
            trigger: trigger_list_projects,
            action: RuleAction::Operation(catalog::LIST_PROJECTS),
        },
        Rule {
            name: "fallback_status",
            trigger: trigger_fallback_status,
            action: RuleAction::Operation(catalog::LIST_DEPLOYMENTS),
        },
    ]
}

/// Interprets free-form instructions. Holds only immutable configuration, so
/// `parse` is a pure function of its inputs.
pub struct IntentParser {
    rules: Vec<Rule>,
    projects: Vec<String>,
    max_suggestions: usize,
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl IntentParser {
    /// `projects` are the names project mentions are resolved against.
    pub fn new(projects: Vec<String>) -> Self {
        Self {
            rules: default_rules(),
            projects,
            max_suggestions: DEFAULT_MAX_SUGGESTIONS,
        }
    }

    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max.max(1);
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn parse(&self, text: &str) -> ParsedCommand {
        self.parse_with_context(text, &ParseContext::default())
    }

    pub fn parse_with_context(&self, text: &str, context: &ParseContext) -> ParsedCommand {
        let input = Normalized::new(text);
        if input.is_empty() {
            tracing::debug!("empty instruction");
            return ParsedCommand::failed(
                CommandError::new(ErrorKind::EmptyCommand, "Command is empty.")
                    .with_suggestions(self.example_suggestions(&input)),
            );
        }

        let Some((rule, strength)) = self
            .rules
            .iter()
            .find_map(|rule| (rule.trigger)(&input).map(|strength| (rule, strength)))
        else {
            let suggestions = self.example_suggestions(&input);
            tracing::debug!(text = %input.text, ?suggestions, "no rule matched instruction");
            return ParsedCommand::failed(
                CommandError::new(
                    ErrorKind::UnrecognizedCommand,
                    format!("Could not match {:?} to a known operation.", text.trim()),
                )
                .with_suggestions(suggestions),
            );
        };

        match rule.action {
            RuleAction::Operation(id) => {
                let Some(descriptor) = catalog::lookup(id) else {
                    // Every rule points at a catalog entry; see `rules_target_catalog_operations`.
                    return ParsedCommand::failed(CommandError::new(
                        ErrorKind::UnrecognizedCommand,
                        format!("rule {} names unknown operation {id}", rule.name),
                    ));
                };
                let (arguments, weight) =
                    self.build_arguments(descriptor.id, descriptor.expected_params, &input, context);
                let confidence = confidence(strength, weight, descriptor.expected_params.len());
                tracing::debug!(
                    rule = rule.name,
                    operation = descriptor.id,
                    confidence,
                    ?strength,
                    "instruction matched"
                );
                ParsedCommand::matched(OperationId::new(descriptor.id), arguments, confidence)
            }
            RuleAction::Ambiguous {
                category,
                candidates,
            } => {
                let expected = union_expected(candidates);
                let (arguments, _) = self.build_arguments(category, &expected, &input, context);
                let ranked = rank_candidates(candidates, &arguments);
                let confidence = strength.base_confidence().min(100) as u8;
                tracing::debug!(
                    rule = rule.name,
                    category,
                    candidates = ?ranked,
                    "instruction matched an operation category without a member"
                );
                let message = format!(
                    "\"{category}\" could mean several operations: {}. Please say which one.",
                    ranked.join(", ")
                );
                ParsedCommand::ambiguous(ranked, arguments, confidence, message)
            }
        }
    }

    /// Arguments plus the confidence weight: 2 per expected parameter found in
    /// the text, 1 per parameter defaulted from context.
    fn build_arguments(
        &self,
        operation: &str,
        expected: &[&str],
        input: &Normalized,
        context: &ParseContext,
    ) -> (Map<String, Value>, u32) {
        let mut args = Map::new();
        let mut weight = 0u32;
        let expects = |key: &str| expected.iter().any(|p| *p == key);

        if expects("project") {
            match extract::projects(input, &self.projects) {
                ProjectMention::All => {
                    args.insert("all_projects".to_string(), json!(true));
                    weight += 2;
                }
                ProjectMention::Named(names) if names.len() == 1 => {
                    args.insert("project".to_string(), json!(names[0]));
                    weight += 2;
                }
                ProjectMention::Named(names) => {
                    args.insert("projects".to_string(), json!(names));
                    weight += 2;
                }
                ProjectMention::None if operation != catalog::SWITCH_PROJECT => {
                    if let Some(current) = context.current_target.as_ref() {
                        args.insert("project".to_string(), json!(current));
                        weight += 1;
                    }
                }
                ProjectMention::None => {}
            }
        }

        let envs = extract::environments(input);
        if expects("source_environment") || expects("target_environment") {
            if let Some(source) = envs.source {
                args.insert("source_environment".to_string(), json!(source.as_str()));
                weight += 2;
            }
            if let Some(target) = envs.target.or_else(|| {
                // A lone environment with no direction reads as the destination.
                (envs.source.is_none() && envs.mentioned.len() == 1)
                    .then(|| envs.single())
                    .flatten()
            }) {
                args.insert("target_environment".to_string(), json!(target.as_str()));
                weight += 2;
            }
        }
        if expects("environment") {
            if let Some(env) = envs.single().or(envs.target) {
                args.insert("environment".to_string(), json!(env.as_str()));
                weight += 2;
            }
        }

        if expects("database") {
            if let Some(db) = extract::database_name(input) {
                args.insert("database".to_string(), json!(db));
                weight += 2;
            }
        }
        if expects("log_type") {
            if let Some(kind) = extract::log_type(input) {
                args.insert("log_type".to_string(), json!(kind));
                weight += 2;
            }
        }
        if expects("container") {
            if let Some(container) = extract::container(input) {
                args.insert("container".to_string(), json!(container));
                weight += 2;
            }
        }
        if expects("export_id") {
            if let Some(id) = extract::export_id(input) {
                args.insert("export_id".to_string(), json!(id));
                weight += 2;
            }
        }
        if expects("time_window_hours") {
            let dates = extract::dates(input);
            if let Some(hours) = extract::time_window_hours(input) {
                args.insert("time_window_hours".to_string(), json!(hours));
                weight += 2;
            } else if !dates.is_empty() {
                weight += 2;
            }
            if let Some(start) = dates.first() {
                args.insert("start_date".to_string(), json!(start));
            }
            if let Some(end) = dates.get(1) {
                args.insert("end_date".to_string(), json!(end));
            }
        }

        let flags = extract::flags(input);
        if flags.force {
            args.insert("force".to_string(), json!(true));
        }
        if flags.dry_run {
            args.insert("dry_run".to_string(), json!(true));
        }
        if flags.preview_only {
            args.insert("preview_only".to_string(), json!(true));
        }

        (args, weight)
    }

    /// The highest-scoring canonical examples for an instruction nothing
    /// matched: shared words first, then overall string similarity.
    fn example_suggestions(&self, input: &Normalized) -> Vec<String> {
        let mut scored: Vec<(u32, &str)> = EXAMPLE_COMMANDS
            .iter()
            .map(|example| {
                let example_input = Normalized::new(example);
                let shared = input
                    .tokens
                    .iter()
                    .filter(|t| t.chars().count() > 2 && example_input.has_token(t))
                    .count() as u32;
                let similarity = (fuzzy::similarity(&input.text, &example_input.text) * 10.0)
                    .floor() as u32;
                (shared * 10 + similarity, *example)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.max_suggestions)
            .map(|(_, example)| example.to_string())
            .collect()
    }
}

fn confidence(strength: TriggerStrength, weight: u32, expected: usize) -> u8 {
    let base = strength.base_confidence();
    let bonus = if expected == 0 {
        PARAM_CONFIDENCE_SPAN
    } else {
        PARAM_CONFIDENCE_SPAN * weight / (2 * expected as u32)
    };
    (base + bonus).min(100) as u8
}

fn union_expected(candidates: &[&str]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for descriptor in candidates.iter().filter_map(|id| catalog::lookup(id)) {
        for param in descriptor.expected_params {
            if !out.contains(param) {
                out.push(param);
            }
        }
    }
    out
}

/// Candidates whose distinguishing parameters were already extracted move to
/// the front; otherwise catalog order is kept.
fn rank_candidates(candidates: &[&str], args: &Map<String, Value>) -> Vec<String> {
    let hint = |id: &str| -> u32 {
        let has = |key: &str| args.contains_key(key);
        match id {
            catalog::DOWNLOAD_LOGS => {
                u32::from(has("log_type") || has("time_window_hours") || has("start_date"))
            }
            catalog::DOWNLOAD_DATABASE => u32::from(has("database")),
            catalog::DOWNLOAD_BLOBS => u32::from(has("container")),
            catalog::START_DEPLOYMENT => {
                u32::from(has("source_environment") && has("target_environment"))
            }
            _ => 0,
        }
    };
    let mut ranked: Vec<&str> = candidates.to_vec();
    ranked.sort_by(|a, b| hint(b).cmp(&hint(a)));
    ranked.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> IntentParser {
        IntentParser::new(vec![
            "ACME_CORP".to_string(),
            "Fabrikam".to_string(),
            "Contoso".to_string(),
        ])
    }

    fn op(parsed: &ParsedCommand) -> Option<&str> {
        parsed.operation.as_ref().map(|o| o.as_str())
    }

    #[test]
    fn rules_target_catalog_operations() {
        for rule in default_rules() {
            match rule.action {
                RuleAction::Operation(id) => assert!(catalog::lookup(id).is_some(), "{id}"),
                RuleAction::Ambiguous { candidates, .. } => {
                    for id in candidates {
                        assert!(catalog::lookup(id).is_some(), "{id}");
                    }
                }
            }
        }
    }

    #[test]
    fn specific_rules_precede_general_ones() {
        let names = parser().rule_names();
        let pos = |name: &str| names.iter().position(|n| *n == name).expect(name);
        assert!(pos("check_export_status") < pos("export_database"));
        assert!(pos("download_logs") < pos("ambiguous_download"));
        assert!(pos("download_blobs") < pos("ambiguous_download"));
        assert!(pos("download_database") < pos("ambiguous_download"));
        assert!(pos("complete_deployment") < pos("start_deployment"));
        assert!(pos("reset_deployment") < pos("ambiguous_deployment"));
        assert_eq!(names.last(), Some(&"fallback_status"));
    }

    #[test]
    fn empty_and_whitespace_are_empty_command() {
        for text in ["", "   ", "\n\t"] {
            let parsed = parser().parse(text);
            assert_eq!(parsed.error_kind(), Some(&ErrorKind::EmptyCommand));
            assert!(parsed.operation.is_none());
            assert_eq!(parsed.confidence, 0);
        }
    }

    #[test]
    fn bare_download_is_ambiguous_with_all_three_candidates() {
        let parsed = parser().parse("download");
        assert!(parsed.ambiguous);
        assert!(parsed.operation.is_none());
        assert_eq!(parsed.error_kind(), Some(&ErrorKind::AmbiguousCommand));
        assert_eq!(
            parsed.candidates,
            vec!["download_blobs", "download_logs", "download_database"]
        );
    }

    #[test]
    fn ambiguous_download_ranks_by_extracted_hints() {
        let parsed = parser().parse("download the last 24 hours");
        assert!(parsed.ambiguous);
        assert_eq!(parsed.candidates[0], "download_logs");
        assert_eq!(parsed.candidates.len(), 3);
    }

    #[test]
    fn qualified_download_is_not_ambiguous() {
        let parsed = parser().parse("download application logs from production for the last 7 days");
        assert_eq!(op(&parsed), Some("download_logs"));
        assert!(!parsed.ambiguous);
        assert_eq!(parsed.arguments["log_type"], "application");
        assert_eq!(parsed.arguments["environment"], "Production");
        assert_eq!(parsed.arguments["time_window_hours"], 168);
    }

    #[test]
    fn export_status_wins_over_export() {
        let parsed = parser().parse("check export status for contoso");
        assert_eq!(op(&parsed), Some("check_export_status"));
        assert_eq!(parsed.arguments["project"], "Contoso");
    }

    #[test]
    fn export_with_all_parameters_is_fully_confident() {
        let parsed = parser().parse("export the production cms database for acme");
        assert_eq!(op(&parsed), Some("export_database"));
        assert_eq!(parsed.confidence, 100);
        assert_eq!(parsed.arguments["project"], "ACME_CORP");
        assert_eq!(parsed.arguments["database"], "epicms");
    }

    #[test]
    fn context_target_fills_project_at_half_weight() {
        let ctx = ParseContext::with_target("Fabrikam");
        let parsed = parser().parse_with_context("export the production cms database", &ctx);
        assert_eq!(parsed.arguments["project"], "Fabrikam");
        // 60 + 40 * (1 + 2 + 2) / 6
        assert_eq!(parsed.confidence, 93);
    }

    #[test]
    fn category_keyword_scores_below_exact() {
        let exact = parser().parse("export database");
        let category = parser().parse("backup");
        assert!(exact.confidence > category.confidence);
        assert_eq!(op(&category), Some("export_database"));
        assert!(category.needs_interpretation_confirmation());
    }

    #[test]
    fn deploy_extracts_direction() {
        let parsed = parser().parse("deploy contoso from prep to prod");
        assert_eq!(op(&parsed), Some("start_deployment"));
        assert_eq!(parsed.arguments["source_environment"], "Preproduction");
        assert_eq!(parsed.arguments["target_environment"], "Production");
        assert_eq!(parsed.confidence, 100);
    }

    #[test]
    fn complete_and_reset_beat_start() {
        assert_eq!(op(&parser().parse("complete the deployment in prod")), Some("complete_deployment"));
        assert_eq!(op(&parser().parse("rollback deployment on preproduction")), Some("reset_deployment"));
        assert_eq!(op(&parser().parse("show recent deployments")), Some("list_deployments"));
    }

    #[test]
    fn bare_deployment_noun_is_ambiguous() {
        let parsed = parser().parse("deployment for acme");
        assert!(parsed.ambiguous);
        assert_eq!(parsed.candidates.len(), 4);
        assert_eq!(parsed.arguments["project"], "ACME_CORP");
    }

    #[test]
    fn copy_content_between_environments() {
        let parsed = parser().parse("copy content from production to integration");
        assert_eq!(op(&parsed), Some("copy_content"));
        assert_eq!(parsed.arguments["source_environment"], "Production");
        assert_eq!(parsed.arguments["target_environment"], "Integration");
    }

    #[test]
    fn multiple_and_all_projects() {
        let parsed = parser().parse("export database for acme and fabrikam");
        assert_eq!(parsed.arguments["projects"], json!(["ACME_CORP", "Fabrikam"]));
        let parsed = parser().parse("export database for all projects");
        assert_eq!(parsed.arguments["all_projects"], true);
    }

    #[test]
    fn switch_project_never_defaults_from_context() {
        let ctx = ParseContext::with_target("Fabrikam");
        let parsed = parser().parse_with_context("switch to contoso", &ctx);
        assert_eq!(op(&parsed), Some("switch_project"));
        assert_eq!(parsed.arguments["project"], "Contoso");
        let parsed = parser().parse_with_context("switch project", &ctx);
        assert!(!parsed.arguments.contains_key("project"));
    }

    #[test]
    fn list_projects_without_parameters() {
        let parsed = parser().parse("list projects");
        assert_eq!(op(&parsed), Some("list_projects"));
        assert_eq!(parsed.confidence, 100);
    }

    #[test]
    fn fallback_rule_is_low_confidence() {
        let parsed = parser().parse("status");
        assert_eq!(op(&parsed), Some("list_deployments"));
        assert!(parsed.confidence < 50);
    }

    #[test]
    fn unrecognized_returns_three_example_suggestions() {
        let parsed = parser().parse("make me a sandwich");
        assert_eq!(parsed.error_kind(), Some(&ErrorKind::UnrecognizedCommand));
        assert_eq!(parsed.error.as_ref().map(|e| e.suggestions.len()), Some(3));
    }

    #[test]
    fn unrecognized_suggestions_prefer_shared_words() {
        let parsed = parser().parse("sandwich logs thing");
        assert_eq!(parsed.error_kind(), Some(&ErrorKind::UnrecognizedCommand));
        let suggestions = &parsed.error.as_ref().expect("error").suggestions;
        assert_eq!(
            suggestions.first().map(String::as_str),
            Some("download application logs from the last 24 hours")
        );
    }

    #[test]
    fn flags_are_carried_as_arguments() {
        let parsed = parser().parse("force export the database, dry run");
        assert_eq!(parsed.arguments["force"], true);
        assert_eq!(parsed.arguments["dry_run"], true);
    }

    #[test]
    fn parsing_is_idempotent() {
        let p = parser();
        let ctx = ParseContext::with_target("Contoso");
        for text in [
            "download",
            "export the production cms database for acme",
            "download logs yesterday",
            "",
            "nonsense words here",
        ] {
            assert_eq!(p.parse_with_context(text, &ctx), p.parse_with_context(text, &ctx));
        }
    }
}

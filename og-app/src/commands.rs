//! Slash commands for the interactive shell.

use crate::engine::{BatchRequest, CommandEngine, CommandResponse};
use crate::targets::TargetSelector;

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Text(String),
    Response(Box<CommandResponse>),
}

const USAGE: &str =
    "Supported: /new /status /project [name] /projects /pending /confirm <token> /accept /batch <operation> <targets> [key=value...] /help";

/// `/batch <operation> <targets> [key=value...]`. Comma-separated targets are
/// taken literally; anything else ("all projects", "acme and contoso") is
/// resolved as natural language.
fn batch_request(rest: &[&str]) -> Option<BatchRequest> {
    let (operation, tail) = rest.split_first()?;
    let mut arguments = serde_json::Map::new();
    let mut words = Vec::new();
    for token in tail {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                arguments.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
            _ => words.push(*token),
        }
    }
    if words.is_empty() {
        return None;
    }
    let selection = words.join(" ");
    let targets = if selection.contains(',') {
        TargetSelector::Explicit(
            selection
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    } else {
        TargetSelector::NaturalLanguage(selection)
    };
    Some(BatchRequest {
        targets,
        operation: operation.to_string(),
        arguments,
    })
}

pub async fn handle_command(
    engine: &CommandEngine,
    scope: &str,
    input: &str,
) -> Option<CommandReply> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    let reply = match command {
        "/new" => {
            engine.sessions().reset(scope);
            CommandReply::Text("Session reset.".to_string())
        }
        "/status" => {
            let session = engine.sessions().get_or_create(scope);
            CommandReply::Text(format!(
                "session_id={}\ncurrent_project={}\npending={}\nlast_active={}",
                session.id,
                session.current_project.as_deref().unwrap_or("-"),
                session
                    .pending
                    .as_ref()
                    .map(|p| format!("{} on {}", p.operation, p.targets.join(",")))
                    .unwrap_or_else(|| "-".to_string()),
                session.last_active.to_rfc3339()
            ))
        }
        "/project" if rest.is_empty() => {
            let current = engine.sessions().get_or_create(scope).current_project;
            CommandReply::Text(format!(
                "current_project={}",
                current.as_deref().unwrap_or("-")
            ))
        }
        "/project" => CommandReply::Response(Box::new(
            engine.switch_project(scope, &rest.join(" ")).await,
        )),
        "/projects" => CommandReply::Response(Box::new(engine.list_projects(scope))),
        "/pending" => match engine.sessions().get_or_create(scope).pending {
            Some(pending) => CommandReply::Text(format!(
                "operation={}\ntargets={}\nexpires_at={}\nconfirm with: /confirm {}",
                pending.operation,
                pending.targets.join(","),
                pending.expires_at.to_rfc3339(),
                pending.token
            )),
            None => CommandReply::Text("Nothing is awaiting confirmation.".to_string()),
        },
        "/confirm" => match rest.as_slice() {
            [token] => CommandReply::Response(Box::new(engine.confirm_pending(scope, token).await)),
            _ => CommandReply::Text("Usage: /confirm <token>".to_string()),
        },
        "/accept" => CommandReply::Response(Box::new(engine.accept_interpretation(scope).await)),
        "/batch" => match batch_request(&rest) {
            Some(request) => CommandReply::Response(Box::new(engine.run_batch(scope, request).await)),
            None => CommandReply::Text(
                "Usage: /batch <operation> <targets> [key=value...]".to_string(),
            ),
        },
        "/help" => CommandReply::Text(format!(
            "Type an instruction, e.g. \"{}\".\n{USAGE}",
            og_intent::EXAMPLE_COMMANDS[0]
        )),
        _ => CommandReply::Text(format!("Unknown command. {USAGE}")),
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CommandRequest;
    use crate::engine::tests::fixture;
    use og_intent::{ErrorKind, catalog};

    fn text(reply: Option<CommandReply>) -> String {
        match reply {
            Some(CommandReply::Text(text)) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    fn response(reply: Option<CommandReply>) -> CommandResponse {
        match reply {
            Some(CommandReply::Response(response)) => *response,
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn plain_text_is_not_a_command() {
        let fx = fixture();
        assert_eq!(handle_command(&fx.engine, "s", "list projects").await, None);
    }

    #[tokio::test]
    async fn project_switches_and_reports() {
        let fx = fixture();
        let switched = response(handle_command(&fx.engine, "s", "/project contoso").await);
        assert!(matches!(switched, CommandResponse::Informational { .. }));
        let current = text(handle_command(&fx.engine, "s", "/project").await);
        assert_eq!(current, "current_project=contoso");

        text(handle_command(&fx.engine, "s", "/new").await);
        let current = text(handle_command(&fx.engine, "s", "/project").await);
        assert_eq!(current, "current_project=-");
    }

    #[tokio::test]
    async fn confirm_runs_the_pending_request() {
        let fx = fixture();
        let preview = fx
            .engine
            .handle("s", CommandRequest::new("deploy from preproduction to production for acme"))
            .await;
        let CommandResponse::AwaitingConfirmation { confirmation_token, .. } = preview else {
            panic!("expected a preview");
        };
        assert!(text(handle_command(&fx.engine, "s", "/pending").await).contains(&confirmation_token));

        let done = response(
            handle_command(&fx.engine, "s", &format!("/confirm {confirmation_token}")).await,
        );
        assert!(matches!(done, CommandResponse::Executed { .. }));
        assert_eq!(fx.calls(catalog::START_DEPLOYMENT), 1);

        let again = response(
            handle_command(&fx.engine, "s", &format!("/confirm {confirmation_token}")).await,
        );
        assert_eq!(again.error_kind(), Some(&ErrorKind::NoPendingConfirmation));
    }

    #[tokio::test]
    async fn confirm_without_token_prints_usage() {
        let fx = fixture();
        assert_eq!(
            text(handle_command(&fx.engine, "s", "/confirm").await),
            "Usage: /confirm <token>"
        );
    }

    #[tokio::test]
    async fn accept_runs_the_held_interpretation_once() {
        let fx = fixture();
        fx.engine.switch_project("s", "acme").await;
        let held = fx.engine.handle("s", CommandRequest::new("status")).await;
        assert!(matches!(held, CommandResponse::ConfirmInterpretation { .. }));
        assert_eq!(fx.calls(catalog::LIST_DEPLOYMENTS), 0);

        let accepted = response(handle_command(&fx.engine, "s", "/accept").await);
        assert!(matches!(
            accepted,
            CommandResponse::Executed { ref target, .. } if target == "acme"
        ));
        assert_eq!(fx.calls(catalog::LIST_DEPLOYMENTS), 1);

        let again = response(handle_command(&fx.engine, "s", "/accept").await);
        assert_eq!(again.error_kind(), Some(&ErrorKind::NoPendingConfirmation));
    }

    #[tokio::test]
    async fn a_new_instruction_drops_the_held_interpretation() {
        let fx = fixture();
        fx.engine.switch_project("s", "acme").await;
        fx.engine.handle("s", CommandRequest::new("status")).await;
        fx.engine.handle("s", CommandRequest::new("list projects")).await;
        let response = fx.engine.accept_interpretation("s").await;
        assert_eq!(response.error_kind(), Some(&ErrorKind::NoPendingConfirmation));
        assert_eq!(fx.calls(catalog::LIST_DEPLOYMENTS), 0);
    }

    #[test]
    fn batch_request_splits_targets_and_arguments() {
        let request = batch_request(&["download_logs", "acme,", "contoso", "environment=prod"])
            .expect("request");
        assert_eq!(request.operation, "download_logs");
        assert_eq!(
            request.targets,
            TargetSelector::Explicit(vec!["acme".to_string(), "contoso".to_string()])
        );
        assert_eq!(request.arguments["environment"], "prod");

        let request = batch_request(&["download_logs", "all", "projects"]).expect("request");
        assert_eq!(
            request.targets,
            TargetSelector::NaturalLanguage("all projects".to_string())
        );
        assert!(batch_request(&["download_logs"]).is_none());
    }

    #[tokio::test]
    async fn batch_command_previews_across_targets() {
        let fx = fixture();
        let reply = response(
            handle_command(&fx.engine, "s", "/batch export_database acme,contoso").await,
        );
        assert!(matches!(reply, CommandResponse::AwaitingConfirmation { .. }));
        assert_eq!(fx.calls(catalog::EXPORT_DATABASE), 0);
    }

    #[tokio::test]
    async fn unknown_command_lists_supported_ones() {
        let fx = fixture();
        assert!(text(handle_command(&fx.engine, "s", "/frobnicate").await).contains("/confirm"));
    }
}

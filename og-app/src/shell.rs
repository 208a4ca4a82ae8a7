//! Runtime wiring and the interactive shell.

use crate::commands::{CommandReply, handle_command};
use crate::config::OpsGateConfig;
use crate::engine::{CommandEngine, CommandRequest, CommandResponse};
use crate::gate::ConfirmationGate;
use crate::targets::{ConfigTargets, EnvCredentials, TargetRegistry};
use anyhow::Result;
use og_intent::{IntentParser, ParseContext};
use og_tools::{RemoteOperationTool, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const SHELL_SCOPE: &str = "shell:local";

pub fn build_engine(cfg: &OpsGateConfig) -> Result<CommandEngine> {
    let credentials = Arc::new(EnvCredentials::from_config(cfg));
    let mut registry = ToolRegistry::new();
    for tool in RemoteOperationTool::for_catalog(&cfg.remote.base_url, cfg.remote_timeout(), credentials)? {
        registry.register(tool)?;
    }
    let targets: Arc<dyn TargetRegistry> = Arc::new(ConfigTargets::from_config(cfg));
    Ok(CommandEngine::new(
        Arc::new(registry),
        targets,
        ConfirmationGate::new(cfg.confirmation_ttl()),
    )
    .with_default_project(cfg.general.default_project.clone())
    .with_max_suggestions(cfg.general.max_suggestions))
}

pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = OpsGateConfig::load(config_path).await?;
    let engine = build_engine(&cfg)?;
    tracing::info!(
        projects = cfg.projects.len(),
        base_url = %cfg.remote.base_url,
        "opsgate shell ready"
    );
    println!("opsgate: type an instruction, /help for commands, /exit to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/exit" | "/quit") {
            break;
        }
        match handle_command(&engine, SHELL_SCOPE, line).await {
            Some(CommandReply::Text(text)) => println!("{text}"),
            Some(CommandReply::Response(response)) => print_response(&response)?,
            None => {
                let response = engine.handle(SHELL_SCOPE, CommandRequest::new(line)).await;
                print_response(&response)?;
            }
        }
    }
    engine.sessions().end(SHELL_SCOPE);
    Ok(())
}

fn print_response(response: &CommandResponse) -> Result<()> {
    if let Some(kind) = response.error_kind() {
        tracing::debug!(kind = kind.as_str(), "instruction not executed");
    }
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Interprets one instruction without executing anything.
pub async fn parse(config_path: Option<PathBuf>, text: &str, project: Option<String>) -> Result<()> {
    let parser = match OpsGateConfig::load(config_path).await {
        Ok(cfg) => IntentParser::new(cfg.project_names()).with_max_suggestions(cfg.general.max_suggestions),
        Err(error) => {
            tracing::warn!(%error, "config unavailable; parsing without known projects");
            IntentParser::default()
        }
    };
    let context = project.map(ParseContext::with_target).unwrap_or_default();
    let parsed = parser.parse_with_context(text, &context);
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

pub async fn targets(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = OpsGateConfig::load(config_path).await?;
    let registry = ConfigTargets::from_config(&cfg);
    for target in registry.list_targets() {
        let environments: Vec<&str> = target.environments.iter().map(String::as_str).collect();
        println!(
            "{}\t{}\t{}",
            target.name,
            target.project_id,
            if environments.is_empty() {
                "*".to_string()
            } else {
                environments.join(",")
            }
        );
    }
    Ok(())
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(crate::config::default_config_path);
    let cfg = OpsGateConfig::load(Some(path.clone())).await?;
    build_engine(&cfg)?;
    tracing::info!(
        config_path = %path.display(),
        base_url = %cfg.remote.base_url,
        projects = cfg.projects.len(),
        confirmation_ttl_seconds = cfg.general.confirmation_ttl_seconds,
        "config ok"
    );

    let credentials = EnvCredentials::from_config(&cfg);
    let mut missing_total = 0usize;
    for project in &cfg.projects {
        let missing = credentials.missing_vars(project.name.trim());
        if missing.is_empty() {
            println!("ok\t{}", project.name);
        } else {
            missing_total += missing.len();
            println!("missing\t{}\t{}", project.name, missing.join(","));
        }
    }
    if missing_total > 0 {
        return Err(anyhow::anyhow!(
            "{missing_total} credential variable(s) unset; see output above"
        ));
    }
    Ok(())
}

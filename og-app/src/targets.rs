//! Project/target registry boundary and target-set selection.

use crate::config::OpsGateConfig;
use og_intent::ErrorKind;
use og_intent::extract::{self, Normalized, ProjectMention};
use og_intent::fuzzy;
use og_tools::{CredentialProvider, Credentials};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Opaque reference to a project's credentials. Only a [`CredentialProvider`]
/// can turn it into a key pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CredentialsHandle(String);

impl CredentialsHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectTarget {
    pub name: String,
    pub project_id: String,
    pub credentials: CredentialsHandle,
    pub environments: BTreeSet<String>,
}

impl ProjectTarget {
    /// Targets that list no environments accept any.
    pub fn has_environment(&self, environment: &str) -> bool {
        self.environments.is_empty()
            || self
                .environments
                .iter()
                .any(|e| e.eq_ignore_ascii_case(environment))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("project {name:?} not found")]
    NotFound { name: String, suggestions: Vec<String> },

    #[error("no target projects specified; name one or more projects, or say \"all projects\"")]
    NoTargetsSpecified,
}

impl TargetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::TargetNotFound,
            Self::NoTargetsSpecified => ErrorKind::NoTargetsSpecified,
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { suggestions, .. } => suggestions.clone(),
            Self::NoTargetsSpecified => Vec::new(),
        }
    }
}

pub trait TargetRegistry: Send + Sync {
    fn list_targets(&self) -> Vec<ProjectTarget>;

    fn resolve_target(&self, name: &str) -> Result<ProjectTarget, TargetError>;

    fn names(&self) -> Vec<String> {
        self.list_targets().into_iter().map(|t| t.name).collect()
    }
}

/// Targets declared in `[[projects]]`.
pub struct ConfigTargets {
    targets: Vec<ProjectTarget>,
    max_suggestions: usize,
}

impl ConfigTargets {
    pub fn new(targets: Vec<ProjectTarget>, max_suggestions: usize) -> Self {
        Self {
            targets,
            max_suggestions: max_suggestions.max(1),
        }
    }

    pub fn from_config(cfg: &OpsGateConfig) -> Self {
        let targets = cfg
            .projects
            .iter()
            .map(|p| ProjectTarget {
                name: p.name.trim().to_string(),
                project_id: p.project_id.trim().to_string(),
                credentials: CredentialsHandle::new(p.name.trim()),
                environments: p.environments.iter().cloned().collect(),
            })
            .collect();
        Self::new(targets, cfg.general.max_suggestions)
    }
}

impl TargetRegistry for ConfigTargets {
    fn list_targets(&self) -> Vec<ProjectTarget> {
        self.targets.clone()
    }

    fn resolve_target(&self, name: &str) -> Result<ProjectTarget, TargetError> {
        let name = name.trim();
        if let Some(target) = self
            .targets
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
        {
            return Ok(target.clone());
        }
        let names: Vec<&str> = self.targets.iter().map(|t| t.name.as_str()).collect();
        Err(TargetError::NotFound {
            name: name.to_string(),
            suggestions: fuzzy::resolve(name, &names, self.max_suggestions),
        })
    }
}

/// How a batch request names its targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    NaturalLanguage(String),
    Explicit(Vec<String>),
}

pub fn select_targets(
    registry: &dyn TargetRegistry,
    selector: &TargetSelector,
) -> Result<Vec<ProjectTarget>, TargetError> {
    let names = match selector {
        TargetSelector::Explicit(names) => names.clone(),
        TargetSelector::NaturalLanguage(text) => {
            let known = registry.names();
            match extract::projects(&Normalized::new(text), &known) {
                ProjectMention::All => known,
                ProjectMention::Named(names) => names,
                ProjectMention::None => Vec::new(),
            }
        }
    };
    resolve_all(registry, &names)
}

/// Resolves every name, dropping repeats while keeping first-seen order.
pub fn resolve_all(
    registry: &dyn TargetRegistry,
    names: &[String],
) -> Result<Vec<ProjectTarget>, TargetError> {
    let mut targets: Vec<ProjectTarget> = Vec::new();
    for name in names.iter().filter(|n| !n.trim().is_empty()) {
        let target = registry.resolve_target(name)?;
        if !targets.iter().any(|t| t.name == target.name) {
            targets.push(target);
        }
    }
    if targets.is_empty() {
        return Err(TargetError::NoTargetsSpecified);
    }
    Ok(targets)
}

/// Reads each project's key pair from the environment variables named in
/// its config entry, at call time.
pub struct EnvCredentials {
    vars: HashMap<String, (String, String)>,
}

impl EnvCredentials {
    pub fn from_config(cfg: &OpsGateConfig) -> Self {
        let vars = cfg
            .projects
            .iter()
            .map(|p| {
                (
                    p.name.trim().to_string(),
                    (p.api_key_env.clone(), p.api_secret_env.clone()),
                )
            })
            .collect();
        Self { vars }
    }

    /// Environment variables that are unset or empty.
    pub fn missing_vars(&self, handle: &str) -> Vec<String> {
        let Some((key_env, secret_env)) = self.vars.get(handle) else {
            return Vec::new();
        };
        [key_env, secret_env]
            .into_iter()
            .filter(|var| read_var(var).is_none())
            .cloned()
            .collect()
    }
}

impl CredentialProvider for EnvCredentials {
    fn resolve(&self, handle: &str) -> Option<Credentials> {
        let (key_env, secret_env) = self.vars.get(handle)?;
        Some(Credentials {
            key: read_var(key_env)?,
            secret: read_var(secret_env)?,
        })
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn target(name: &str) -> ProjectTarget {
        ProjectTarget {
            name: name.to_string(),
            project_id: format!("p-{}", name.to_ascii_lowercase()),
            credentials: CredentialsHandle::new(name),
            environments: BTreeSet::new(),
        }
    }

    pub(crate) fn registry() -> ConfigTargets {
        ConfigTargets::new(
            vec![target("ACME_CORP"), target("Fabrikam"), target("Contoso")],
            3,
        )
    }

    #[test]
    fn resolves_case_insensitively() {
        let found = registry().resolve_target("contoso").unwrap();
        assert_eq!(found.name, "Contoso");
    }

    #[test]
    fn unknown_target_carries_fuzzy_suggestions() {
        let err = registry().resolve_target("acme").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);
        assert_eq!(err.suggestions().first().map(String::as_str), Some("ACME_CORP"));
    }

    #[test]
    fn explicit_selection_dedups_in_order() {
        let selected = select_targets(
            &registry(),
            &TargetSelector::Explicit(vec![
                "fabrikam".to_string(),
                "Contoso".to_string(),
                "FABRIKAM".to_string(),
            ]),
        )
        .unwrap();
        let names: Vec<&str> = selected.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Fabrikam", "Contoso"]);
    }

    #[test]
    fn natural_language_all_projects() {
        let selected = select_targets(
            &registry(),
            &TargetSelector::NaturalLanguage("run it on all projects".to_string()),
        )
        .unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn empty_selection_is_an_error() {
        let err = select_targets(&registry(), &TargetSelector::Explicit(Vec::new())).unwrap_err();
        assert_eq!(err, TargetError::NoTargetsSpecified);
        let err = select_targets(
            &registry(),
            &TargetSelector::NaturalLanguage("nothing relevant here".to_string()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoTargetsSpecified);
    }

    #[test]
    fn environment_membership_is_case_insensitive() {
        let mut t = target("acme");
        assert!(t.has_environment("Production"));
        t.environments.insert("Integration".to_string());
        assert!(t.has_environment("integration"));
        assert!(!t.has_environment("Production"));
    }
}

//! opsgate configuration loader.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct OpsGateConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    /// Project used when neither the instruction nor the session names one.
    #[serde(default)]
    pub default_project: Option<String>,
    #[serde(default = "default_confirmation_ttl_seconds")]
    pub confirmation_ttl_seconds: u64,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

fn default_confirmation_ttl_seconds() -> u64 {
    600
}

fn default_max_suggestions() -> usize {
    og_intent::fuzzy::DEFAULT_MAX_SUGGESTIONS
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_project: None,
            confirmation_ttl_seconds: default_confirmation_ttl_seconds(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default = "default_remote_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_remote_timeout_seconds() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub environments: Vec<String>,
    /// Names of the environment variables holding the API key pair; the
    /// values themselves never live in the config file.
    pub api_key_env: String,
    pub api_secret_env: String,
}

impl OpsGateConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg = Self::parse(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("OPSGATE_BASE_URL") {
            if !v.trim().is_empty() {
                self.remote.base_url = v;
            }
        }
        if let Some(v) = lookup("OPSGATE_DEFAULT_PROJECT") {
            if !v.trim().is_empty() {
                self.general.default_project = Some(v);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.remote.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("remote.base_url is required"));
        }
        if self.remote.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("remote.timeout_seconds must be > 0"));
        }
        if self.general.confirmation_ttl_seconds == 0 {
            return Err(anyhow::anyhow!(
                "general.confirmation_ttl_seconds must be > 0"
            ));
        }
        let mut seen = HashSet::new();
        for project in &self.projects {
            let name = project.name.trim();
            if name.is_empty() {
                return Err(anyhow::anyhow!("projects[].name must not be empty"));
            }
            if project.project_id.trim().is_empty() {
                return Err(anyhow::anyhow!("project {name}: project_id is required"));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(anyhow::anyhow!("duplicate project name {name:?}"));
            }
        }
        if let Some(default) = self.general.default_project.as_deref() {
            if !seen.contains(&default.trim().to_ascii_lowercase()) {
                return Err(anyhow::anyhow!(
                    "general.default_project {default:?} is not a configured project"
                ));
            }
        }
        Ok(())
    }

    pub fn confirmation_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.general.confirmation_ttl_seconds as i64)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_seconds)
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.name.clone()).collect()
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".opsgate").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[general]
default_project = "acme"

[remote]
base_url = "https://ops.example.test/api/v1"

[[projects]]
name = "acme"
project_id = "p-acme"
environments = ["Integration", "Production"]
api_key_env = "ACME_KEY"
api_secret_env = "ACME_SECRET"

[[projects]]
name = "contoso"
project_id = "p-contoso"
api_key_env = "CONTOSO_KEY"
api_secret_env = "CONTOSO_SECRET"
"#;

    #[tokio::test]
    async fn loads_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let cfg = OpsGateConfig::load(Some(file.path().to_path_buf()))
            .await
            .unwrap();
        assert_eq!(cfg.projects.len(), 2);
        assert_eq!(cfg.general.confirmation_ttl_seconds, 600);
        assert_eq!(cfg.general.max_suggestions, 3);
        assert_eq!(cfg.remote.timeout_seconds, 120);
        assert_eq!(cfg.project_names(), vec!["acme", "contoso"]);
    }

    #[tokio::test]
    async fn missing_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = OpsGateConfig::load(Some(path.clone())).await.unwrap_err();
        assert!(err.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn overrides_replace_non_empty_values_only() {
        let mut cfg = OpsGateConfig::parse(SAMPLE).unwrap();
        cfg.apply_overrides(|key| match key {
            "OPSGATE_BASE_URL" => Some("http://localhost:9000".to_string()),
            "OPSGATE_DEFAULT_PROJECT" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.remote.base_url, "http://localhost:9000");
        assert_eq!(cfg.general.default_project.as_deref(), Some("acme"));
    }

    #[test]
    fn rejects_duplicate_project_names() {
        let mut cfg = OpsGateConfig::parse(SAMPLE).unwrap();
        cfg.projects[1].name = "ACME".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate project name"));
    }

    #[test]
    fn rejects_unknown_default_project() {
        let mut cfg = OpsGateConfig::parse(SAMPLE).unwrap();
        cfg.general.default_project = Some("fabrikam".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_ttl() {
        let mut cfg = OpsGateConfig::parse(SAMPLE).unwrap();
        cfg.general.confirmation_ttl_seconds = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("confirmation_ttl_seconds"));
    }
}

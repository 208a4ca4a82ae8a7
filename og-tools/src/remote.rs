//! Generic remote operation: every catalog entry maps onto one endpoint of the
//! hosting management API, authenticated per project with basic auth.

use crate::error::{Result, ToolError};
use crate::traits::{OutstandingOperation, Tool, ToolSpec, require_string};
use async_trait::async_trait;
use og_intent::OperationDescriptor;
use reqwest::{StatusCode, Url};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Argument keys consumed locally and never forwarded in the request body.
const LOCAL_KEYS: &[&str] = &[
    "project_id",
    "credentials_ref",
    "confirmation_token",
    "confirm",
    "confirmed",
    "duplicate_policy",
];

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Resolves an opaque credentials handle (as carried in `credentials_ref`)
/// into the key pair for one project.
pub trait CredentialProvider: Send + Sync {
    fn resolve(&self, handle: &str) -> Option<Credentials>;
}

pub struct RemoteOperationTool {
    http: reqwest::Client,
    base_url: Url,
    descriptor: &'static OperationDescriptor,
    credentials: Arc<dyn CredentialProvider>,
}

impl RemoteOperationTool {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        descriptor: &'static OperationDescriptor,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            descriptor,
            credentials,
        })
    }

    /// One tool per remote catalog entry. Session-local operations
    /// (`list_projects`, `switch_project`) are skipped.
    pub fn for_catalog(
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Vec<Arc<dyn Tool>>> {
        og_intent::catalog::all()
            .iter()
            .filter(|descriptor| og_intent::catalog::is_remote(descriptor.id))
            .map(|descriptor| {
                Self::new(base_url, timeout, descriptor, credentials.clone())
                    .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
            })
            .collect()
    }

    fn endpoint(&self, project_id: &str, suffix: &str) -> Result<Url> {
        self.base_url
            .join(&format!("projects/{project_id}/operations/{}{suffix}", self.descriptor.id))
            .map_err(|e| ToolError::ExecutionFailed(format!("invalid endpoint: {e}")))
    }

    fn target(&self, arguments: &serde_json::Value) -> Result<(String, Credentials)> {
        let project_id = require_string(arguments, "project_id")?;
        validate_project_id(&project_id)?;
        let handle = require_string(arguments, "credentials_ref")?;
        let credentials = self.credentials.resolve(&handle).ok_or_else(|| {
            ToolError::Unauthorized(format!("no credentials available for {handle}"))
        })?;
        Ok((project_id, credentials))
    }
}

#[async_trait]
impl Tool for RemoteOperationTool {
    fn spec(&self) -> ToolSpec {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .descriptor
            .expected_params
            .iter()
            .map(|param| ((*param).to_string(), json!({})))
            .collect();
        ToolSpec {
            name: self.descriptor.id.to_string(),
            description: self.descriptor.description.to_string(),
            parameters_schema: json!({
                "type": "object",
                "properties": properties,
                "required": ["project_id", "credentials_ref"],
            }),
            operation_class: self.descriptor.class,
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value> {
        let (project_id, credentials) = self.target(&arguments)?;
        let url = self.endpoint(&project_id, "")?;
        let body = forwarded_arguments(&arguments);

        tracing::debug!(operation = self.descriptor.id, %project_id, "sending remote operation");
        let response = self
            .http
            .post(url)
            .basic_auth(&credentials.key, Some(&credentials.secret))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ToolError::Unauthorized(format!(
                "{} rejected for project {project_id}: status={status}",
                self.descriptor.id
            )));
        }
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "{} failed for project {project_id}: status={status} body={text}",
                self.descriptor.id
            )));
        }
        parse_body(status, &text)
    }

    async fn outstanding(
        &self,
        arguments: &serde_json::Value,
    ) -> Result<Option<OutstandingOperation>> {
        let guarded = self
            .descriptor
            .class
            .is_some_and(|class| class.requires_duplicate_guard());
        if !guarded {
            return Ok(None);
        }
        let (project_id, credentials) = self.target(arguments)?;
        let url = self.endpoint(&project_id, "/outstanding")?;
        let response = self
            .http
            .get(url)
            .basic_auth(&credentials.key, Some(&credentials.secret))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "outstanding lookup for {} failed: status={status} body={text}",
                self.descriptor.id
            )));
        }
        parse_outstanding(&text)
    }
}

fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArguments("base_url is required".to_string()));
    }
    // Url::join drops the last path segment unless it ends with a slash.
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&with_slash)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid base_url {trimmed:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::InvalidArguments(format!(
            "base_url must be http(s), got {other}"
        ))),
    }
}

fn validate_project_id(project_id: &str) -> Result<()> {
    let valid = project_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments(format!(
            "project_id {project_id:?} contains invalid characters"
        )))
    }
}

fn forwarded_arguments(arguments: &serde_json::Value) -> serde_json::Value {
    let mut body = arguments.as_object().cloned().unwrap_or_default();
    for key in LOCAL_KEYS {
        body.remove(*key);
    }
    serde_json::Value::Object(body)
}

fn parse_body(status: StatusCode, text: &str) -> Result<serde_json::Value> {
    if text.trim().is_empty() {
        return Ok(json!({ "status": status.as_u16() }));
    }
    Ok(serde_json::from_str(text)?)
}

fn parse_outstanding(text: &str) -> Result<Option<OutstandingOperation>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_intent::catalog;

    struct StaticCredentials;

    impl CredentialProvider for StaticCredentials {
        fn resolve(&self, handle: &str) -> Option<Credentials> {
            (handle == "acme").then(|| Credentials {
                key: "k".to_string(),
                secret: "s3cret".to_string(),
            })
        }
    }

    fn tool(id: &str) -> RemoteOperationTool {
        let descriptor = catalog::lookup(id).unwrap();
        RemoteOperationTool::new(
            "https://ops.example.test/api/v1",
            Duration::from_secs(5),
            descriptor,
            Arc::new(StaticCredentials),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let url = tool(catalog::EXPORT_DATABASE).endpoint("p-1", "/outstanding").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ops.example.test/api/v1/projects/p-1/operations/export_database/outstanding"
        );
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = normalize_base_url("ftp://ops.example.test").unwrap_err();
        assert!(err.to_string().contains("must be http(s)"));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = StaticCredentials.resolve("acme").unwrap();
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("s3cret"));
    }

    #[tokio::test]
    async fn invalid_project_id_fails_before_sending() {
        let err = tool(catalog::DOWNLOAD_LOGS)
            .execute(json!({ "project_id": "../etc", "credentials_ref": "acme" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_credentials_are_unauthorized() {
        let err = tool(catalog::DOWNLOAD_LOGS)
            .execute(json!({ "project_id": "p1", "credentials_ref": "globex" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unguarded_operations_report_nothing_outstanding() {
        let none = tool(catalog::DOWNLOAD_BLOBS)
            .outstanding(&json!({ "project_id": "p1", "credentials_ref": "acme" }))
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn forwarded_arguments_drop_local_keys() {
        let body = forwarded_arguments(&json!({
            "project_id": "p1",
            "credentials_ref": "acme",
            "confirmation_token": "t",
            "environment": "Production",
        }));
        assert_eq!(body, json!({ "environment": "Production" }));
    }

    #[test]
    fn outstanding_body_parses() {
        let parsed = parse_outstanding(r#"{"reference":"exp-9","status":"InProgress"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.reference, "exp-9");
        assert_eq!(parsed.started_at, None);
        assert_eq!(parse_outstanding("null").unwrap(), None);
    }

    #[test]
    fn catalog_tools_skip_session_operations() {
        let tools = RemoteOperationTool::for_catalog(
            "http://localhost:8080",
            Duration::from_secs(5),
            Arc::new(StaticCredentials),
        )
        .unwrap();
        let names: Vec<String> = tools.iter().map(|t| t.spec().name).collect();
        assert!(names.contains(&"export_database".to_string()));
        assert!(!names.contains(&"switch_project".to_string()));
        assert!(!names.contains(&"list_projects".to_string()));
    }
}

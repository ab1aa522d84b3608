//! Issue tracker integration.
//!
//! A plan maps onto tracker issues as Epic → Story (linked to its Epic) →
//! Sub-task (child of its Story). The [`TrackerBackend`] trait is the seam
//! to a concrete tracker; [`Reconciler`] walks a session's plan and drives
//! the backend.

mod jira;
mod reconciler;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use jira::JiraTracker;
pub use reconciler::{CreatedIssue, Reconciler, UploadReport, UploadSummary};

use crate::config::TrackerConfig;
use crate::error::PlannerError;

/// Fully resolved credentials for one tracker call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerCredentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub project_key: String,
}

/// Credentials as supplied by a client. Missing fields are filled from the
/// configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsInput {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub project_key: Option<String>,
}

impl CredentialsInput {
    pub fn resolve(self, defaults: &TrackerConfig) -> Result<TrackerCredentials, PlannerError> {
        self.resolve_inner(defaults, true)
    }

    /// Like [`resolve`](Self::resolve) but the project key may be absent,
    /// for calls that only concern the account.
    pub fn resolve_account(
        self,
        defaults: &TrackerConfig,
    ) -> Result<TrackerCredentials, PlannerError> {
        self.resolve_inner(defaults, false)
    }

    fn resolve_inner(
        self,
        defaults: &TrackerConfig,
        require_project: bool,
    ) -> Result<TrackerCredentials, PlannerError> {
        fn pick(given: Option<String>, fallback: &Option<String>) -> Option<String> {
            given
                .or_else(|| fallback.clone())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        let missing =
            |name: &str| PlannerError::InvalidInput(format!("Missing tracker credential: {}", name));

        let project_key = pick(self.project_key, &defaults.project_key);
        if require_project && project_key.is_none() {
            return Err(missing("project_key"));
        }

        Ok(TrackerCredentials {
            base_url: pick(self.base_url, &defaults.base_url)
                .ok_or_else(|| missing("base_url"))?
                .trim_end_matches('/')
                .to_string(),
            email: pick(self.email, &defaults.email).ok_or_else(|| missing("email"))?,
            api_token: pick(self.api_token, &defaults.api_token)
                .ok_or_else(|| missing("api_token"))?,
            project_key: project_key.unwrap_or_default(),
        })
    }
}

/// The configured tracker defaults as shown to clients. The token itself
/// is never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerDefaults {
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub project_key: Option<String>,
    pub has_token: bool,
}

impl From<&TrackerConfig> for TrackerDefaults {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            email: config.email.clone(),
            project_key: config.project_key.clone(),
            has_token: config
                .api_token
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
        }
    }
}

/// Who the credentials belong to and which project they point at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerIdentity {
    pub display_name: String,
    pub email: Option<String>,
    pub project_key: String,
    pub project_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackerProject {
    pub id: String,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Epic,
    Story,
    Subtask,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Subtask => "subtask",
        }
    }
}

/// A block of issue description text, rendered by each tracker in its own
/// rich-text format.
#[derive(Debug, Clone, PartialEq)]
pub enum DescriptionBlock {
    Paragraph(String),
    Strong(String),
    Bullets(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IssueFields {
    pub summary: String,
    pub description: Vec<DescriptionBlock>,
    /// Original time estimate. Only sent when positive.
    pub hours: Option<f64>,
}

/// A created issue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueRef {
    pub key: String,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("tracker rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid tracker response: {0}")]
    InvalidResponse(String),
}

impl TrackerError {
    /// Errors that will fail every following call too.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::ProjectNotFound(_))
    }
}

impl From<TrackerError> for PlannerError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::Auth(msg) => PlannerError::AuthFailed(msg),
            TrackerError::ProjectNotFound(msg) => PlannerError::ProjectNotFound(msg),
            other => PlannerError::NetworkError(other.to_string()),
        }
    }
}

#[async_trait]
pub trait TrackerBackend: Send + Sync {
    /// Verify credentials and project access without creating anything.
    async fn test_connection(
        &self,
        credentials: &TrackerCredentials,
    ) -> Result<TrackerIdentity, TrackerError>;

    async fn list_projects(
        &self,
        credentials: &TrackerCredentials,
    ) -> Result<Vec<TrackerProject>, TrackerError>;

    /// Create one issue. `parent` is the key of the Epic for a Story and of
    /// the Story for a Sub-task.
    async fn create_issue(
        &self,
        credentials: &TrackerCredentials,
        kind: IssueKind,
        fields: &IssueFields,
        parent: Option<&str>,
    ) -> Result<IssueRef, TrackerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> TrackerConfig {
        TrackerConfig {
            base_url: Some("https://acme.atlassian.net/".to_string()),
            email: Some("pm@acme.test".to_string()),
            api_token: Some("s3cret".to_string()),
            project_key: Some("OKR".to_string()),
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn request_fields_override_defaults() {
        let input = CredentialsInput {
            project_key: Some("GROW".to_string()),
            ..CredentialsInput::default()
        };
        let creds = input.resolve(&defaults()).unwrap();
        assert_eq!(creds.project_key, "GROW");
        assert_eq!(creds.email, "pm@acme.test");
        assert_eq!(creds.base_url, "https://acme.atlassian.net");
    }

    #[test]
    fn missing_fields_are_invalid_input() {
        let err = CredentialsInput::default()
            .resolve(&TrackerConfig::default())
            .unwrap_err();
        assert!(matches!(err, PlannerError::InvalidInput(msg) if msg.contains("project_key")));
    }

    #[test]
    fn account_calls_do_not_need_a_project() {
        let mut config = defaults();
        config.project_key = None;
        let creds = CredentialsInput::default().resolve_account(&config).unwrap();
        assert_eq!(creds.project_key, "");
        let err = CredentialsInput::default().resolve(&config).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidInput(_)));
    }

    #[test]
    fn defaults_view_redacts_the_token() {
        let view = TrackerDefaults::from(&defaults());
        assert!(view.has_token);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("s3cret"));
    }

    #[test]
    fn fatal_errors_map_to_planner_taxonomy() {
        let auth: PlannerError = TrackerError::Auth("401".into()).into();
        assert!(matches!(auth, PlannerError::AuthFailed(_)));
        assert!(TrackerError::ProjectNotFound("OKR".into()).is_fatal());
        let rejected = TrackerError::Rejected {
            status: 400,
            message: "bad field".into(),
        };
        assert!(!rejected.is_fatal());
        assert!(matches!(PlannerError::from(rejected), PlannerError::NetworkError(_)));
    }
}

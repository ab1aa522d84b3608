//! Jira Cloud REST v3 tracker.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    DescriptionBlock, IssueFields, IssueKind, IssueRef, TrackerBackend, TrackerCredentials,
    TrackerError, TrackerIdentity, TrackerProject,
};

/// Link types tried, in order, when relating a Story to its Epic.
const LINK_TYPES: [&str; 2] = ["Relates", "Blocks"];

/// Sub-task issue type names vary between Jira schemes.
const SUBTASK_TYPES: [&str; 2] = ["Sub-task", "Subtask"];

#[derive(Debug, Clone)]
pub struct JiraTracker {
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Myself {
    display_name: Option<String>,
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    #[serde(default)]
    id: String,
    key: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    key: String,
}

impl JiraTracker {
    pub fn new(timeout: Duration) -> Result<Self, TrackerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Build an authenticated request against the REST v3 API.
    fn request(&self, creds: &TrackerCredentials, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/rest/api/3{}", creds.base_url, path);
        self.client
            .request(method, url)
            .basic_auth(&creds.email, Some(&creds.api_token))
            .header("Accept", "application/json")
    }

    /// Map a non-success response to an error.
    async fn failure(response: Response, project_key: &str) -> TrackerError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        classify(status, message, project_key)
    }

    async fn post_issue(
        &self,
        creds: &TrackerCredentials,
        payload: &Value,
    ) -> Result<Result<IssueRef, (StatusCode, String)>, TrackerError> {
        let response = self
            .request(creds, Method::POST, "/issue")
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let created: CreatedIssue = response
                .json()
                .await
                .map_err(|e| TrackerError::InvalidResponse(e.to_string()))?;
            Ok(Ok(IssueRef { key: created.key }))
        } else {
            let message = response.text().await.unwrap_or_default();
            Ok(Err((status, message)))
        }
    }

    /// Relate a Story to its Epic. Failure is logged and otherwise ignored.
    async fn link_to_epic(&self, creds: &TrackerCredentials, story_key: &str, epic_key: &str) {
        for link_type in LINK_TYPES {
            let payload = json!({
                "type": { "name": link_type },
                "inwardIssue": { "key": story_key },
                "outwardIssue": { "key": epic_key },
            });
            match self
                .request(creds, Method::POST, "/issueLink")
                .json(&payload)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(story_key, epic_key, link_type, "linked story to epic");
                    return;
                }
                Ok(response) => {
                    tracing::debug!(
                        story_key,
                        link_type,
                        status = response.status().as_u16(),
                        "link type rejected"
                    );
                }
                Err(e) => {
                    tracing::warn!(story_key, epic_key, "epic link failed: {}", e);
                    return;
                }
            }
        }
        tracing::warn!(story_key, epic_key, "no usable link type, story left unlinked");
    }

    fn fields_payload(
        creds: &TrackerCredentials,
        issue_type: &str,
        fields: &IssueFields,
        parent: Option<&str>,
    ) -> Value {
        let mut payload = json!({
            "fields": {
                "project": { "key": creds.project_key },
                "summary": fields.summary,
                "description": adf(&fields.description),
                "issuetype": { "name": issue_type },
            }
        });
        if let Some(parent) = parent {
            payload["fields"]["parent"] = json!({ "key": parent });
        }
        if let Some(original) = fields.hours.and_then(estimate) {
            payload["fields"]["timetracking"] = json!({ "originalEstimate": original });
        }
        payload
    }

    async fn create_subtask(
        &self,
        creds: &TrackerCredentials,
        fields: &IssueFields,
        parent: Option<&str>,
    ) -> Result<IssueRef, TrackerError> {
        if let Some(parent) = parent {
            for issue_type in SUBTASK_TYPES {
                let payload = Self::fields_payload(creds, issue_type, fields, Some(parent));
                match self.post_issue(creds, &payload).await? {
                    Ok(issue) => return Ok(issue),
                    Err((status, message)) if is_issue_type_error(&message) => {
                        tracing::debug!(issue_type, status = status.as_u16(), "issue type unavailable");
                    }
                    Err((status, message)) => {
                        return Err(classify(status, message, &creds.project_key))
                    }
                }
            }
            tracing::warn!(
                parent,
                "no sub-task issue type available, creating a plain Task instead"
            );
        }

        let payload = Self::fields_payload(creds, "Task", fields, None);
        self.post_issue(creds, &payload)
            .await?
            .map_err(|(status, message)| classify(status, message, &creds.project_key))
    }
}

#[async_trait]
impl TrackerBackend for JiraTracker {
    async fn test_connection(
        &self,
        creds: &TrackerCredentials,
    ) -> Result<TrackerIdentity, TrackerError> {
        let response = self.request(creds, Method::GET, "/myself").send().await?;
        if !response.status().is_success() {
            return Err(match Self::failure(response, &creds.project_key).await {
                TrackerError::Rejected { status, message } if status == 404 => {
                    TrackerError::Auth(format!("no Jira API at {}: {}", creds.base_url, message))
                }
                other => other,
            });
        }
        let me: Myself = response
            .json()
            .await
            .map_err(|e| TrackerError::InvalidResponse(e.to_string()))?;

        let path = format!("/project/{}", creds.project_key);
        let response = self.request(creds, Method::GET, &path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TrackerError::ProjectNotFound(creds.project_key.clone()));
        }
        if !response.status().is_success() {
            return Err(Self::failure(response, &creds.project_key).await);
        }
        let project: Project = response
            .json()
            .await
            .map_err(|e| TrackerError::InvalidResponse(e.to_string()))?;

        Ok(TrackerIdentity {
            display_name: me.display_name.unwrap_or_default(),
            email: me.email_address,
            project_key: project.key,
            project_name: project.name,
        })
    }

    async fn list_projects(
        &self,
        creds: &TrackerCredentials,
    ) -> Result<Vec<TrackerProject>, TrackerError> {
        let response = self.request(creds, Method::GET, "/project").send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(response, &creds.project_key).await);
        }
        let projects: Vec<Project> = response
            .json()
            .await
            .map_err(|e| TrackerError::InvalidResponse(e.to_string()))?;
        Ok(projects
            .into_iter()
            .map(|p| TrackerProject {
                id: p.id,
                key: p.key,
                name: p.name,
            })
            .collect())
    }

    async fn create_issue(
        &self,
        creds: &TrackerCredentials,
        kind: IssueKind,
        fields: &IssueFields,
        parent: Option<&str>,
    ) -> Result<IssueRef, TrackerError> {
        match kind {
            IssueKind::Epic => {
                let payload = Self::fields_payload(creds, "Epic", fields, None);
                self.post_issue(creds, &payload)
                    .await?
                    .map_err(|(status, message)| classify(status, message, &creds.project_key))
            }
            IssueKind::Story => {
                let payload = Self::fields_payload(creds, "Story", fields, None);
                let issue = self
                    .post_issue(creds, &payload)
                    .await?
                    .map_err(|(status, message)| classify(status, message, &creds.project_key))?;
                if let Some(epic_key) = parent {
                    self.link_to_epic(creds, &issue.key, epic_key).await;
                }
                Ok(issue)
            }
            IssueKind::Subtask => self.create_subtask(creds, fields, parent).await,
        }
    }
}

fn classify(status: StatusCode, message: String, project_key: &str) -> TrackerError {
    match status {
        StatusCode::UNAUTHORIZED => TrackerError::Auth(message),
        StatusCode::FORBIDDEN => TrackerError::Auth(format!(
            "no permission for project '{}': {}",
            project_key, message
        )),
        StatusCode::BAD_REQUEST if message.to_lowercase().contains("valid project") => {
            TrackerError::ProjectNotFound(project_key.to_string())
        }
        _ => TrackerError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

fn is_issue_type_error(message: &str) -> bool {
    message.to_lowercase().contains("valid issue type")
}

/// Jira time-tracking notation for an hour estimate. `None` unless positive.
fn estimate(hours: f64) -> Option<String> {
    if !hours.is_finite() || hours <= 0.0 {
        return None;
    }
    if hours.fract() == 0.0 {
        Some(format!("{}h", hours))
    } else {
        Some(format!("{}m", (hours * 60.0).round()))
    }
}

/// Render description blocks as an Atlassian Document Format document.
fn adf(blocks: &[DescriptionBlock]) -> Value {
    let text = |t: &str| json!({ "type": "text", "text": t });
    let content: Vec<Value> = blocks
        .iter()
        .filter_map(|block| match block {
            DescriptionBlock::Paragraph(t) if !t.is_empty() => {
                Some(json!({ "type": "paragraph", "content": [text(t)] }))
            }
            DescriptionBlock::Strong(t) if !t.is_empty() => Some(json!({
                "type": "paragraph",
                "content": [{ "type": "text", "text": t, "marks": [{ "type": "strong" }] }]
            })),
            DescriptionBlock::Bullets(items) if !items.is_empty() => Some(json!({
                "type": "bulletList",
                "content": items.iter().map(|item| json!({
                    "type": "listItem",
                    "content": [{ "type": "paragraph", "content": [text(item)] }]
                })).collect::<Vec<_>>()
            })),
            _ => None,
        })
        .collect();

    json!({ "type": "doc", "version": 1, "content": content })
}

//! Walks a session's plan and creates the matching tracker issues.
//!
//! Three top-down passes: every Epic, then every Story (flattened, titled
//! `"<Feature>: <Story>"`), then every Task as a Sub-task. A failed item is
//! recorded and its siblings continue; its children are skipped with one
//! error naming the parent. Authentication or project errors stop the walk.
//! Nothing is rolled back, and re-running creates everything again.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    DescriptionBlock, IssueFields, IssueKind, TrackerBackend, TrackerCredentials, TrackerIdentity,
    TrackerProject,
};
use crate::error::{PlannerError, Result};
use crate::models::{Epic, RollupScope, StoryPath, Task};
use crate::store::SessionRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadSummary {
    pub epics: usize,
    pub stories: usize,
    pub subtasks: usize,
}

/// One issue created during an upload, tied back to its plan node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedIssue {
    pub kind: IssueKind,
    pub local_id: String,
    pub key: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadReport {
    /// True iff `errors` is empty.
    pub success: bool,
    pub summary: UploadSummary,
    pub created: Vec<CreatedIssue>,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct Reconciler {
    tracker: Arc<dyn TrackerBackend>,
}

impl Reconciler {
    pub fn new(tracker: Arc<dyn TrackerBackend>) -> Self {
        Self { tracker }
    }

    pub async fn test_connection(&self, creds: &TrackerCredentials) -> Result<TrackerIdentity> {
        let identity = self.tracker.test_connection(creds).await?;
        tracing::info!(
            project = %identity.project_key,
            user = %identity.display_name,
            "tracker connection verified"
        );
        Ok(identity)
    }

    pub async fn list_projects(&self, creds: &TrackerCredentials) -> Result<Vec<TrackerProject>> {
        Ok(self.tracker.list_projects(creds).await?)
    }

    /// Upload a snapshot of a session's plan.
    pub async fn upload(
        &self,
        record: &SessionRecord,
        creds: &TrackerCredentials,
    ) -> Result<UploadReport> {
        let plan = &record.plan;
        if plan.is_empty() {
            return Err(PlannerError::PreconditionFailed(
                "Session has no epics to upload".to_string(),
            ));
        }

        tracing::info!(
            session_id = %record.session.id,
            project = %creds.project_key,
            "starting tracker upload"
        );
        let mut walk = Walk {
            tracker: self.tracker.as_ref(),
            creds,
            report: UploadReport::default(),
            halted: false,
        };

        // Epics
        let mut epic_keys: HashMap<&str, String> = HashMap::new();
        for epic in plan.epics() {
            let fields = epic_fields(record, epic);
            if let Some(key) = walk
                .create(IssueKind::Epic, &epic.id, &epic.title, &fields, None)
                .await
            {
                epic_keys.insert(epic.id.as_str(), key);
            }
            if walk.halted {
                return Ok(walk.finish());
            }
        }

        for epic in plan.epics().filter(|e| !epic_keys.contains_key(e.id.as_str())) {
            let below = plan.rollup(RollupScope::Epic(&epic.id)).unwrap_or_default();
            if below.stories > 0 {
                walk.skip(format!(
                    "Skipped {} stories and {} sub-tasks of epic '{}' ({}): parent issue was not created",
                    below.stories, below.tasks, epic.title, epic.id
                ));
            }
        }

        // Stories
        let paths = plan.flatten_stories();
        let mut story_keys: HashMap<&str, String> = HashMap::new();
        for path in &paths {
            let Some(epic_key) = epic_keys.get(path.epic.id.as_str()) else {
                continue;
            };
            let fields = story_fields(path);
            if let Some(key) = walk
                .create(
                    IssueKind::Story,
                    &path.story.id,
                    &fields.summary,
                    &fields,
                    Some(epic_key.as_str()),
                )
                .await
            {
                story_keys.insert(path.story.id.as_str(), key);
            }
            if walk.halted {
                return Ok(walk.finish());
            }
        }

        // Sub-tasks
        for path in &paths {
            let story = path.story;
            let tasks: Vec<&Task> = plan.tasks_of(story).collect();
            let Some(story_key) = story_keys.get(story.id.as_str()) else {
                // Stories under a failed epic were already accounted for.
                if epic_keys.contains_key(path.epic.id.as_str()) && !tasks.is_empty() {
                    walk.skip(format!(
                        "Skipped {} sub-tasks of story '{}' ({}): parent issue was not created",
                        tasks.len(),
                        story.title,
                        story.id
                    ));
                }
                continue;
            };
            for task in tasks {
                let fields = task_fields(task);
                walk.create(IssueKind::Subtask, &task.id, &task.title, &fields, Some(story_key.as_str()))
                    .await;
                if walk.halted {
                    return Ok(walk.finish());
                }
            }
        }

        let report = walk.finish();
        tracing::info!(
            session_id = %record.session.id,
            epics = report.summary.epics,
            stories = report.summary.stories,
            subtasks = report.summary.subtasks,
            errors = report.errors.len(),
            "tracker upload finished"
        );
        Ok(report)
    }
}

/// Mutable state of one upload.
struct Walk<'a> {
    tracker: &'a dyn TrackerBackend,
    creds: &'a TrackerCredentials,
    report: UploadReport,
    halted: bool,
}

impl Walk<'_> {
    /// Create one issue, returning its key. Failures are recorded; a fatal
    /// failure also halts the walk.
    async fn create(
        &mut self,
        kind: IssueKind,
        local_id: &str,
        title: &str,
        fields: &IssueFields,
        parent: Option<&str>,
    ) -> Option<String> {
        match self
            .tracker
            .create_issue(self.creds, kind, fields, parent)
            .await
        {
            Ok(issue) => {
                tracing::debug!(kind = kind.as_str(), local_id, key = %issue.key, "created issue");
                self.report.created.push(CreatedIssue {
                    kind,
                    local_id: local_id.to_string(),
                    key: issue.key.clone(),
                    title: title.to_string(),
                });
                Some(issue.key)
            }
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), local_id, "issue creation failed: {}", e);
                self.report.errors.push(format!(
                    "Failed to create {} '{}' ({}): {}",
                    kind.as_str(),
                    title,
                    local_id,
                    e
                ));
                if e.is_fatal() {
                    self.report
                        .errors
                        .push("Upload stopped: tracker rejected the credentials or project".to_string());
                    self.halted = true;
                }
                None
            }
        }
    }

    fn skip(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.report.errors.push(message);
    }

    fn finish(mut self) -> UploadReport {
        let count = |kind| {
            self.report
                .created
                .iter()
                .filter(|issue| issue.kind == kind)
                .count()
        };
        let summary = UploadSummary {
            epics: count(IssueKind::Epic),
            stories: count(IssueKind::Story),
            subtasks: count(IssueKind::Subtask),
        };
        self.report.summary = summary;
        self.report.success = self.report.errors.is_empty();
        self.report
    }
}

fn epic_fields(record: &SessionRecord, epic: &Epic) -> IssueFields {
    let mut description = vec![
        DescriptionBlock::Paragraph(format!("Epic: {}", epic.title)),
        DescriptionBlock::Paragraph(format!("Objective: {}", record.session.objective.text)),
    ];
    if let Some(kr) = record.selected_key_result() {
        description.push(DescriptionBlock::Paragraph(format!("Key result: {}", kr.text)));
    }
    description.push(DescriptionBlock::Paragraph(format!(
        "Features: {}",
        epic.feature_ids.len()
    )));
    IssueFields {
        summary: epic.title.clone(),
        description,
        hours: None,
    }
}

fn story_fields(path: &StoryPath<'_>) -> IssueFields {
    let StoryPath { feature, story, .. } = *path;
    let mut description = vec![
        DescriptionBlock::Paragraph(format!("Feature: {}", feature.title)),
        DescriptionBlock::Paragraph(feature.description.clone()),
        DescriptionBlock::Paragraph(story.title.clone()),
    ];
    if !story.acceptance_criteria.is_empty() {
        description.push(DescriptionBlock::Strong("Acceptance Criteria:".to_string()));
        description.push(DescriptionBlock::Bullets(story.acceptance_criteria.clone()));
    }
    description.push(DescriptionBlock::Strong(format!(
        "Story Points: {}",
        story.story_points.value()
    )));
    IssueFields {
        summary: format!("{}: {}", feature.title, story.title),
        description,
        hours: None,
    }
}

fn task_fields(task: &Task) -> IssueFields {
    IssueFields {
        summary: task.title.clone(),
        description: vec![
            DescriptionBlock::Paragraph(format!("Development task: {}", task.title)),
            DescriptionBlock::Paragraph(format!("Estimated effort: {} hours", task.hours)),
        ],
        hours: Some(task.hours),
    }
}

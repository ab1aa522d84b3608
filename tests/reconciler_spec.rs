use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use okr_planner::error::PlannerError;
use okr_planner::models::*;
use okr_planner::store::{SessionRecord, SessionStore};
use okr_planner::tracker::{
    IssueFields, IssueKind, IssueRef, Reconciler, TrackerBackend, TrackerCredentials,
    TrackerError, TrackerIdentity, TrackerProject, UploadReport,
};

#[derive(Debug, Clone, Copy)]
enum Outage {
    None,
    /// Only the nth creation of this kind fails (1-based).
    Once(IssueKind, usize),
    /// Every creation of this kind from the nth on fails.
    From(IssueKind, usize),
    /// The nth creation of this kind is refused as unauthorized.
    Auth(IssueKind, usize),
}

#[derive(Debug, Clone)]
struct Call {
    kind: IssueKind,
    summary: String,
    parent: Option<String>,
}

struct FakeTracker {
    outage: Outage,
    calls: Mutex<Vec<Call>>,
    next_key: Mutex<usize>,
}

impl FakeTracker {
    fn new(outage: Outage) -> Self {
        Self {
            outage,
            calls: Mutex::new(Vec::new()),
            next_key: Mutex::new(100),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackerBackend for FakeTracker {
    async fn test_connection(
        &self,
        creds: &TrackerCredentials,
    ) -> Result<TrackerIdentity, TrackerError> {
        Ok(TrackerIdentity {
            display_name: "Pat Manager".to_string(),
            email: Some(creds.email.clone()),
            project_key: creds.project_key.clone(),
            project_name: "OKR Board".to_string(),
        })
    }

    async fn list_projects(
        &self,
        _creds: &TrackerCredentials,
    ) -> Result<Vec<TrackerProject>, TrackerError> {
        Ok(vec![TrackerProject {
            id: "10000".to_string(),
            key: "OKR".to_string(),
            name: "OKR Board".to_string(),
        }])
    }

    async fn create_issue(
        &self,
        _creds: &TrackerCredentials,
        kind: IssueKind,
        fields: &IssueFields,
        parent: Option<&str>,
    ) -> Result<IssueRef, TrackerError> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                kind,
                summary: fields.summary.clone(),
                parent: parent.map(str::to_string),
            });
            calls.iter().filter(|c| c.kind == kind).count()
        };

        match self.outage {
            Outage::Once(k, n) if k == kind && n == nth => {
                return Err(TrackerError::Rejected {
                    status: 400,
                    message: "summary is required".to_string(),
                })
            }
            Outage::From(k, n) if k == kind && nth >= n => {
                return Err(TrackerError::Rejected {
                    status: 503,
                    message: "service unavailable".to_string(),
                })
            }
            Outage::Auth(k, n) if k == kind && n == nth => {
                return Err(TrackerError::Auth("token revoked".to_string()))
            }
            _ => {}
        }

        let mut next = self.next_key.lock().unwrap();
        *next += 1;
        Ok(IssueRef {
            key: format!("OKR-{}", *next),
        })
    }
}

fn creds() -> TrackerCredentials {
    TrackerCredentials {
        base_url: "https://acme.atlassian.net".to_string(),
        email: "pm@acme.test".to_string(),
        api_token: "s3cret".to_string(),
        project_key: "OKR".to_string(),
    }
}

fn epic(title: &str, features: &[&str]) -> EpicInput {
    EpicInput {
        title: title.to_string(),
        features: features
            .iter()
            .map(|f| FeatureInput {
                title: f.to_string(),
                description: None,
            })
            .collect(),
    }
}

/// One epic per entry; the first feature of the first epic gets three
/// stories with one task each.
fn record_with(epics: Vec<EpicInput>) -> SessionRecord {
    let store = SessionStore::new();
    let session = store.create("Increase retention 20%").unwrap();
    let mut record = store.snapshot(session.id).unwrap();

    let krs = record.replace_key_results(vec![KeyResultInput {
        text: "Raise D30 retention".to_string(),
        metric: Some("D30 retention".to_string()),
        baseline: Some("40%".to_string()),
        target: Some("48%".to_string()),
        rationale: None,
    }]);
    record.select_key_result(&krs[0].id, epics).unwrap();

    let feature = record.plan.features().next().unwrap().id.clone();
    let stories = record
        .plan
        .replace_stories(
            &feature,
            (1..=3)
                .map(|i| StoryInput {
                    title: format!("Story {}", i),
                    acceptance_criteria: vec!["GIVEN x, WHEN y, THEN z".to_string()],
                    story_points: Some(3.0),
                })
                .collect(),
        )
        .unwrap();
    for story in &stories {
        record
            .plan
            .replace_tasks(
                &story.id,
                vec![TaskInput {
                    title: format!("Build {}", story.title),
                    hours: Some(4.0),
                }],
            )
            .unwrap();
    }
    record
}

fn simple_record() -> SessionRecord {
    record_with(vec![epic("Onboarding", &["Welcome tour"])])
}

async fn upload(outage: Outage, record: &SessionRecord) -> (UploadReport, Arc<FakeTracker>) {
    let tracker = Arc::new(FakeTracker::new(outage));
    let reconciler = Reconciler::new(tracker.clone());
    let report = reconciler.upload(record, &creds()).await.unwrap();
    (report, tracker)
}

mod uploads {
    use super::*;

    #[tokio::test]
    async fn test_creates_epics_then_stories_then_subtasks() {
        let (report, tracker) = upload(Outage::None, &simple_record()).await;

        assert!(report.success);
        assert!(report.errors.is_empty());
        assert_eq!(report.summary.epics, 1);
        assert_eq!(report.summary.stories, 3);
        assert_eq!(report.summary.subtasks, 3);

        let calls = tracker.calls();
        let kinds: Vec<IssueKind> = calls.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::Epic,
                IssueKind::Story,
                IssueKind::Story,
                IssueKind::Story,
                IssueKind::Subtask,
                IssueKind::Subtask,
                IssueKind::Subtask,
            ]
        );
        assert_eq!(calls[1].summary, "Welcome tour: Story 1");
        assert_eq!(calls[1].parent.as_deref(), Some("OKR-101"));
        assert_eq!(calls[4].parent.as_deref(), Some("OKR-102"));
        assert!(calls[0].parent.is_none());
    }

    #[tokio::test]
    async fn test_created_issues_point_back_to_plan_nodes() {
        let record = simple_record();
        let (report, _) = upload(Outage::None, &record).await;

        for issue in &report.created {
            assert!(record.plan.contains_id(&issue.local_id));
        }
        assert_eq!(report.created[0].title, "Onboarding");
        assert_eq!(report.created[0].key, "OKR-101");
    }

    #[tokio::test]
    async fn test_single_story_failure_lets_siblings_continue() {
        let (report, tracker) = upload(Outage::Once(IssueKind::Story, 2), &simple_record()).await;

        assert!(!report.success);
        assert_eq!(report.summary.epics, 1);
        assert_eq!(report.summary.stories, 2);
        assert_eq!(report.summary.subtasks, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("Failed to create story 'Welcome tour: Story 2'"));
        assert!(report.errors[0].contains("(400)"));
        assert!(report.errors[1].starts_with("Skipped 1 sub-tasks of story 'Story 2'"));

        // The failed story's task was never attempted.
        let attempted = tracker
            .calls()
            .iter()
            .filter(|c| c.kind == IssueKind::Subtask)
            .count();
        assert_eq!(attempted, 2);
    }

    #[tokio::test]
    async fn test_outage_from_second_story_keeps_the_first() {
        let (report, _) = upload(Outage::From(IssueKind::Story, 2), &simple_record()).await;

        assert!(!report.success);
        assert_eq!(report.summary.epics, 1);
        assert_eq!(report.summary.stories, 1);
        assert_eq!(report.summary.subtasks, 1);
        let failures = report
            .errors
            .iter()
            .filter(|e| e.starts_with("Failed to create story"))
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_failed_epic_skips_its_subtree_once() {
        let record = record_with(vec![
            epic("Onboarding", &["Welcome tour"]),
            epic("Engagement", &["Streaks"]),
        ]);
        let (report, tracker) = upload(Outage::Once(IssueKind::Epic, 1), &record).await;

        assert_eq!(report.summary.epics, 1);
        assert_eq!(report.summary.stories, 0);
        assert_eq!(report.summary.subtasks, 0);
        assert_eq!(
            report.errors.len(),
            2,
            "one failure and one skip: {:?}",
            report.errors
        );
        assert!(report.errors[1].starts_with("Skipped 3 stories and 3 sub-tasks of epic 'Onboarding'"));
        assert_eq!(tracker.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_the_walk() {
        let (report, tracker) = upload(Outage::Auth(IssueKind::Story, 2), &simple_record()).await;

        assert!(!report.success);
        assert_eq!(report.summary.stories, 1);
        assert_eq!(report.summary.subtasks, 0);
        assert!(report.errors.last().unwrap().starts_with("Upload stopped"));
        assert_eq!(tracker.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_plan_is_a_precondition_failure() {
        let store = SessionStore::new();
        let session = store.create("Increase retention 20%").unwrap();
        let record = store.snapshot(session.id).unwrap();

        let tracker = Arc::new(FakeTracker::new(Outage::None));
        let err = Reconciler::new(tracker.clone())
            .upload(&record, &creds())
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::PreconditionFailed(_)));
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rerunning_creates_everything_again() {
        let record = simple_record();
        let tracker = Arc::new(FakeTracker::new(Outage::None));
        let reconciler = Reconciler::new(tracker.clone());

        let first = reconciler.upload(&record, &creds()).await.unwrap();
        let second = reconciler.upload(&record, &creds()).await.unwrap();
        assert_eq!(first.summary, second.summary);
        assert_ne!(first.created[0].key, second.created[0].key);
        assert_eq!(tracker.calls().len(), 14);
    }
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn test_reports_identity_and_projects() {
        let reconciler = Reconciler::new(Arc::new(FakeTracker::new(Outage::None)));

        let identity = reconciler.test_connection(&creds()).await.unwrap();
        assert_eq!(identity.project_key, "OKR");
        assert_eq!(identity.display_name, "Pat Manager");

        let projects = reconciler.list_projects(&creds()).await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].key, "OKR");
    }
}

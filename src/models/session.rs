use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::objective::{KeyResult, Objective};
use super::plan::EpicNode;
use super::rollup::Rollup;

/// A planning session: one objective and the work breakdown grown from it.
///
/// The session id is an opaque token handed to clients. Everything else a
/// session owns (candidates, selection, plan) lives in the session store's
/// record and is only reachable through the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub objective: Objective,
    pub created_at: DateTime<Utc>,
}

/// Where a session is in the generation pipeline.
///
/// Derived from the session's data rather than stored, so it can never
/// disagree with the tree:
///
/// - `ObjectiveSet`: created, no key results yet
/// - `KeyResultsSuggested`: candidates exist, none selected
/// - `EpicsGenerated`: a key result is selected and its epics exist
/// - `StoriesGenerated`: at least one feature has stories
/// - `TasksGenerated`: at least one story has tasks
///
/// `Empty` is the state before a session exists; it is never observed on a
/// stored session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    ObjectiveSet,
    KeyResultsSuggested,
    EpicsGenerated,
    StoriesGenerated,
    TasksGenerated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::ObjectiveSet => "objective_set",
            Self::KeyResultsSuggested => "key_results_suggested",
            Self::EpicsGenerated => "epics_generated",
            Self::StoriesGenerated => "stories_generated",
            Self::TasksGenerated => "tasks_generated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the generation pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SuggestKeyResults,
    GenerateEpics,
    GenerateStories,
    GenerateTasks,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuggestKeyResults => "suggest_key_results",
            Self::GenerateEpics => "generate_epics",
            Self::GenerateStories => "generate_stories",
            Self::GenerateTasks => "generate_tasks",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionInput {
    pub objective: String,
}

/// Input for generating epics from one of the suggested key results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectKeyResultInput {
    pub key_result_id: String,
}

/// Result of one pipeline stage: the state the session ended in plus the
/// children the stage produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome<T> {
    pub session_id: Uuid,
    pub stage: Stage,
    pub state: SessionState,
    pub items: Vec<T>,
}

/// Full read model of a session, used by `GET /sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub state: SessionState,
    pub key_results: Vec<KeyResult>,
    pub selected_key_result_id: Option<String>,
    pub epics: Vec<EpicNode>,
    pub summary: Rollup,
}

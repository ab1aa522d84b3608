//! The staged generation pipeline.
//!
//! Every stage follows the same shape:
//!
//! 1. take an operation token for the parent and snapshot the context the
//!    backend needs (under the session lock)
//! 2. call the reasoning backend (no lock held, optionally time-boxed)
//! 3. check the output is usable, converting it into `*Input` values
//! 4. atomically replace the parent's children (under the session lock)
//!
//! Anything that fails before step 4 leaves the session untouched.

mod checks;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use uuid::Uuid;

use crate::error::{PlannerError, Result};
use crate::models::*;
use crate::reasoning::{BackendError, Expansion, ExpansionContext, ParentKind, ReasoningBackend};
use crate::store::{ParentKey, SessionRecord, SessionStore};

/// How far `autoplan` breaks the plan down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum Depth {
    Epics,
    Stories,
    Tasks,
}

#[derive(Clone)]
pub struct Pipeline {
    store: SessionStore,
    backend: Arc<dyn ReasoningBackend>,
    stage_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(store: SessionStore, backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            store,
            backend,
            stage_timeout: None,
        }
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn create_session(&self, objective: &str) -> Result<SessionView> {
        let session = self.store.create(objective)?;
        tracing::info!(session_id = %session.id, "created session");
        self.store.read(session.id, SessionRecord::view)
    }

    pub async fn suggest_key_results(&self, session_id: Uuid) -> Result<StageOutcome<KeyResult>> {
        let stage = Stage::SuggestKeyResults;
        let (token, objective) = self.store.begin(session_id, ParentKey::KeyResults, |record| {
            Ok(record.session.objective.text.clone())
        })?;
        let parent = token.key.to_string();

        let inputs = self
            .call(stage, &parent, self.backend.suggest(&objective))
            .await?;
        checks::key_results(&inputs).map_err(|reason| generation_failed(stage, &parent, reason))?;

        let (items, state) = self.store.replace_subtree(&token, |record| {
            let items = record.replace_key_results(inputs);
            Ok((items, record.state()))
        })?;

        tracing::info!(%session_id, count = items.len(), "suggested key results");
        Ok(StageOutcome {
            session_id,
            stage,
            state,
            items,
        })
    }

    /// Select a key result and generate its epics and features.
    pub async fn generate_epics(
        &self,
        session_id: Uuid,
        key_result_id: &str,
    ) -> Result<StageOutcome<EpicNode>> {
        let stage = Stage::GenerateEpics;
        let (token, context) = self.store.begin(session_id, ParentKey::Epics, |record| {
            let key_result = record
                .key_result(key_result_id)
                .ok_or_else(|| PlannerError::not_found("Key result", key_result_id))?;
            Ok(ExpansionContext {
                objective: record.session.objective.clone(),
                key_result: Some(key_result.clone()),
                ..ExpansionContext::default()
            })
        })?;

        let expansion = self
            .call(
                stage,
                key_result_id,
                self.backend
                    .expand(&context, ParentKind::KeyResult, key_result_id),
            )
            .await?;
        let epics = match expansion {
            Expansion::Epics(epics) => epics,
            other => return Err(wrong_kind(stage, key_result_id, &other)),
        };
        checks::epics(&epics).map_err(|reason| generation_failed(stage, key_result_id, reason))?;

        let (items, state) = self.store.replace_subtree(&token, |record| {
            let items = record.select_key_result(key_result_id, epics)?;
            Ok((items, record.state()))
        })?;

        tracing::info!(%session_id, key_result_id, count = items.len(), "generated epics");
        Ok(StageOutcome {
            session_id,
            stage,
            state,
            items,
        })
    }

    /// Generate the stories of one feature, replacing any it already has.
    pub async fn generate_stories(
        &self,
        session_id: Uuid,
        feature_id: &str,
    ) -> Result<StageOutcome<StoryNode>> {
        let stage = Stage::GenerateStories;
        let key = ParentKey::Feature(feature_id.to_string());
        let (token, context) = self.store.begin(session_id, key, |record| {
            let feature = record
                .plan
                .feature(feature_id)
                .ok_or_else(|| PlannerError::not_found("Feature", feature_id))?;
            Ok(ExpansionContext {
                objective: record.session.objective.clone(),
                key_result: record.selected_key_result().cloned(),
                epic: record.plan.epic(&feature.epic_id).cloned(),
                feature: Some(feature.clone()),
                story: None,
            })
        })?;

        let expansion = self
            .call(
                stage,
                feature_id,
                self.backend
                    .expand(&context, ParentKind::Feature, feature_id),
            )
            .await?;
        let stories = match expansion {
            Expansion::Stories(stories) => stories,
            other => return Err(wrong_kind(stage, feature_id, &other)),
        };
        checks::stories(&stories).map_err(|reason| generation_failed(stage, feature_id, reason))?;

        let (items, state) = self.store.replace_subtree(&token, |record| {
            let items = record.plan.replace_stories(feature_id, stories)?;
            Ok((items, record.state()))
        })?;

        tracing::info!(%session_id, feature_id, count = items.len(), "generated stories");
        Ok(StageOutcome {
            session_id,
            stage,
            state,
            items,
        })
    }

    /// Generate the tasks of one story, replacing any it already has.
    pub async fn generate_tasks(
        &self,
        session_id: Uuid,
        story_id: &str,
    ) -> Result<StageOutcome<Task>> {
        let stage = Stage::GenerateTasks;
        let key = ParentKey::Story(story_id.to_string());
        let (token, context) = self.store.begin(session_id, key, |record| {
            let story = record
                .plan
                .story(story_id)
                .ok_or_else(|| PlannerError::not_found("Story", story_id))?;
            let feature = record.plan.feature(&story.feature_id);
            Ok(ExpansionContext {
                objective: record.session.objective.clone(),
                key_result: record.selected_key_result().cloned(),
                epic: feature.and_then(|f| record.plan.epic(&f.epic_id)).cloned(),
                feature: feature.cloned(),
                story: Some(story.clone()),
            })
        })?;

        let expansion = self
            .call(
                stage,
                story_id,
                self.backend.expand(&context, ParentKind::Story, story_id),
            )
            .await?;
        let tasks = match expansion {
            Expansion::Tasks(tasks) => tasks,
            other => return Err(wrong_kind(stage, story_id, &other)),
        };
        checks::tasks(&tasks).map_err(|reason| generation_failed(stage, story_id, reason))?;

        let (items, state) = self.store.replace_subtree(&token, |record| {
            let items = record.plan.replace_tasks(story_id, tasks)?;
            Ok((items, record.state()))
        })?;

        tracing::info!(%session_id, story_id, count = items.len(), "generated tasks");
        Ok(StageOutcome {
            session_id,
            stage,
            state,
            items,
        })
    }

    /// Run every stage for a new objective: suggest, select the key result
    /// at `key_result_index` (zero-based), then expand down to `depth`.
    /// Stories for different features, and tasks for different stories,
    /// are generated concurrently.
    pub async fn autoplan(
        &self,
        objective: &str,
        key_result_index: usize,
        depth: Depth,
    ) -> Result<Uuid> {
        let session_id = self.create_session(objective)?.session.id;

        let suggested = self.suggest_key_results(session_id).await?;
        let key_result = suggested.items.get(key_result_index).ok_or_else(|| {
            PlannerError::InvalidInput(format!(
                "Key result #{} requested but only {} were suggested",
                key_result_index + 1,
                suggested.items.len()
            ))
        })?;
        let epics = self.generate_epics(session_id, &key_result.id).await?;

        if depth >= Depth::Stories {
            let feature_ids = epics
                .items
                .iter()
                .flat_map(|epic| epic.features.iter().map(|f| f.id.clone()));
            let stages = feature_ids
                .map(|feature_id| async move { self.generate_stories(session_id, &feature_id).await });
            first_failure(join_all(stages).await)?;
        }

        if depth >= Depth::Tasks {
            let story_ids = self.store.read(session_id, |record| {
                record
                    .plan
                    .stories()
                    .map(|story| story.id.clone())
                    .collect::<Vec<_>>()
            })?;
            let stages = story_ids
                .into_iter()
                .map(|story_id| async move { self.generate_tasks(session_id, &story_id).await });
            first_failure(join_all(stages).await)?;
        }

        Ok(session_id)
    }

    /// Await a backend call, applying the stage timeout and mapping failure
    /// to `GenerationFailed`.
    async fn call<T>(
        &self,
        stage: Stage,
        parent: &str,
        request: impl Future<Output = std::result::Result<T, BackendError>>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = match self.stage_timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(limit)),
            },
            None => request.await,
        };
        tracing::debug!(
            backend = self.backend.name(),
            %stage,
            parent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "backend call finished"
        );

        result.map_err(|e| {
            tracing::warn!(%stage, parent, "backend call failed: {}", e);
            generation_failed(stage, parent, e.to_string())
        })
    }
}

fn first_failure<T>(results: Vec<Result<T>>) -> Result<()> {
    results.into_iter().try_for_each(|result| result.map(drop))
}

fn generation_failed(stage: Stage, parent: &str, reason: impl Into<String>) -> PlannerError {
    PlannerError::GenerationFailed {
        stage,
        parent: parent.to_string(),
        reason: reason.into(),
    }
}

fn wrong_kind(stage: Stage, parent: &str, expansion: &Expansion) -> PlannerError {
    generation_failed(
        stage,
        parent,
        format!(
            "backend returned children of a {} instead",
            expansion.parent_kind()
        ),
    )
}

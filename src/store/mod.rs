//! In-memory session store.
//!
//! Each session's record sits behind its own lock. The outer map lock is
//! only held long enough to find or insert a record, so sessions never
//! contend with each other. Locks are never held across an `.await`.

mod ledger;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

pub use ledger::{OpLedger, OpToken, ParentKey};

use crate::error::{PlannerError, Result};
use crate::models::*;

/// Everything a session owns.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session: Session,
    pub key_results: Vec<KeyResult>,
    pub selected_key_result_id: Option<String>,
    pub plan: PlanTree,
    ledger: OpLedger,
}

impl SessionRecord {
    fn new(session: Session) -> Self {
        Self {
            session,
            key_results: Vec::new(),
            selected_key_result_id: None,
            plan: PlanTree::new(),
            ledger: OpLedger::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.plan.stories().any(|story| !story.task_ids.is_empty()) {
            SessionState::TasksGenerated
        } else if self.plan.features().any(|f| !f.story_ids.is_empty()) {
            SessionState::StoriesGenerated
        } else if self.selected_key_result_id.is_some() {
            SessionState::EpicsGenerated
        } else if !self.key_results.is_empty() {
            SessionState::KeyResultsSuggested
        } else {
            SessionState::ObjectiveSet
        }
    }

    pub fn key_result(&self, id: &str) -> Option<&KeyResult> {
        self.key_results.iter().find(|kr| kr.id == id)
    }

    pub fn selected_key_result(&self) -> Option<&KeyResult> {
        self.selected_key_result_id
            .as_deref()
            .and_then(|id| self.key_result(id))
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session: self.session.clone(),
            state: self.state(),
            key_results: self.key_results.clone(),
            selected_key_result_id: self.selected_key_result_id.clone(),
            epics: self.plan.nodes(),
            summary: self.plan.summary(),
        }
    }

    /// Install a fresh candidate list. The selection and the plan grown
    /// from it no longer refer to anything and are discarded.
    pub fn replace_key_results(&mut self, inputs: Vec<KeyResultInput>) -> Vec<KeyResult> {
        let mut key_results: Vec<KeyResult> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let id = loop {
                let candidate = short_id("kr");
                if !key_results.iter().any(|kr| kr.id == candidate) {
                    break candidate;
                }
            };
            key_results.push(KeyResult {
                id,
                text: input.text.trim().to_string(),
                metric: input.metric,
                baseline: input.baseline,
                target: input.target,
                rationale: input.rationale,
            });
        }

        self.key_results = key_results.clone();
        self.selected_key_result_id = None;
        self.plan = PlanTree::new();
        key_results
    }

    /// Select a key result and install the epics generated for it,
    /// replacing whatever subtree the previous selection had.
    pub fn select_key_result(
        &mut self,
        key_result_id: &str,
        epics: Vec<EpicInput>,
    ) -> Result<Vec<EpicNode>> {
        if self.key_result(key_result_id).is_none() {
            return Err(PlannerError::not_found("Key result", key_result_id));
        }
        self.selected_key_result_id = Some(key_result_id.to_string());
        Ok(self.plan.replace_epics(epics))
    }
}

/// Session id → record.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<RwLock<SessionRecord>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for an objective. The objective is stored trimmed.
    pub fn create(&self, objective: &str) -> Result<Session> {
        let text = objective.trim();
        if text.is_empty() {
            return Err(PlannerError::InvalidInput(
                "Objective must not be empty".to_string(),
            ));
        }

        let session = Session {
            id: Uuid::new_v4(),
            objective: Objective {
                text: text.to_string(),
            },
            created_at: Utc::now(),
        };

        let mut sessions = self.sessions.write().expect("session map lock poisoned");
        sessions.insert(
            session.id,
            Arc::new(RwLock::new(SessionRecord::new(session.clone()))),
        );
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().expect("session map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .contains_key(&id)
    }

    /// Destroy a session and everything it owns.
    pub fn remove(&self, id: Uuid) -> Result<()> {
        self.sessions
            .write()
            .expect("session map lock poisoned")
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PlannerError::not_found("Session", id.to_string()))
    }

    /// Run a read-only closure against a session.
    pub fn read<T>(&self, id: Uuid, f: impl FnOnce(&SessionRecord) -> T) -> Result<T> {
        let slot = self.slot(id)?;
        let record = slot.read().expect("session lock poisoned");
        Ok(f(&*record))
    }

    /// An owned copy of a session, for pure consumers such as the exporter.
    pub fn snapshot(&self, id: Uuid) -> Result<SessionRecord> {
        self.read(id, SessionRecord::clone)
    }

    /// Check a stage's preconditions and take an operation token for the
    /// parent it will replace. `prepare` typically gathers the backend
    /// context; if it fails, no token is issued.
    pub fn begin<T>(
        &self,
        id: Uuid,
        key: ParentKey,
        prepare: impl FnOnce(&SessionRecord) -> Result<T>,
    ) -> Result<(OpToken, T)> {
        let slot = self.slot(id)?;
        let mut record = slot.write().expect("session lock poisoned");
        let prepared = prepare(&*record)?;
        let token = record.ledger.issue(id, key);
        tracing::debug!(session_id = %id, key = %token.key, seq = token.seq, "issued operation token");
        Ok((token, prepared))
    }

    /// Atomically replace the children of the parent named by `token`.
    ///
    /// Refused with [`PlannerError::Superseded`] when a newer call for the
    /// same parent has already been applied. `apply` must either fail
    /// without mutating or succeed completely; concurrent readers observe
    /// the record before or after, never in between.
    pub fn replace_subtree<T>(
        &self,
        token: &OpToken,
        apply: impl FnOnce(&mut SessionRecord) -> Result<T>,
    ) -> Result<T> {
        let slot = self.slot(token.session_id)?;
        let mut record = slot.write().expect("session lock poisoned");

        if record.ledger.is_stale(token) {
            tracing::debug!(
                session_id = %token.session_id,
                key = %token.key,
                seq = token.seq,
                "dropping stale write"
            );
            return Err(PlannerError::Superseded {
                stage: token.key.stage(),
                parent: token.key.to_string(),
            });
        }

        let output = apply(&mut *record)?;
        record.ledger.record(token);
        Ok(output)
    }

    fn slot(&self, id: Uuid) -> Result<Arc<RwLock<SessionRecord>>> {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .get(&id)
            .cloned()
            .ok_or_else(|| PlannerError::not_found("Session", id.to_string()))
    }
}

//! Reasoning backends that generate plan content.
//!
//! The pipeline talks to a [`ReasoningBackend`] through two calls:
//! `suggest` for key result candidates and `expand` for the children of a
//! key result, feature or story. Implementations never see ids they must
//! keep stable; ids are assigned by the pipeline when the output is stored.
//!
//! - [`GeminiBackend`]: HTTP completion endpoint, JSON recovered from text
//! - [`FallbackBackend`]: deterministic offline templates

mod error;
mod fallback;
mod gemini;
pub mod parse;
mod prompts;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

pub use error::BackendError;
pub use fallback::FallbackBackend;
pub use gemini::GeminiBackend;

use crate::config::ReasoningConfig;
use crate::models::*;

/// The kind of node whose children are being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentKind {
    KeyResult,
    Feature,
    Story,
}

impl ParentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyResult => "key result",
            Self::Feature => "feature",
            Self::Story => "story",
        }
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Children generated for one parent.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    Epics(Vec<EpicInput>),
    Stories(Vec<StoryInput>),
    Tasks(Vec<TaskInput>),
}

impl Expansion {
    /// The parent kind this expansion answers.
    pub fn parent_kind(&self) -> ParentKind {
        match self {
            Self::Epics(_) => ParentKind::KeyResult,
            Self::Stories(_) => ParentKind::Feature,
            Self::Tasks(_) => ParentKind::Story,
        }
    }
}

/// What a backend knows about the parent it is expanding.
///
/// Populated from a snapshot of the session taken before the call, so the
/// backend never reads live session state.
#[derive(Debug, Clone, Default)]
pub struct ExpansionContext {
    pub objective: Objective,
    pub key_result: Option<KeyResult>,
    pub epic: Option<Epic>,
    pub feature: Option<Feature>,
    pub story: Option<Story>,
}

#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Suggest key result candidates for an objective.
    async fn suggest(&self, objective: &str) -> Result<Vec<KeyResultInput>, BackendError>;

    /// Generate the children of one parent.
    async fn expand(
        &self,
        context: &ExpansionContext,
        parent_kind: ParentKind,
        parent_id: &str,
    ) -> Result<Expansion, BackendError>;
}

/// Pick the backend for a configuration: Gemini when an API key is set,
/// the offline fallback otherwise.
pub fn create_backend(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningBackend>, BackendError> {
    match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            tracing::info!(url = %config.api_url, "using Gemini reasoning backend");
            Ok(Arc::new(GeminiBackend::from_config(config)?))
        }
        _ => {
            tracing::info!("no reasoning API key configured, using offline fallback backend");
            Ok(Arc::new(FallbackBackend::new()))
        }
    }
}

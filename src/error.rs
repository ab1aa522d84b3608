use thiserror::Error;

use crate::models::Stage;

/// Errors surfaced by the planning core.
///
/// Partial tracker uploads are not represented here: they come back as an
/// [`UploadReport`](crate::tracker::UploadReport) whose `errors` list is
/// non-empty.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Bad or empty arguments. Never retried automatically.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown session, key result, feature or story id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The reasoning backend failed or returned unusable content.
    /// Session state is unchanged and the stage can be retried as-is.
    #[error("Generation failed during {stage} for {parent}: {reason}")]
    GenerationFailed {
        stage: Stage,
        parent: String,
        reason: String,
    },

    /// A newer call for the same parent was applied before this one finished.
    #[error("{stage} for {parent} was superseded by a newer request")]
    Superseded { stage: Stage, parent: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Tracker authentication failed: {0}")]
    AuthFailed(String),

    #[error("Tracker project not found: {0}")]
    ProjectNotFound(String),

    #[error("Tracker network error: {0}")]
    NetworkError(String),
}

impl PlannerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether repeating the exact same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailed { .. } | Self::Superseded { .. } | Self::NetworkError(_)
        )
    }
}

pub type Result<T, E = PlannerError> = std::result::Result<T, E>;

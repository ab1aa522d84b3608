use serde::{Deserialize, Deserializer, Serialize};

use super::lenient::Fields;

/// The top-level qualitative goal a session plans for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Objective {
    pub text: String,
}

/// A measurable target suggested for the objective.
///
/// Candidates are created in bulk and never mutated afterwards. Exactly one
/// of them may be selected to drive epic generation; the rest are kept so a
/// client can go back and pick another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyResult {
    pub id: String,
    pub text: String,
    /// Name of the measured quantity, e.g. "30-day retention".
    pub metric: Option<String>,
    pub baseline: Option<String>,
    pub target: Option<String>,
    pub rationale: Option<String>,
}

impl KeyResult {
    /// Baseline and target are both present and identical.
    pub fn has_flat_target(&self) -> bool {
        match (&self.baseline, &self.target) {
            (Some(baseline), Some(target)) => baseline.trim() == target.trim(),
            _ => false,
        }
    }
}

/// A key result as produced by a reasoning backend, before it gets an id.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct KeyResultInput {
    pub text: String,
    pub metric: Option<String>,
    pub baseline: Option<String>,
    pub target: Option<String>,
    pub rationale: Option<String>,
}

impl<'de> Deserialize<'de> for KeyResultInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::from_deserializer(deserializer)?;
        Ok(Self {
            text: fields.text(&["text", "title", "description"]),
            metric: fields.string(&["metric"]),
            baseline: fields.string(&["baseline"]),
            target: fields.string(&["target"]),
            rationale: fields.string(&["rationale"]),
        })
    }
}

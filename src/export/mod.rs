//! Canonical export of a session.
//!
//! The export is a pure function of the session record. Field order is
//! fixed by the struct definitions, children appear in tree order, and the
//! only timestamp is the session's creation time, so exporting an unchanged
//! session twice yields byte-identical JSON.

mod outline;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use outline::render_outline;

use crate::models::{EpicNode, KeyResult, Objective, Rollup};
use crate::store::SessionRecord;
use crate::validator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub objective: Objective,
    /// The selected key result, if any.
    pub key_result: Option<KeyResult>,
    pub epics: Vec<EpicNode>,
    pub summary: Rollup,
    pub warnings: Vec<String>,
}

pub fn export(record: &SessionRecord) -> ExportDocument {
    ExportDocument {
        session_id: record.session.id,
        created_at: record.session.created_at,
        objective: record.session.objective.clone(),
        key_result: record.selected_key_result().cloned(),
        epics: record.plan.nodes(),
        summary: record.plan.summary(),
        warnings: validator::validate(record),
    }
}

/// Pretty-printed JSON form of [`export`].
pub fn export_json(record: &SessionRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&export(record))
}

//! Operation tokens for stage writes.
//!
//! A stage call takes a token before it talks to the reasoning backend and
//! presents it again when it writes. A write is refused when a newer token
//! for the same parent has already been applied, so the last *issued* call
//! wins rather than the last *response* to arrive.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::models::Stage;

/// The parent whose children a stage replaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentKey {
    /// Key result candidates of the objective.
    KeyResults,
    /// The epic subtree of the selected key result.
    Epics,
    Feature(String),
    Story(String),
}

impl ParentKey {
    pub fn stage(&self) -> Stage {
        match self {
            Self::KeyResults => Stage::SuggestKeyResults,
            Self::Epics => Stage::GenerateEpics,
            Self::Feature(_) => Stage::GenerateStories,
            Self::Story(_) => Stage::GenerateTasks,
        }
    }

    /// Whether replacing `self` invalidates work keyed by `other`.
    fn covers(&self, other: &ParentKey) -> bool {
        match self {
            Self::KeyResults => !matches!(other, Self::KeyResults),
            Self::Epics => matches!(other, Self::Feature(_) | Self::Story(_)),
            Self::Feature(_) | Self::Story(_) => false,
        }
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyResults => f.write_str("objective"),
            Self::Epics => f.write_str("key result selection"),
            Self::Feature(id) => write!(f, "feature {}", id),
            Self::Story(id) => write!(f, "story {}", id),
        }
    }
}

/// Proof that a stage call was started, presented when it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpToken {
    pub session_id: Uuid,
    pub key: ParentKey,
    pub seq: u64,
}

/// Per-session bookkeeping of issued and applied tokens.
#[derive(Debug, Clone, Default)]
pub struct OpLedger {
    next_seq: u64,
    applied: HashMap<ParentKey, u64>,
}

impl OpLedger {
    pub fn issue(&mut self, session_id: Uuid, key: ParentKey) -> OpToken {
        self.next_seq += 1;
        OpToken {
            session_id,
            key,
            seq: self.next_seq,
        }
    }

    /// A newer call for the same parent has already been applied.
    pub fn is_stale(&self, token: &OpToken) -> bool {
        self.applied
            .get(&token.key)
            .is_some_and(|&applied| applied > token.seq)
    }

    /// Mark `token` as applied and forget entries for parents it replaced.
    pub fn record(&mut self, token: &OpToken) {
        self.applied.retain(|key, _| !token.key.covers(key));
        self.applied.insert(token.key.clone(), token.seq);
    }

    pub fn applied_seq(&self, key: &ParentKey) -> Option<u64> {
        self.applied.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_token_is_stale_once_newer_is_applied() {
        let mut ledger = OpLedger::default();
        let session = Uuid::new_v4();
        let key = ParentKey::Feature("feat-1".into());

        let first = ledger.issue(session, key.clone());
        let second = ledger.issue(session, key.clone());
        assert!(!ledger.is_stale(&first));

        ledger.record(&second);
        assert!(ledger.is_stale(&first));
        assert!(!ledger.is_stale(&second));
    }

    #[test]
    fn older_token_applies_if_newer_has_not_landed() {
        let mut ledger = OpLedger::default();
        let session = Uuid::new_v4();
        let key = ParentKey::Story("story-1".into());

        let first = ledger.issue(session, key.clone());
        let _second = ledger.issue(session, key.clone());
        assert!(!ledger.is_stale(&first));
        ledger.record(&first);
        assert_eq!(ledger.applied_seq(&key), Some(first.seq));
    }

    #[test]
    fn tokens_for_different_parents_are_independent() {
        let mut ledger = OpLedger::default();
        let session = Uuid::new_v4();
        let a = ledger.issue(session, ParentKey::Feature("feat-a".into()));
        let b = ledger.issue(session, ParentKey::Feature("feat-b".into()));
        ledger.record(&b);
        assert!(!ledger.is_stale(&a));
    }

    #[test]
    fn replacing_epics_forgets_feature_and_story_entries() {
        let mut ledger = OpLedger::default();
        let session = Uuid::new_v4();
        let feature = ledger.issue(session, ParentKey::Feature("feat-a".into()));
        ledger.record(&feature);
        let epics = ledger.issue(session, ParentKey::Epics);
        ledger.record(&epics);

        assert_eq!(ledger.applied_seq(&ParentKey::Feature("feat-a".into())), None);
        assert_eq!(ledger.applied_seq(&ParentKey::Epics), Some(epics.seq));
    }

    #[test]
    fn new_key_results_forget_everything_below() {
        let mut ledger = OpLedger::default();
        let session = Uuid::new_v4();
        let epics = ledger.issue(session, ParentKey::Epics);
        ledger.record(&epics);
        let krs = ledger.issue(session, ParentKey::KeyResults);
        ledger.record(&krs);

        assert_eq!(ledger.applied_seq(&ParentKey::Epics), None);
        assert_eq!(ledger.applied_seq(&ParentKey::KeyResults), Some(krs.seq));
    }
}

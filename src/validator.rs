//! Completeness warnings for a session's plan.
//!
//! Warnings are advisory only: they never block export or upload.

use crate::store::SessionRecord;

/// Inspect a session and list what is missing or suspicious, in tree order.
pub fn validate(record: &SessionRecord) -> Vec<String> {
    let mut warnings = Vec::new();

    if record.key_results.is_empty() {
        warnings.push("No key results suggested yet.".to_string());
    } else if record.selected_key_result_id.is_none() {
        warnings.push("No key result selected.".to_string());
    }

    for kr in record.key_results.iter().filter(|kr| kr.has_flat_target()) {
        warnings.push(format!(
            "Key result '{}' has identical baseline and target.",
            kr.text
        ));
    }

    let plan = &record.plan;
    if record.selected_key_result_id.is_some() && plan.is_empty() {
        warnings.push("No epics generated yet.".to_string());
    }

    for epic in plan.epics() {
        if epic.feature_ids.is_empty() {
            warnings.push(format!("Epic '{}' has no features.", epic.title));
        }
        for feature in plan.features_of(epic) {
            if feature.story_ids.is_empty() {
                warnings.push(format!("Feature '{}' has no stories.", feature.title));
            }
            for story in plan.stories_of(feature) {
                if story.acceptance_criteria.is_empty() {
                    warnings.push(format!("Story '{}' has no acceptance criteria.", story.title));
                }
                if story.task_ids.is_empty() {
                    warnings.push(format!("Story '{}' has no tasks.", story.title));
                }
            }
        }
    }

    let summary = plan.summary();
    if summary.stories > 0 && summary.total_hours == 0.0 {
        warnings.push("Total estimated hours is zero.".to_string());
    }

    warnings
}

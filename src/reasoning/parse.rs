//! Recovering structured children from model text.
//!
//! Models wrap JSON in prose or markdown fences, rename the top-level key,
//! or return a bare array. Everything here is tolerant of that; anything
//! that still cannot be decoded is an [`BackendError::InvalidResponse`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::BackendError;
use crate::models::{EpicInput, KeyResultInput, StoryInput, TaskInput};

pub fn key_results(text: &str) -> Result<Vec<KeyResultInput>, BackendError> {
    decode_list(text, &["krs", "key_results", "keyResults"])
}

pub fn epics(text: &str) -> Result<Vec<EpicInput>, BackendError> {
    decode_list(text, &["epics"])
}

pub fn stories(text: &str) -> Result<Vec<StoryInput>, BackendError> {
    decode_list(text, &["stories", "user_stories", "userStories"])
}

pub fn tasks(text: &str) -> Result<Vec<TaskInput>, BackendError> {
    decode_list(text, &["tasks"])
}

/// Pull the generated text out of a completion response envelope.
///
/// Understands the Google AI Studio shape
/// (`candidates[0].content.parts[0].text`) and the flat `output` / `text`
/// shapes of generic endpoints.
pub fn response_text(body: &Value) -> Option<String> {
    if let Some(text) = body
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }
    ["output", "text"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Find a JSON document in free-form text.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    let object = outermost(trimmed, '{', '}');
    let array = outermost(trimmed, '[', ']');
    let mut candidates: Vec<(usize, &str)> = object.into_iter().chain(array).collect();
    candidates.sort_by_key(|(start, _)| *start);
    candidates
        .into_iter()
        .find_map(|(_, slice)| serde_json::from_str(slice).ok())
}

fn decode_list<T: DeserializeOwned>(text: &str, keys: &[&str]) -> Result<Vec<T>, BackendError> {
    let value = extract_json(text).ok_or_else(|| {
        BackendError::InvalidResponse(format!("no JSON found in response: {}", preview(text)))
    })?;

    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => {
            if let Some(error) = map.get("error") {
                return Err(BackendError::InvalidResponse(format!(
                    "backend reported an error: {}",
                    error
                )));
            }
            match keys.iter().find_map(|key| map.remove(*key)) {
                Some(list) => list,
                None => {
                    return Err(BackendError::InvalidResponse(format!(
                        "expected one of {:?} in response",
                        keys
                    )))
                }
            }
        }
        other => {
            return Err(BackendError::InvalidResponse(format!(
                "expected an object or array, got {}",
                preview(&other.to_string())
            )))
        }
    };

    Ok(serde_json::from_value(list)?)
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip an optional language tag on the opening fence.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn outermost(text: &str, open: char, close: char) -> Option<(usize, &str)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| (start, &text[start..=end]))
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(120).collect();
    if text.chars().count() > 120 {
        short.push('…');
    }
    short
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_plain_json() {
        let krs = key_results(r#"{"krs":[{"text":"Lift retention","metric":"D30","baseline":"40%","target":"48%"}]}"#)
            .unwrap();
        assert_eq!(krs.len(), 1);
        assert_eq!(krs[0].text, "Lift retention");
        assert_eq!(krs[0].target.as_deref(), Some("48%"));
    }

    #[test]
    fn decodes_fenced_json_with_renamed_key() {
        let text = "Here you go:\n```json\n{\"key_results\": [{\"text\": \"Cut churn\"}]}\n```\nThanks";
        let krs = key_results(text).unwrap();
        assert_eq!(krs[0].text, "Cut churn");
    }

    #[test]
    fn decodes_bare_array() {
        let tasks = tasks(r#"[{"title":"Write tests","hours":3}]"#).unwrap();
        assert_eq!(tasks[0].hours, Some(3.0));
    }

    #[test]
    fn decodes_object_embedded_in_prose() {
        let text = r#"Sure! {"stories":[{"title":"As a user, I want x","story_points":"5","acceptance_criteria":["GIVEN a, WHEN b, THEN c"]}]} Hope this helps."#;
        let stories = stories(text).unwrap();
        assert_eq!(stories[0].story_points, Some(5.0));
    }

    #[test]
    fn key_result_text_prefers_title_over_description() {
        let krs = key_results(
            r#"{"krs":[{"title":"Lift D30 retention","description":"Raise 30-day retention from 40% to 48% by Q3","metric":"D30 retention","target":"48%"}]}"#,
        )
        .unwrap();
        assert_eq!(krs[0].text, "Lift D30 retention");
        assert_eq!(krs[0].metric.as_deref(), Some("D30 retention"));
    }

    #[test]
    fn task_hours_win_over_estimate() {
        let tasks = tasks(r#"{"tasks":[{"title":"Build","hours":4,"estimate":"6h"}]}"#).unwrap();
        assert_eq!(tasks[0].title, "Build");
        assert_eq!(tasks[0].hours, Some(4.0));

        let tasks = super::tasks(r#"{"tasks":[{"name":"Build","estimate":"6h"}]}"#).unwrap();
        assert_eq!(tasks[0].title, "Build");
        assert_eq!(tasks[0].hours, Some(6.0));
    }

    #[test]
    fn tolerates_every_alias_at_once() {
        let epics = epics(
            r#"{"epics":[{"title":"Onboarding","name":"Onboard","features":[{"title":"Tour","name":"T","description":"Guided tour"}]}]}"#,
        )
        .unwrap();
        assert_eq!(epics[0].title, "Onboarding");
        assert_eq!(epics[0].features[0].title, "Tour");

        let stories = stories(
            r#"{"stories":[{"title":"As a user, I want a tour","story":"tour","story_points":5,"points":8,"acceptance_criteria":"GIVEN a, WHEN b, THEN c"}]}"#,
        )
        .unwrap();
        assert_eq!(stories[0].title, "As a user, I want a tour");
        assert_eq!(stories[0].story_points, Some(5.0));
        assert_eq!(stories[0].acceptance_criteria.len(), 1);
    }

    #[test]
    fn rejects_non_numeric_hours() {
        let err = tasks(r#"{"tasks":[{"title":"Build","hours":"soon"}]}"#).unwrap_err();
        assert!(matches!(err, BackendError::Json(_)));
    }

    #[test]
    fn surfaces_backend_error_objects() {
        let err = epics(r#"{"error": "quota exceeded"}"#).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(msg) if msg.contains("quota")));
    }

    #[test]
    fn rejects_text_without_json() {
        assert!(epics("I cannot help with that.").is_err());
    }

    #[test]
    fn rejects_missing_list_key() {
        let err = tasks(r#"{"items": []}"#).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[test]
    fn reads_google_response_envelope() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "{\"tasks\": []}"}]}}]});
        assert_eq!(response_text(&body).as_deref(), Some("{\"tasks\": []}"));
    }

    #[test]
    fn reads_flat_response_envelope() {
        assert_eq!(response_text(&json!({"output": "hi"})).as_deref(), Some("hi"));
        assert_eq!(response_text(&json!({"text": "yo"})).as_deref(), Some("yo"));
        assert_eq!(response_text(&json!({"other": 1})), None);
    }
}

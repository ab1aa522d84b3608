//! Usability checks on backend output. A failing check becomes a
//! `GenerationFailed` and nothing is written.

use crate::models::{EpicInput, KeyResultInput, StoryInput, TaskInput};

pub fn key_results(inputs: &[KeyResultInput]) -> Result<(), String> {
    non_empty(inputs, "key results")?;
    for (i, kr) in inputs.iter().enumerate() {
        if kr.text.trim().is_empty() {
            return Err(format!("key result #{} has no text", i + 1));
        }
    }
    Ok(())
}

pub fn epics(inputs: &[EpicInput]) -> Result<(), String> {
    non_empty(inputs, "epics")?;
    for (i, epic) in inputs.iter().enumerate() {
        if epic.title.trim().is_empty() {
            return Err(format!("epic #{} has no title", i + 1));
        }
        if epic.features.is_empty() {
            return Err(format!("epic '{}' has no features", epic.title.trim()));
        }
        for (j, feature) in epic.features.iter().enumerate() {
            if feature.title.trim().is_empty() {
                return Err(format!(
                    "feature #{} of epic '{}' has no title",
                    j + 1,
                    epic.title.trim()
                ));
            }
        }
    }
    Ok(())
}

pub fn stories(inputs: &[StoryInput]) -> Result<(), String> {
    non_empty(inputs, "stories")?;
    for (i, story) in inputs.iter().enumerate() {
        if story.title.trim().is_empty() {
            return Err(format!("story #{} has no title", i + 1));
        }
    }
    Ok(())
}

pub fn tasks(inputs: &[TaskInput]) -> Result<(), String> {
    non_empty(inputs, "tasks")?;
    for (i, task) in inputs.iter().enumerate() {
        if task.title.trim().is_empty() {
            return Err(format!("task #{} has no title", i + 1));
        }
        if let Some(hours) = task.hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(format!("task '{}' has invalid hours {}", task.title.trim(), hours));
            }
        }
    }
    Ok(())
}

fn non_empty<T>(items: &[T], what: &str) -> Result<(), String> {
    if items.is_empty() {
        Err(format!("backend returned no {}", what))
    } else {
        Ok(())
    }
}

//! Offline reasoning backend.
//!
//! Produces deterministic, template-based content from the text of the
//! parent being expanded. Used when no API key is configured and in tests.

use async_trait::async_trait;

use super::error::BackendError;
use super::{Expansion, ExpansionContext, ParentKind, ReasoningBackend};
use crate::models::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackBackend;

impl FallbackBackend {
    pub fn new() -> Self {
        Self
    }

    fn epics(objective: &str, key_result: &KeyResult) -> Vec<EpicInput> {
        let words: Vec<&str> = objective.split_whitespace().take(3).collect();
        let lead = words.first().copied().unwrap_or("System");
        let metric = key_result.metric.as_deref().unwrap_or("Metrics");
        let baseline = key_result.baseline.as_deref().unwrap_or("current");
        let target = key_result.target.as_deref().unwrap_or("target");

        vec![
            EpicInput {
                title: format!("Foundation for {}", truncate(&key_result.text, 40)),
                features: vec![
                    feature(
                        format!("Core Infrastructure for {}", words.join(" ")),
                        format!("Build essential infrastructure to support {}", key_result.text),
                    ),
                    feature(
                        format!("User Interface for {}", lead),
                        format!("Create interface elements that make {} visible", metric),
                    ),
                    feature(
                        format!("Data Management for {}", metric),
                        format!(
                            "Collect and process data to measure {} from {} to {}",
                            metric, baseline, target
                        ),
                    ),
                ],
            },
            EpicInput {
                title: format!("Optimization for {}", metric),
                features: vec![
                    feature(
                        format!("Analytics & Reporting for {}", metric),
                        format!("Report progress toward {}", target),
                    ),
                    feature(
                        format!("Automation for {}", words.iter().take(2).copied().collect::<Vec<_>>().join(" ")),
                        format!("Automate processes that contribute to {}", key_result.text),
                    ),
                ],
            },
        ]
    }

    fn stories(feature: &Feature) -> Vec<StoryInput> {
        let subject = feature.title.to_lowercase();
        vec![
            StoryInput {
                title: format!("As a user, I want to use {} so that I reach my goal faster", subject),
                acceptance_criteria: vec![
                    format!("GIVEN {} is enabled, WHEN I open it, THEN I see my current progress", subject),
                    format!("GIVEN I complete an action in {}, WHEN I return, THEN my progress is saved", subject),
                ],
                story_points: Some(5.0),
            },
            StoryInput {
                title: format!("As an administrator, I want to configure {} so that it fits our workflow", subject),
                acceptance_criteria: vec![
                    "GIVEN I have admin rights, WHEN I change a setting, THEN it applies to all users".to_string(),
                    "GIVEN I enter an invalid setting, WHEN I save, THEN I see a validation error".to_string(),
                ],
                story_points: Some(3.0),
            },
            StoryInput {
                title: format!("As a product owner, I want to measure {} usage so that I can track the key result", subject),
                acceptance_criteria: vec![
                    format!("GIVEN users interact with {}, WHEN events occur, THEN they are recorded", subject),
                    "GIVEN recorded events, WHEN I open the report, THEN I see usage over time".to_string(),
                ],
                story_points: Some(8.0),
            },
        ]
    }

    fn tasks() -> Vec<TaskInput> {
        [("Design UI", 4.0), ("Implement backend", 8.0), ("Tests & QA", 3.0)]
            .into_iter()
            .map(|(title, hours)| TaskInput {
                title: title.to_string(),
                hours: Some(hours),
            })
            .collect()
    }
}

#[async_trait]
impl ReasoningBackend for FallbackBackend {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn suggest(&self, objective: &str) -> Result<Vec<KeyResultInput>, BackendError> {
        let kr = |text: String, metric: &str, baseline: &str, target: &str, rationale: &str| {
            KeyResultInput {
                text,
                metric: Some(metric.to_string()),
                baseline: Some(baseline.to_string()),
                target: Some(target.to_string()),
                rationale: Some(rationale.to_string()),
            }
        };

        Ok(vec![
            kr(
                format!("Achieve measurable progress toward: {}", truncate(objective, 50)),
                "Progress %",
                "0%",
                "100%",
                "Direct objective measurement",
            ),
            kr(
                "Improve user engagement metrics".to_string(),
                "User satisfaction",
                "70%",
                "85%",
                "User-focused outcome",
            ),
            kr(
                "Increase operational efficiency".to_string(),
                "Process efficiency",
                "Current",
                "20% improvement",
                "Operational excellence",
            ),
            kr(
                "Enhance quality metrics".to_string(),
                "Quality score",
                "Current",
                "Improved",
                "Quality assurance",
            ),
        ])
    }

    async fn expand(
        &self,
        context: &ExpansionContext,
        parent_kind: ParentKind,
        parent_id: &str,
    ) -> Result<Expansion, BackendError> {
        let missing = || {
            BackendError::InvalidResponse(format!(
                "no {} context supplied for {}",
                parent_kind, parent_id
            ))
        };

        Ok(match parent_kind {
            ParentKind::KeyResult => {
                let key_result = context.key_result.as_ref().ok_or_else(missing)?;
                Expansion::Epics(Self::epics(&context.objective.text, key_result))
            }
            ParentKind::Feature => {
                let feature = context.feature.as_ref().ok_or_else(missing)?;
                Expansion::Stories(Self::stories(feature))
            }
            ParentKind::Story => Expansion::Tasks(Self::tasks()),
        })
    }
}

fn feature(title: String, description: String) -> FeatureInput {
    FeatureInput {
        title,
        description: Some(description),
    }
}

/// Cut to `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max).collect();
    short.push_str("...");
    short
}

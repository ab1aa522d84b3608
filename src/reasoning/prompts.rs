//! Prompt templates for each generation stage.

use crate::models::{Feature, KeyResult, Story};

pub const KEY_RESULTS_MAX_TOKENS: u32 = 600;
pub const EPICS_MAX_TOKENS: u32 = 800;
pub const STORIES_MAX_TOKENS: u32 = 800;
pub const TASKS_MAX_TOKENS: u32 = 600;

pub fn key_results(objective: &str) -> String {
    format!(
        r#"Objective: {objective}
Task: Suggest 4-6 measurable Key Results for this objective. Return JSON in this exact format:
{{"krs":[{{"text":"Key result description","metric":"measurement unit","baseline":"current value","target":"target value","rationale":"why this KR matters"}}]}}

Return only valid JSON, no markdown formatting."#
    )
}

pub fn epics(objective: &str, key_result: &KeyResult) -> String {
    format!(
        r#"Objective: {objective}
Key Result: {text}
Metric: {metric}
Target: {target}

Task: Generate 2-4 Epics and 2-4 Features per Epic that will help achieve this specific Key Result.

Requirements:
- Epics must be directly related to achieving the Key Result above
- Features should be specific capabilities that support the Epic
- Include a title and description for each feature
- Use meaningful titles that relate to the business goal

Return only valid JSON in this exact format:
{{"epics":[{{"title":"Epic Title Here","features":[{{"title":"Feature Title","description":"What this feature does and why it helps achieve the KR"}}]}}]}}

No markdown formatting, just pure JSON."#,
        text = key_result.text,
        metric = key_result.metric.as_deref().unwrap_or(""),
        target = key_result.target.as_deref().unwrap_or(""),
    )
}

pub fn stories(feature: &Feature) -> String {
    format!(
        r#"Feature: {title}
Description: {description}

Task: Create 3-6 user stories in proper format:
- Title format: "As a [Role], I want [Goal] so that [Benefit]"
- Acceptance criteria format: "GIVEN [context], WHEN [action], THEN [outcome]"
- Story points: 1, 2, 3, 5, 8, 13 (Fibonacci sequence)

Return JSON only with this structure:
{{"stories":[{{"title":"As a user, I want to log in so that I can access my account","acceptance_criteria":["GIVEN I am on the login page, WHEN I enter valid credentials, THEN I am redirected to the dashboard"],"story_points":3}}]}}"#,
        title = feature.title,
        description = feature.description,
    )
}

pub fn tasks(story: &Story) -> String {
    format!(
        r#"User Story: {title}
Acceptance Criteria: {criteria}

Task: Break down this user story into 3-7 development tasks with realistic hour estimates.

Consider frontend, backend, testing, documentation and integration work.

Return only valid JSON in this exact format:
{{"tasks":[{{"title":"Create user interface components","hours":6}},{{"title":"Implement backend API endpoints","hours":8}}]}}

No markdown formatting, just pure JSON."#,
        title = story.title,
        criteria = story.acceptance_criteria.join(", "),
    )
}

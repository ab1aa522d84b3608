use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::lenient::Fields;
use crate::error::{PlannerError, Result};

/// A grouping of work that addresses the selected key result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Epic {
    pub id: String,
    pub title: String,
    pub feature_ids: Vec<String>,
}

/// A capability within an epic. Stories are attached by a later stage, so
/// a feature with no stories is a normal intermediate condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feature {
    pub id: String,
    /// Back-reference to the owning epic. Non-owning.
    pub epic_id: String,
    pub title: String,
    pub description: String,
    pub story_ids: Vec<String>,
}

/// A user-facing unit of work with acceptance criteria and a point estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
    pub id: String,
    pub feature_id: String,
    pub title: String,
    pub story_points: StoryPoints,
    /// Conventionally "GIVEN ..., WHEN ..., THEN ...". Not validated.
    pub acceptance_criteria: Vec<String>,
    pub task_ids: Vec<String>,
}

/// The smallest actionable unit, estimated in hours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub story_id: String,
    pub title: String,
    pub hours: f64,
}

/// A story point estimate restricted to the Fibonacci scale 1, 2, 3, 5, 8, 13.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u32", into = "u32")]
pub struct StoryPoints(u8);

impl StoryPoints {
    pub const SCALE: [u8; 6] = [1, 2, 3, 5, 8, 13];

    /// Snap an arbitrary estimate onto the scale. Ties round up.
    pub fn nearest(raw: f64) -> Self {
        if !raw.is_finite() || raw <= 1.0 {
            return Self(1);
        }
        let mut best = Self::SCALE[0];
        for &candidate in &Self::SCALE {
            let distance = (f64::from(candidate) - raw).abs();
            let best_distance = (f64::from(best) - raw).abs();
            if distance <= best_distance {
                best = candidate;
            }
        }
        Self(best)
    }

    pub fn value(&self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u32> for StoryPoints {
    type Error = String;

    fn try_from(value: u32) -> std::result::Result<Self, Self::Error> {
        Self::SCALE
            .iter()
            .find(|&&p| u32::from(p) == value)
            .map(|&p| Self(p))
            .ok_or_else(|| format!("{} is not a Fibonacci story point value", value))
    }
}

impl From<StoryPoints> for u32 {
    fn from(points: StoryPoints) -> Self {
        points.value()
    }
}

// ============================================================
// Backend inputs
// ============================================================

/// An epic and its features as produced by a reasoning backend.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EpicInput {
    pub title: String,
    pub features: Vec<FeatureInput>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FeatureInput {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StoryInput {
    pub title: String,
    pub acceptance_criteria: Vec<String>,
    /// Raw estimate; snapped onto the Fibonacci scale when stored.
    pub story_points: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub hours: Option<f64>,
}

impl<'de> Deserialize<'de> for EpicInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::from_deserializer(deserializer)?;
        Ok(Self {
            title: fields.text(&["title", "name"]),
            features: fields.items(&["features"])?,
        })
    }
}

impl<'de> Deserialize<'de> for FeatureInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::from_deserializer(deserializer)?;
        Ok(Self {
            title: fields.text(&["title", "name"]),
            description: fields.string(&["description"]),
        })
    }
}

impl<'de> Deserialize<'de> for StoryInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::from_deserializer(deserializer)?;
        Ok(Self {
            title: fields.text(&["title", "story"]),
            acceptance_criteria: fields.list(&["acceptance_criteria"]),
            story_points: fields.number(&["story_points", "points"])?,
        })
    }
}

impl<'de> Deserialize<'de> for TaskInput {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Fields::from_deserializer(deserializer)?;
        Ok(Self {
            title: fields.text(&["title", "name"]),
            hours: fields.number(&["hours", "estimate"])?,
        })
    }
}

/// Hours assumed when a backend omits an estimate.
pub const DEFAULT_TASK_HOURS: f64 = 1.0;

// ============================================================
// Nested views
// ============================================================

/// An epic with its features nested, used for API and export responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpicNode {
    pub id: String,
    pub title: String,
    pub features: Vec<FeatureNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureNode {
    pub id: String,
    pub epic_id: String,
    pub title: String,
    pub description: String,
    pub stories: Vec<StoryNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryNode {
    pub id: String,
    pub feature_id: String,
    pub title: String,
    pub story_points: StoryPoints,
    pub acceptance_criteria: Vec<String>,
    pub tasks: Vec<Task>,
}

// ============================================================
// Arena
// ============================================================

/// The epic → feature → story → task tree of one session.
///
/// Nodes live in id-indexed maps and point at their parent by id; ordering
/// is carried by each parent's child-id list. All mutation goes through the
/// `replace_*` methods, which swap out one parent's children wholesale.
#[derive(Debug, Clone, Default)]
pub struct PlanTree {
    epic_order: Vec<String>,
    epics: HashMap<String, Epic>,
    features: HashMap<String, Feature>,
    stories: HashMap<String, Story>,
    tasks: HashMap<String, Task>,
}

impl PlanTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.epic_order.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.epics.contains_key(id)
            || self.features.contains_key(id)
            || self.stories.contains_key(id)
            || self.tasks.contains_key(id)
    }

    pub fn epic(&self, id: &str) -> Option<&Epic> {
        self.epics.get(id)
    }

    pub fn feature(&self, id: &str) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories.get(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Epics in generation order.
    pub fn epics(&self) -> impl Iterator<Item = &Epic> + '_ {
        self.epic_order.iter().filter_map(|id| self.epics.get(id))
    }

    pub fn features_of<'a>(&'a self, epic: &'a Epic) -> impl Iterator<Item = &'a Feature> + 'a {
        epic.feature_ids
            .iter()
            .filter_map(|id| self.features.get(id))
    }

    pub fn stories_of<'a>(&'a self, feature: &'a Feature) -> impl Iterator<Item = &'a Story> + 'a {
        feature
            .story_ids
            .iter()
            .filter_map(|id| self.stories.get(id))
    }

    pub fn tasks_of<'a>(&'a self, story: &'a Story) -> impl Iterator<Item = &'a Task> + 'a {
        story.task_ids.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Every feature in tree order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.epics().flat_map(|epic| self.features_of(epic))
    }

    /// Every story in tree order.
    pub fn stories(&self) -> impl Iterator<Item = &Story> + '_ {
        self.features().flat_map(|feature| self.stories_of(feature))
    }

    /// Replace the whole tree with a fresh set of epics and features.
    /// Everything previously generated (stories and tasks included) is dropped.
    pub fn replace_epics(&mut self, epics: Vec<EpicInput>) -> Vec<EpicNode> {
        *self = Self::default();

        for input in epics {
            let epic_id = self.fresh_id("epic");
            let mut feature_ids = Vec::with_capacity(input.features.len());
            // Reserve the epic id before minting feature ids.
            self.epics.insert(
                epic_id.clone(),
                Epic {
                    id: epic_id.clone(),
                    title: input.title.trim().to_string(),
                    feature_ids: Vec::new(),
                },
            );

            for feature in input.features {
                let feature_id = self.fresh_id("feat");
                self.features.insert(
                    feature_id.clone(),
                    Feature {
                        id: feature_id.clone(),
                        epic_id: epic_id.clone(),
                        title: feature.title.trim().to_string(),
                        description: feature.description.unwrap_or_default().trim().to_string(),
                        story_ids: Vec::new(),
                    },
                );
                feature_ids.push(feature_id);
            }

            if let Some(epic) = self.epics.get_mut(&epic_id) {
                epic.feature_ids = feature_ids;
            }
            self.epic_order.push(epic_id);
        }

        self.nodes()
    }

    /// Replace the stories (and with them, their tasks) of one feature.
    pub fn replace_stories(
        &mut self,
        feature_id: &str,
        stories: Vec<StoryInput>,
    ) -> Result<Vec<StoryNode>> {
        let old = self
            .features
            .get(feature_id)
            .map(|f| f.story_ids.clone())
            .ok_or_else(|| PlannerError::not_found("Feature", feature_id))?;

        for story_id in old {
            self.remove_story(&story_id);
        }

        let mut story_ids = Vec::with_capacity(stories.len());
        for input in stories {
            let id = self.fresh_id("story");
            self.stories.insert(
                id.clone(),
                Story {
                    id: id.clone(),
                    feature_id: feature_id.to_string(),
                    title: input.title.trim().to_string(),
                    story_points: StoryPoints::nearest(input.story_points.unwrap_or(1.0)),
                    acceptance_criteria: input
                        .acceptance_criteria
                        .into_iter()
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
                    task_ids: Vec::new(),
                },
            );
            story_ids.push(id);
        }

        if let Some(feature) = self.features.get_mut(feature_id) {
            feature.story_ids = story_ids.clone();
        }

        Ok(story_ids
            .iter()
            .filter_map(|id| self.stories.get(id))
            .map(|story| self.story_node(story))
            .collect())
    }

    /// Replace the tasks of one story.
    pub fn replace_tasks(&mut self, story_id: &str, tasks: Vec<TaskInput>) -> Result<Vec<Task>> {
        let old = self
            .stories
            .get(story_id)
            .map(|s| s.task_ids.clone())
            .ok_or_else(|| PlannerError::not_found("Story", story_id))?;

        for task_id in old {
            self.tasks.remove(&task_id);
        }

        let mut created = Vec::with_capacity(tasks.len());
        for input in tasks {
            let task = Task {
                id: self.fresh_id("task"),
                story_id: story_id.to_string(),
                title: input.title.trim().to_string(),
                hours: input.hours.unwrap_or(DEFAULT_TASK_HOURS),
            };
            self.tasks.insert(task.id.clone(), task.clone());
            created.push(task);
        }

        if let Some(story) = self.stories.get_mut(story_id) {
            story.task_ids = created.iter().map(|t| t.id.clone()).collect();
        }

        Ok(created)
    }

    /// The whole tree as nested nodes, in order.
    pub fn nodes(&self) -> Vec<EpicNode> {
        self.epics().map(|epic| self.epic_node(epic)).collect()
    }

    pub fn epic_node(&self, epic: &Epic) -> EpicNode {
        EpicNode {
            id: epic.id.clone(),
            title: epic.title.clone(),
            features: self
                .features_of(epic)
                .map(|feature| self.feature_node(feature))
                .collect(),
        }
    }

    pub fn feature_node(&self, feature: &Feature) -> FeatureNode {
        FeatureNode {
            id: feature.id.clone(),
            epic_id: feature.epic_id.clone(),
            title: feature.title.clone(),
            description: feature.description.clone(),
            stories: self
                .stories_of(feature)
                .map(|story| self.story_node(story))
                .collect(),
        }
    }

    pub fn story_node(&self, story: &Story) -> StoryNode {
        StoryNode {
            id: story.id.clone(),
            feature_id: story.feature_id.clone(),
            title: story.title.clone(),
            story_points: story.story_points,
            acceptance_criteria: story.acceptance_criteria.clone(),
            tasks: self.tasks_of(story).cloned().collect(),
        }
    }

    fn remove_story(&mut self, story_id: &str) {
        if let Some(story) = self.stories.remove(story_id) {
            for task_id in story.task_ids {
                self.tasks.remove(&task_id);
            }
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        loop {
            let id = short_id(prefix);
            if !self.contains_id(&id) {
                return id;
            }
        }
    }
}

/// `<prefix>-<8 hex chars>`.
pub fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..8])
}

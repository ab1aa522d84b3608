use serde::{Deserialize, Serialize};

use super::plan::{Epic, Feature, PlanTree, Story};

/// Aggregate counts and effort for a subtree.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Rollup {
    pub epics: usize,
    pub features: usize,
    pub stories: usize,
    pub tasks: usize,
    pub total_hours: f64,
}

/// Which subtree to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupScope<'a> {
    Plan,
    Epic(&'a str),
    Feature(&'a str),
    Story(&'a str),
}

/// A story together with its ancestors.
#[derive(Debug, Clone, Copy)]
pub struct StoryPath<'a> {
    pub epic: &'a Epic,
    pub feature: &'a Feature,
    pub story: &'a Story,
}

impl PlanTree {
    /// Aggregate a subtree. `None` when the scoped node does not exist.
    ///
    /// Recomputed on every call; there is nothing to invalidate.
    pub fn rollup(&self, scope: RollupScope<'_>) -> Option<Rollup> {
        let mut total = Rollup::default();
        match scope {
            RollupScope::Plan => {
                for epic in self.epics() {
                    self.add_epic(epic, &mut total);
                }
            }
            RollupScope::Epic(id) => self.add_epic(self.epic(id)?, &mut total),
            RollupScope::Feature(id) => self.add_feature(self.feature(id)?, &mut total),
            RollupScope::Story(id) => self.add_story(self.story(id)?, &mut total),
        }
        Some(total)
    }

    /// Shorthand for the whole-plan roll-up.
    pub fn summary(&self) -> Rollup {
        self.rollup(RollupScope::Plan).unwrap_or_default()
    }

    /// Every reachable story with its epic and feature, in tree order.
    pub fn flatten_stories(&self) -> Vec<StoryPath<'_>> {
        let mut paths = Vec::new();
        for epic in self.epics() {
            for feature in self.features_of(epic) {
                for story in self.stories_of(feature) {
                    paths.push(StoryPath {
                        epic,
                        feature,
                        story,
                    });
                }
            }
        }
        paths
    }

    fn add_epic(&self, epic: &Epic, total: &mut Rollup) {
        total.epics += 1;
        for feature in self.features_of(epic) {
            self.add_feature(feature, total);
        }
    }

    fn add_feature(&self, feature: &Feature, total: &mut Rollup) {
        total.features += 1;
        for story in self.stories_of(feature) {
            self.add_story(story, total);
        }
    }

    fn add_story(&self, story: &Story, total: &mut Rollup) {
        total.stories += 1;
        for task in self.tasks_of(story) {
            total.tasks += 1;
            total.total_hours += task.hours;
        }
    }
}

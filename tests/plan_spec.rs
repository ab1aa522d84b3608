use okr_planner::models::*;
use okr_planner::store::{SessionRecord, SessionStore};
use okr_planner::validator::validate;
use speculate2::speculate;

fn kr(text: &str, baseline: &str, target: &str) -> KeyResultInput {
    KeyResultInput {
        text: text.to_string(),
        metric: Some("D30 retention".to_string()),
        baseline: Some(baseline.to_string()),
        target: Some(target.to_string()),
        rationale: None,
    }
}

fn epic(title: &str, features: &[&str]) -> EpicInput {
    EpicInput {
        title: title.to_string(),
        features: features
            .iter()
            .map(|f| FeatureInput {
                title: f.to_string(),
                description: Some(format!("{} description", f)),
            })
            .collect(),
    }
}

fn story(title: &str, points: f64) -> StoryInput {
    StoryInput {
        title: title.to_string(),
        acceptance_criteria: vec!["GIVEN a user, WHEN they act, THEN it works".to_string()],
        story_points: Some(points),
    }
}

fn task(title: &str, hours: f64) -> TaskInput {
    TaskInput {
        title: title.to_string(),
        hours: Some(hours),
    }
}

/// Objective → KRs → selected KR with two epics; the first feature gets two
/// stories, each with tasks.
fn grow(record: &mut SessionRecord) {
    let krs = record.replace_key_results(vec![
        kr("Raise D30 retention", "40%", "48%"),
        kr("Cut churn", "5%", "4%"),
    ]);
    record
        .select_key_result(
            &krs[0].id,
            vec![
                epic("Onboarding", &["Welcome tour", "Reminders"]),
                epic("Engagement", &["Streaks"]),
            ],
        )
        .unwrap();

    let tour = record.plan.features().next().unwrap().id.clone();
    let stories = record
        .plan
        .replace_stories(&tour, vec![story("Take the tour", 3.0), story("Skip the tour", 1.0)])
        .unwrap();
    record
        .plan
        .replace_tasks(&stories[0].id, vec![task("Design UI", 4.0), task("Implement backend", 8.0)])
        .unwrap();
    record
        .plan
        .replace_tasks(&stories[1].id, vec![task("Tests & QA", 2.5)])
        .unwrap();
}

speculate! {
    before {
        let store = SessionStore::new();
        let session = store.create("Increase retention 20%").expect("Failed to create session");
        let mut record = store.snapshot(session.id).expect("Failed to snapshot");
    }

    describe "session state" {
        it "is derived from the data" {
            assert_eq!(record.state(), SessionState::ObjectiveSet);

            let krs = record.replace_key_results(vec![kr("Raise D30 retention", "40%", "48%")]);
            assert_eq!(record.state(), SessionState::KeyResultsSuggested);

            record.select_key_result(&krs[0].id, vec![epic("Onboarding", &["Welcome tour"])]).unwrap();
            assert_eq!(record.state(), SessionState::EpicsGenerated);
        }

        it "reaches tasks_generated once a story has tasks" {
            grow(&mut record);
            assert_eq!(record.state(), SessionState::TasksGenerated);
        }

        it "resets the plan when key results are suggested again" {
            grow(&mut record);
            record.replace_key_results(vec![kr("Something else", "1", "2")]);

            assert!(record.selected_key_result_id.is_none());
            assert!(record.plan.is_empty());
            assert_eq!(record.state(), SessionState::KeyResultsSuggested);
        }
    }

    describe "rollup" {
        it "sums hours over the whole plan" {
            grow(&mut record);
            let summary = record.plan.summary();

            assert_eq!(summary.epics, 2);
            assert_eq!(summary.features, 3);
            assert_eq!(summary.stories, 2);
            assert_eq!(summary.tasks, 3);
            assert_eq!(summary.total_hours, 14.5);
        }

        it "matches a manual sum over the flattened stories" {
            grow(&mut record);
            let manual: f64 = record
                .plan
                .flatten_stories()
                .iter()
                .flat_map(|path| record.plan.tasks_of(path.story))
                .map(|t| t.hours)
                .sum();

            assert_eq!(record.plan.summary().total_hours, manual);
        }

        it "scopes to a single subtree" {
            grow(&mut record);
            let engagement = record.plan.epics().nth(1).unwrap().id.clone();
            let scoped = record.plan.rollup(RollupScope::Epic(&engagement)).unwrap();
            assert_eq!(scoped.features, 1);
            assert_eq!(scoped.stories, 0);
            assert_eq!(scoped.total_hours, 0.0);

            let first_story = record.plan.stories().next().unwrap().id.clone();
            let story_scope = record.plan.rollup(RollupScope::Story(&first_story)).unwrap();
            assert_eq!(story_scope.tasks, 2);
            assert_eq!(story_scope.total_hours, 12.0);
        }

        it "returns None for unknown nodes" {
            grow(&mut record);
            assert!(record.plan.rollup(RollupScope::Feature("feat-00000000")).is_none());
        }
    }

    describe "flatten_stories" {
        it "yields every story with its ancestors in tree order" {
            grow(&mut record);
            let paths = record.plan.flatten_stories();

            let titles: Vec<&str> = paths.iter().map(|p| p.story.title.as_str()).collect();
            assert_eq!(titles, vec!["Take the tour", "Skip the tour"]);
            assert!(paths.iter().all(|p| p.epic.title == "Onboarding"));
            assert!(paths.iter().all(|p| p.feature.title == "Welcome tour"));
            assert!(paths.iter().all(|p| p.story.feature_id == p.feature.id));
        }
    }

    describe "validator" {
        it "asks for key results on a fresh session" {
            assert_eq!(validate(&record), vec!["No key results suggested yet.".to_string()]);
        }

        it "asks for a selection once key results exist" {
            record.replace_key_results(vec![kr("Raise D30 retention", "40%", "48%")]);
            assert_eq!(validate(&record), vec!["No key result selected.".to_string()]);
        }

        it "flags key results whose baseline equals the target" {
            record.replace_key_results(vec![kr("Hold steady", "50%", "50%")]);
            let warnings = validate(&record);
            assert!(warnings.contains(&"Key result 'Hold steady' has identical baseline and target.".to_string()));
        }

        it "flags a selection with no epics" {
            let krs = record.replace_key_results(vec![kr("Raise D30 retention", "40%", "48%")]);
            record.select_key_result(&krs[0].id, vec![]).unwrap();
            assert_eq!(validate(&record), vec!["No epics generated yet.".to_string()]);
        }

        it "flags missing stories, criteria and tasks in tree order" {
            let krs = record.replace_key_results(vec![kr("Raise D30 retention", "40%", "48%")]);
            record
                .select_key_result(&krs[0].id, vec![epic("Onboarding", &["Welcome tour", "Reminders"])])
                .unwrap();
            let tour = record.plan.features().next().unwrap().id.clone();
            record
                .plan
                .replace_stories(&tour, vec![StoryInput {
                    title: "Take the tour".to_string(),
                    acceptance_criteria: vec![],
                    story_points: Some(2.0),
                }])
                .unwrap();

            assert_eq!(
                validate(&record),
                vec![
                    "Story 'Take the tour' has no acceptance criteria.".to_string(),
                    "Story 'Take the tour' has no tasks.".to_string(),
                    "Feature 'Reminders' has no stories.".to_string(),
                    "Total estimated hours is zero.".to_string(),
                ]
            );
        }

        it "is quiet about hours once estimates exist" {
            grow(&mut record);
            let warnings = validate(&record);
            assert!(!warnings.iter().any(|w| w.contains("Total estimated hours")));
            assert!(warnings.contains(&"Feature 'Reminders' has no stories.".to_string()));
            assert!(warnings.contains(&"Feature 'Streaks' has no stories.".to_string()));
        }
    }

    describe "export" {
        it "is byte-identical for an unchanged session" {
            grow(&mut record);
            let first = okr_planner::export::export_json(&record).unwrap();
            let second = okr_planner::export::export_json(&record).unwrap();
            assert_eq!(first, second);
        }

        it "carries the selected key result, nested plan, summary and warnings" {
            grow(&mut record);
            let doc = okr_planner::export::export(&record);

            assert_eq!(doc.session_id, session.id);
            assert_eq!(doc.created_at, session.created_at);
            assert_eq!(doc.objective.text, "Increase retention 20%");
            assert_eq!(doc.key_result.as_ref().unwrap().text, "Raise D30 retention");
            assert_eq!(doc.epics.len(), 2);
            let take_the_tour = &doc.epics[0].features[0].stories[0];
            let stored: Vec<Task> = record
                .plan
                .tasks_of(record.plan.story(&take_the_tour.id).unwrap())
                .cloned()
                .collect();
            assert_eq!(take_the_tour.tasks, stored);
            let estimates: Vec<(&str, f64)> = take_the_tour
                .tasks
                .iter()
                .map(|t| (t.title.as_str(), t.hours))
                .collect();
            assert_eq!(estimates, vec![("Design UI", 4.0), ("Implement backend", 8.0)]);
            assert!(take_the_tour.tasks.iter().all(|t| t.story_id == take_the_tour.id));
            assert_eq!(doc.summary, record.plan.summary());
            assert_eq!(doc.warnings, validate(&record));
        }

        it "lists fields in a fixed order" {
            grow(&mut record);
            let json = okr_planner::export::export_json(&record).unwrap();
            let keys = ["\"session_id\"", "\"created_at\"", "\"objective\"", "\"key_result\"", "\"epics\"", "\"summary\"", "\"warnings\""];
            let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }

        it "has a null key result before selection" {
            let doc = okr_planner::export::export(&record);
            assert!(doc.key_result.is_none());
            assert!(doc.epics.is_empty());
        }
    }
}

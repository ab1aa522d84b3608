//! ASCII outline rendering for an exported plan.

use super::ExportDocument;
use crate::models::{EpicNode, FeatureNode, StoryNode};

const EPIC: char = '■';
const FEATURE: char = '▸';
const STORY: char = '•';
const TASK: char = '-';

struct Line {
    symbol: char,
    label: String,
    children: Vec<Line>,
}

/// Render a plan as an ASCII tree.
///
/// Example output:
/// ```text
/// Increase retention 20%
/// Key result: Raise D30 retention (40% → 48%)
/// └── ■ Onboarding
///     ├── ▸ Welcome tour
///     │   └── • As a new user, I want a tour (3 pts)
///     │       ├── - Design UI (4h)
///     │       └── - Tests & QA (3h)
///     └── ▸ Reminders
/// 1 epics, 2 features, 1 stories, 2 tasks, 7h total
/// ```
pub fn render_outline(doc: &ExportDocument) -> String {
    let mut output = String::new();
    output.push_str(&doc.objective.text);
    output.push('\n');

    if let Some(kr) = &doc.key_result {
        output.push_str("Key result: ");
        output.push_str(&kr.text);
        if let (Some(baseline), Some(target)) = (&kr.baseline, &kr.target) {
            output.push_str(&format!(" ({} → {})", baseline, target));
        }
        output.push('\n');
    }

    let epics: Vec<Line> = doc.epics.iter().map(epic_line).collect();
    for (i, line) in epics.iter().enumerate() {
        render_line(&mut output, line, "", i == epics.len() - 1);
    }

    let s = &doc.summary;
    output.push_str(&format!(
        "{} epics, {} features, {} stories, {} tasks, {}h total\n",
        s.epics, s.features, s.stories, s.tasks, s.total_hours
    ));
    output
}

fn epic_line(epic: &EpicNode) -> Line {
    Line {
        symbol: EPIC,
        label: epic.title.clone(),
        children: epic.features.iter().map(feature_line).collect(),
    }
}

fn feature_line(feature: &FeatureNode) -> Line {
    Line {
        symbol: FEATURE,
        label: feature.title.clone(),
        children: feature.stories.iter().map(story_line).collect(),
    }
}

fn story_line(story: &StoryNode) -> Line {
    Line {
        symbol: STORY,
        label: format!("{} ({} pts)", story.title, story.story_points.value()),
        children: story
            .tasks
            .iter()
            .map(|task| Line {
                symbol: TASK,
                label: format!("{} ({}h)", task.title, task.hours),
                children: Vec::new(),
            })
            .collect(),
    }
}

fn render_line(output: &mut String, line: &Line, prefix: &str, is_last: bool) {
    let branch = if is_last { "└── " } else { "├── " };
    output.push_str(prefix);
    output.push_str(branch);
    output.push(line.symbol);
    output.push(' ');
    output.push_str(&line.label);
    output.push('\n');

    let continuation = if is_last { "    " } else { "│   " };
    let child_prefix = format!("{}{}", prefix, continuation);
    for (i, child) in line.children.iter().enumerate() {
        render_line(output, child, &child_prefix, i == line.children.len() - 1);
    }
}

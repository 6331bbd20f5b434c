use crate::adf;
use crate::jira::IssueDetail;
use crate::tree::IssueNode;

/// Seconds to hours in the shortest decimal form: 5400 → "1.5", 3600 → "1".
pub fn format_time(seconds: u64) -> String {
    format!("{}", seconds as f64 / 3600.0)
}

/// One line per visible issue, indented by depth. Children of a collapsed
/// node are skipped; the host editor owns the `expanded` flags.
pub fn render_forest(forest: &[IssueNode]) -> String {
    let mut out = String::new();
    for node in forest {
        render_node(node, 0, &mut out);
    }
    out
}

fn render_node(node: &IssueNode, depth: usize, out: &mut String) {
    let issue = &node.issue;
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&format!(
        "{} [{}] {}",
        issue.key, issue.status, issue.summary
    ));
    if let Some(spent) = issue.time_spent {
        out.push_str(&format!(" ({}h", format_time(spent)));
        if let Some(estimate) = issue.time_estimate {
            out.push_str(&format!("/{}h", format_time(estimate)));
        }
        out.push(')');
    }
    out.push('\n');

    if !node.expanded {
        return;
    }
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

/// Detail-view Markdown for one issue; description and comment bodies go
/// through the structured-document converter.
pub fn render_issue_markdown(detail: &IssueDetail) -> String {
    let issue = &detail.record;
    let assignee = issue
        .assignee
        .clone()
        .unwrap_or_else(|| "Unassigned".to_string());
    let priority = issue.priority.clone().unwrap_or_else(|| "None".to_string());
    let description = adf::to_markdown_value(&detail.description);

    let mut out = String::new();
    out.push_str(&format!("# {} - {}\n\n", issue.key, issue.summary));
    out.push_str(&format!("- Status: {}\n", issue.status));
    out.push_str(&format!("- Type: {}\n", issue.issue_type));
    out.push_str(&format!("- Assignee: {}\n", assignee));
    out.push_str(&format!("- Priority: {}\n", priority));
    if let Some(points) = issue.story_points {
        out.push_str(&format!("- Story points: {}\n", points));
    }
    if let Some(spent) = issue.time_spent {
        out.push_str(&format!("- Time spent: {}h\n", format_time(spent)));
    }
    if let Some(estimate) = issue.time_estimate {
        out.push_str(&format!("- Estimate: {}h\n", format_time(estimate)));
    }
    out.push('\n');

    out.push_str("## Description\n\n");
    if description.trim().is_empty() {
        out.push_str("(no description)\n\n");
    } else {
        out.push_str(description.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Comments\n\n");
    if detail.comments.is_empty() {
        out.push_str("(no comments)\n");
        return out;
    }

    for (idx, comment) in detail.comments.iter().enumerate() {
        let author = comment
            .author_display_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());
        let created = comment
            .created
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());
        let body = adf::to_markdown_value(&comment.body);

        out.push_str(&format!("### Comment {}\n\n", idx + 1));
        out.push_str(&format!("- Author: {}\n", author));
        out.push_str(&format!("- Created: {}\n\n", created));
        if body.trim().is_empty() {
            out.push_str("(empty comment)\n\n");
        } else {
            out.push_str(body.trim());
            out.push_str("\n\n");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::jira::{IssueComment, IssueRecord};
    use crate::tree::build_forest;

    fn record(key: &str, parent: Option<&str>) -> IssueRecord {
        IssueRecord {
            key: key.to_string(),
            summary: format!("summary {key}"),
            status: "To Do".to_string(),
            issue_type: "Task".to_string(),
            parent: parent.map(str::to_string),
            assignee: None,
            priority: None,
            time_spent: None,
            time_estimate: None,
            story_points: None,
        }
    }

    #[test]
    fn formats_seconds_as_hours() {
        assert_eq!(format_time(5400), "1.5");
        assert_eq!(format_time(3600), "1");
        assert_eq!(format_time(0), "0");
    }

    #[test]
    fn renders_forest_with_indentation() {
        let forest = build_forest(vec![
            record("A", None),
            record("B", Some("A")),
            record("C", None),
        ]);

        assert_eq!(
            render_forest(&forest),
            "A [To Do] summary A\n  B [To Do] summary B\nC [To Do] summary C\n"
        );
    }

    #[test]
    fn collapsed_nodes_hide_their_children() {
        let mut forest = build_forest(vec![record("A", None), record("B", Some("A"))]);
        forest[0].expanded = false;

        assert_eq!(render_forest(&forest), "A [To Do] summary A\n");
    }

    #[test]
    fn renders_time_tracking_when_present() {
        let mut issue = record("A", None);
        issue.time_spent = Some(5400);
        issue.time_estimate = Some(7200);

        let forest = build_forest(vec![issue]);
        assert_eq!(render_forest(&forest), "A [To Do] summary A (1.5h/2h)\n");
    }

    #[test]
    fn renders_issue_detail_deterministically() {
        let detail = IssueDetail {
            record: IssueRecord {
                key: "PROJ-123".to_string(),
                summary: "Fix cache invalidation".to_string(),
                status: "In Progress".to_string(),
                issue_type: "Bug".to_string(),
                parent: None,
                assignee: Some("Ada".to_string()),
                priority: Some("High".to_string()),
                time_spent: None,
                time_estimate: None,
                story_points: Some(3.0),
            },
            description: json!({
                "type": "doc",
                "content": [{"type": "paragraph", "content": [{"type": "text", "text": "Line one"}]}]
            }),
            comments: vec![IssueComment {
                author_display_name: Some("Bob".to_string()),
                body: json!({
                    "type": "doc",
                    "content": [{"type": "paragraph", "content": [{"type": "text", "text": "Looks good"}]}]
                }),
                created: Some("2026-08-21T01:00:00.000+0000".to_string()),
            }],
        };

        let expected = "# PROJ-123 - Fix cache invalidation\n\n- Status: In Progress\n- Type: Bug\n- Assignee: Ada\n- Priority: High\n- Story points: 3\n\n## Description\n\nLine one\n\n## Comments\n\n### Comment 1\n\n- Author: Bob\n- Created: 2026-08-21T01:00:00.000+0000\n\nLooks good\n\n";
        assert_eq!(render_issue_markdown(&detail), expected);
    }

    #[test]
    fn renders_missing_fields_consistently() {
        let detail = IssueDetail {
            record: record("PROJ-1", None),
            description: Value::Null,
            comments: vec![],
        };

        let expected = "# PROJ-1 - summary PROJ-1\n\n- Status: To Do\n- Type: Task\n- Assignee: Unassigned\n- Priority: None\n\n## Description\n\n(no description)\n\n## Comments\n\n(no comments)\n";
        assert_eq!(render_issue_markdown(&detail), expected);
    }
}

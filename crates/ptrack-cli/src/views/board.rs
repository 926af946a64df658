//! Timeline board: one column per day, one row per plan line.
//!
//! Each task renders as a header row, its PLANNED row, the ACTUAL rollup,
//! then every other subtask with its steps indented underneath.

use chrono::NaiveDate;
use comfy_table::{Attribute, Cell, ContentArrangement, Row, Table};
use ptrack_core::aggregate::{milestones_on, timeline_window, GroupedTask};
use ptrack_core::models::{Milestone, User};
use ptrack_core::realm_config::{MilestoneTone, RealmConfig};

use crate::util::short_id;
use crate::views::{category_color, hex_color, tone_color};

fn label_cell(labels: &[&str]) -> Cell {
    match labels {
        [] => Cell::new(""),
        [only] => Cell::new(only).fg(tone_color(MilestoneTone::classify(only))),
        many => {
            let tone = MilestoneTone::classify(many[many.len() - 1]);
            Cell::new(many.join("\n")).fg(tone_color(tone))
        }
    }
}

fn milestone_row(head: Cell, milestones: &[Milestone], days: &[NaiveDate]) -> Row {
    let mut row = Row::new();
    row.add_cell(head);
    for day in days {
        let labels: Vec<&str> = milestones_on(milestones, *day)
            .map(|m| m.milestone_text.as_str())
            .collect();
        row.add_cell(label_cell(&labels));
    }
    row
}

fn first_name(user: Option<&User>) -> &str {
    user.and_then(|u| u.full_name.split_whitespace().next())
        .unwrap_or("-")
}

/// Builds the board for `tasks` over `days` consecutive days from `start`.
pub fn board_table(tasks: &[&GroupedTask], config: &RealmConfig, start: NaiveDate, days: u32) -> Table {
    let window = timeline_window(start, days);
    let rows = &config.row_colors;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![Cell::new("Plan")];
    header.extend(window.iter().map(|d| Cell::new(d.format("%m-%d"))));
    table.set_header(header);

    for task in tasks {
        let mut title = Row::new();
        title.add_cell(
            Cell::new(format!("{} {}", short_id(task.task.id), task.task.name))
                .fg(category_color(config, task.task.category))
                .add_attribute(Attribute::Bold),
        );
        for _ in &window {
            title.add_cell(Cell::new(""));
        }
        table.add_row(title);

        if let Some(planned) = task.planned() {
            let head = Cell::new("  PLANNED").fg(hex_color(&rows.planned));
            table.add_row(milestone_row(head, &planned.milestones, &window));
        }

        let by_date = task.actual().by_date();
        let mut actual = Row::new();
        actual.add_cell(Cell::new("  ACTUAL").fg(hex_color(&rows.actual)));
        for day in &window {
            let labels: Vec<&str> = by_date
                .get(day)
                .map(|labels| labels.iter().map(String::as_str).collect())
                .unwrap_or_default();
            actual.add_cell(label_cell(&labels));
        }
        table.add_row(actual);

        for subtask in task.actual_contributors() {
            let head = Cell::new(format!(
                "  {} ({})",
                subtask.subtask.name,
                first_name(subtask.assigned_user.as_ref())
            ))
            .fg(hex_color(&rows.subtask));
            table.add_row(milestone_row(head, &subtask.milestones, &window));

            for step in &subtask.sub_subtasks {
                let head = Cell::new(format!(
                    "    {}. {} ({})",
                    step.sub_subtask.order_index + 1,
                    step.sub_subtask.name,
                    first_name(step.assigned_user.as_ref())
                ))
                .fg(hex_color(&rows.sub_subtask));
                table.add_row(milestone_row(head, &step.milestones, &window));
            }
        }
    }

    table
}

/// Plain-text board, or a notice when nothing matches.
pub fn render_board(tasks: &[&GroupedTask], config: &RealmConfig, start: NaiveDate, days: u32) -> String {
    if tasks.is_empty() {
        return "No tasks found.".to_string();
    }
    board_table(tasks, config, start, days).to_string()
}

/// Legend line naming the milestone tones shown on the board.
pub fn legend() -> String {
    [
        "PLANNED",
        "In progress",
        "Dev Complete",
        "Staging Merge Done",
        "Prod Merge Done",
        "CLOSED",
    ]
    .join(" | ")
}

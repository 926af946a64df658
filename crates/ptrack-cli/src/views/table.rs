use chrono_humanize::Humanize;
use comfy_table::{Attribute, Cell, Color, Row, Table};
use ptrack_core::aggregate::GroupedTask;
use ptrack_core::models::{
    user_name, ActionLogRecord, ActionType, Realm, TaskCategory, TempTaskPriority, TempTaskStatus, User,
};
use ptrack_core::realm_config::{MilestoneOption, MilestoneTone, RealmConfig};
use ptrack_core::temp::{TempTaskPage, TempTaskStats};

use crate::util::short_id;
use crate::views::{category_color, tone_color};

fn priority_cell(priority: i32) -> Cell {
    let cell = Cell::new(priority);
    match priority {
        1 => cell.fg(Color::Red).add_attribute(Attribute::Bold),
        2 => cell.fg(Color::Yellow),
        _ => cell.fg(Color::Green),
    }
}

pub fn display_tasks(tasks: &[&GroupedTask], config: &RealmConfig) {
    if tasks.is_empty() {
        println!("No tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Category", "Priority", "Subtasks", "Latest Actual", "Status"]);

    for task in tasks {
        let mut row = Row::new();
        row.add_cell(Cell::new(short_id(task.task.id)));

        let closed = task.is_closed();
        let mut name_cell = Cell::new(&task.task.name);
        if closed {
            name_cell = name_cell.add_attribute(Attribute::CrossedOut).fg(Color::DarkGrey);
        }
        row.add_cell(name_cell);

        row.add_cell(Cell::new(task.task.category).fg(category_color(config, task.task.category)));
        row.add_cell(priority_cell(task.task.priority));
        row.add_cell(Cell::new(task.actual_contributors().count()));

        let actual = task.actual();
        let latest = actual.iter().max_by_key(|(_, date)| *date);
        row.add_cell(match latest {
            Some((label, date)) => Cell::new(format!("{label} ({date})")).fg(tone_color(MilestoneTone::classify(label))),
            None => Cell::new("None"),
        });

        row.add_cell(if closed {
            Cell::new("Closed").fg(Color::DarkGrey)
        } else {
            Cell::new("Open").fg(Color::Green)
        });
        table.add_row(row);
    }

    println!("{table}");
}

/// Prints one task as an indented tree.
pub fn display_task_detail(task: &GroupedTask, users: &[User]) {
    println!(
        "{} {} [{} | priority {}]{}",
        short_id(task.task.id),
        task.task.name,
        task.task.category,
        task.task.priority,
        if task.is_closed() { " (closed)" } else { "" }
    );
    println!("  created {}", task.task.created_at.humanize());

    for subtask in &task.subtasks {
        println!(
            "  {} {} ({})",
            short_id(subtask.subtask.id),
            subtask.subtask.name,
            user_name(subtask.subtask.assigned_to, users)
        );
        for m in &subtask.milestones {
            println!("      * {} {}", m.milestone_date, m.milestone_text);
        }
        for step in &subtask.sub_subtasks {
            println!(
                "    {}. {} {} ({})",
                step.sub_subtask.order_index + 1,
                short_id(step.sub_subtask.id),
                step.sub_subtask.name,
                user_name(step.sub_subtask.assigned_to, users)
            );
            for m in &step.milestones {
                println!("        * {} {}", m.milestone_date, m.milestone_text);
            }
        }
    }

    let actual = task.actual();
    if !actual.is_empty() {
        println!("  ACTUAL");
        for (label, date) in actual.iter() {
            println!("      * {} {}", date, label);
        }
    }
}

pub fn display_realms(realms: &[Realm]) {
    if realms.is_empty() {
        println!("No realms found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Created"]);
    for realm in realms {
        table.add_row(vec![
            Cell::new(short_id(realm.id)),
            Cell::new(&realm.name),
            Cell::new(realm.created_at.humanize()),
        ]);
    }
    println!("{table}");
}

pub fn display_users(users: &[User]) {
    if users.is_empty() {
        println!("No users found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Email", "Role"]);
    for user in users {
        table.add_row(vec![
            Cell::new(short_id(user.id)),
            Cell::new(&user.full_name),
            Cell::new(&user.email),
            Cell::new(user.role),
        ]);
    }
    println!("{table}");
}

pub fn display_milestone_options(options: &[MilestoneOption]) {
    let mut table = Table::new();
    table.set_header(vec!["#", "Label", "Value", "Kind"]);
    for (index, option) in options.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index),
            Cell::new(&option.label).fg(tone_color(MilestoneTone::classify(&option.label))),
            Cell::new(&option.value),
            Cell::new(if option.is_custom() { "custom" } else { "default" }),
        ]);
    }
    println!("{table}");
}

pub fn display_colors(config: &RealmConfig) {
    let rows = &config.row_colors;
    let mut table = Table::new();
    table.set_header(vec!["Target", "Color", "Opacity"]);
    for (target, hex, opacity) in [
        ("planned", &rows.planned, rows.planned_opacity),
        ("actual", &rows.actual, rows.actual_opacity),
        ("subtask", &rows.subtask, rows.subtask_opacity),
        ("sub-subtask", &rows.sub_subtask, rows.sub_subtask_opacity),
    ] {
        table.add_row(vec![Cell::new(target), Cell::new(hex), Cell::new(opacity)]);
    }
    for category in [TaskCategory::Dev, TaskCategory::Test, TaskCategory::Infra, TaskCategory::Support] {
        table.add_row(vec![
            Cell::new(category).fg(category_color(config, category)),
            Cell::new(config.category_colors.for_category(category)),
            Cell::new(config.category_opacity.for_category(category)),
        ]);
    }
    println!("{table}");
}

fn temp_status_cell(status: TempTaskStatus) -> Cell {
    let cell = Cell::new(status);
    match status {
        TempTaskStatus::Completed | TempTaskStatus::ProjectTaskCreated => cell.fg(Color::Green),
        TempTaskStatus::InProgress => cell.fg(Color::Yellow),
        TempTaskStatus::DePrioritized => cell.fg(Color::DarkGrey),
        TempTaskStatus::Created | TempTaskStatus::Assigned => cell,
    }
}

pub fn display_temp_page(page: &TempTaskPage) {
    if page.items.is_empty() {
        println!("No temporary tasks found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Priority", "Status", "Assignee", "Creator", "Created"]);
    for task in &page.items {
        let priority = Cell::new(task.priority);
        let priority = match task.priority {
            TempTaskPriority::High => priority.fg(Color::Red),
            TempTaskPriority::Medium => priority.fg(Color::Yellow),
            TempTaskPriority::Low => priority.fg(Color::Green),
        };
        table.add_row(vec![
            Cell::new(short_id(task.id)),
            Cell::new(&task.name),
            priority,
            temp_status_cell(task.status),
            Cell::new(if task.assigned_byname.is_empty() { "-" } else { &task.assigned_byname }),
            Cell::new(&task.created_byname),
            Cell::new(task.created_at.humanize()),
        ]);
    }
    println!("{table}");

    if let Some((first, last)) = page.showing() {
        println!(
            "Showing {} to {} of {} (page {} of {})",
            first,
            last,
            page.total,
            page.page,
            page.total_pages()
        );
    }
}

pub fn display_temp_stats(stats: &TempTaskStats) {
    let mut table = Table::new();
    table.set_header(vec!["Total", "Assigned", "In Progress", "Completed"]);
    table.add_row(vec![
        Cell::new(stats.total),
        Cell::new(stats.assigned),
        Cell::new(stats.in_progress),
        Cell::new(stats.completed),
    ]);
    println!("{table}");
}

pub fn display_actions(actions: &[ActionLogRecord]) {
    if actions.is_empty() {
        println!("No actions logged.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["When", "Action", "Entity", "Name", "By"]);
    for action in actions {
        let verb = Cell::new(format!("{:?}", action.action_type));
        let verb = match action.action_type {
            ActionType::Create => verb.fg(Color::Green),
            ActionType::Update => verb.fg(Color::Yellow),
            ActionType::Delete => verb.fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(action.created_at.humanize()),
            verb,
            Cell::new(format!("{:?}", action.entity_type)),
            Cell::new(&action.entity_name),
            Cell::new(&action.performed_by),
        ]);
    }
    println!("{table}");
}

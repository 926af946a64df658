use crate::aggregate::GroupedTask;
use crate::models::TaskCategory;

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Filter(Filter),
    Not(Box<Query>),
    Binary {
        op: Operator,
        left: Box<Query>,
        right: Box<Query>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(&self, actual: i32, expected: i32) -> bool {
        match self {
            Comparison::Eq => actual == expected,
            Comparison::Lt => actual < expected,
            Comparison::Le => actual <= expected,
            Comparison::Gt => actual > expected,
            Comparison::Ge => actual >= expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Category(TaskCategory),
    Priority(Comparison, i32),
    /// Case-insensitive match on the full name or email of any assignee.
    Assignee(String),
    /// Case-insensitive substring of the task name.
    Name(String),
    /// Case-insensitive substring of any milestone label in the tree.
    Milestone(String),
    Closed(bool),
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl Filter {
    pub fn matches(&self, task: &GroupedTask) -> bool {
        match self {
            Filter::Category(category) => task.task.category == *category,
            Filter::Priority(op, value) => op.holds(task.task.priority, *value),
            Filter::Name(needle) => contains_ci(&task.task.name, needle),
            Filter::Assignee(needle) => task
                .subtasks
                .iter()
                .flat_map(|s| {
                    std::iter::once(s.assigned_user.as_ref())
                        .chain(s.sub_subtasks.iter().map(|step| step.assigned_user.as_ref()))
                })
                .flatten()
                .any(|u| contains_ci(&u.full_name, needle) || contains_ci(&u.email, needle)),
            Filter::Milestone(needle) => task
                .subtasks
                .iter()
                .flat_map(|s| s.all_milestones())
                .any(|m| contains_ci(&m.milestone_text, needle)),
            Filter::Closed(closed) => task.is_closed() == *closed,
        }
    }
}

impl Query {
    pub fn matches(&self, task: &GroupedTask) -> bool {
        match self {
            Query::Filter(filter) => filter.matches(task),
            Query::Not(inner) => !inner.matches(task),
            Query::Binary { op, left, right } => match op {
                Operator::And => left.matches(task) && right.matches(task),
                Operator::Or => left.matches(task) || right.matches(task),
            },
        }
    }
}

/// Keeps the tasks matched by `query`, preserving order.
pub fn filter_tasks<'a>(tasks: &'a [GroupedTask], query: Option<&Query>) -> Vec<&'a GroupedTask> {
    tasks
        .iter()
        .filter(|t| query.map_or(true, |q| q.matches(t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::group;
    use crate::models::UserRole;
    use crate::store::fixtures::*;
    use crate::store::RecordStore;
    use uuid::Uuid;

    fn board() -> Vec<GroupedTask> {
        let realm = Uuid::now_v7();
        let mut store = RecordStore::new();
        store.reset(Some(realm));

        let ada = user(realm, "Ada Lovelace", UserRole::Engineer);
        let mut login = task(realm, "Login Flow");
        login.category = TaskCategory::Dev;
        login.priority = 1;
        let mut build = subtask(&login, "Build");
        build.assigned_to = Some(ada.id);
        let closed = subtask_milestone(&build, date(2024, 2, 1), "CLOSED");

        let mut reports = task(realm, "Reports");
        reports.category = TaskCategory::Support;
        reports.priority = 3;
        let planned = subtask(&reports, "PLANNED");
        let spec = subtask_milestone(&planned, date(2024, 3, 1), "Spec Review");

        store.upsert(ada);
        store.upsert(login);
        store.upsert(reports);
        store.upsert(build);
        store.upsert(planned);
        store.upsert(closed);
        store.upsert(spec);
        group(&store)
    }

    fn names(tasks: Vec<&GroupedTask>) -> Vec<String> {
        tasks.into_iter().map(|t| t.task.name.clone()).collect()
    }

    #[test]
    fn test_category_and_priority_filters() {
        let tasks = board();
        let q = Query::Filter(Filter::Category(TaskCategory::Dev));
        assert_eq!(names(filter_tasks(&tasks, Some(&q))), vec!["Login Flow"]);

        let q = Query::Filter(Filter::Priority(Comparison::Ge, 3));
        assert_eq!(names(filter_tasks(&tasks, Some(&q))), vec!["Reports"]);
    }

    #[test]
    fn test_assignee_and_milestone_filters() {
        let tasks = board();
        let q = Query::Filter(Filter::Assignee("ada".to_string()));
        assert_eq!(names(filter_tasks(&tasks, Some(&q))), vec!["Login Flow"]);

        let q = Query::Filter(Filter::Milestone("review".to_string()));
        assert_eq!(names(filter_tasks(&tasks, Some(&q))), vec!["Reports"]);
    }

    #[test]
    fn test_logical_operators() {
        let tasks = board();
        let q = Query::Binary {
            op: Operator::Or,
            left: Box::new(Query::Filter(Filter::Name("login".to_string()))),
            right: Box::new(Query::Filter(Filter::Name("reports".to_string()))),
        };
        assert_eq!(filter_tasks(&tasks, Some(&q)).len(), 2);

        let q = Query::Not(Box::new(Query::Filter(Filter::Closed(true))));
        assert_eq!(names(filter_tasks(&tasks, Some(&q))), vec!["Reports"]);

        assert_eq!(filter_tasks(&tasks, None).len(), 2);
    }
}

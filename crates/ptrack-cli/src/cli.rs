use clap::{Parser, Subcommand, ValueEnum};
use ptrack_core::models::{TaskCategory, TempTaskPriority, TempTaskStatus, UserRole};

/// Realm-scoped project tracker: tasks, subtasks, steps and milestone timelines
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Realm to work in (overrides `realm` from the config)
    #[clap(long, global = true)]
    pub realm: Option<String>,
    /// Email of the acting user (overrides `user_email` from the config)
    #[clap(long = "as", global = true, value_name = "EMAIL")]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create and list realms
    Realm(RealmCommand),
    /// Manage users of the current realm
    User(UserCommand),
    /// Manage tasks
    Task(TaskCommand),
    /// Manage subtasks
    Subtask(SubtaskCommand),
    /// Manage sub-subtasks (ordered steps under a subtask)
    Step(StepCommand),
    /// Add or remove milestones
    Milestone(MilestoneCommand),
    /// Show the task board with its milestone timeline
    Board(BoardCommand),
    /// Re-render the board on every change until interrupted
    Watch(BoardCommand),
    /// Realm configuration: milestone vocabulary and colors
    Config(ConfigCommand),
    /// Temporary tasks
    Temp(TempCommand),
    /// Show the realm's action log
    Log(LogCommand),
}

// ---------------------------------------------------------------------------
// Realms and users
// ---------------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
pub struct RealmCommand {
    #[command(subcommand)]
    pub command: RealmSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RealmSubcommand {
    /// Create a realm together with its first admin
    Create(CreateRealmCommand),
    /// List realms
    List,
}

#[derive(Parser, Debug, Clone)]
pub struct CreateRealmCommand {
    /// The name of the realm
    pub name: String,
    /// Email of the first admin
    #[clap(long)]
    pub admin_email: String,
    /// Full name of the first admin
    #[clap(long)]
    pub admin_name: String,
}

#[derive(Parser, Debug, Clone)]
pub struct UserCommand {
    #[command(subcommand)]
    pub command: UserSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum UserSubcommand {
    /// Add a user to the realm
    Add(AddUserCommand),
    /// List users
    List,
    /// Change a user's name or role
    Edit(EditUserCommand),
    /// Delete a user, clearing their assignments first
    Delete(DeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddUserCommand {
    pub email: String,
    #[clap(long)]
    pub name: String,
    #[clap(long, value_enum, default_value = "engineer")]
    pub role: RoleArg,
}

#[derive(Parser, Debug, Clone)]
pub struct EditUserCommand {
    /// User ID or email
    pub user: String,
    #[clap(long)]
    pub name: Option<String>,
    #[clap(long, value_enum)]
    pub role: Option<RoleArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Admin,
    Lead,
    Engineer,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Admin => UserRole::Admin,
            RoleArg::Lead => UserRole::Lead,
            RoleArg::Engineer => UserRole::Engineer,
        }
    }
}

// ---------------------------------------------------------------------------
// Task hierarchy
// ---------------------------------------------------------------------------

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryArg {
    Dev,
    Test,
    Infra,
    Support,
}

impl From<CategoryArg> for TaskCategory {
    fn from(category: CategoryArg) -> Self {
        match category {
            CategoryArg::Dev => TaskCategory::Dev,
            CategoryArg::Test => TaskCategory::Test,
            CategoryArg::Infra => TaskCategory::Infra,
            CategoryArg::Support => TaskCategory::Support,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct TaskCommand {
    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskSubcommand {
    /// Add a task (its PLANNED row is created with it)
    Add(AddTaskCommand),
    /// List tasks
    List(ListCommand),
    /// Show one task with its subtasks, steps and milestones
    Show(ShowCommand),
    /// Edit a task
    Edit(EditTaskCommand),
    /// Delete a task and everything under it
    Delete(DeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddTaskCommand {
    /// The name of the task
    pub name: String,
    #[clap(short, long, value_enum, default_value = "dev")]
    pub category: CategoryArg,
    /// Priority from 1 (highest) to 3
    #[clap(short, long, default_value_t = 2)]
    pub priority: i32,
}

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// A filter query string (e.g., "category:dev and (assignee:ada or milestone:\"dev complete\")")
    #[clap(default_value = "")]
    pub query: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    /// The ID of the task
    pub id: String,
}

#[derive(Parser, Debug, Clone)]
pub struct EditTaskCommand {
    /// The ID of the task to edit
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, value_enum)]
    pub category: Option<CategoryArg>,
    #[arg(long)]
    pub priority: Option<i32>,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteCommand {
    /// The ID of the row to delete
    pub id: String,
    /// Force deletion without confirmation
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct SubtaskCommand {
    #[command(subcommand)]
    pub command: SubtaskSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubtaskSubcommand {
    /// Add a subtask under a task
    Add(AddSubtaskCommand),
    /// Rename or (un)assign a subtask
    Edit(EditAssignableCommand),
    /// Delete a subtask with its steps and milestones
    Delete(DeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddSubtaskCommand {
    /// The parent task ID
    pub task: String,
    /// The name of the subtask
    pub name: String,
    /// Assignee (user ID or email)
    #[clap(long)]
    pub assign: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct EditAssignableCommand {
    /// The ID of the row to edit
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    /// Assignee (user ID or email)
    #[arg(long)]
    pub assign: Option<String>,
    #[arg(long, conflicts_with = "assign")]
    pub unassign: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct StepCommand {
    #[command(subcommand)]
    pub command: StepSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StepSubcommand {
    /// Add a step at the end of a subtask
    Add(AddStepCommand),
    /// Rename or (un)assign a step
    Edit(EditAssignableCommand),
    /// Delete a step with its milestones
    Delete(DeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddStepCommand {
    /// The parent subtask ID
    pub subtask: String,
    /// The name of the step
    pub name: String,
    /// Assignee (user ID or email)
    #[clap(long)]
    pub assign: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct MilestoneCommand {
    #[command(subcommand)]
    pub command: MilestoneSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MilestoneSubcommand {
    /// Add a milestone to a subtask or a step
    Add(AddMilestoneCommand),
    /// Delete a milestone
    Delete(DeleteCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AddMilestoneCommand {
    /// Subtask or step ID
    pub parent: String,
    /// Milestone label (see `ptrack config milestones`)
    pub label: String,
    /// Date of the milestone (e.g., '2024-01-12', 'next friday')
    #[clap(long)]
    pub on: String,
}

// ---------------------------------------------------------------------------
// Board and watch
// ---------------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
pub struct BoardCommand {
    /// First day of the timeline (defaults to today)
    #[clap(long)]
    pub from: Option<String>,
    /// Number of days shown
    #[clap(long)]
    pub days: Option<u32>,
    /// Optional task filter, same syntax as `task list`
    #[clap(default_value = "")]
    pub query: String,
}

// ---------------------------------------------------------------------------
// Realm configuration
// ---------------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// List milestone options
    Milestones,
    /// Add a custom milestone option
    AddMilestone { label: String },
    /// Rename a custom milestone option (index from `config milestones`)
    RenameMilestone { index: usize, label: String },
    /// Remove a custom milestone option (index from `config milestones`)
    RemoveMilestone { index: usize },
    /// Show row and category colors
    Colors,
    /// Set a row or category color
    SetColor(SetColorCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct SetColorCommand {
    /// planned, actual, subtask, sub-subtask, dev, test, infra or support
    pub target: String,
    /// Hex color, e.g. '#3b82f6'
    pub hex: String,
    /// Opacity between 0 and 1
    #[clap(long)]
    pub opacity: Option<f64>,
}

// ---------------------------------------------------------------------------
// Temporary tasks
// ---------------------------------------------------------------------------

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempPriorityArg {
    Low,
    Medium,
    High,
}

impl From<TempPriorityArg> for TempTaskPriority {
    fn from(priority: TempPriorityArg) -> Self {
        match priority {
            TempPriorityArg::Low => TempTaskPriority::Low,
            TempPriorityArg::Medium => TempTaskPriority::Medium,
            TempPriorityArg::High => TempTaskPriority::High,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempStatusArg {
    Created,
    Assigned,
    InProgress,
    Completed,
    ProjectTaskCreated,
    DePrioritized,
}

impl From<TempStatusArg> for TempTaskStatus {
    fn from(status: TempStatusArg) -> Self {
        match status {
            TempStatusArg::Created => TempTaskStatus::Created,
            TempStatusArg::Assigned => TempTaskStatus::Assigned,
            TempStatusArg::InProgress => TempTaskStatus::InProgress,
            TempStatusArg::Completed => TempTaskStatus::Completed,
            TempStatusArg::ProjectTaskCreated => TempTaskStatus::ProjectTaskCreated,
            TempStatusArg::DePrioritized => TempTaskStatus::DePrioritized,
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct TempCommand {
    #[command(subcommand)]
    pub command: TempSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TempSubcommand {
    /// Add a temporary task
    Add(AddTempCommand),
    /// List one page of temporary tasks
    List(ListTempCommand),
    /// Edit a temporary task
    Edit(EditTempCommand),
    /// Delete a temporary task
    Delete(DeleteCommand),
    /// Totals by status
    Stats,
}

#[derive(Parser, Debug, Clone)]
pub struct AddTempCommand {
    pub name: String,
    #[clap(long, value_enum, default_value = "medium")]
    pub priority: TempPriorityArg,
    /// Assignee (user ID or email)
    #[clap(long)]
    pub assign: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ListTempCommand {
    #[clap(long, default_value_t = 1)]
    pub page: u32,
    /// name, priority, assignee, creator, status or created
    #[clap(long, default_value = "created")]
    pub sort: String,
    /// Sort ascending instead of descending
    #[clap(long)]
    pub asc: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct EditTempCommand {
    pub id: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long, value_enum)]
    pub priority: Option<TempPriorityArg>,
    #[arg(long, value_enum)]
    pub status: Option<TempStatusArg>,
    /// Assignee (user ID or email)
    #[arg(long)]
    pub assign: Option<String>,
    #[arg(long, conflicts_with = "assign")]
    pub unassign: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct LogCommand {
    /// Number of entries to show
    #[clap(long, short, default_value_t = 20)]
    pub limit: i64,
}

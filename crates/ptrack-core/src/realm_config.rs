//! Per-realm configuration documents stored in `app_config`.
//!
//! Each key holds one JSON document. Missing keys fall back to the built-in
//! defaults, so a fresh realm renders exactly like an unconfigured one.

use crate::error::CoreError;
use crate::models::TaskCategory;
use crate::repository::ConfigRepository;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    MilestoneOptions,
    RowColors,
    CategoryColors,
    CategoryOpacity,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::MilestoneOptions,
        ConfigKey::RowColors,
        ConfigKey::CategoryColors,
        ConfigKey::CategoryOpacity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::MilestoneOptions => "milestone_options",
            ConfigKey::RowColors => "row_colors",
            ConfigKey::CategoryColors => "category_colors",
            ConfigKey::CategoryOpacity => "category_opacity",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MilestoneOption {
    pub value: String,
    pub label: String,
}

impl MilestoneOption {
    fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.value.starts_with("custom-")
    }
}

/// The vocabulary every realm starts with. These entries cannot be edited.
pub fn default_milestone_options() -> Vec<MilestoneOption> {
    vec![
        MilestoneOption::new("planned", "PLANNED"),
        MilestoneOption::new("in-progress", "In progress"),
        MilestoneOption::new("closed", "CLOSED"),
        MilestoneOption::new("dev-complete", "Dev Complete"),
        MilestoneOption::new("dev-merge-done", "Dev Merge Done"),
        MilestoneOption::new("staging-merge-done", "Staging Merge Done"),
        MilestoneOption::new("prod-merge-done", "Prod Merge Done"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RowColors {
    pub planned: String,
    pub actual: String,
    pub subtask: String,
    pub sub_subtask: String,
    pub planned_opacity: f64,
    pub actual_opacity: f64,
    pub subtask_opacity: f64,
    pub sub_subtask_opacity: f64,
}

impl Default for RowColors {
    fn default() -> Self {
        Self {
            planned: "#3b82f6".to_string(),
            actual: "#14b8a6".to_string(),
            subtask: "#6366f1".to_string(),
            sub_subtask: "#f59e0b".to_string(),
            planned_opacity: 0.15,
            actual_opacity: 0.15,
            subtask_opacity: 0.12,
            sub_subtask_opacity: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryColors {
    pub dev: String,
    pub test: String,
    pub infra: String,
    pub support: String,
}

impl Default for CategoryColors {
    fn default() -> Self {
        Self {
            dev: "#06b6d4".to_string(),
            test: "#8b5cf6".to_string(),
            infra: "#f59e0b".to_string(),
            support: "#ec4899".to_string(),
        }
    }
}

impl CategoryColors {
    pub fn for_category(&self, category: TaskCategory) -> &str {
        match category {
            TaskCategory::Dev => &self.dev,
            TaskCategory::Test => &self.test,
            TaskCategory::Infra => &self.infra,
            TaskCategory::Support => &self.support,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryOpacity {
    pub dev: f64,
    pub test: f64,
    pub infra: f64,
    pub support: f64,
}

impl Default for CategoryOpacity {
    fn default() -> Self {
        Self {
            dev: 1.0,
            test: 1.0,
            infra: 1.0,
            support: 1.0,
        }
    }
}

impl CategoryOpacity {
    pub fn for_category(&self, category: TaskCategory) -> f64 {
        match category {
            TaskCategory::Dev => self.dev,
            TaskCategory::Test => self.test,
            TaskCategory::Infra => self.infra,
            TaskCategory::Support => self.support,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealmConfig {
    /// Realm-specific milestone options, appended after the defaults.
    pub custom_milestones: Vec<MilestoneOption>,
    pub row_colors: RowColors,
    pub category_colors: CategoryColors,
    pub category_opacity: CategoryOpacity,
}

async fn load_key<T, R>(repo: &R, realm_id: Uuid, key: ConfigKey) -> Result<Option<T>, CoreError>
where
    T: DeserializeOwned,
    R: ConfigRepository + Sync + ?Sized,
{
    match repo.load_config(realm_id, key.as_str()).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

impl RealmConfig {
    pub async fn load<R>(repo: &R, realm_id: Uuid) -> Result<Self, CoreError>
    where
        R: ConfigRepository + Sync + ?Sized,
    {
        Ok(Self {
            custom_milestones: load_key(repo, realm_id, ConfigKey::MilestoneOptions)
                .await?
                .unwrap_or_default(),
            row_colors: load_key(repo, realm_id, ConfigKey::RowColors).await?.unwrap_or_default(),
            category_colors: load_key(repo, realm_id, ConfigKey::CategoryColors)
                .await?
                .unwrap_or_default(),
            category_opacity: load_key(repo, realm_id, ConfigKey::CategoryOpacity)
                .await?
                .unwrap_or_default(),
        })
    }

    /// Writes one key back with an upsert on `(realm_id, config_key)`.
    pub async fn save<R>(&self, repo: &R, realm_id: Uuid, key: ConfigKey) -> Result<(), CoreError>
    where
        R: ConfigRepository + Sync + ?Sized,
    {
        let value = match key {
            ConfigKey::MilestoneOptions => serde_json::to_value(&self.custom_milestones)?,
            ConfigKey::RowColors => serde_json::to_value(&self.row_colors)?,
            ConfigKey::CategoryColors => serde_json::to_value(&self.category_colors)?,
            ConfigKey::CategoryOpacity => serde_json::to_value(&self.category_opacity)?,
        };
        repo.upsert_config(realm_id, key.as_str(), &value).await
    }

    pub async fn save_all<R>(&self, repo: &R, realm_id: Uuid) -> Result<(), CoreError>
    where
        R: ConfigRepository + Sync + ?Sized,
    {
        for key in ConfigKey::ALL {
            self.save(repo, realm_id, key).await?;
        }
        Ok(())
    }

    /// Defaults followed by the realm's custom options.
    pub fn milestone_options(&self) -> Vec<MilestoneOption> {
        let mut options = default_milestone_options();
        options.extend(self.custom_milestones.iter().cloned());
        options
    }

    pub fn add_custom_milestone(&mut self, label: &str) -> Result<MilestoneOption, CoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(CoreError::InvalidInput("Milestone label cannot be empty".to_string()));
        }
        let mut stamp = Utc::now().timestamp_millis();
        while self.custom_milestones.iter().any(|o| o.value == format!("custom-{stamp}")) {
            stamp += 1;
        }
        let option = MilestoneOption::new(&format!("custom-{stamp}"), label);
        self.custom_milestones.push(option.clone());
        Ok(option)
    }

    /// Maps an index into `milestone_options()` onto the custom list.
    fn custom_index(&self, index: usize) -> Result<usize, CoreError> {
        let defaults = default_milestone_options().len();
        if index < defaults {
            return Err(CoreError::InvalidInput(
                "Built-in milestone options cannot be changed".to_string(),
            ));
        }
        let custom = index - defaults;
        if custom >= self.custom_milestones.len() {
            return Err(CoreError::NotFound(format!("Milestone option #{index}")));
        }
        Ok(custom)
    }

    pub fn rename_custom_milestone(&mut self, index: usize, label: &str) -> Result<(), CoreError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(CoreError::InvalidInput("Milestone label cannot be empty".to_string()));
        }
        let custom = self.custom_index(index)?;
        self.custom_milestones[custom].label = label.to_string();
        Ok(())
    }

    pub fn remove_custom_milestone(&mut self, index: usize) -> Result<MilestoneOption, CoreError> {
        let custom = self.custom_index(index)?;
        Ok(self.custom_milestones.remove(custom))
    }
}

/// Visual class of a milestone badge, derived from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneTone {
    Planned,
    Closed,
    ProdMergeDone,
    InProgress,
    DevDone,
    StagingMergeDone,
    Other,
}

impl MilestoneTone {
    pub fn classify(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "PLANNED" => MilestoneTone::Planned,
            "CLOSED" => MilestoneTone::Closed,
            "PROD MERGE DONE" => MilestoneTone::ProdMergeDone,
            "IN PROGRESS" => MilestoneTone::InProgress,
            "DEV COMPLETE" | "DEV MERGE DONE" => MilestoneTone::DevDone,
            "STAGING MERGE DONE" => MilestoneTone::StagingMergeDone,
            _ => MilestoneTone::Other,
        }
    }
}

const FALLBACK_RGB: (u8, u8, u8) = (59, 130, 246);

/// `#rrggbb` plus alpha as a CSS `rgba(...)` string. Unparseable colors fall
/// back to the planned-row blue and a zero alpha to 0.15.
pub fn hex_to_rgba(hex: &str, alpha: f64) -> String {
    let alpha = if alpha == 0.0 { 0.15 } else { alpha };
    let (r, g, b) = parse_hex(hex).unwrap_or(FALLBACK_RGB);
    format!("rgba({r}, {g}, {b}, {alpha})")
}

pub fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

use anyhow::Result;
use ptrack_core::models::TaskCategory;
use ptrack_core::realm_config::{parse_hex, ConfigKey, RealmConfig};

use crate::cli::{ConfigSubcommand, SetColorCommand};
use crate::commands::{success, AppTracker};
use crate::parser::parse_opacity;
use crate::views::table::{display_colors, display_milestone_options};

pub async fn config_command(tracker: &AppTracker, command: ConfigSubcommand) -> Result<()> {
    let mut config = tracker.config().await?;
    match command {
        ConfigSubcommand::Milestones => display_milestone_options(&config.milestone_options()),
        ConfigSubcommand::AddMilestone { label } => {
            let option = config.add_custom_milestone(&label)?;
            tracker.save_config(&config, ConfigKey::MilestoneOptions).await?;
            success(format!("Added milestone option '{}' ({})", option.label, option.value));
        }
        ConfigSubcommand::RenameMilestone { index, label } => {
            config.rename_custom_milestone(index, &label)?;
            tracker.save_config(&config, ConfigKey::MilestoneOptions).await?;
            success(format!("Renamed milestone option #{index} to '{label}'"));
        }
        ConfigSubcommand::RemoveMilestone { index } => {
            let removed = config.remove_custom_milestone(index)?;
            tracker.save_config(&config, ConfigKey::MilestoneOptions).await?;
            success(format!("Removed milestone option '{}'", removed.label));
        }
        ConfigSubcommand::Colors => display_colors(&config),
        ConfigSubcommand::SetColor(command) => set_color(tracker, &mut config, command).await?,
    }
    Ok(())
}

async fn set_color(tracker: &AppTracker, config: &mut RealmConfig, command: SetColorCommand) -> Result<()> {
    if parse_hex(&command.hex).is_none() {
        anyhow::bail!("'{}' is not a #rrggbb color", command.hex);
    }
    let opacity = command.opacity.map(parse_opacity).transpose()?;
    let target = command.target.to_lowercase();

    let rows = &mut config.row_colors;
    let row_target = match target.as_str() {
        "planned" => Some((&mut rows.planned, &mut rows.planned_opacity)),
        "actual" => Some((&mut rows.actual, &mut rows.actual_opacity)),
        "subtask" => Some((&mut rows.subtask, &mut rows.subtask_opacity)),
        "sub-subtask" | "step" => Some((&mut rows.sub_subtask, &mut rows.sub_subtask_opacity)),
        _ => None,
    };

    if let Some((color, alpha)) = row_target {
        *color = command.hex.clone();
        if let Some(opacity) = opacity {
            *alpha = opacity;
        }
        tracker.save_config(config, ConfigKey::RowColors).await?;
    } else {
        let category: TaskCategory = target
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown color target '{}'", command.target))?;
        let (color, alpha) = match category {
            TaskCategory::Dev => (&mut config.category_colors.dev, &mut config.category_opacity.dev),
            TaskCategory::Test => (&mut config.category_colors.test, &mut config.category_opacity.test),
            TaskCategory::Infra => (&mut config.category_colors.infra, &mut config.category_opacity.infra),
            TaskCategory::Support => (&mut config.category_colors.support, &mut config.category_opacity.support),
        };
        *color = command.hex.clone();
        if let Some(opacity) = opacity {
            *alpha = opacity;
        }
        tracker.save_config(config, ConfigKey::CategoryColors).await?;
        if opacity.is_some() {
            tracker.save_config(config, ConfigKey::CategoryOpacity).await?;
        }
    }
    success(format!("Set {} color to {}", command.target, command.hex));
    Ok(())
}

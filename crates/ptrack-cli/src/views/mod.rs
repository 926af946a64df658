use comfy_table::Color;
use ptrack_core::models::TaskCategory;
use ptrack_core::realm_config::{parse_hex, MilestoneTone, RealmConfig};

pub mod board;
pub mod table;

/// Terminal color for a configured `#rrggbb` string.
pub fn hex_color(hex: &str) -> Color {
    match parse_hex(hex) {
        Some((r, g, b)) => Color::Rgb { r, g, b },
        None => Color::Reset,
    }
}

pub fn category_color(config: &RealmConfig, category: TaskCategory) -> Color {
    hex_color(config.category_colors.for_category(category))
}

pub fn tone_color(tone: MilestoneTone) -> Color {
    match tone {
        MilestoneTone::Planned => Color::Blue,
        MilestoneTone::Closed => Color::DarkGrey,
        MilestoneTone::ProdMergeDone => Color::Green,
        MilestoneTone::InProgress => Color::Yellow,
        MilestoneTone::DevDone => Color::Cyan,
        MilestoneTone::StagingMergeDone => Color::Magenta,
        MilestoneTone::Other => Color::White,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_color() {
        assert_eq!(hex_color("#ff0080"), Color::Rgb { r: 255, g: 0, b: 128 });
        assert_eq!(hex_color("red"), Color::Reset);
    }
}

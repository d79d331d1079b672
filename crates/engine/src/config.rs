use crate::events::DEFAULT_FAILURE_THRESHOLD;
use crate::grid::DEFAULT_TILE_SIZE;

pub const DEFAULT_LEVEL_LABELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

/// Gameplay tuning shared by the simulation components.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub tile_size: u32,
    pub step_duration_seconds: f32,
    pub char_reveal_seconds: f32,
    pub animation_frame_seconds: f32,
    pub patrol_step_seconds: f32,
    pub handler_failure_threshold: u32,
    pub quiz_points_per_correct: u32,
    pub lesson_default_xp: u32,
    pub xp_per_level: u32,
    pub level_labels: Vec<String>,
    pub save_slot: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            step_duration_seconds: 0.2,
            char_reveal_seconds: 0.05,
            animation_frame_seconds: 0.15,
            patrol_step_seconds: 0.6,
            handler_failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            quiz_points_per_correct: 10,
            lesson_default_xp: 20,
            xp_per_level: 200,
            level_labels: DEFAULT_LEVEL_LABELS.iter().map(ToString::to_string).collect(),
            save_slot: 0,
        }
    }
}

impl GameConfig {
    /// Replaces values that would stall or divide by zero with the defaults.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.tile_size == 0 {
            self.tile_size = defaults.tile_size;
        }
        self.step_duration_seconds =
            positive_or(self.step_duration_seconds, defaults.step_duration_seconds);
        self.char_reveal_seconds =
            positive_or(self.char_reveal_seconds, defaults.char_reveal_seconds);
        self.animation_frame_seconds =
            positive_or(self.animation_frame_seconds, defaults.animation_frame_seconds);
        self.patrol_step_seconds =
            positive_or(self.patrol_step_seconds, defaults.patrol_step_seconds);
        self.handler_failure_threshold = self.handler_failure_threshold.max(1);
        if self.xp_per_level == 0 {
            self.xp_per_level = defaults.xp_per_level;
        }
        if self.level_labels.is_empty() {
            self.level_labels = defaults.level_labels;
        }
        self
    }
}

fn positive_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_replaces_degenerate_values() {
        let config = GameConfig {
            tile_size: 0,
            step_duration_seconds: 0.0,
            char_reveal_seconds: f32::NAN,
            xp_per_level: 0,
            level_labels: Vec::new(),
            handler_failure_threshold: 0,
            ..GameConfig::default()
        }
        .normalized();

        assert_eq!(config.tile_size, 16);
        assert_eq!(config.step_duration_seconds, 0.2);
        assert_eq!(config.char_reveal_seconds, 0.05);
        assert_eq!(config.xp_per_level, 200);
        assert_eq!(config.level_labels.len(), 6);
        assert_eq!(config.handler_failure_threshold, 1);
    }

    #[test]
    fn normalized_keeps_valid_tuning() {
        let config = GameConfig {
            step_duration_seconds: 0.18,
            ..GameConfig::default()
        }
        .normalized();
        assert_eq!(config.step_duration_seconds, 0.18);
    }
}

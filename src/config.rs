use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_CUSTOMIZE_SECS, DEFAULT_ENV_KEEP_PERCENTAGE, DEFAULT_GAMEPLAY_SECS,
    DEFAULT_ITEM_REMAIN_PERCENTAGE, DEFAULT_PREPARE_SECS, DEFAULT_PROGRESSION_WIN_THRESHOLD,
    DEFAULT_READY_SECS, MAX_BOTS_PER_TEAM,
};
use crate::error::ConfigError;
use crate::types::TimerSlot;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    #[default]
    Normal,
    DebugSinglePlayer,
    DebugRelaxed,
}

impl ReadinessPolicy {
    pub fn is_debug(self) -> bool {
        !matches!(self, ReadinessPolicy::Normal)
    }
}

/// Per-match settings. Built once and handed to the controller, which
/// shares it by reference with every component.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    pub ready_secs: u32,
    pub customize_secs: u32,
    pub prepare_secs: u32,
    pub gameplay_secs: u32,
    pub progression_win_threshold: f32,
    pub item_remain_percentage: u8,
    pub env_keep_percentage: u8,
    pub readiness_policy: ReadinessPolicy,
    pub seed: Option<u32>,
    pub initial_human_bots: usize,
    pub initial_cat_bots: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            ready_secs: DEFAULT_READY_SECS,
            customize_secs: DEFAULT_CUSTOMIZE_SECS,
            prepare_secs: DEFAULT_PREPARE_SECS,
            gameplay_secs: DEFAULT_GAMEPLAY_SECS,
            progression_win_threshold: DEFAULT_PROGRESSION_WIN_THRESHOLD,
            item_remain_percentage: DEFAULT_ITEM_REMAIN_PERCENTAGE,
            env_keep_percentage: DEFAULT_ENV_KEEP_PERCENTAGE,
            readiness_policy: ReadinessPolicy::Normal,
            seed: None,
            initial_human_bots: 0,
            initial_cat_bots: 0,
        }
    }
}

impl MatchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for slot in TimerSlot::ALL {
            if self.total_for(slot) == 0 {
                return Err(ConfigError::Invalid {
                    field: slot_field(slot),
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }
        let threshold = self.progression_win_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(ConfigError::Invalid {
                field: "progression_win_threshold",
                reason: format!("{threshold} is outside (0, 1]"),
            });
        }
        if self.item_remain_percentage > 100 {
            return Err(ConfigError::Invalid {
                field: "item_remain_percentage",
                reason: format!("{} exceeds 100", self.item_remain_percentage),
            });
        }
        if self.env_keep_percentage > 100 {
            return Err(ConfigError::Invalid {
                field: "env_keep_percentage",
                reason: format!("{} exceeds 100", self.env_keep_percentage),
            });
        }
        if self.initial_human_bots > MAX_BOTS_PER_TEAM || self.initial_cat_bots > MAX_BOTS_PER_TEAM
        {
            return Err(ConfigError::Invalid {
                field: "initial_bots",
                reason: format!("at most {MAX_BOTS_PER_TEAM} bots per team"),
            });
        }
        Ok(())
    }

    pub fn total_for(&self, slot: TimerSlot) -> u32 {
        match slot {
            TimerSlot::Ready => self.ready_secs,
            TimerSlot::Customize => self.customize_secs,
            TimerSlot::Prepare => self.prepare_secs,
            TimerSlot::Gameplay => self.gameplay_secs,
        }
    }
}

fn slot_field(slot: TimerSlot) -> &'static str {
    match slot {
        TimerSlot::Ready => "ready_secs",
        TimerSlot::Customize => "customize_secs",
        TimerSlot::Prepare => "prepare_secs",
        TimerSlot::Gameplay => "gameplay_secs",
    }
}

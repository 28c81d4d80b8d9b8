use crate::types::Team;

pub const DEFAULT_READY_SECS: u32 = 5;
pub const DEFAULT_CUSTOMIZE_SECS: u32 = 30;
pub const DEFAULT_PREPARE_SECS: u32 = 10;
pub const DEFAULT_GAMEPLAY_SECS: u32 = 300;

pub const DEFAULT_PROGRESSION_WIN_THRESHOLD: f32 = 0.75;
pub const DEFAULT_ITEM_REMAIN_PERCENTAGE: u8 = 60;
pub const DEFAULT_ENV_KEEP_PERCENTAGE: u8 = 50;

/// Capture ratio treated as "everything captured" to absorb float drift.
pub const CAPTURE_WIN_RATIO: f32 = 0.999;

pub const TICK_PERIOD_MS: u64 = 1_000;

/// Selectable pawn sub-types per team; the died body sits right after them.
pub const PLAYABLE_KINDS_PER_TEAM: u8 = 4;
pub const DIED_PAWN_KIND: u8 = PLAYABLE_KINDS_PER_TEAM;

pub const MAX_BOTS_PER_TEAM: usize = 16;

pub fn is_playable_kind(kind: u8) -> bool {
    kind < PLAYABLE_KINDS_PER_TEAM
}

pub fn died_kind_for(team: Team) -> Option<u8> {
    team.is_playable().then_some(DIED_PAWN_KIND)
}

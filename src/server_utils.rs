use crate::constants::{MAX_BOTS_PER_TEAM, PLAYABLE_KINDS_PER_TEAM};

pub fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

pub fn normalize_character_kind(value: i64) -> Option<u8> {
    u8::try_from(value)
        .ok()
        .filter(|kind| *kind < PLAYABLE_KINDS_PER_TEAM)
}

pub fn normalize_bot_index(value: i64) -> Option<usize> {
    usize::try_from(value)
        .ok()
        .filter(|index| *index < MAX_BOTS_PER_TEAM)
}

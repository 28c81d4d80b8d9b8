use std::path::PathBuf;

use thiserror::Error;

use crate::types::{MatchPhase, Team};

/// Failures inside the match core. None of these are fatal: public
/// operations log them and answer `false` or do nothing.
#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("team balance rejected moving {player_id} to {team:?}")]
    ConstraintViolation { player_id: String, team: Team },

    #[error("{team:?} already has the maximum of {max} bots")]
    BotLimit { team: Team, max: usize },

    #[error("index {index} out of range (len {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("objective impossible: {0}")]
    ImpossibleObjective(&'static str),

    #[error("no authoritative world context for {0}")]
    MissingWorldContext(&'static str),

    #[error("unknown player {0}")]
    UnknownPlayer(String),

    #[error("{operation} not allowed during {phase:?}")]
    WrongPhase {
        operation: &'static str,
        phase: MatchPhase,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Raised by the async host when the match task is gone.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("match task has stopped")]
    Closed,

    #[error("match task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = MatchError::InvalidIndex { index: 5, len: 5 };
        assert_eq!(err.to_string(), "index 5 out of range (len 5)");

        let err = MatchError::WrongPhase {
            operation: "choose_character",
            phase: MatchPhase::Lobby,
        };
        assert_eq!(err.to_string(), "choose_character not allowed during Lobby");

        let err = ConfigError::Invalid {
            field: "gameplay_secs",
            reason: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("gameplay_secs"));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Lobby,
    CustomizeCharacter,
    Prepare,
    Gameplay,
    Ended,
}

/// `Cat` is the progression team (team A), `Human` the capture team (team B).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    #[default]
    None,
    Cat,
    Human,
}

impl Team {
    pub const PROGRESSION: Team = Team::Cat;
    pub const CAPTURE: Team = Team::Human;

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cat" | "team_a" => Some(Self::Cat),
            "human" | "team_b" => Some(Self::Human),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::Cat => Team::Human,
            Team::Human => Team::Cat,
            Team::None => Team::None,
        }
    }

    pub fn is_playable(self) -> bool {
        self != Team::None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HudKind {
    Lobby,
    CustomizeHuman,
    CustomizeCat,
    GameplayHuman,
    GameplayCat,
    End,
}

impl HudKind {
    pub fn customize_for(team: Team) -> Option<Self> {
        match team {
            Team::Human => Some(Self::CustomizeHuman),
            Team::Cat => Some(Self::CustomizeCat),
            Team::None => None,
        }
    }

    pub fn gameplay_for(team: Team) -> Option<Self> {
        match team {
            Team::Human => Some(Self::GameplayHuman),
            Team::Cat => Some(Self::GameplayCat),
            Team::None => None,
        }
    }
}

/// Behavioural state stored on an agent's blackboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Wander,
    Search,
    HoldCat,
    UseItem,
    Stunned,
}

impl AgentState {
    pub fn accepts_task(self) -> bool {
        matches!(self, AgentState::Idle | AgentState::Wander)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerSlot {
    Ready,
    Customize,
    Prepare,
    Gameplay,
}

impl TimerSlot {
    pub const ALL: [TimerSlot; 4] = [
        TimerSlot::Ready,
        TimerSlot::Customize,
        TimerSlot::Prepare,
        TimerSlot::Gameplay,
    ];

    pub fn index(self) -> usize {
        match self {
            TimerSlot::Ready => 0,
            TimerSlot::Customize => 1,
            TimerSlot::Prepare => 2,
            TimerSlot::Gameplay => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Transform {
    pub location: Vec3,
    pub yaw: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PawnHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ControllerHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    ProgressionReached,
    TargetsCaptured,
    CaptureTeamEliminated,
    TimeoutProgressionAhead,
    TimeoutCaptureAhead,
    TimeoutTie,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub winner: Team,
    pub reason: WinReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProgressView {
    #[serde(rename = "progressionPercent")]
    pub progression_percent: f32,
    #[serde(rename = "capturePercent")]
    pub capture_percent: f32,
    #[serde(rename = "progressionPossible")]
    pub progression_possible: bool,
    #[serde(rename = "capturePossible")]
    pub capture_possible: bool,
    #[serde(rename = "remainingSecs")]
    pub remaining_secs: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LobbyPlayerView {
    pub id: String,
    pub name: String,
    pub team: Team,
    pub ready: bool,
    pub host: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BotCounts {
    pub human: usize,
    pub cat: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    PhaseChanged {
        from: MatchPhase,
        to: MatchPhase,
    },
    AttachHud {
        #[serde(rename = "playerId")]
        player_id: String,
        hud: HudKind,
    },
    RemoveHud {
        #[serde(rename = "playerId")]
        player_id: String,
        hud: HudKind,
    },
    Countdown {
        slot: TimerSlot,
        remaining: u32,
    },
    CountdownCancelled {
        slot: TimerSlot,
    },
    LobbyUpdated {
        players: Vec<LobbyPlayerView>,
        #[serde(rename = "hostId")]
        host_id: Option<String>,
        bots: BotCounts,
    },
    ProgressUpdated {
        progress: ProgressView,
    },
    PlayerCaptured {
        #[serde(rename = "playerId")]
        player_id: String,
        by: String,
    },
    MatchResult {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "didWin")]
        did_win: bool,
        #[serde(rename = "teamAPercent")]
        team_a_percent: f32,
        #[serde(rename = "teamBPercent")]
        team_b_percent: f32,
    },
    MatchEnded {
        outcome: MatchOutcome,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerResult {
    #[serde(rename = "playerId")]
    pub player_id: String,
    pub name: String,
    pub team: Team,
    pub won: bool,
    pub died: bool,
    pub captured: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchSummary {
    pub outcome: MatchOutcome,
    #[serde(rename = "progressionPercent")]
    pub progression_percent: f32,
    #[serde(rename = "capturePercent")]
    pub capture_percent: f32,
    #[serde(rename = "elapsedSecs")]
    pub elapsed_secs: u32,
    pub players: Vec<PlayerResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_parse_accepts_role_aliases() {
        assert_eq!(Team::parse("team_a"), Some(Team::PROGRESSION));
        assert_eq!(Team::parse("human"), Some(Team::CAPTURE));
        assert_eq!(Team::parse("dog"), None);
        assert_eq!(Team::Cat.opponent(), Team::Human);
        assert_eq!(Team::None.opponent(), Team::None);
    }

    #[test]
    fn match_event_serializes_with_type_tag() {
        let event = MatchEvent::MatchResult {
            player_id: "player_1".to_string(),
            did_win: true,
            team_a_percent: 0.5,
            team_b_percent: 0.25,
        };
        let json = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(json["type"], "match_result");
        assert_eq!(json["playerId"], "player_1");
        assert_eq!(json["didWin"], true);
    }

    #[test]
    fn only_idle_and_wander_accept_tasks() {
        assert!(AgentState::Idle.accepts_task());
        assert!(AgentState::Wander.accepts_task());
        assert!(!AgentState::Search.accepts_task());
        assert!(!AgentState::Stunned.accepts_task());
    }
}

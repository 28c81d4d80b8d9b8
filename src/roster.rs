use serde::Serialize;

use crate::types::{ControllerHandle, HudKind, LobbyPlayerView, PawnHandle, Team};

/// Address of anything that can sit on a team.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParticipantId {
    Player { id: String },
    Bot { controller: ControllerHandle },
}

impl ParticipantId {
    pub fn player(id: impl Into<String>) -> Self {
        Self::Player { id: id.into() }
    }
}

/// A resolved team member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Participant {
    Player { id: String, team: Team },
    Bot { controller: ControllerHandle, team: Team },
}

impl Participant {
    pub fn team(&self) -> Team {
        match self {
            Participant::Player { team, .. } | Participant::Bot { team, .. } => *team,
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self, Participant::Player { .. })
    }

    pub fn id(&self) -> ParticipantId {
        match self {
            Participant::Player { id, .. } => ParticipantId::player(id.clone()),
            Participant::Bot { controller, .. } => ParticipantId::Bot {
                controller: *controller,
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlayerEntry {
    pub id: String,
    pub name: String,
    pub team: Team,
    pub is_ready: bool,
    pub is_died: bool,
    pub is_captured: bool,
    pub character_kind: Option<u8>,
    pub pawn: Option<PawnHandle>,
    pub holding: Option<ParticipantId>,
    pub hud: Option<HudKind>,
}

impl PlayerEntry {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            team: Team::None,
            is_ready: false,
            is_died: false,
            is_captured: false,
            character_kind: None,
            pawn: None,
            holding: None,
            hud: None,
        }
    }

    pub fn participant(&self) -> Participant {
        Participant::Player {
            id: self.id.clone(),
            team: self.team,
        }
    }

    fn reset_round(&mut self) {
        self.is_ready = false;
        self.is_died = false;
        self.is_captured = false;
        self.character_kind = None;
        self.pawn = None;
        self.holding = None;
    }
}

/// Connected players in join order. The first entry is the host.
#[derive(Clone, Debug, Default)]
pub struct PlayerRoster {
    players: Vec<PlayerEntry>,
}

impl PlayerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the id is already connected.
    pub fn join(&mut self, id: &str, name: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.players
            .push(PlayerEntry::new(id.to_string(), name.to_string()));
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<PlayerEntry> {
        let index = self.players.iter().position(|p| p.id == id)?;
        Some(self.players.remove(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&PlayerEntry> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PlayerEntry> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerEntry> {
        self.players.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerEntry> {
        self.players.iter_mut()
    }

    pub fn ids(&self) -> Vec<String> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn count_team(&self, team: Team) -> usize {
        self.players.iter().filter(|p| p.team == team).count()
    }

    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_ready).count()
    }

    pub fn host_id(&self) -> Option<&str> {
        self.players.first().map(|p| p.id.as_str())
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host_id() == Some(id)
    }

    /// Who is holding `target`, if anyone.
    pub fn holder_of(&self, target: &ParticipantId) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.holding.as_ref() == Some(target))
            .map(|p| p.id.as_str())
    }

    pub fn reset_round_flags(&mut self) {
        for player in &mut self.players {
            player.reset_round();
        }
    }

    pub fn lobby_view(&self) -> Vec<LobbyPlayerView> {
        let host = self.host_id().map(str::to_string);
        self.players
            .iter()
            .map(|p| LobbyPlayerView {
                id: p.id.clone(),
                name: p.name.clone(),
                team: p.team,
                ready: p.is_ready,
                host: host.as_deref() == Some(p.id.as_str()),
            })
            .collect()
    }
}

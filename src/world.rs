//! Collaborator contracts the match core drives but does not own.

use crate::types::{AgentState, ControllerHandle, PawnHandle, Team, Transform, Vec3};

/// Spawns character bodies. `None` means the class for that team/kind is not
/// configured; callers log it and skip the spawn.
pub trait PawnFactory {
    fn spawn_pawn(&mut self, team: Team, kind: u8, at: Transform) -> Option<PawnHandle>;
    fn destroy_pawn(&mut self, pawn: PawnHandle);
}

pub trait ControllerFactory {
    fn spawn_controller(&mut self, team: Team) -> Option<ControllerHandle>;
    fn destroy_controller(&mut self, controller: ControllerHandle);
    fn possess(&mut self, controller: ControllerHandle, pawn: PawnHandle);
}

/// Per-agent decision state. No atomicity across keys.
pub trait Blackboard {
    fn agent_state(&self, agent: ControllerHandle) -> Option<AgentState>;
    fn set_agent_state(&mut self, agent: ControllerHandle, state: AgentState);
    fn set_target_location(&mut self, agent: ControllerHandle, location: Vec3);
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnvObject {
    pub id: String,
    /// `Some` for pushables that count toward progression.
    pub weight: Option<f32>,
}

/// The authoritative game world one match runs in.
pub trait MatchWorld: PawnFactory + ControllerFactory + Blackboard {
    fn item_ids(&self) -> Vec<String>;
    fn eliminate_item(&mut self, item_id: &str);

    fn env_objects(&self) -> Vec<EnvObject>;
    fn randomize_env_object(&mut self, object_id: &str);

    /// Puts items and env objects back the way they were before any round
    /// thinned or randomised them.
    fn reset_round(&mut self);

    fn spawn_point(&self, team: Team, index: usize) -> Transform;
    fn possess_player(&mut self, player_id: &str, pawn: PawnHandle);
}

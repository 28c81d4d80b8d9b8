//! In-memory world used by the headless host, the simulator and tests.

use std::collections::{BTreeMap, HashSet};

use crate::rng::Rng;
use crate::types::{AgentState, ControllerHandle, PawnHandle, Team, Transform, Vec3};
use crate::world::{Blackboard, ControllerFactory, EnvObject, MatchWorld, PawnFactory};

#[derive(Clone, Debug, PartialEq)]
pub struct SimPawn {
    pub team: Team,
    pub kind: u8,
    pub at: Transform,
}

#[derive(Clone, Debug, Default)]
struct SimAgent {
    team: Team,
    state: AgentState,
    target: Option<Vec3>,
    pawn: Option<PawnHandle>,
}

#[derive(Clone, Debug)]
pub struct SimWorld {
    rng: Rng,
    items: Vec<String>,
    env: Vec<EnvObject>,
    layout_items: Vec<String>,
    layout_env: Vec<EnvObject>,
    pawns: BTreeMap<PawnHandle, SimPawn>,
    agents: BTreeMap<ControllerHandle, SimAgent>,
    player_pawns: BTreeMap<String, PawnHandle>,
    missing_pawn_classes: HashSet<Team>,
    controller_class: bool,
    next_handle: u64,
}

impl SimWorld {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed),
            items: Vec::new(),
            env: Vec::new(),
            layout_items: Vec::new(),
            layout_env: Vec::new(),
            pawns: BTreeMap::new(),
            agents: BTreeMap::new(),
            player_pawns: BTreeMap::new(),
            missing_pawn_classes: HashSet::new(),
            controller_class: true,
            next_handle: 1,
        }
    }

    /// A small furnished house: a few items, pushables and fixtures.
    pub fn furnished(seed: u32) -> Self {
        let mut world = Self::new(seed);
        for index in 0..6 {
            world = world.with_item(&format!("item_{index}"));
        }
        for (index, weight) in [10.0, 15.0, 20.0, 5.0, 25.0, 25.0].into_iter().enumerate() {
            world = world.with_pushable(&format!("vase_{index}"), weight);
        }
        for index in 0..3 {
            world = world.with_fixture(&format!("window_{index}"));
        }
        world
    }

    pub fn with_item(mut self, id: &str) -> Self {
        self.layout_items.push(id.to_string());
        self.items = self.layout_items.clone();
        self
    }

    pub fn with_pushable(self, id: &str, weight: f32) -> Self {
        self.with_env(EnvObject {
            id: id.to_string(),
            weight: Some(weight),
        })
    }

    pub fn with_fixture(self, id: &str) -> Self {
        self.with_env(EnvObject {
            id: id.to_string(),
            weight: None,
        })
    }

    fn with_env(mut self, object: EnvObject) -> Self {
        self.layout_env.push(object);
        self.env = self.layout_env.clone();
        self
    }

    pub fn without_pawn_class(mut self, team: Team) -> Self {
        self.missing_pawn_classes.insert(team);
        self
    }

    pub fn without_controller_class(mut self) -> Self {
        self.controller_class = false;
        self
    }

    pub fn pawn(&self, pawn: PawnHandle) -> Option<&SimPawn> {
        self.pawns.get(&pawn)
    }

    pub fn pawn_count(&self) -> usize {
        self.pawns.len()
    }

    pub fn controller_count(&self) -> usize {
        self.agents.len()
    }

    pub fn player_pawn(&self, player_id: &str) -> Option<PawnHandle> {
        self.player_pawns.get(player_id).copied()
    }

    pub fn agent_pawn(&self, agent: ControllerHandle) -> Option<PawnHandle> {
        self.agents.get(&agent).and_then(|a| a.pawn)
    }

    pub fn agent_team(&self, agent: ControllerHandle) -> Option<Team> {
        self.agents.get(&agent).map(|a| a.team)
    }

    pub fn target_location(&self, agent: ControllerHandle) -> Option<Vec3> {
        self.agents.get(&agent).and_then(|a| a.target)
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl PawnFactory for SimWorld {
    fn spawn_pawn(&mut self, team: Team, kind: u8, at: Transform) -> Option<PawnHandle> {
        if !team.is_playable() || self.missing_pawn_classes.contains(&team) {
            return None;
        }
        let handle = PawnHandle(self.next_handle());
        self.pawns.insert(handle, SimPawn { team, kind, at });
        Some(handle)
    }

    fn destroy_pawn(&mut self, pawn: PawnHandle) {
        self.pawns.remove(&pawn);
        self.player_pawns.retain(|_, owned| *owned != pawn);
        for agent in self.agents.values_mut() {
            if agent.pawn == Some(pawn) {
                agent.pawn = None;
            }
        }
    }
}

impl ControllerFactory for SimWorld {
    fn spawn_controller(&mut self, team: Team) -> Option<ControllerHandle> {
        if !self.controller_class || !team.is_playable() {
            return None;
        }
        let handle = ControllerHandle(self.next_handle());
        self.agents.insert(
            handle,
            SimAgent {
                team,
                ..SimAgent::default()
            },
        );
        Some(handle)
    }

    fn destroy_controller(&mut self, controller: ControllerHandle) {
        self.agents.remove(&controller);
    }

    fn possess(&mut self, controller: ControllerHandle, pawn: PawnHandle) {
        if let Some(agent) = self.agents.get_mut(&controller) {
            agent.pawn = Some(pawn);
        }
    }
}

impl Blackboard for SimWorld {
    fn agent_state(&self, agent: ControllerHandle) -> Option<AgentState> {
        self.agents.get(&agent).map(|a| a.state)
    }

    fn set_agent_state(&mut self, agent: ControllerHandle, state: AgentState) {
        if let Some(entry) = self.agents.get_mut(&agent) {
            entry.state = state;
        }
    }

    fn set_target_location(&mut self, agent: ControllerHandle, location: Vec3) {
        if let Some(entry) = self.agents.get_mut(&agent) {
            entry.target = Some(location);
        }
    }
}

impl MatchWorld for SimWorld {
    fn item_ids(&self) -> Vec<String> {
        self.items.clone()
    }

    fn eliminate_item(&mut self, item_id: &str) {
        self.items.retain(|id| id != item_id);
    }

    fn env_objects(&self) -> Vec<EnvObject> {
        self.env.clone()
    }

    /// Half the time the object turns into a fixture, otherwise it is
    /// reweighted.
    fn randomize_env_object(&mut self, object_id: &str) {
        let lose = self.rng.bool(0.5);
        let weight = self.rng.int(5, 25) as f32;
        if let Some(object) = self.env.iter_mut().find(|o| o.id == object_id) {
            object.weight = if lose { None } else { Some(weight) };
        }
    }

    fn reset_round(&mut self) {
        self.items = self.layout_items.clone();
        self.env = self.layout_env.clone();
    }

    fn spawn_point(&self, team: Team, index: usize) -> Transform {
        let lane = match team {
            Team::Human => -10.0,
            Team::Cat => 10.0,
            Team::None => 0.0,
        };
        Transform {
            location: Vec3::new(lane, index as f32 * 2.0, 0.0),
            yaw: 0.0,
        }
    }

    fn possess_player(&mut self, player_id: &str, pawn: PawnHandle) {
        self.player_pawns.insert(player_id.to_string(), pawn);
    }
}

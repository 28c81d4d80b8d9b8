use tracing::{debug, error, info, warn};

use crate::constants::{MAX_BOTS_PER_TEAM, PLAYABLE_KINDS_PER_TEAM};
use crate::error::MatchError;
use crate::rng::Rng;
use crate::types::{AgentState, BotCounts, ControllerHandle, PawnHandle, Team};
use crate::world::{Blackboard, ControllerFactory, MatchWorld, PawnFactory};

#[derive(Clone, Debug, PartialEq)]
pub struct BotEntry {
    pub team: Team,
    pub controller: ControllerHandle,
    pub pawn: Option<PawnHandle>,
}

/// Non-player team members. Human bots come first in the flat index space,
/// then cat bots.
#[derive(Clone, Debug, Default)]
pub struct BotRoster {
    human_bots: Vec<BotEntry>,
    cat_bots: Vec<BotEntry>,
}

impl BotRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn team_bots(&self, team: Team) -> &[BotEntry] {
        match team {
            Team::Human => &self.human_bots,
            Team::Cat => &self.cat_bots,
            Team::None => &[],
        }
    }

    fn team_bots_mut(&mut self, team: Team) -> Option<&mut Vec<BotEntry>> {
        match team {
            Team::Human => Some(&mut self.human_bots),
            Team::Cat => Some(&mut self.cat_bots),
            Team::None => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BotEntry> {
        self.human_bots.iter().chain(self.cat_bots.iter())
    }

    pub fn len(&self) -> usize {
        self.human_bots.len() + self.cat_bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counts(&self) -> BotCounts {
        BotCounts {
            human: self.human_bots.len(),
            cat: self.cat_bots.len(),
        }
    }

    pub fn find(&self, controller: ControllerHandle) -> Option<&BotEntry> {
        self.iter().find(|bot| bot.controller == controller)
    }

    /// Controllers of one team in list order.
    pub fn agents(&self, team: Team) -> Vec<ControllerHandle> {
        self.team_bots(team).iter().map(|bot| bot.controller).collect()
    }

    pub fn add_bot<F>(&mut self, team: Team, factory: Option<&mut F>) -> bool
    where
        F: ControllerFactory + ?Sized,
    {
        match self.try_add(team, factory) {
            Ok(controller) => {
                info!(?team, controller = controller.0, "bot added");
                true
            }
            Err(err @ MatchError::BotLimit { .. }) => {
                warn!(%err, "bot add rejected");
                false
            }
            Err(err) => {
                error!(?team, %err, "bot add failed");
                false
            }
        }
    }

    fn try_add<F>(&mut self, team: Team, factory: Option<&mut F>) -> Result<ControllerHandle, MatchError>
    where
        F: ControllerFactory + ?Sized,
    {
        if !team.is_playable() {
            return Err(MatchError::Configuration(
                "bots need a playable team".to_string(),
            ));
        }
        if self.team_bots(team).len() >= MAX_BOTS_PER_TEAM {
            return Err(MatchError::BotLimit {
                team,
                max: MAX_BOTS_PER_TEAM,
            });
        }
        let factory = factory.ok_or(MatchError::MissingWorldContext("add_bot"))?;
        let controller = factory.spawn_controller(team).ok_or_else(|| {
            MatchError::Configuration(format!("no AI controller class for {team:?}"))
        })?;
        if let Some(list) = self.team_bots_mut(team) {
            list.push(BotEntry {
                team,
                controller,
                pawn: None,
            });
        }
        Ok(controller)
    }

    /// Maps a flat `[human_bots..., cat_bots...]` index to `(team, local)`.
    pub fn resolve_flat(&self, flat_index: usize) -> Option<(Team, usize)> {
        let humans = self.human_bots.len();
        if flat_index < humans {
            return Some((Team::Human, flat_index));
        }
        let local = flat_index - humans;
        (local < self.cat_bots.len()).then_some((Team::Cat, local))
    }

    pub fn remove_bot<W>(&mut self, flat_index: usize, world: Option<&mut W>) -> bool
    where
        W: PawnFactory + ControllerFactory + ?Sized,
    {
        match self.resolve_flat(flat_index) {
            Some((team, local)) => self.remove_bot_at(team, local, world),
            None => {
                let err = MatchError::InvalidIndex {
                    index: flat_index,
                    len: self.len(),
                };
                warn!(%err, "bot removal rejected");
                false
            }
        }
    }

    pub fn remove_bot_at<W>(&mut self, team: Team, local_index: usize, world: Option<&mut W>) -> bool
    where
        W: PawnFactory + ControllerFactory + ?Sized,
    {
        let Some(list) = self.team_bots_mut(team) else {
            warn!(?team, "bot removal needs a playable team");
            return false;
        };
        if local_index >= list.len() {
            let err = MatchError::InvalidIndex {
                index: local_index,
                len: list.len(),
            };
            warn!(?team, %err, "bot removal rejected");
            return false;
        }
        let bot = list.remove(local_index);
        match world {
            Some(world) => {
                if let Some(pawn) = bot.pawn {
                    world.destroy_pawn(pawn);
                }
                world.destroy_controller(bot.controller);
            }
            None => warn!(
                controller = bot.controller.0,
                "bot removed without world context; controller not destroyed"
            ),
        }
        info!(?team, local_index, controller = bot.controller.0, "bot removed");
        true
    }

    /// Spawns and possesses a pawn for every bot that has none. Returns how
    /// many were spawned.
    pub fn spawn_roster_pawns<W: MatchWorld>(&mut self, world: &mut W, rng: &mut Rng) -> usize {
        let mut spawned = 0;
        for team in [Team::Human, Team::Cat] {
            let Some(list) = self.team_bots_mut(team) else {
                continue;
            };
            for (index, bot) in list.iter_mut().enumerate() {
                if bot.pawn.is_some() {
                    continue;
                }
                let kind = rng.pick_index(PLAYABLE_KINDS_PER_TEAM as usize) as u8;
                let at = world.spawn_point(team, index);
                match world.spawn_pawn(team, kind, at) {
                    Some(pawn) => {
                        world.possess(bot.controller, pawn);
                        bot.pawn = Some(pawn);
                        spawned += 1;
                        debug!(?team, controller = bot.controller.0, kind, "bot pawn spawned");
                    }
                    None => {
                        let err = MatchError::Configuration(format!(
                            "no pawn class for {team:?} kind {kind}"
                        ));
                        error!(controller = bot.controller.0, %err, "bot pawn skipped");
                    }
                }
            }
        }
        spawned
    }

    /// Puts every bot back to `Idle` so it takes tasks again next round.
    pub fn reset_agent_states<B>(&self, blackboard: &mut B)
    where
        B: Blackboard + ?Sized,
    {
        for bot in self.iter() {
            blackboard.set_agent_state(bot.controller, AgentState::Idle);
        }
    }

    /// Destroys every bot pawn; the controllers stay.
    pub fn clear_pawns<W>(&mut self, mut world: Option<&mut W>)
    where
        W: PawnFactory + ?Sized,
    {
        for bot in self.human_bots.iter_mut().chain(self.cat_bots.iter_mut()) {
            if let Some(pawn) = bot.pawn.take() {
                if let Some(world) = world.as_deref_mut() {
                    world.destroy_pawn(pawn);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimWorld;

    fn filled_roster(world: &mut SimWorld, humans: usize, cats: usize) -> BotRoster {
        let mut bots = BotRoster::new();
        for _ in 0..humans {
            assert!(bots.add_bot(Team::Human, Some(&mut *world)));
        }
        for _ in 0..cats {
            assert!(bots.add_bot(Team::Cat, Some(&mut *world)));
        }
        bots
    }

    #[test]
    fn flat_index_spans_humans_then_cats() {
        let mut world = SimWorld::new(1);
        let mut bots = filled_roster(&mut world, 2, 3);
        let cats = bots.agents(Team::Cat);

        assert_eq!(bots.resolve_flat(1), Some((Team::Human, 1)));
        assert_eq!(bots.resolve_flat(4), Some((Team::Cat, 2)));
        assert!(bots.remove_bot(4, Some(&mut world)));
        assert_eq!(bots.agents(Team::Cat), cats[..2].to_vec());
        assert_eq!(world.controller_count(), 4);
    }

    #[test]
    fn out_of_range_removal_changes_nothing() {
        let mut world = SimWorld::new(1);
        let mut bots = filled_roster(&mut world, 2, 3);
        assert!(!bots.remove_bot(5, Some(&mut world)));
        assert!(!bots.remove_bot_at(Team::Human, 2, Some(&mut world)));
        assert!(!bots.remove_bot_at(Team::None, 0, Some(&mut world)));
        assert_eq!(bots.counts(), BotCounts { human: 2, cat: 3 });
        assert_eq!(world.controller_count(), 5);
    }

    #[test]
    fn team_list_is_capped() {
        let mut world = SimWorld::new(1);
        let mut bots = filled_roster(&mut world, MAX_BOTS_PER_TEAM, 0);
        assert!(!bots.add_bot(Team::Human, Some(&mut world)));
        assert_eq!(bots.counts().human, MAX_BOTS_PER_TEAM);
        assert_eq!(world.controller_count(), MAX_BOTS_PER_TEAM);
        assert!(bots.add_bot(Team::Cat, Some(&mut world)));
    }

    #[test]
    fn reset_returns_agents_to_idle() {
        let mut world = SimWorld::new(1);
        let bots = filled_roster(&mut world, 1, 1);
        for bot in bots.iter() {
            world.set_agent_state(bot.controller, AgentState::Search);
        }
        bots.reset_agent_states(&mut world);
        for bot in bots.iter() {
            assert_eq!(world.agent_state(bot.controller), Some(AgentState::Idle));
        }
    }

    #[test]
    fn add_without_factory_leaves_no_entry() {
        let mut bots = BotRoster::new();
        assert!(!bots.add_bot::<SimWorld>(Team::Cat, None));

        let mut world = SimWorld::new(1).without_controller_class();
        assert!(!bots.add_bot(Team::Cat, Some(&mut world)));
        assert!(!bots.add_bot(Team::None, Some(&mut world)));
        assert!(bots.is_empty());
    }

    #[test]
    fn roster_pawns_spawn_once_and_skip_missing_classes() {
        let mut world = SimWorld::new(1).without_pawn_class(Team::Cat);
        let mut bots = filled_roster(&mut world, 2, 1);
        let mut rng = Rng::new(11);

        assert_eq!(bots.spawn_roster_pawns(&mut world, &mut rng), 2);
        assert_eq!(bots.spawn_roster_pawns(&mut world, &mut rng), 0);
        for bot in bots.team_bots(Team::Human) {
            let pawn = bot.pawn.expect("human bot has a pawn");
            assert_eq!(world.agent_pawn(bot.controller), Some(pawn));
            let kind = world.pawn(pawn).map(|p| p.kind).expect("pawn exists");
            assert!(kind < PLAYABLE_KINDS_PER_TEAM);
        }
        assert_eq!(bots.team_bots(Team::Cat)[0].pawn, None);

        bots.clear_pawns(Some(&mut world));
        assert_eq!(world.pawn_count(), 0);
        assert_eq!(bots.len(), 3);
    }
}

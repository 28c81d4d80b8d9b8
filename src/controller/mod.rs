use tracing::{debug, error, info, warn};

use crate::balance::TeamBalancer;
use crate::bots::BotRoster;
use crate::config::MatchConfig;
use crate::constants::{died_kind_for, is_playable_kind};
use crate::error::MatchError;
use crate::objective::ObjectiveTracker;
use crate::rng::Rng;
use crate::roster::{Participant, ParticipantId, PlayerRoster};
use crate::tasks::TaskDispatcher;
use crate::timers::PhaseTimers;
use crate::types::{
    HudKind, MatchEvent, MatchOutcome, MatchPhase, MatchSummary, PlayerResult, ProgressView, Team,
    TimerSlot, Transform, Vec3,
};
use crate::world::MatchWorld;

mod lobby_flow;
mod match_flow;
mod spawn_system;

pub use self::match_flow::CageOutcome;

/// Owns one match from lobby to result. Every mutation goes through here on
/// a single thread of control; time only moves when `tick` is called.
pub struct PhaseController<W: MatchWorld> {
    config: MatchConfig,
    phase: MatchPhase,
    world: Option<W>,
    rng: Rng,

    roster: PlayerRoster,
    balancer: TeamBalancer,
    objectives: ObjectiveTracker,
    bots: BotRoster,
    tasks: TaskDispatcher,
    timers: PhaseTimers,

    events: Vec<MatchEvent>,
    outcome: Option<MatchOutcome>,
    summary: Option<MatchSummary>,
}

impl<W: MatchWorld> PhaseController<W> {
    pub fn new(config: MatchConfig, world: W) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut controller = Self {
            phase: MatchPhase::Lobby,
            world: Some(world),
            rng: Rng::new(seed),
            roster: PlayerRoster::new(),
            balancer: TeamBalancer::new(config.readiness_policy),
            objectives: ObjectiveTracker::new(config.progression_win_threshold),
            bots: BotRoster::new(),
            tasks: TaskDispatcher::new(),
            timers: PhaseTimers::new(&config),
            events: Vec::new(),
            outcome: None,
            summary: None,
            config,
        };
        for (team, count) in [
            (Team::Human, controller.config.initial_human_bots),
            (Team::Cat, controller.config.initial_cat_bots),
        ] {
            for _ in 0..count {
                controller.bots.add_bot(team, controller.world.as_mut());
            }
        }
        info!(seed, policy = ?controller.config.readiness_policy, "match controller ready");
        controller
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn roster(&self) -> &PlayerRoster {
        &self.roster
    }

    pub fn bots(&self) -> &BotRoster {
        &self.bots
    }

    pub fn objectives(&self) -> &ObjectiveTracker {
        &self.objectives
    }

    pub fn tasks(&self) -> &TaskDispatcher {
        &self.tasks
    }

    pub fn timers(&self) -> &PhaseTimers {
        &self.timers
    }

    pub fn world(&self) -> Option<&W> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut W> {
        self.world.as_mut()
    }

    /// Tears the world down. Later transitions log and abort until a world
    /// is attached again.
    pub fn detach_world(&mut self) -> Option<W> {
        self.world.take()
    }

    pub fn attach_world(&mut self, world: W) {
        self.world = Some(world);
    }

    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    pub fn summary(&self) -> Option<&MatchSummary> {
        self.summary.as_ref()
    }

    pub fn drain_events(&mut self) -> Vec<MatchEvent> {
        std::mem::take(&mut self.events)
    }

    /// Advances simulated time by one second.
    pub fn tick(&mut self) {
        for handle in self.timers.due() {
            if self.timers.fire(handle) {
                self.on_timer(handle.slot);
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
        info!(phase = ?self.phase, "match controller shut down");
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<Participant> {
        match id {
            ParticipantId::Player { id } => self.roster.get(id).map(|p| p.participant()),
            ParticipantId::Bot { controller } => {
                self.bots.find(*controller).map(|bot| Participant::Bot {
                    controller: bot.controller,
                    team: bot.team,
                })
            }
        }
    }

    pub fn progress(&self) -> ProgressView {
        let remaining = self.active_slot().map(|slot| self.timers.remaining(slot));
        self.objectives.progress(remaining)
    }

    pub fn log_progress_status(&self) {
        let progress = self.progress();
        info!(
            phase = ?self.phase,
            progression = progress.progression_percent,
            capture = progress.capture_percent,
            progression_possible = progress.progression_possible,
            capture_possible = progress.capture_possible,
            remaining = ?progress.remaining_secs,
            "match progress"
        );
    }

    fn active_slot(&self) -> Option<TimerSlot> {
        match self.phase {
            MatchPhase::Lobby => self
                .timers
                .is_armed(TimerSlot::Ready)
                .then_some(TimerSlot::Ready),
            MatchPhase::CustomizeCharacter => Some(TimerSlot::Customize),
            MatchPhase::Prepare => Some(TimerSlot::Prepare),
            MatchPhase::Gameplay => Some(TimerSlot::Gameplay),
            MatchPhase::Ended => None,
        }
    }

    fn on_timer(&mut self, slot: TimerSlot) {
        if self.world.is_none() {
            let err = MatchError::MissingWorldContext("timer");
            error!(?slot, phase = ?self.phase, %err, "timer fired without a world; transition aborted");
            return;
        }
        match slot {
            TimerSlot::Ready => self.ready_countdown(),
            TimerSlot::Customize => self.customize_countdown(),
            TimerSlot::Prepare => self.prepare_countdown(),
            TimerSlot::Gameplay => self.gameplay_countdown(),
        }
    }

    fn set_phase(&mut self, to: MatchPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        info!(?from, ?to, "phase changed");
        self.events.push(MatchEvent::PhaseChanged { from, to });
    }

    /// Loads the slot with its configured total, announces it and arms it.
    fn start_countdown(&mut self, slot: TimerSlot) {
        let total = self.config.total_for(slot);
        self.timers.set_remaining(slot, total);
        self.events.push(MatchEvent::Countdown {
            slot,
            remaining: total,
        });
        self.timers.arm(slot);
    }

    /// One second of a running countdown. Returns true once it hits zero;
    /// otherwise the slot is re-armed.
    fn step_countdown(&mut self, slot: TimerSlot) -> bool {
        let remaining = self.timers.decrement(slot);
        self.events.push(MatchEvent::Countdown { slot, remaining });
        if remaining == 0 {
            return true;
        }
        self.timers.arm(slot);
        false
    }

    fn switch_hud(&mut self, player_id: &str, hud: Option<HudKind>) {
        let Some(player) = self.roster.get_mut(player_id) else {
            return;
        };
        if player.hud == hud {
            return;
        }
        if let Some(old) = std::mem::replace(&mut player.hud, hud) {
            self.events.push(MatchEvent::RemoveHud {
                player_id: player_id.to_string(),
                hud: old,
            });
        }
        if let Some(new) = hud {
            self.events.push(MatchEvent::AttachHud {
                player_id: player_id.to_string(),
                hud: new,
            });
        }
    }

    fn require_phase(&self, operation: &'static str, allowed: &[MatchPhase]) -> Result<(), MatchError> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }
        Err(MatchError::WrongPhase {
            operation,
            phase: self.phase,
        })
    }

    fn push_progress(&mut self) {
        let progress = self.progress();
        self.events.push(MatchEvent::ProgressUpdated { progress });
    }
}


#[cfg(test)]
mod tests {
    use super::testkit::*;
    use super::*;
    use crate::sim::SimWorld;
    use crate::types::WinReason;

    #[test]
    fn full_timers_walk_every_phase_in_order() {
        let mut controller = lobby(2, quick_config(), SimWorld::furnished(3));
        controller.drain_events();
        for id in controller.roster().ids() {
            controller.set_player_ready(&id, true);
        }

        let ticks = tick_until(&mut controller, MatchPhase::Ended, 64);
        // ready + customize + prepare + gameplay seconds
        assert_eq!(ticks, 2 + 2 + 2 + 5);

        let events = controller.drain_events();
        assert_eq!(
            phase_changes(&events),
            vec![
                (MatchPhase::Lobby, MatchPhase::CustomizeCharacter),
                (MatchPhase::CustomizeCharacter, MatchPhase::Prepare),
                (MatchPhase::Prepare, MatchPhase::Gameplay),
                (MatchPhase::Gameplay, MatchPhase::Ended),
            ]
        );
        assert_eq!(
            controller.outcome(),
            Some(MatchOutcome {
                winner: Team::Cat,
                reason: WinReason::TimeoutTie,
            })
        );
        let summary = controller.summary().expect("summary retained after end");
        assert_eq!(summary.elapsed_secs, 5);
        assert_eq!(summary.players.len(), 2);
    }

    #[test]
    fn ended_is_terminal_until_restart() {
        let mut controller = lobby(2, quick_config(), SimWorld::furnished(3));
        into_gameplay(&mut controller);
        tick_until(&mut controller, MatchPhase::Ended, 16);
        controller.drain_events();

        for _ in 0..10 {
            controller.tick();
        }
        assert_eq!(controller.phase(), MatchPhase::Ended);
        assert!(!controller.check_if_game_end());
        assert!(controller.drain_events().is_empty());
    }

    #[test]
    fn restart_resets_timers_flags_and_phase() {
        let config = quick_config();
        let mut controller = lobby(2, config.clone(), SimWorld::furnished(3));
        into_gameplay(&mut controller);
        controller.tick();
        tick_until(&mut controller, MatchPhase::Ended, 16);
        assert!(controller.world().is_some_and(|w| w.pawn_count() > 0));

        controller.restart_lobby();
        assert_eq!(controller.phase(), MatchPhase::Lobby);
        for slot in TimerSlot::ALL {
            assert_eq!(controller.timers().remaining(slot), config.total_for(slot));
            assert!(!controller.timers().is_armed(slot));
        }
        assert!(controller.roster().iter().all(|p| !p.is_ready && !p.is_died));
        assert!(controller.roster().iter().all(|p| p.hud == Some(HudKind::Lobby)));
        assert_eq!(controller.outcome(), None);
        assert!(controller.summary().is_none());
        assert_eq!(controller.world().map(|w| w.pawn_count()), Some(0));
        assert_eq!(controller.objectives().capture().total_targets, 0);
    }

    #[test]
    fn restart_mid_match_returns_to_lobby() {
        let mut controller = lobby(2, quick_config(), SimWorld::furnished(3));
        into_gameplay(&mut controller);
        controller.drain_events();

        controller.restart_lobby();
        let events = controller.drain_events();
        assert_eq!(
            phase_changes(&events),
            vec![(MatchPhase::Gameplay, MatchPhase::Lobby)]
        );
        for _ in 0..10 {
            controller.tick();
        }
        assert_eq!(controller.phase(), MatchPhase::Lobby);
    }

    #[test]
    fn timer_without_world_aborts_only_that_transition() {
        let mut controller = lobby(2, quick_config(), SimWorld::furnished(3));
        for id in controller.roster().ids() {
            controller.set_player_ready(&id, true);
        }
        tick_until(&mut controller, MatchPhase::CustomizeCharacter, 8);

        let world = controller.detach_world().expect("world attached");
        for _ in 0..5 {
            controller.tick();
        }
        assert_eq!(controller.phase(), MatchPhase::CustomizeCharacter);

        controller.attach_world(world);
        controller.restart_lobby();
        assert_eq!(controller.phase(), MatchPhase::Lobby);
    }

    #[test]
    fn progress_reports_active_countdown() {
        let mut controller = lobby(2, quick_config(), SimWorld::furnished(3));
        assert_eq!(controller.progress().remaining_secs, None);
        into_gameplay(&mut controller);
        assert_eq!(controller.progress().remaining_secs, Some(5));
        controller.tick();
        assert_eq!(controller.progress().remaining_secs, Some(4));
        controller.log_progress_status();
    }

    #[test]
    fn initial_bots_are_added_at_construction() {
        let config = MatchConfig {
            initial_human_bots: 2,
            initial_cat_bots: 1,
            ..quick_config()
        };
        let controller = PhaseController::new(config, SimWorld::new(1));
        assert_eq!(controller.bots().counts().human, 2);
        assert_eq!(controller.bots().counts().cat, 1);
        assert_eq!(controller.world().map(|w| w.controller_count()), Some(3));
    }

    #[test]
    fn participant_resolves_players_and_bots() {
        let config = MatchConfig {
            initial_cat_bots: 1,
            ..quick_config()
        };
        let mut controller = lobby(1, config, SimWorld::new(1));
        let bot = controller.bots().agents(Team::Cat)[0];
        assert_eq!(
            controller
                .participant(&ParticipantId::Bot { controller: bot })
                .map(|p| p.team()),
            Some(Team::Cat)
        );
        assert_eq!(
            controller
                .participant(&ParticipantId::player("player_0"))
                .map(|p| p.is_player()),
            Some(true)
        );
        assert_eq!(controller.participant(&ParticipantId::player("nobody")), None);
        controller.drain_events();
    }
}

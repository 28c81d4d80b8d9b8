use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CageOutcome {
    /// A player target was captured and counted.
    Captured,
    /// An AI decoy was caged; nothing is counted.
    DecoyCaught,
}

impl<W: MatchWorld> PhaseController<W> {
    pub(super) fn customize_countdown(&mut self) {
        if self.step_countdown(TimerSlot::Customize) {
            self.start_prepare();
        }
    }

    fn start_prepare(&mut self) {
        if self.world.is_none() {
            let err = MatchError::MissingWorldContext("start_prepare");
            error!(%err, "prepare aborted");
            return;
        }
        self.set_phase(MatchPhase::Prepare);
        for player_id in self.roster.ids() {
            self.switch_hud(&player_id, None);
        }
        self.setup_map_items();
        self.setup_env_objects();
        self.setup_players();
        self.setup_bots();
        self.start_countdown(TimerSlot::Prepare);
    }

    pub(super) fn prepare_countdown(&mut self) {
        if self.step_countdown(TimerSlot::Prepare) {
            self.start_gameplay();
        }
    }

    fn start_gameplay(&mut self) {
        self.set_phase(MatchPhase::Gameplay);
        self.report_objective_feasibility();
        self.start_countdown(TimerSlot::Gameplay);
        self.log_progress_status();
        // contributions made while preparing count from the first second
        self.check_if_game_end();
    }

    fn report_objective_feasibility(&self) {
        let progression = self.objectives.progression().possible;
        let capture = self.objectives.capture().possible;
        match (progression, capture) {
            (false, false) => error!(
                "both objectives are impossible; the match can only end on time"
            ),
            (false, true) => warn!("progression objective is impossible"),
            (true, false) => warn!("capture objective is impossible"),
            (true, true) => {}
        }
    }

    pub(super) fn gameplay_countdown(&mut self) {
        let remaining = self.timers.decrement(TimerSlot::Gameplay);
        self.events.push(MatchEvent::Countdown {
            slot: TimerSlot::Gameplay,
            remaining,
        });
        if !self.check_if_game_end() && remaining > 0 {
            self.timers.arm(TimerSlot::Gameplay);
        }
    }

    /// Evaluates the win rules and ends the match on the first that holds.
    /// Only meaningful during gameplay; otherwise returns false.
    pub fn check_if_game_end(&mut self) -> bool {
        if self.phase != MatchPhase::Gameplay {
            return false;
        }
        let time_expired = self.timers.remaining(TimerSlot::Gameplay) == 0;
        let eliminated = self.capture_team_eliminated();
        match self.objectives.evaluate(eliminated, time_expired) {
            Some(outcome) => {
                self.end_gameplay(outcome);
                true
            }
            None => false,
        }
    }

    fn capture_team_eliminated(&self) -> bool {
        let mut capture_players = self
            .roster
            .iter()
            .filter(|p| p.team == Team::CAPTURE)
            .peekable();
        capture_players.peek().is_some() && capture_players.all(|p| p.is_died)
    }

    fn end_gameplay(&mut self, outcome: MatchOutcome) {
        if self.phase == MatchPhase::Ended {
            return;
        }
        self.timers.cancel_all();
        self.objectives.freeze();
        self.outcome = Some(outcome);
        self.set_phase(MatchPhase::Ended);

        let team_a_percent = self.objectives.progression().current_percentage;
        let team_b_percent = self.objectives.capture().current_percentage;
        for player_id in self.roster.ids() {
            let team = self.roster.get(&player_id).map(|p| p.team).unwrap_or_default();
            self.switch_hud(&player_id, Some(HudKind::End));
            self.events.push(MatchEvent::MatchResult {
                player_id,
                did_win: team == outcome.winner,
                team_a_percent,
                team_b_percent,
            });
        }
        self.events.push(MatchEvent::MatchEnded { outcome });
        self.summary = Some(self.build_summary(outcome));
        info!(
            winner = ?outcome.winner,
            reason = ?outcome.reason,
            team_a_percent,
            team_b_percent,
            "match ended"
        );
    }

    fn build_summary(&self, outcome: MatchOutcome) -> MatchSummary {
        let elapsed_secs = self
            .config
            .gameplay_secs
            .saturating_sub(self.timers.remaining(TimerSlot::Gameplay));
        MatchSummary {
            outcome,
            progression_percent: self.objectives.progression().current_percentage,
            capture_percent: self.objectives.capture().current_percentage,
            elapsed_secs,
            players: self
                .roster
                .iter()
                .map(|p| PlayerResult {
                    player_id: p.id.clone(),
                    name: p.name.clone(),
                    team: p.team,
                    won: p.team == outcome.winner,
                    died: p.is_died,
                    captured: p.is_captured,
                })
                .collect(),
        }
    }

    pub fn register_contributor(&mut self, object_id: &str) {
        self.objectives.register_contributor(object_id);
    }

    /// Called by a pushable when it is destroyed or crosses its threshold.
    /// Returns whether the weight was counted.
    pub fn contribute_progression(&mut self, object_id: &str, weight: f32) -> bool {
        if let Err(err) = self.require_phase(
            "contribute_progression",
            &[MatchPhase::Prepare, MatchPhase::Gameplay],
        ) {
            debug!(object_id, %err, "contribution ignored");
            return false;
        }
        if !self.objectives.contribute_progression(object_id, weight) {
            return false;
        }
        self.push_progress();
        self.check_if_game_end();
        true
    }

    pub fn contribute_capture(&mut self, delta: i32) -> bool {
        if let Err(err) = self.require_phase(
            "contribute_capture",
            &[MatchPhase::Prepare, MatchPhase::Gameplay],
        ) {
            debug!(delta, %err, "capture ignored");
            return false;
        }
        if !self.objectives.contribute_capture(delta) {
            return false;
        }
        self.push_progress();
        self.check_if_game_end();
        true
    }

    /// Marks the player dead, swaps in a died body and re-checks the match.
    pub fn on_player_death(&mut self, player_id: &str, at: Transform) -> bool {
        if let Err(err) = self.require_phase(
            "on_player_death",
            &[MatchPhase::Prepare, MatchPhase::Gameplay],
        ) {
            debug!(player_id, %err, "death ignored");
            return false;
        }
        let Some(player) = self.roster.get_mut(player_id) else {
            warn!(player_id, "death reported for unknown player");
            return false;
        };
        if player.is_died {
            return false;
        }
        player.is_died = true;
        player.holding = None;
        let team = player.team;
        self.release_holds_on(&ParticipantId::player(player_id));
        info!(player_id, ?team, "player died");

        self.spawn_died_body(player_id, team, at);
        self.check_if_game_end();
        true
    }

    /// A capture-team player picks up a progression-team member.
    pub fn hold_player(&mut self, holder_id: &str, target: &ParticipantId) -> bool {
        match self.try_hold(holder_id, target) {
            Ok(()) => {
                debug!(holder_id, ?target, "hold started");
                true
            }
            Err(err) => {
                debug!(holder_id, ?target, %err, "hold rejected");
                false
            }
        }
    }

    fn try_hold(&mut self, holder_id: &str, target: &ParticipantId) -> Result<(), MatchError> {
        self.require_phase("hold_player", &[MatchPhase::Gameplay])?;
        let holder = self
            .roster
            .get(holder_id)
            .ok_or_else(|| MatchError::UnknownPlayer(holder_id.to_string()))?;
        if holder.team != Team::CAPTURE || holder.is_died || holder.holding.is_some() {
            return Err(MatchError::ConstraintViolation {
                player_id: holder_id.to_string(),
                team: holder.team,
            });
        }
        let participant = self.participant(target).ok_or_else(|| match target {
            ParticipantId::Player { id } => MatchError::UnknownPlayer(id.clone()),
            ParticipantId::Bot { controller } => {
                MatchError::UnknownPlayer(format!("bot controller {}", controller.0))
            }
        })?;
        let unavailable = match &participant {
            Participant::Player { id, .. } => self
                .roster
                .get(id)
                .is_some_and(|p| p.is_died || p.is_captured),
            Participant::Bot { .. } => false,
        };
        if participant.team() != Team::PROGRESSION
            || unavailable
            || self.roster.holder_of(target).is_some()
        {
            return Err(MatchError::ConstraintViolation {
                player_id: holder_id.to_string(),
                team: participant.team(),
            });
        }
        if let Some(holder) = self.roster.get_mut(holder_id) {
            holder.holding = Some(target.clone());
        }
        Ok(())
    }

    pub fn release_hold(&mut self, holder_id: &str) -> bool {
        self.roster
            .get_mut(holder_id)
            .and_then(|p| p.holding.take())
            .is_some()
    }

    /// Puts whatever the holder carries into a cage. Player targets count
    /// once toward the capture objective; AI decoys count for nothing.
    pub fn cage_held(&mut self, holder_id: &str) -> Option<CageOutcome> {
        if let Err(err) = self.require_phase("cage_held", &[MatchPhase::Gameplay]) {
            debug!(holder_id, %err, "cage ignored");
            return None;
        }
        let target = self.roster.get_mut(holder_id)?.holding.take()?;
        match target {
            ParticipantId::Player { id } => {
                let Some(captured) = self.roster.get_mut(&id) else {
                    return None;
                };
                captured.is_captured = true;
                info!(player_id = %id, by = holder_id, "player caged");
                self.events.push(MatchEvent::PlayerCaptured {
                    player_id: id,
                    by: holder_id.to_string(),
                });
                self.contribute_capture(1);
                Some(CageOutcome::Captured)
            }
            ParticipantId::Bot { controller } => {
                info!(controller = controller.0, by = holder_id, "decoy caged");
                Some(CageOutcome::DecoyCaught)
            }
        }
    }

    fn release_holds_on(&mut self, target: &ParticipantId) {
        for player in self.roster.iter_mut() {
            if player.holding.as_ref() == Some(target) {
                player.holding = None;
            }
        }
    }

    /// Settles holds and the capture objective for a player leaving a
    /// running match.
    pub(super) fn settle_departure(&mut self, player_id: &str) {
        let Some(player) = self.roster.get(player_id) else {
            return;
        };
        let team = player.team;
        let captured = player.is_captured;
        let pawn = player.pawn;
        self.release_holds_on(&ParticipantId::player(player_id));

        if team == Team::PROGRESSION && !self.objectives.is_frozen() {
            if captured {
                self.objectives.contribute_capture(-1);
            }
            self.objectives.release_target();
            self.push_progress();
            info!(player_id, captured, "capture target left the match");
        }
        if let (Some(pawn), Some(world)) = (pawn, self.world.as_mut()) {
            world.destroy_pawn(pawn);
        }
    }

    /// Queues a point of interest for idle capture-team bots.
    pub fn add_global_search_task(&mut self, location: Vec3) -> usize {
        let agents = self.bots.agents(Team::CAPTURE);
        match self.world.as_mut() {
            Some(world) => self.tasks.add_global_search_task(location, &agents, world),
            None => {
                let err = MatchError::MissingWorldContext("add_global_search_task");
                error!(%err, "search task queued but not dispatched");
                self.tasks.enqueue(location);
                0
            }
        }
    }

    pub fn assign_global_tasks(&mut self) -> usize {
        let agents = self.bots.agents(Team::CAPTURE);
        match self.world.as_mut() {
            Some(world) => self.tasks.assign_global_tasks(&agents, world),
            None => {
                let err = MatchError::MissingWorldContext("assign_global_tasks");
                error!(%err, "task assignment skipped");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CageOutcome;
    use crate::config::{MatchConfig, ReadinessPolicy};
    use crate::controller::testkit::*;
    use crate::controller::PhaseController;
    use crate::roster::ParticipantId;
    use crate::sim::SimWorld;
    use crate::types::{
        AgentState, MatchEvent, MatchOutcome, MatchPhase, Team, Transform, Vec3, WinReason,
    };
    use crate::world::Blackboard;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    fn quarters_world() -> SimWorld {
        SimWorld::new(1)
            .with_pushable("a", 25.0)
            .with_pushable("b", 25.0)
            .with_pushable("c", 25.0)
            .with_pushable("d", 25.0)
    }

    fn cage(controller: &mut PhaseController<SimWorld>, holder: &str, target: &str) -> Option<CageOutcome> {
        assert!(controller.hold_player(holder, &ParticipantId::player(target)));
        controller.cage_held(holder)
    }

    #[test]
    fn progression_threshold_fires_one_win() {
        let mut controller = lobby(2, quick_config(), quarters_world());
        into_gameplay(&mut controller);
        controller.drain_events();

        assert!(controller.contribute_progression("a", 25.0));
        assert!(controller.contribute_progression("b", 25.0));
        assert_eq!(controller.phase(), MatchPhase::Gameplay);
        assert!(controller.contribute_progression("c", 25.0));
        assert!(!controller.contribute_progression("a", 25.0));
        assert!(!controller.contribute_progression("d", 25.0));

        let events = controller.drain_events();
        assert_eq!(match_ended_count(&events), 1);
        assert_eq!(
            controller.outcome(),
            Some(MatchOutcome {
                winner: Team::Cat,
                reason: WinReason::ProgressionReached,
            })
        );
        assert!(events.iter().any(|e| matches!(
            e,
            MatchEvent::MatchResult { player_id, did_win: true, .. } if player_id == "player_0"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            MatchEvent::MatchResult { player_id, did_win: false, .. } if player_id == "player_1"
        )));
        assert_eq!(controller.objectives().progression().current_weight, 75.0);
    }

    #[test]
    fn caging_three_targets_wins_for_capture_team() {
        let mut controller = lobby(5, quick_config(), SimWorld::furnished(1));
        into_gameplay(&mut controller);
        assert_eq!(controller.objectives().capture().total_targets, 3);

        let steps = [("player_1", "player_0", 0.33), ("player_1", "player_2", 0.67), ("player_3", "player_4", 1.0)];
        for (holder, target, want) in steps {
            assert_eq!(cage(&mut controller, holder, target), Some(CageOutcome::Captured));
            assert!(approx_eq(controller.objectives().capture().current_percentage, want));
        }
        assert_eq!(
            controller.outcome(),
            Some(MatchOutcome {
                winner: Team::Human,
                reason: WinReason::TargetsCaptured,
            })
        );
        let summary = controller.summary().expect("summary retained");
        assert_eq!(summary.players.iter().filter(|p| p.captured).count(), 3);
    }

    #[test]
    fn hold_rules_follow_team_roles() {
        let config = MatchConfig {
            initial_cat_bots: 1,
            ..quick_config()
        };
        let mut controller = lobby(4, config, SimWorld::furnished(1));
        into_gameplay(&mut controller);
        let decoy = ParticipantId::Bot {
            controller: controller.bots().agents(Team::Cat)[0],
        };

        assert!(!controller.hold_player("player_0", &ParticipantId::player("player_2")));
        assert!(!controller.hold_player("player_1", &ParticipantId::player("player_3")));
        assert!(controller.hold_player("player_1", &ParticipantId::player("player_0")));
        assert!(!controller.hold_player("player_3", &ParticipantId::player("player_0")));
        assert!(!controller.hold_player("player_1", &ParticipantId::player("player_2")));
        assert!(controller.release_hold("player_1"));
        assert!(!controller.release_hold("player_1"));
        assert_eq!(controller.cage_held("player_1"), None);

        assert!(controller.hold_player("player_3", &decoy));
        assert_eq!(controller.cage_held("player_3"), Some(CageOutcome::DecoyCaught));
        assert_eq!(controller.objectives().capture().captured_count, 0);
    }

    #[test]
    fn dead_capture_team_hands_progression_the_win() {
        let mut controller = lobby(2, quick_config(), SimWorld::furnished(1));
        into_gameplay(&mut controller);
        assert!(controller.on_player_death("player_1", Transform::default()));
        assert_eq!(
            controller.outcome(),
            Some(MatchOutcome {
                winner: Team::Cat,
                reason: WinReason::CaptureTeamEliminated,
            })
        );
    }

    #[test]
    fn empty_capture_team_is_not_an_elimination() {
        let config = MatchConfig {
            readiness_policy: ReadinessPolicy::DebugSinglePlayer,
            ..quick_config()
        };
        let mut controller = lobby(1, config, SimWorld::furnished(1));
        into_gameplay(&mut controller);
        assert_eq!(controller.phase(), MatchPhase::Gameplay);
        assert!(!controller.check_if_game_end());
    }

    #[test]
    fn both_objectives_impossible_runs_to_timeout() {
        let config = MatchConfig {
            readiness_policy: ReadinessPolicy::DebugSinglePlayer,
            ..quick_config()
        };
        let mut controller = lobby(1, config, SimWorld::new(1));
        assert!(controller.switch_player_team("player_0", Team::Human));
        into_gameplay(&mut controller);
        assert!(!controller.objectives().progression().possible);
        assert!(!controller.objectives().capture().possible);

        let ticks = tick_until(&mut controller, MatchPhase::Ended, 16);
        assert_eq!(ticks, 5);
        assert_eq!(
            controller.outcome(),
            Some(MatchOutcome {
                winner: Team::Cat,
                reason: WinReason::TimeoutTie,
            })
        );
    }

    #[test]
    fn captured_target_leaving_takes_its_capture_along() {
        let mut controller = lobby(5, quick_config(), SimWorld::furnished(1));
        into_gameplay(&mut controller);
        cage(&mut controller, "player_1", "player_0");

        assert!(controller.disconnect_player("player_0"));
        assert_eq!(controller.objectives().capture().captured_count, 0);
        assert_eq!(controller.objectives().capture().total_targets, 2);

        assert!(controller.disconnect_player("player_2"));
        assert_eq!(controller.objectives().capture().total_targets, 1);
        assert_eq!(controller.phase(), MatchPhase::Gameplay);

        cage(&mut controller, "player_3", "player_4");
        assert_eq!(controller.outcome().map(|o| o.winner), Some(Team::Human));
    }

    #[test]
    fn uncaptured_target_leaving_can_finish_the_match() {
        let mut controller = lobby(5, quick_config(), SimWorld::furnished(1));
        into_gameplay(&mut controller);
        cage(&mut controller, "player_1", "player_0");
        cage(&mut controller, "player_1", "player_2");
        assert_eq!(controller.phase(), MatchPhase::Gameplay);

        assert!(controller.disconnect_player("player_4"));
        assert_eq!(
            controller.outcome(),
            Some(MatchOutcome {
                winner: Team::Human,
                reason: WinReason::TargetsCaptured,
            })
        );
    }

    #[test]
    fn holder_leaving_frees_the_target() {
        let mut controller = lobby(4, quick_config(), SimWorld::furnished(1));
        into_gameplay(&mut controller);
        assert!(controller.hold_player("player_1", &ParticipantId::player("player_0")));
        assert!(controller.disconnect_player("player_1"));
        assert!(controller.hold_player("player_3", &ParticipantId::player("player_0")));
    }

    #[test]
    fn search_tasks_go_to_capture_bots_only() {
        let config = MatchConfig {
            initial_human_bots: 1,
            initial_cat_bots: 1,
            ..quick_config()
        };
        let mut controller = lobby(2, config, SimWorld::furnished(1));
        into_gameplay(&mut controller);
        let human_bot = controller.bots().agents(Team::Human)[0];
        let cat_bot = controller.bots().agents(Team::Cat)[0];

        let noise = Vec3::new(4.0, 2.0, 0.0);
        assert_eq!(controller.add_global_search_task(noise), 1);
        assert_eq!(controller.add_global_search_task(Vec3::default()), 0);
        let world = controller.world().expect("world attached");
        assert_eq!(world.target_location(human_bot), Some(noise));
        assert_eq!(world.agent_state(human_bot), Some(AgentState::Search));
        assert_eq!(world.target_location(cat_bot), None);
        assert_eq!(controller.tasks().pending().len(), 1);

        if let Some(world) = controller.world_mut() {
            world.set_agent_state(human_bot, AgentState::Idle);
        }
        assert_eq!(controller.assign_global_tasks(), 1);
        assert!(controller.tasks().pending().is_empty());

        controller.add_global_search_task(noise);
        controller.restart_lobby();
        assert!(controller.tasks().pending().is_empty());
    }

    #[test]
    fn contributions_outside_play_are_ignored() {
        let mut controller = lobby(2, quick_config(), quarters_world());
        assert!(!controller.contribute_progression("a", 25.0));
        assert!(!controller.contribute_capture(1));
        assert!(!controller.on_player_death("player_1", Transform::default()));

        into_gameplay(&mut controller);
        assert!(controller.on_player_death("player_1", Transform::default()));
        assert_eq!(controller.phase(), MatchPhase::Ended);
        assert!(!controller.contribute_progression("a", 25.0));
        assert_eq!(controller.objectives().progression().current_weight, 0.0);
    }

    #[test]
    fn prepare_contributions_are_judged_when_gameplay_starts() {
        let mut controller = lobby(2, quick_config(), quarters_world());
        for id in controller.roster().ids() {
            controller.set_player_ready(&id, true);
        }
        tick_until(&mut controller, MatchPhase::Prepare, 8);
        for id in ["a", "b", "c"] {
            assert!(controller.contribute_progression(id, 25.0));
        }
        assert_eq!(controller.phase(), MatchPhase::Prepare);
        controller.drain_events();

        tick_until(&mut controller, MatchPhase::Ended, 8);
        let events = controller.drain_events();
        assert_eq!(
            phase_changes(&events),
            vec![
                (MatchPhase::Prepare, MatchPhase::Gameplay),
                (MatchPhase::Gameplay, MatchPhase::Ended),
            ]
        );
        assert_eq!(match_ended_count(&events), 1);
    }
}

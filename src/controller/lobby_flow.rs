use super::*;

const BOT_PHASES: &[MatchPhase] = &[MatchPhase::Lobby, MatchPhase::Prepare, MatchPhase::Gameplay];

impl<W: MatchWorld> PhaseController<W> {
    pub fn join_player(&mut self, player_id: &str, name: &str) -> bool {
        if let Err(err) = self.require_phase("join_player", &[MatchPhase::Lobby]) {
            warn!(player_id, %err, "join rejected");
            return false;
        }
        if !self.roster.join(player_id, name) {
            warn!(player_id, "player already connected");
            return false;
        }
        self.balancer.auto_assign_teams(&mut self.roster);
        self.switch_hud(player_id, Some(HudKind::Lobby));
        info!(player_id, name, host = self.roster.is_host(player_id), "player joined");
        self.broadcast_lobby();
        true
    }

    /// Flips the ready flag; starts the ready countdown once the policy holds.
    pub fn set_player_ready(&mut self, player_id: &str, ready: bool) -> bool {
        if let Err(err) = self.require_phase("set_player_ready", &[MatchPhase::Lobby]) {
            debug!(player_id, %err, "ready ignored");
            return false;
        }
        let Some(player) = self.roster.get_mut(player_id) else {
            warn!(player_id, "ready from unknown player");
            return false;
        };
        player.is_ready = ready;
        debug!(player_id, ready, "ready changed");
        self.broadcast_lobby();
        self.refresh_ready_countdown();
        true
    }

    /// Removes the player. During a running match the capture objective and
    /// any hold involving the player are settled first.
    pub fn disconnect_player(&mut self, player_id: &str) -> bool {
        if !self.roster.contains(player_id) {
            return false;
        }
        if matches!(self.phase, MatchPhase::Prepare | MatchPhase::Gameplay) {
            self.settle_departure(player_id);
        }
        self.roster.remove(player_id);
        info!(player_id, host = ?self.roster.host_id(), "player left");
        self.broadcast_lobby();
        match self.phase {
            MatchPhase::Lobby => self.refresh_ready_countdown(),
            MatchPhase::Gameplay => {
                self.check_if_game_end();
            }
            _ => {}
        }
        true
    }

    pub fn assign_player_to_team(&mut self, player_id: &str, team: Team) -> bool {
        if let Err(err) = self.require_phase("assign_player_to_team", &[MatchPhase::Lobby]) {
            warn!(player_id, %err, "assignment rejected");
            return false;
        }
        let accepted = self
            .balancer
            .assign_player_to_team(&mut self.roster, player_id, team);
        if accepted {
            self.broadcast_lobby();
            self.refresh_ready_countdown();
        }
        accepted
    }

    pub fn switch_player_team(&mut self, player_id: &str, new_team: Team) -> bool {
        if let Err(err) = self.require_phase("switch_player_team", &[MatchPhase::Lobby]) {
            warn!(player_id, %err, "switch rejected");
            return false;
        }
        let accepted = self
            .balancer
            .switch_player_team(&mut self.roster, player_id, new_team);
        if accepted {
            info!(player_id, team = ?new_team, "player switched team");
            self.broadcast_lobby();
            self.refresh_ready_countdown();
        }
        accepted
    }

    pub fn auto_assign_teams(&mut self) {
        self.balancer.auto_assign_teams(&mut self.roster);
        self.broadcast_lobby();
    }

    pub fn get_team_player_count(&self, team: Team) -> usize {
        self.balancer.get_team_player_count(&self.roster, team)
    }

    pub fn check_ready_to_start_game(&self) -> bool {
        self.balancer.check_ready_to_start_game(&self.roster)
    }

    /// Records the pawn sub-type the player will spawn as.
    pub fn choose_character(&mut self, player_id: &str, kind: u8) -> bool {
        if let Err(err) = self.require_phase("choose_character", &[MatchPhase::CustomizeCharacter]) {
            debug!(player_id, %err, "character choice ignored");
            return false;
        }
        if !is_playable_kind(kind) {
            warn!(player_id, kind, "unknown character kind");
            return false;
        }
        let Some(player) = self.roster.get_mut(player_id) else {
            return false;
        };
        if !player.team.is_playable() {
            return false;
        }
        player.character_kind = Some(kind);
        debug!(player_id, kind, "character chosen");
        true
    }

    pub fn add_bot(&mut self, team: Team) -> bool {
        if let Err(err) = self.require_phase("add_bot", BOT_PHASES) {
            warn!(?team, %err, "bot add rejected");
            return false;
        }
        if !self.bots.add_bot(team, self.world.as_mut()) {
            return false;
        }
        if matches!(self.phase, MatchPhase::Prepare | MatchPhase::Gameplay) {
            self.setup_bots();
        }
        self.broadcast_lobby();
        true
    }

    /// Compatibility shim over `[human_bots..., cat_bots...]`, 0-based.
    pub fn remove_bot(&mut self, flat_index: usize) -> bool {
        if let Err(err) = self.require_phase("remove_bot", BOT_PHASES) {
            warn!(flat_index, %err, "bot removal rejected");
            return false;
        }
        let removed = self.bots.remove_bot(flat_index, self.world.as_mut());
        if removed {
            self.broadcast_lobby();
        }
        removed
    }

    pub fn remove_bot_at(&mut self, team: Team, local_index: usize) -> bool {
        if let Err(err) = self.require_phase("remove_bot", BOT_PHASES) {
            warn!(?team, local_index, %err, "bot removal rejected");
            return false;
        }
        let removed = self
            .bots
            .remove_bot_at(team, local_index, self.world.as_mut());
        if removed {
            self.broadcast_lobby();
        }
        removed
    }

    /// Back to a fresh lobby from any phase. Rosters survive; everything the
    /// last round produced is cleared and the world gets its layout back.
    pub fn restart_lobby(&mut self) {
        let ready_running = self.timers.is_armed(TimerSlot::Ready);
        self.timers.cancel_all();
        self.timers.reset(&self.config);
        if ready_running {
            self.events.push(MatchEvent::CountdownCancelled {
                slot: TimerSlot::Ready,
            });
        }
        self.objectives.reset();
        self.clear_spawned();
        match self.world.as_mut() {
            Some(world) => {
                world.reset_round();
                self.bots.reset_agent_states(world);
            }
            None => warn!("no world to reset for the next round"),
        }
        self.roster.reset_round_flags();
        self.tasks.clear();
        self.outcome = None;
        self.summary = None;

        self.set_phase(MatchPhase::Lobby);
        self.balancer.auto_assign_teams(&mut self.roster);
        for player_id in self.roster.ids() {
            self.switch_hud(&player_id, Some(HudKind::Lobby));
        }
        info!(players = self.roster.len(), bots = self.bots.len(), "lobby restarted");
        self.broadcast_lobby();
    }

    pub(super) fn broadcast_lobby(&mut self) {
        self.events.push(MatchEvent::LobbyUpdated {
            players: self.roster.lobby_view(),
            host_id: self.roster.host_id().map(str::to_string),
            bots: self.bots.counts(),
        });
    }

    /// Starts the ready countdown when the policy holds, cancels it when it
    /// stopped holding.
    fn refresh_ready_countdown(&mut self) {
        if self.phase != MatchPhase::Lobby {
            return;
        }
        let ready = self.check_ready_to_start_game();
        let running = self.timers.is_armed(TimerSlot::Ready);
        if ready && !running {
            info!(players = self.roster.len(), "readiness reached, countdown started");
            self.start_countdown(TimerSlot::Ready);
        } else if !ready && running {
            self.cancel_ready_countdown();
        }
    }

    fn cancel_ready_countdown(&mut self) {
        self.timers.cancel(TimerSlot::Ready);
        self.timers
            .set_remaining(TimerSlot::Ready, self.config.total_for(TimerSlot::Ready));
        self.events.push(MatchEvent::CountdownCancelled {
            slot: TimerSlot::Ready,
        });
        info!("readiness lost, countdown cancelled");
    }

    pub(super) fn ready_countdown(&mut self) {
        if !self.check_ready_to_start_game() {
            self.cancel_ready_countdown();
            return;
        }
        if self.step_countdown(TimerSlot::Ready) {
            self.start_customize();
        }
    }

    fn start_customize(&mut self) {
        self.set_phase(MatchPhase::CustomizeCharacter);
        for player_id in self.roster.ids() {
            let team = self.roster.get(&player_id).map(|p| p.team).unwrap_or_default();
            if let Some(player) = self.roster.get_mut(&player_id) {
                player.is_ready = false;
            }
            self.switch_hud(&player_id, HudKind::customize_for(team));
        }
        self.start_countdown(TimerSlot::Customize);
    }
}

use super::*;

impl<W: MatchWorld> PhaseController<W> {
    /// Each item survives a `1..=100` roll at or under the remain percentage.
    pub(super) fn setup_map_items(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let keep = self.config.item_remain_percentage;
        let items = world.item_ids();
        let mut eliminated = 0;
        for item_id in &items {
            if self.rng.roll_percent() > keep {
                world.eliminate_item(item_id);
                eliminated += 1;
            }
        }
        info!(total = items.len(), eliminated, "map items randomised");
    }

    /// Randomises env objects that fail their keep roll, then totals the
    /// pushables that are left as the progression objective.
    pub(super) fn setup_env_objects(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let keep = self.config.env_keep_percentage;
        let mut randomized = 0;
        for object in world.env_objects() {
            if self.rng.roll_percent() > keep {
                world.randomize_env_object(&object.id);
                randomized += 1;
            }
        }
        let eligible: Vec<(String, f32)> = world
            .env_objects()
            .into_iter()
            .filter_map(|object| object.weight.map(|weight| (object.id, weight)))
            .collect();
        info!(randomized, pushables = eligible.len(), "env objects randomised");

        let setup = self
            .objectives
            .setup_progression_objective(eligible.iter().map(|(id, weight)| (id.as_str(), *weight)));
        if let Err(err) = setup {
            debug!(%err, "match continues without a progression win");
        }
    }

    /// Spawns every team member, sizes the capture objective from the
    /// progression team and swaps in the gameplay HUDs.
    pub(super) fn setup_players(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let mut next_spawn = [0usize; 2];
        let mut targets = 0;
        for player in self.roster.iter_mut() {
            let lane = match player.team {
                Team::Human => 0,
                Team::Cat => 1,
                Team::None => continue,
            };
            if player.team == Team::PROGRESSION {
                targets += 1;
            }
            let kind = player.character_kind.unwrap_or(0);
            let at = world.spawn_point(player.team, next_spawn[lane]);
            next_spawn[lane] += 1;
            match world.spawn_pawn(player.team, kind, at) {
                Some(pawn) => {
                    world.possess_player(&player.id, pawn);
                    player.pawn = Some(pawn);
                }
                None => {
                    let err = MatchError::Configuration(format!(
                        "no pawn class for {:?} kind {kind}",
                        player.team
                    ));
                    error!(player_id = %player.id, %err, "player spawn skipped");
                }
            }
        }
        if let Err(err) = self.objectives.setup_capture_objective(targets) {
            debug!(%err, "match continues without a capture win");
        }

        for player_id in self.roster.ids() {
            let team = self.roster.get(&player_id).map(|p| p.team).unwrap_or_default();
            self.switch_hud(&player_id, HudKind::gameplay_for(team));
        }
    }

    pub(super) fn setup_bots(&mut self) {
        let Some(world) = self.world.as_mut() else {
            return;
        };
        let spawned = self.bots.spawn_roster_pawns(world, &mut self.rng);
        debug!(spawned, total = self.bots.len(), "bot pawns spawned");
    }

    /// Replaces a dead player's pawn with the team's died body.
    pub(super) fn spawn_died_body(&mut self, player_id: &str, team: Team, at: Transform) {
        let Some(kind) = died_kind_for(team) else {
            return;
        };
        let Some(world) = self.world.as_mut() else {
            let err = MatchError::MissingWorldContext("spawn_died_body");
            error!(player_id, %err, "died body not spawned");
            return;
        };
        if let Some(old) = self.roster.get_mut(player_id).and_then(|p| p.pawn.take()) {
            world.destroy_pawn(old);
        }
        match world.spawn_pawn(team, kind, at) {
            Some(pawn) => {
                world.possess_player(player_id, pawn);
                if let Some(player) = self.roster.get_mut(player_id) {
                    player.pawn = Some(pawn);
                }
            }
            None => {
                let err = MatchError::Configuration(format!("no died body for {team:?}"));
                error!(player_id, %err, "died body skipped");
            }
        }
    }

    /// Destroys every pawn the last round spawned.
    pub(super) fn clear_spawned(&mut self) {
        let pawns: Vec<_> = self.roster.iter().filter_map(|p| p.pawn).collect();
        match self.world.as_mut() {
            Some(world) => {
                for pawn in pawns {
                    world.destroy_pawn(pawn);
                }
            }
            None if !pawns.is_empty() => {
                warn!(count = pawns.len(), "no world to clear player pawns from");
            }
            None => {}
        }
        self.bots.clear_pawns(self.world.as_mut());
    }
}

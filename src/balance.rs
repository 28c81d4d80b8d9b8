use tracing::{debug, warn};

use crate::config::ReadinessPolicy;
use crate::error::MatchError;
use crate::roster::PlayerRoster;
use crate::types::Team;

/// Team membership and readiness rules over the player roster. Bots never
/// reach this type: they are filler, not objective participants.
#[derive(Clone, Copy, Debug)]
pub struct TeamBalancer {
    policy: ReadinessPolicy,
}

impl TeamBalancer {
    pub fn new(policy: ReadinessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    pub fn get_team_player_count(&self, roster: &PlayerRoster, team: Team) -> usize {
        roster.count_team(team)
    }

    pub fn assign_player_to_team(&self, roster: &mut PlayerRoster, player_id: &str, team: Team) -> bool {
        match self.try_move(roster, player_id, team) {
            Ok(()) => true,
            Err(err) => {
                warn!(player_id, ?team, %err, "team assignment rejected");
                false
            }
        }
    }

    pub fn switch_player_team(&self, roster: &mut PlayerRoster, player_id: &str, new_team: Team) -> bool {
        let Some(current) = roster.get(player_id).map(|p| p.team) else {
            warn!(player_id, "switch requested for unknown player");
            return false;
        };
        if current == new_team {
            return false;
        }
        match self.try_move(roster, player_id, new_team) {
            Ok(()) => true,
            Err(err) => {
                debug!(player_id, ?new_team, %err, "team switch rejected");
                false
            }
        }
    }

    /// Places every unassigned player on the smaller team, ties going to the
    /// progression team. Counts are re-read for each player.
    pub fn auto_assign_teams(&self, roster: &mut PlayerRoster) {
        let unassigned: Vec<String> = roster
            .iter()
            .filter(|p| p.team == Team::None)
            .map(|p| p.id.clone())
            .collect();
        for player_id in unassigned {
            let cats = roster.count_team(Team::PROGRESSION);
            let humans = roster.count_team(Team::CAPTURE);
            let team = if humans < cats {
                Team::CAPTURE
            } else {
                Team::PROGRESSION
            };
            if let Some(entry) = roster.get_mut(&player_id) {
                entry.team = team;
                debug!(player_id, ?team, "auto-assigned");
            }
        }
    }

    pub fn check_ready_to_start_game(&self, roster: &PlayerRoster) -> bool {
        let ready = roster.ready_count();
        if self.policy.is_debug() {
            return ready >= 1;
        }
        let cats = roster.count_team(Team::PROGRESSION);
        let humans = roster.count_team(Team::CAPTURE);
        let required = (roster.len() / 2).max(1);
        cats > 0 && humans > 0 && ready >= required
    }

    /// Accepts the move iff, after it, the destination team is at most one
    /// larger than the other team.
    fn try_move(&self, roster: &mut PlayerRoster, player_id: &str, team: Team) -> Result<(), MatchError> {
        if !team.is_playable() {
            return Err(MatchError::ConstraintViolation {
                player_id: player_id.to_string(),
                team,
            });
        }
        let current = roster
            .get(player_id)
            .map(|p| p.team)
            .ok_or_else(|| MatchError::UnknownPlayer(player_id.to_string()))?;

        let mut post_team = roster.count_team(team);
        let mut post_other = roster.count_team(team.opponent());
        if current != team {
            post_team += 1;
        }
        if current == team.opponent() {
            post_other -= 1;
        }
        if post_team > post_other + 1 {
            return Err(MatchError::ConstraintViolation {
                player_id: player_id.to_string(),
                team,
            });
        }
        if let Some(entry) = roster.get_mut(player_id) {
            entry.team = team;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roster_with(count: usize) -> PlayerRoster {
        let mut roster = PlayerRoster::new();
        for index in 0..count {
            roster.join(&format!("player_{index}"), &format!("P{index}"));
        }
        roster
    }

    fn imbalance(roster: &PlayerRoster) -> usize {
        roster
            .count_team(Team::Cat)
            .abs_diff(roster.count_team(Team::Human))
    }

    #[test]
    fn assign_rejects_third_player_on_same_side() {
        let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
        let mut roster = roster_with(3);
        assert!(balancer.assign_player_to_team(&mut roster, "player_0", Team::Cat));
        assert!(!balancer.assign_player_to_team(&mut roster, "player_1", Team::Cat));
        assert_eq!(roster.get("player_1").map(|p| p.team), Some(Team::None));
        assert!(balancer.assign_player_to_team(&mut roster, "player_1", Team::Human));
        assert!(balancer.assign_player_to_team(&mut roster, "player_2", Team::Cat));
    }

    #[test]
    fn switch_to_current_team_is_a_noop() {
        let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
        let mut roster = roster_with(2);
        balancer.auto_assign_teams(&mut roster);
        assert!(!balancer.switch_player_team(&mut roster, "player_0", Team::Cat));
        assert!(!balancer.switch_player_team(&mut roster, "ghost", Team::Cat));
    }

    #[test]
    fn switch_uses_post_move_counts() {
        let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
        let mut roster = roster_with(3);
        balancer.auto_assign_teams(&mut roster);
        // cat, human, cat
        assert_eq!(roster.count_team(Team::Cat), 2);
        assert!(balancer.switch_player_team(&mut roster, "player_0", Team::Human));
        assert_eq!(roster.count_team(Team::Human), 2);
        assert!(!balancer.switch_player_team(&mut roster, "player_2", Team::Human));
    }

    #[test]
    fn auto_assign_covers_everyone_and_ties_go_to_progression() {
        let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
        let mut roster = roster_with(5);
        balancer.auto_assign_teams(&mut roster);
        assert!(roster.iter().all(|p| p.team != Team::None));
        assert_eq!(roster.get("player_0").map(|p| p.team), Some(Team::Cat));
        assert_eq!(roster.count_team(Team::Cat), 3);
        assert_eq!(roster.count_team(Team::Human), 2);
    }

    #[test]
    fn normal_readiness_with_five_players() {
        let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
        let mut roster = roster_with(5);
        for (index, team) in [Team::Cat, Team::Cat, Team::Human, Team::Human, Team::Human]
            .into_iter()
            .enumerate()
        {
            roster
                .get_mut(&format!("player_{index}"))
                .expect("player exists")
                .team = team;
        }
        roster.get_mut("player_0").expect("player exists").is_ready = true;
        assert!(!balancer.check_ready_to_start_game(&roster));

        roster.get_mut("player_3").expect("player exists").is_ready = true;
        assert!(balancer.check_ready_to_start_game(&roster));
    }

    #[test]
    fn normal_readiness_needs_both_teams() {
        let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
        let mut roster = roster_with(1);
        balancer.auto_assign_teams(&mut roster);
        roster.get_mut("player_0").expect("player exists").is_ready = true;
        assert!(!balancer.check_ready_to_start_game(&roster));

        let debug = TeamBalancer::new(ReadinessPolicy::DebugSinglePlayer);
        assert!(debug.check_ready_to_start_game(&roster));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Assign(usize, bool),
        Switch(usize, bool),
        Auto,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..8, any::<bool>()).prop_map(|(i, cat)| Op::Assign(i, cat)),
            (0usize..8, any::<bool>()).prop_map(|(i, cat)| Op::Switch(i, cat)),
            Just(Op::Auto),
        ]
    }

    proptest! {
        #[test]
        fn balance_holds_after_every_successful_call(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let balancer = TeamBalancer::new(ReadinessPolicy::Normal);
            let mut roster = roster_with(8);
            for op in ops {
                let team_for = |cat: bool| if cat { Team::Cat } else { Team::Human };
                let accepted = match op {
                    Op::Assign(i, cat) => {
                        balancer.assign_player_to_team(&mut roster, &format!("player_{i}"), team_for(cat))
                    }
                    Op::Switch(i, cat) => {
                        balancer.switch_player_team(&mut roster, &format!("player_{i}"), team_for(cat))
                    }
                    Op::Auto => {
                        balancer.auto_assign_teams(&mut roster);
                        prop_assert!(roster.iter().all(|p| p.team != Team::None));
                        true
                    }
                };
                if accepted {
                    prop_assert!(imbalance(&roster) <= 1);
                }
            }
        }
    }
}

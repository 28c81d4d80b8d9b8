use std::collections::HashMap;

use tracing::{debug, warn};

use crate::constants::CAPTURE_WIN_RATIO;
use crate::error::MatchError;
use crate::types::{MatchOutcome, ProgressView, Team, WinReason};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContributionGuard {
    pub has_contributed: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressionObjective {
    pub total_weight: f32,
    pub current_weight: f32,
    pub current_percentage: f32,
    pub win_threshold_percentage: f32,
    pub possible: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureObjective {
    pub total_targets: i32,
    pub captured_count: i32,
    pub current_percentage: f32,
    pub possible: bool,
}

/// Both team objectives and the win evaluator. Percentages are left
/// unclamped so the win tests stay plain `>=` comparisons.
#[derive(Clone, Debug)]
pub struct ObjectiveTracker {
    progression: ProgressionObjective,
    capture: CaptureObjective,
    guards: HashMap<String, ContributionGuard>,
    frozen: bool,
}

impl ObjectiveTracker {
    pub fn new(win_threshold_percentage: f32) -> Self {
        Self {
            progression: ProgressionObjective {
                total_weight: 0.0,
                current_weight: 0.0,
                current_percentage: 0.0,
                win_threshold_percentage,
                possible: false,
            },
            capture: CaptureObjective {
                total_targets: 0,
                captured_count: 0,
                current_percentage: 0.0,
                possible: false,
            },
            guards: HashMap::new(),
            frozen: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.progression.win_threshold_percentage);
    }

    pub fn progression(&self) -> &ProgressionObjective {
        &self.progression
    }

    pub fn capture(&self) -> &CaptureObjective {
        &self.capture
    }

    pub fn guard(&self, object_id: &str) -> Option<ContributionGuard> {
        self.guards.get(object_id).copied()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Sums the weights of the objects that survived randomisation and arms a
    /// guard for each of them.
    pub fn setup_progression_objective<'a, I>(&mut self, eligible: I) -> Result<(), MatchError>
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let mut total = 0.0;
        for (object_id, weight) in eligible {
            total += weight;
            self.register_contributor(object_id);
        }
        self.progression.total_weight = total;
        self.progression.current_weight = 0.0;
        self.progression.current_percentage = 0.0;
        self.progression.possible = total > 0.0;
        if !self.progression.possible {
            warn!(total_weight = total, "progression objective has no weight");
            return Err(MatchError::ImpossibleObjective("progression total weight is zero"));
        }
        debug!(total_weight = total, "progression objective ready");
        Ok(())
    }

    /// Arms a guard for an object that just became able to contribute.
    pub fn register_contributor(&mut self, object_id: &str) {
        self.guards.entry(object_id.to_string()).or_default();
    }

    /// Counts `weight` once per object. Returns whether it was counted.
    pub fn contribute_progression(&mut self, object_id: &str, weight: f32) -> bool {
        if self.frozen {
            debug!(object_id, "objectives frozen, contribution ignored");
            return false;
        }
        let guard = self.guards.entry(object_id.to_string()).or_default();
        if guard.has_contributed {
            debug!(object_id, "object already contributed");
            return false;
        }
        guard.has_contributed = true;
        self.progression.current_weight += weight;
        self.progression.current_percentage = if self.progression.total_weight > 0.0 {
            self.progression.current_weight / self.progression.total_weight
        } else {
            0.0
        };
        debug!(
            object_id,
            weight,
            percentage = self.progression.current_percentage,
            "progression contributed"
        );
        true
    }

    pub fn setup_capture_objective(&mut self, total_targets: i32) -> Result<(), MatchError> {
        self.capture.total_targets = total_targets.max(0);
        self.capture.captured_count = 0;
        self.capture.current_percentage = 0.0;
        self.capture.possible = total_targets > 0;
        if !self.capture.possible {
            warn!(total_targets, "capture objective has no targets");
            return Err(MatchError::ImpossibleObjective("no capture targets"));
        }
        debug!(total_targets, "capture objective ready");
        Ok(())
    }

    /// Applies a capture delta, clamping the count at zero.
    pub fn contribute_capture(&mut self, delta: i32) -> bool {
        if self.frozen {
            debug!(delta, "objectives frozen, capture ignored");
            return false;
        }
        self.capture.captured_count = (self.capture.captured_count + delta).max(0);
        self.recompute_capture();
        debug!(
            delta,
            captured = self.capture.captured_count,
            percentage = self.capture.current_percentage,
            "capture contributed"
        );
        true
    }

    /// A target left the match: it no longer counts toward the total.
    pub fn release_target(&mut self) {
        if self.frozen {
            return;
        }
        self.capture.total_targets = (self.capture.total_targets - 1).max(0);
        self.recompute_capture();
    }

    fn recompute_capture(&mut self) {
        self.capture.current_percentage = if self.capture.total_targets > 0 {
            self.capture.captured_count as f32 / self.capture.total_targets as f32
        } else {
            0.0
        };
    }

    /// Fixed-order win check; the first rule that matches decides.
    pub fn evaluate(&self, capture_team_eliminated: bool, time_expired: bool) -> Option<MatchOutcome> {
        let progression = &self.progression;
        let capture = &self.capture;

        if progression.total_weight > 0.0
            && progression.current_percentage >= progression.win_threshold_percentage
        {
            return Some(MatchOutcome {
                winner: Team::PROGRESSION,
                reason: WinReason::ProgressionReached,
            });
        }
        if capture.total_targets > 0
            && (capture.captured_count >= capture.total_targets
                || capture.current_percentage >= CAPTURE_WIN_RATIO)
        {
            return Some(MatchOutcome {
                winner: Team::CAPTURE,
                reason: WinReason::TargetsCaptured,
            });
        }
        if capture_team_eliminated {
            return Some(MatchOutcome {
                winner: Team::PROGRESSION,
                reason: WinReason::CaptureTeamEliminated,
            });
        }
        if !time_expired {
            return None;
        }
        let outcome = if progression.current_percentage > capture.current_percentage {
            MatchOutcome {
                winner: Team::PROGRESSION,
                reason: WinReason::TimeoutProgressionAhead,
            }
        } else if capture.current_percentage > progression.current_percentage {
            MatchOutcome {
                winner: Team::CAPTURE,
                reason: WinReason::TimeoutCaptureAhead,
            }
        } else {
            MatchOutcome {
                winner: Team::PROGRESSION,
                reason: WinReason::TimeoutTie,
            }
        };
        Some(outcome)
    }

    pub fn progress(&self, remaining_secs: Option<u32>) -> ProgressView {
        ProgressView {
            progression_percent: self.progression.current_percentage,
            capture_percent: self.capture.current_percentage,
            progression_possible: self.progression.possible,
            capture_possible: self.capture.possible,
            remaining_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn duplicate_contribution_counts_once() {
        let mut tracker = ObjectiveTracker::new(0.75);
        tracker
            .setup_progression_objective([("obj1", 10.0), ("obj2", 30.0)])
            .expect("weight is positive");
        assert!(tracker.contribute_progression("obj1", 10.0));
        assert!(!tracker.contribute_progression("obj1", 10.0));
        assert_eq!(tracker.progression().current_weight, 10.0);
        assert_eq!(
            tracker.guard("obj1"),
            Some(ContributionGuard {
                has_contributed: true
            })
        );
        assert_eq!(tracker.guard("obj2").map(|g| g.has_contributed), Some(false));
    }

    #[test]
    fn zero_weight_marks_progression_impossible() {
        let mut tracker = ObjectiveTracker::new(0.75);
        let result = tracker.setup_progression_objective(std::iter::empty());
        assert!(matches!(result, Err(MatchError::ImpossibleObjective(_))));
        assert!(!tracker.progression().possible);
        assert!(tracker.contribute_progression("late", 5.0));
        assert_eq!(tracker.progression().current_percentage, 0.0);
        assert_eq!(tracker.evaluate(false, false), None);
    }

    #[test]
    fn capture_sequence_reaches_capture_win_on_third_target() {
        let mut tracker = ObjectiveTracker::new(0.75);
        tracker.setup_capture_objective(3).expect("targets exist");
        let expected = [0.33, 0.67, 1.0];
        for (step, want) in expected.into_iter().enumerate() {
            tracker.contribute_capture(1);
            assert!(approx_eq(tracker.capture().current_percentage, want));
            let outcome = tracker.evaluate(false, false);
            if step < 2 {
                assert_eq!(outcome, None);
            } else {
                assert_eq!(
                    outcome,
                    Some(MatchOutcome {
                        winner: Team::Human,
                        reason: WinReason::TargetsCaptured,
                    })
                );
            }
        }
    }

    #[test]
    fn negative_capture_clamps_at_zero() {
        let mut tracker = ObjectiveTracker::new(0.75);
        tracker.setup_capture_objective(2).expect("targets exist");
        tracker.contribute_capture(-1);
        assert_eq!(tracker.capture().captured_count, 0);
        assert_eq!(tracker.capture().current_percentage, 0.0);
    }

    #[test]
    fn released_target_shrinks_total() {
        let mut tracker = ObjectiveTracker::new(0.75);
        tracker.setup_capture_objective(2).expect("targets exist");
        tracker.contribute_capture(1);
        tracker.release_target();
        assert_eq!(tracker.capture().total_targets, 1);
        assert!(approx_eq(tracker.capture().current_percentage, 1.0));
        assert_eq!(
            tracker.evaluate(false, false).map(|o| o.winner),
            Some(Team::Human)
        );
    }

    #[test]
    fn percentages_are_not_capped() {
        let mut tracker = ObjectiveTracker::new(1.0);
        tracker
            .setup_progression_objective([("a", 10.0)])
            .expect("weight is positive");
        tracker.contribute_progression("a", 10.0);
        tracker.contribute_progression("bonus", 5.0);
        assert!(approx_eq(tracker.progression().current_percentage, 1.5));
    }

    #[test]
    fn progression_is_checked_before_capture() {
        let mut tracker = ObjectiveTracker::new(0.5);
        tracker
            .setup_progression_objective([("a", 10.0)])
            .expect("weight is positive");
        tracker.setup_capture_objective(1).expect("targets exist");
        tracker.contribute_progression("a", 10.0);
        tracker.contribute_capture(1);
        assert_eq!(
            tracker.evaluate(true, true).map(|o| o.reason),
            Some(WinReason::ProgressionReached)
        );
    }

    #[test]
    fn timeout_tie_goes_to_progression_team() {
        let mut tracker = ObjectiveTracker::new(0.75);
        tracker
            .setup_progression_objective([("a", 10.0), ("b", 10.0)])
            .expect("weight is positive");
        tracker.setup_capture_objective(2).expect("targets exist");
        tracker.contribute_progression("a", 10.0);
        tracker.contribute_capture(1);
        assert_eq!(tracker.evaluate(false, false), None);
        assert_eq!(
            tracker.evaluate(false, true),
            Some(MatchOutcome {
                winner: Team::Cat,
                reason: WinReason::TimeoutTie,
            })
        );

        tracker.release_target();
        assert_eq!(
            tracker.evaluate(false, true).map(|o| o.winner),
            Some(Team::Human)
        );
    }

    #[test]
    fn frozen_tracker_ignores_contributions() {
        let mut tracker = ObjectiveTracker::new(0.75);
        tracker
            .setup_progression_objective([("a", 10.0)])
            .expect("weight is positive");
        tracker.freeze();
        assert!(!tracker.contribute_progression("a", 10.0));
        assert!(!tracker.contribute_capture(1));
        tracker.reset();
        assert!(!tracker.is_frozen());
        assert_eq!(tracker.guard("a"), None);
        assert_eq!(tracker.progression().win_threshold_percentage, 0.75);
    }
}

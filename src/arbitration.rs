// src/arbitration.rs
//
// Signal arbitration: decides which lane holds the right-of-way from the
// latest per-lane vehicle counts, with a one-dwell caution phase before
// every switch.
//
//   Steady(A) ──count(B) > count(A)──► Switching(A, B) ──1 dwell──► Steady(B)
//
// The machine has no clock of its own. Each `tick` is one dwell interval;
// the loop driving it owns the timer.

use crate::types::LaneId;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArbiterState {
    Steady { active: LaneId },
    Switching { from: LaneId, to: LaneId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Steady,
    Switching,
}

/// Everything a renderer needs to draw the lights, published as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SignalState {
    /// Lane currently showing green. During `Switching` this is still the
    /// outgoing lane; it only changes on commit.
    pub active_lane: LaneId,
    pub phase: Phase,
    /// Lane that will take over when the caution phase ends.
    pub pending_lane: Option<LaneId>,
    /// Cosmetic green shade toggle. No control meaning.
    pub blink_on: bool,
    /// Caution lamp, lit exactly while `phase == Switching`.
    pub caution: bool,
    pub tick: u64,
}

impl SignalState {
    pub fn is_green(&self, lane: LaneId) -> bool {
        self.active_lane == lane
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Began { from: LaneId, to: LaneId },
    Committed { lane: LaneId },
}

pub struct SignalArbiter {
    lane_count: usize,
    state: ArbiterState,
    blink_on: bool,
    ticks: u64,
}

impl SignalArbiter {
    pub fn new(lane_count: usize, initial: LaneId) -> Self {
        debug_assert!(initial.index() < lane_count);
        Self {
            lane_count,
            state: ArbiterState::Steady { active: initial },
            blink_on: true,
            ticks: 0,
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lane_count
    }

    pub fn active_lane(&self) -> LaneId {
        match self.state {
            ArbiterState::Steady { active } => active,
            ArbiterState::Switching { from, .. } => from,
        }
    }

    /// Advance one dwell interval.
    ///
    /// `counts[i]` is the latest vehicle count of lane `i`; missing entries
    /// read as zero. Counts are ignored while a switch is pending.
    pub fn tick(&mut self, counts: &[usize]) -> Option<Transition> {
        self.ticks += 1;

        match self.state {
            ArbiterState::Steady { active } => match self.challenger(active, counts) {
                Some(to) => {
                    self.state = ArbiterState::Switching { from: active, to };
                    info!(
                        "🟡 Switching {} → {} (counts {:?})",
                        active,
                        to,
                        &counts[..counts.len().min(self.lane_count)]
                    );
                    Some(Transition::Began { from: active, to })
                }
                None => {
                    self.blink_on = !self.blink_on;
                    None
                }
            },

            ArbiterState::Switching { to, .. } => {
                self.state = ArbiterState::Steady { active: to };
                info!("🟢 {} has the right-of-way", to);
                Some(Transition::Committed { lane: to })
            }
        }
    }

    /// Lane whose count strictly exceeds the active lane's. The busiest
    /// such lane wins; equal counts go to the lower index.
    fn challenger(&self, active: LaneId, counts: &[usize]) -> Option<LaneId> {
        let count_of = |lane: usize| counts.get(lane).copied().unwrap_or(0);
        let active_count = count_of(active.index());

        let mut best: Option<(LaneId, usize)> = None;
        for lane in (0..self.lane_count).filter(|&l| l != active.index()) {
            let count = count_of(lane);
            if count <= active_count {
                continue;
            }
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((LaneId(lane), count));
            }
        }

        if let Some((lane, count)) = best {
            debug!(
                "{} ({} vehicles) outnumbers {} ({} vehicles)",
                lane, count, active, active_count
            );
        }
        best.map(|(lane, _)| lane)
    }

    pub fn snapshot(&self) -> SignalState {
        match self.state {
            ArbiterState::Steady { active } => SignalState {
                active_lane: active,
                phase: Phase::Steady,
                pending_lane: None,
                blink_on: self.blink_on,
                caution: false,
                tick: self.ticks,
            },
            ArbiterState::Switching { from, to } => SignalState {
                active_lane: from,
                phase: Phase::Switching,
                pending_lane: Some(to),
                blink_on: self.blink_on,
                caution: true,
                tick: self.ticks,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROAD_1: LaneId = LaneId(0);
    const ROAD_2: LaneId = LaneId(1);

    fn two_lane() -> SignalArbiter {
        SignalArbiter::new(2, ROAD_1)
    }

    #[test]
    fn test_initial_state() {
        let arbiter = two_lane();
        let state = arbiter.snapshot();
        assert_eq!(state.active_lane, ROAD_1);
        assert_eq!(state.phase, Phase::Steady);
        assert!(!state.caution);
        assert_eq!(state.pending_lane, None);
    }

    #[test]
    fn test_busier_lane_takes_over_after_one_dwell() {
        let mut arbiter = two_lane();

        let t = arbiter.tick(&[2, 5]);
        assert_eq!(
            t,
            Some(Transition::Began {
                from: ROAD_1,
                to: ROAD_2
            })
        );
        let state = arbiter.snapshot();
        assert_eq!(state.phase, Phase::Switching);
        assert!(state.caution);
        assert_eq!(state.active_lane, ROAD_1);
        assert_eq!(state.pending_lane, Some(ROAD_2));

        let t = arbiter.tick(&[2, 5]);
        assert_eq!(t, Some(Transition::Committed { lane: ROAD_2 }));
        let state = arbiter.snapshot();
        assert_eq!(state.phase, Phase::Steady);
        assert!(!state.caution);
        assert_eq!(state.active_lane, ROAD_2);
    }

    #[test]
    fn test_switch_is_not_aborted_by_counts_during_dwell() {
        let mut arbiter = two_lane();
        arbiter.tick(&[0, 3]);
        assert_eq!(arbiter.snapshot().phase, Phase::Switching);

        // Road 1 floods during the caution phase; the switch still commits.
        let t = arbiter.tick(&[50, 0]);
        assert_eq!(t, Some(Transition::Committed { lane: ROAD_2 }));
        assert_eq!(arbiter.active_lane(), ROAD_2);
    }

    #[test]
    fn test_ties_and_active_majority_hold() {
        let mut arbiter = two_lane();
        for counts in [[0, 0], [3, 3], [4, 1], [7, 7], [1, 0]] {
            assert_eq!(arbiter.tick(&counts), None);
            assert_eq!(arbiter.snapshot().phase, Phase::Steady);
            assert_eq!(arbiter.active_lane(), ROAD_1);
        }
    }

    #[test]
    fn test_switch_back_uses_same_rule() {
        let mut arbiter = two_lane();
        arbiter.tick(&[0, 1]);
        arbiter.tick(&[0, 1]);
        assert_eq!(arbiter.active_lane(), ROAD_2);

        assert_eq!(arbiter.tick(&[1, 1]), None);
        assert_eq!(
            arbiter.tick(&[2, 1]),
            Some(Transition::Began {
                from: ROAD_2,
                to: ROAD_1
            })
        );
        arbiter.tick(&[0, 0]);
        assert_eq!(arbiter.active_lane(), ROAD_1);
    }

    #[test]
    fn test_no_deadband_near_equal_counts() {
        // Counts alternating by one vehicle cause a switch each time the
        // waiting lane is ahead.
        let mut arbiter = two_lane();
        let mut commits = 0;
        for counts in [[3, 4], [3, 4], [4, 3], [4, 3], [3, 4], [3, 4]] {
            if let Some(Transition::Committed { .. }) = arbiter.tick(&counts) {
                commits += 1;
            }
        }
        assert_eq!(commits, 3);
        assert_eq!(arbiter.active_lane(), ROAD_2);
    }

    #[test]
    fn test_blink_toggles_only_while_steady() {
        let mut arbiter = two_lane();
        let b0 = arbiter.snapshot().blink_on;
        arbiter.tick(&[1, 0]);
        assert_eq!(arbiter.snapshot().blink_on, !b0);
        arbiter.tick(&[1, 0]);
        assert_eq!(arbiter.snapshot().blink_on, b0);

        arbiter.tick(&[0, 9]); // begins switch
        let during = arbiter.snapshot().blink_on;
        arbiter.tick(&[0, 9]); // commits
        assert_eq!(arbiter.snapshot().blink_on, during);
    }

    #[test]
    fn test_blink_never_changes_active_lane() {
        let mut arbiter = two_lane();
        for _ in 0..20 {
            arbiter.tick(&[2, 2]);
            assert_eq!(arbiter.active_lane(), ROAD_1);
        }
    }

    #[test]
    fn test_missing_counts_read_as_zero() {
        let mut arbiter = SignalArbiter::new(2, ROAD_2);
        assert_eq!(
            arbiter.tick(&[1]),
            Some(Transition::Began {
                from: ROAD_2,
                to: ROAD_1
            })
        );
    }

    #[test]
    fn test_n_lanes_busiest_challenger_wins() {
        let mut arbiter = SignalArbiter::new(4, ROAD_1);
        assert_eq!(
            arbiter.tick(&[2, 3, 6, 6]),
            Some(Transition::Began {
                from: ROAD_1,
                to: LaneId(2)
            })
        );
        arbiter.tick(&[0, 0, 0, 0]);
        assert_eq!(arbiter.active_lane(), LaneId(2));
    }

    #[test]
    fn test_snapshot_is_consistent_through_cycle() {
        let mut arbiter = two_lane();
        let counts = [[0, 2], [0, 2], [0, 0], [5, 0], [5, 0]];
        for c in counts {
            arbiter.tick(&c);
            let s = arbiter.snapshot();
            assert_eq!(s.caution, s.phase == Phase::Switching);
            assert_eq!(s.pending_lane.is_some(), s.phase == Phase::Switching);
            if let Some(pending) = s.pending_lane {
                assert_ne!(pending, s.active_lane);
            }
        }
    }
}

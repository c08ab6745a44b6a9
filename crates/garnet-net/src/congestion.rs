//! Good/bad send-mode controller.
//!
//! Each peer's connection runs in one of two modes selecting the send
//! cadence: good (one packet per 1/30 s) or bad (one per 1/10 s). The mode
//! follows the round-trip-time verdict, with a growing hold-off budget that
//! keeps a flapping connection from oscillating.

use crate::protocol::{BAD_MODE_SEND_INTERVAL, GOOD_MODE_SEND_INTERVAL};
use log::debug;

const TOGGLE_BUDGET_INITIAL_SECS: f32 = 30.0;
const TOGGLE_BUDGET_MAX_SECS: f32 = 60.0;
const TOGGLE_BUDGET_MIN_SECS: f32 = 1.0;
const STABLE_PERIOD_SECS: f32 = 10.0;

/// Per-peer send-mode state machine.
#[derive(Debug, Clone)]
pub struct FlowControl {
    good: bool,
    /// Seconds the connection must stay bad-with-good-rtt before promotion.
    budget: f32,
    /// Measures sustained goodness between budget halvings.
    good_timer: f32,
    /// Seconds since the last mode change.
    since_toggle: f32,
}

impl FlowControl {
    pub fn new() -> Self {
        Self {
            good: false,
            budget: TOGGLE_BUDGET_INITIAL_SECS,
            good_timer: 0.0,
            since_toggle: 0.0,
        }
    }

    pub fn is_good(&self) -> bool {
        self.good
    }

    /// The send cadence the current mode selects, in seconds.
    pub fn send_interval(&self) -> f32 {
        if self.good {
            GOOD_MODE_SEND_INTERVAL
        } else {
            BAD_MODE_SEND_INTERVAL
        }
    }

    /// Advances the state machine by `dt` seconds given the current
    /// round-trip-time verdict.
    pub fn advance(&mut self, dt: f32, good_rtt: bool) {
        self.good_timer += dt;
        self.since_toggle += dt;

        if self.good && !good_rtt {
            debug!("switching to bad send mode");
            self.good = false;
            // A good period that did not last doubles the hold-off.
            if self.since_toggle <= STABLE_PERIOD_SECS {
                self.budget = (self.budget * 2.0).min(TOGGLE_BUDGET_MAX_SECS);
            }
            self.since_toggle = 0.0;
        } else if self.good {
            if self.good_timer >= STABLE_PERIOD_SECS {
                self.good_timer = 0.0;
                self.budget = (self.budget / 2.0).max(TOGGLE_BUDGET_MIN_SECS);
            }
        } else if good_rtt {
            if self.since_toggle >= self.budget {
                debug!("switching to good send mode");
                self.good_timer = 0.0;
                self.since_toggle = 0.0;
                self.good = true;
            }
        } else {
            self.since_toggle = 0.0;
        }
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance_by(flow: &mut FlowControl, seconds: f32, step: f32, good_rtt: bool) {
        let mut elapsed = 0.0;
        while elapsed < seconds {
            flow.advance(step, good_rtt);
            elapsed += step;
        }
    }

    #[test]
    fn test_starts_bad_with_slow_cadence() {
        let flow = FlowControl::new();
        assert!(!flow.is_good());
        assert_eq!(flow.send_interval(), BAD_MODE_SEND_INTERVAL);
    }

    #[test]
    fn test_promotes_after_budget_of_good_rtt() {
        let mut flow = FlowControl::new();
        advance_by(&mut flow, 29.0, 0.1, true);
        assert!(!flow.is_good());
        advance_by(&mut flow, 1.5, 0.1, true);
        assert!(flow.is_good());
        assert_eq!(flow.send_interval(), GOOD_MODE_SEND_INTERVAL);
    }

    #[test]
    fn test_bad_rtt_resets_promotion_progress() {
        let mut flow = FlowControl::new();
        advance_by(&mut flow, 29.0, 0.1, true);
        // One bad sample throws the accumulated hold-off away.
        flow.advance(0.1, false);
        advance_by(&mut flow, 29.0, 0.1, true);
        assert!(!flow.is_good());
    }

    #[test]
    fn test_quick_demotion_doubles_budget_up_to_cap() {
        let mut flow = FlowControl::new();
        advance_by(&mut flow, 31.0, 0.1, true);
        assert!(flow.is_good());

        // Demoted within the stable period: budget 30 -> 60.
        flow.advance(0.1, false);
        assert!(!flow.is_good());
        advance_by(&mut flow, 45.0, 0.1, true);
        assert!(!flow.is_good(), "promotion before the doubled budget elapsed");
        advance_by(&mut flow, 16.0, 0.1, true);
        assert!(flow.is_good());

        // Another quick demotion must not push the budget past the cap.
        flow.advance(0.1, false);
        advance_by(&mut flow, 61.0, 0.1, true);
        assert!(flow.is_good());
    }

    #[test]
    fn test_sustained_goodness_halves_budget_down_to_floor() {
        let mut flow = FlowControl::new();
        advance_by(&mut flow, 31.0, 0.1, true);
        assert!(flow.is_good());

        // 10 s of goodness halves 30 -> 15; long enough halves to the floor.
        advance_by(&mut flow, 51.0, 0.1, true);

        // A demotion after a stable good period does not double.
        flow.advance(0.1, false);
        assert!(!flow.is_good());
        advance_by(&mut flow, 1.2, 0.1, true);
        assert!(flow.is_good(), "budget should have decayed to the floor");
    }

    #[test]
    fn test_bad_mode_with_bad_rtt_holds() {
        let mut flow = FlowControl::new();
        advance_by(&mut flow, 120.0, 0.1, false);
        assert!(!flow.is_good());
    }
}

//! Reconnection policy: exponential backoff with a bounded attempt budget.
//!
//! The policy owns only counters. The session actor owns the single timer
//! and asks the policy whether (and when) to arm it.

use std::time::Duration;

use ridelink_core::ReconnectSettings;

/// Why a reconnect request was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// An explicit disconnect is in progress
    Disconnecting,
    /// A retry is already scheduled
    AlreadyScheduled,
    /// The budget ran out and the terminal failure was already reported
    BudgetExhausted,
    /// Nothing to reconnect to
    NoConnectionParams,
}

/// Outcome of asking the policy for a reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Arm the timer; reconnect after `delay`
    Scheduled { attempt: u32, delay: Duration },
    /// The budget just ran out. Reported once per exhaustion.
    Exhausted { attempts: u32 },
    Skipped(SkipReason),
}

/// Attempt counter plus the "retry scheduled" flag
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    settings: ReconnectSettings,
    /// Retries scheduled since the last successful open
    attempt: u32,
    /// A retry timer is armed and has not fired yet
    scheduled: bool,
    /// Exhaustion has been reported since the last reset
    exhausted: bool,
}

impl ReconnectPolicy {
    pub fn new(settings: ReconnectSettings) -> Self {
        Self {
            settings,
            attempt: 0,
            scheduled: false,
            exhausted: false,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    pub fn is_reconnecting(&self) -> bool {
        self.scheduled
    }

    /// Backoff before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        compute_backoff(
            self.settings.initial_delay(),
            self.settings.max_delay(),
            attempt,
        )
    }

    /// Decide whether to schedule another retry.
    ///
    /// `immediate` skips the backoff wait for this one retry (used when the
    /// app returns to the foreground). An immediate request while a retry is
    /// already armed pulls that retry forward instead of spending a new
    /// attempt.
    pub fn schedule(
        &mut self,
        disconnecting: bool,
        has_params: bool,
        immediate: bool,
    ) -> ReconnectDecision {
        if disconnecting {
            return ReconnectDecision::Skipped(SkipReason::Disconnecting);
        }
        if !has_params {
            return ReconnectDecision::Skipped(SkipReason::NoConnectionParams);
        }
        if self.scheduled {
            if immediate {
                return ReconnectDecision::Scheduled {
                    attempt: self.attempt,
                    delay: Duration::ZERO,
                };
            }
            return ReconnectDecision::Skipped(SkipReason::AlreadyScheduled);
        }
        if self.attempt >= self.settings.max_attempts {
            if self.exhausted {
                return ReconnectDecision::Skipped(SkipReason::BudgetExhausted);
            }
            self.exhausted = true;
            return ReconnectDecision::Exhausted {
                attempts: self.attempt,
            };
        }

        self.attempt += 1;
        self.scheduled = true;
        let delay = if immediate {
            Duration::ZERO
        } else {
            self.delay_for(self.attempt)
        };
        ReconnectDecision::Scheduled {
            attempt: self.attempt,
            delay,
        }
    }

    /// The armed timer fired (or was cancelled)
    pub fn fire(&mut self) {
        self.scheduled = false;
    }

    /// Successful open or a fresh explicit connect: full budget again
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.scheduled = false;
        self.exhausted = false;
    }
}

/// Compute exponential backoff duration for reconnection attempt `n`.
///
/// The formula is `initial * 2^(n-1)`, capped at `max`.
pub fn compute_backoff(initial: Duration, max: Duration, attempt: u32) -> Duration {
    // checked_shl returns None once the shift amount reaches 64.
    let exponent = attempt.saturating_sub(1);
    let multiplier: u64 = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    let millis = (initial.as_millis() as u64).saturating_mul(multiplier);
    Duration::from_millis(millis).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectSettings::default())
    }

    // -- compute_backoff -----------------------------------------------------

    #[test]
    fn test_backoff_sequence_for_default_budget() {
        let policy = policy();
        let secs: Vec<u64> = (1..=10).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30, 30, 30]);
    }

    #[test]
    fn test_backoff_never_exceeds_max() {
        let policy = policy();
        for attempt in [11, 32, 63, 64, 65, 1_000] {
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(30));
        }
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let dur = compute_backoff(Duration::from_secs(1), Duration::from_secs(30), u32::MAX);
        assert_eq!(dur, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_with_subsecond_initial_delay() {
        let initial = Duration::from_millis(10);
        let max = Duration::from_millis(50);
        assert_eq!(compute_backoff(initial, max, 1), Duration::from_millis(10));
        assert_eq!(compute_backoff(initial, max, 3), Duration::from_millis(40));
        assert_eq!(compute_backoff(initial, max, 4), Duration::from_millis(50));
    }

    // -- schedule ------------------------------------------------------------

    #[test]
    fn test_first_failure_schedules_attempt_one_after_one_second() {
        let mut policy = policy();
        assert_eq!(
            policy.schedule(false, true, false),
            ReconnectDecision::Scheduled {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
        assert!(policy.is_reconnecting());
    }

    #[test]
    fn test_schedule_is_noop_while_a_retry_is_armed() {
        let mut policy = policy();
        policy.schedule(false, true, false);
        assert_eq!(
            policy.schedule(false, true, false),
            ReconnectDecision::Skipped(SkipReason::AlreadyScheduled)
        );
        assert_eq!(policy.attempt(), 1);
    }

    #[test]
    fn test_schedule_guards() {
        let mut policy = policy();
        assert_eq!(
            policy.schedule(true, true, false),
            ReconnectDecision::Skipped(SkipReason::Disconnecting)
        );
        assert_eq!(
            policy.schedule(false, false, false),
            ReconnectDecision::Skipped(SkipReason::NoConnectionParams)
        );
        assert_eq!(policy.attempt(), 0);
    }

    #[test]
    fn test_budget_exhaustion_is_reported_exactly_once() {
        let mut policy = policy();
        for expected in 1..=10 {
            match policy.schedule(false, true, false) {
                ReconnectDecision::Scheduled { attempt, .. } => assert_eq!(attempt, expected),
                other => panic!("attempt {expected}: unexpected {other:?}"),
            }
            policy.fire();
        }

        assert_eq!(
            policy.schedule(false, true, false),
            ReconnectDecision::Exhausted { attempts: 10 }
        );
        for _ in 0..3 {
            assert_eq!(
                policy.schedule(false, true, false),
                ReconnectDecision::Skipped(SkipReason::BudgetExhausted)
            );
        }

        policy.reset();
        assert!(matches!(
            policy.schedule(false, true, false),
            ReconnectDecision::Scheduled { attempt: 1, .. }
        ));
    }

    #[test]
    fn test_immediate_schedule_skips_backoff() {
        let mut policy = policy();
        policy.schedule(false, true, false);
        policy.fire();
        assert_eq!(
            policy.schedule(false, true, true),
            ReconnectDecision::Scheduled {
                attempt: 2,
                delay: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_immediate_schedule_pulls_armed_retry_forward() {
        let mut policy = policy();
        policy.schedule(false, true, false);
        assert_eq!(
            policy.schedule(false, true, true),
            ReconnectDecision::Scheduled {
                attempt: 1,
                delay: Duration::ZERO
            }
        );
        assert_eq!(policy.attempt(), 1);
    }

    #[test]
    fn test_reset_restores_full_budget() {
        let mut policy = policy();
        policy.schedule(false, true, false);
        policy.reset();
        assert_eq!(policy.attempt(), 0);
        assert!(!policy.is_reconnecting());
    }
}

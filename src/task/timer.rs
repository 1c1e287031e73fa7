//! Cooperative wall-clock budgets for long-running jobs.
//!
//! A `StepTimer` tracks two independent budgets: one for the whole job and one
//! for the step currently executing. Nothing is preempted; the job polls
//! `enforce()` at convenient points and unwinds through `?` when a budget is
//! exhausted.

use std::fmt;
use std::time::{Duration, Instant};

/// Which budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    /// The per-step budget (reset by every checkpoint).
    Step,
    /// The overall job budget.
    Job,
}

/// What: Signal raised by `StepTimer::enforce` once a budget is exhausted.
///
/// Details:
/// - Carries the label of the last checkpoint so the offending unit of work
///   can be reported without the caller keeping its own bookkeeping.
/// - Only aborts the job that polled it; callers decide how far to unwind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTimeout {
    /// Label recorded by the most recent checkpoint.
    pub label: String,
    /// Budget that was exceeded.
    pub scope: TimeoutScope,
    /// Time spent in the scope when the timeout was detected.
    pub elapsed: Duration,
    /// Configured budget for the scope.
    pub budget: Duration,
}

impl fmt::Display for StepTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            TimeoutScope::Step => "step",
            TimeoutScope::Job => "job",
        };
        write!(
            f,
            "{scope} timed out after {}ms (budget {}ms) while processing {:?}",
            self.elapsed.as_millis(),
            self.budget.as_millis(),
            self.label
        )
    }
}

impl std::error::Error for StepTimeout {}

/// Job and step clocks for a single run.
#[derive(Debug, Clone)]
pub struct StepTimer {
    job_budget: Duration,
    step_budget: Duration,
    job_started: Instant,
    step_started: Instant,
    label: String,
}

impl StepTimer {
    /// What: Start both clocks.
    ///
    /// Inputs:
    /// - `job_budget`: Budget for the whole job; `Duration::ZERO` disables it.
    /// - `step_budget`: Budget for each step; `Duration::ZERO` disables it.
    ///
    /// Output:
    /// - A timer with an empty checkpoint label.
    #[must_use]
    pub fn begin(job_budget: Duration, step_budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            job_budget,
            step_budget,
            job_started: now,
            step_started: now,
            label: String::new(),
        }
    }

    /// Reset the step clock and record `label` as the unit now executing.
    pub fn checkpoint(&mut self, label: impl Into<String>) {
        self.step_started = Instant::now();
        self.label = label.into();
    }

    /// Label of the most recent checkpoint.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// What: Check both budgets.
    ///
    /// Output:
    /// - `Ok(())` while time remains, otherwise the step timeout (checked
    ///   first) or the job timeout.
    ///
    /// # Errors
    /// - `StepTimeout` when either budget is exhausted.
    pub fn enforce(&self) -> Result<(), StepTimeout> {
        check(
            self.step_started,
            self.step_budget,
            TimeoutScope::Step,
            &self.label,
        )?;
        self.enforce_job()
    }

    /// Check only the job budget.
    ///
    /// # Errors
    /// - `StepTimeout` with `TimeoutScope::Job` when the job budget is exhausted.
    pub fn enforce_job(&self) -> Result<(), StepTimeout> {
        check(
            self.job_started,
            self.job_budget,
            TimeoutScope::Job,
            &self.label,
        )
    }
}

fn check(
    started: Instant,
    budget: Duration,
    scope: TimeoutScope,
    label: &str,
) -> Result<(), StepTimeout> {
    if budget.is_zero() {
        return Ok(());
    }
    let elapsed = started.elapsed();
    if elapsed > budget {
        return Err(StepTimeout {
            label: label.to_string(),
            scope,
            elapsed,
            budget,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    /// What: A fresh timer with generous budgets does not time out
    ///
    /// - Input: 10s job budget, 10s step budget
    /// - Output: enforce() returns Ok
    fn enforce_passes_within_budget() {
        let mut timer = StepTimer::begin(Duration::from_secs(10), Duration::from_secs(10));
        timer.checkpoint("stone");
        assert!(timer.enforce().is_ok());
        assert_eq!(timer.label(), "stone");
    }

    #[test]
    /// What: Step timeout carries the last checkpoint label
    ///
    /// - Input: 5ms step budget, sleep 20ms after checkpoint "slow item"
    /// - Output: Err with Step scope and label "slow item"
    fn step_timeout_reports_label() {
        let mut timer = StepTimer::begin(Duration::ZERO, Duration::from_millis(5));
        timer.checkpoint("slow item");
        sleep(Duration::from_millis(20));
        let err = timer.enforce().expect_err("step budget exceeded");
        assert_eq!(err.scope, TimeoutScope::Step);
        assert_eq!(err.label, "slow item");
        assert!(err.to_string().contains("slow item"));
    }

    #[test]
    /// What: Checkpoint resets the step clock but not the job clock
    ///
    /// - Input: 150ms step budget, 250ms job budget, three 100ms steps
    /// - Output: The first two steps pass; the job budget fails on the third
    fn checkpoint_resets_step_only() {
        let mut timer =
            StepTimer::begin(Duration::from_millis(250), Duration::from_millis(150));
        timer.checkpoint("a");
        sleep(Duration::from_millis(100));
        assert!(timer.enforce().is_ok());
        timer.checkpoint("b");
        sleep(Duration::from_millis(100));
        assert!(timer.enforce().is_ok());
        timer.checkpoint("c");
        sleep(Duration::from_millis(100));
        let err = timer.enforce_job().expect_err("job budget exceeded");
        assert_eq!(err.scope, TimeoutScope::Job);
        assert_eq!(err.label, "c");
    }

    #[test]
    /// What: Zero budgets disable enforcement
    fn zero_budget_is_unlimited() {
        let timer = StepTimer::begin(Duration::ZERO, Duration::ZERO);
        sleep(Duration::from_millis(2));
        assert!(timer.enforce().is_ok());
    }
}

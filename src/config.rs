//! Tunable constants from the crate's specification, turned into a
//! `Config` struct so tests don't have to wait out production timeouts.

use std::time::Duration;

/// Default values for every tunable named in the crate's specification.
pub mod defaults {
    pub const CAROUSEL_ROUNDS_RANGE: u32 = 100;
    pub const CAROUSEL_ROUNDS_MONO: u32 = 100;
    pub const CAS_PROBES_RANGE: usize = 1000;
    pub const CAS_PROBES_MONO: usize = 1000;
    pub const DELTA_RANGE_COUNT_THRESHOLD: usize = 10;
    pub const FULL_LOOP_COUNT_THRESHOLD: usize = 10;
    pub const RATE_SAMPLES: usize = 30;
    pub const MATCH_PERIOD_US: u64 = 500_000;
    pub const MODULUS_SECS: u64 = 10;
    pub const RUN_BUDGET_S: u64 = 300;
    pub const JOIN_POLL_S: u64 = 1;
    pub const CANCEL_BUDGET_S: u64 = 10;
}

/// Timing budgets for the probe-thread supervisor (C5).
#[derive(Debug, Clone, Copy)]
pub struct ProbeTiming {
    /// Total time probe threads are given to finish before cancellation.
    pub run_budget: Duration,
    /// Poll interval while waiting on thread joins.
    pub join_poll: Duration,
    /// Time given to stragglers to join after cancellation before they're detached.
    pub cancel_budget: Duration,
}

impl Default for ProbeTiming {
    fn default() -> Self {
        Self {
            run_budget: Duration::from_secs(defaults::RUN_BUDGET_S),
            join_poll: Duration::from_secs(defaults::JOIN_POLL_S),
            cancel_budget: Duration::from_secs(defaults::CANCEL_BUDGET_S),
        }
    }
}

/// All tunables governing a reliability evaluation or conversion build.
#[derive(Debug, Clone)]
pub struct Config {
    pub carousel_rounds_range: u32,
    pub carousel_rounds_mono: u32,
    pub cas_probes_range: usize,
    pub cas_probes_mono: usize,
    pub delta_range_count_threshold: usize,
    pub full_loop_count_threshold: usize,
    pub rate_samples: usize,
    pub match_period: Duration,
    pub modulus_secs: u64,
    pub probe: ProbeTiming,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            carousel_rounds_range: defaults::CAROUSEL_ROUNDS_RANGE,
            carousel_rounds_mono: defaults::CAROUSEL_ROUNDS_MONO,
            cas_probes_range: defaults::CAS_PROBES_RANGE,
            cas_probes_mono: defaults::CAS_PROBES_MONO,
            delta_range_count_threshold: defaults::DELTA_RANGE_COUNT_THRESHOLD,
            full_loop_count_threshold: defaults::FULL_LOOP_COUNT_THRESHOLD,
            rate_samples: defaults::RATE_SAMPLES,
            match_period: Duration::from_micros(defaults::MATCH_PERIOD_US),
            modulus_secs: defaults::MODULUS_SECS,
            probe: ProbeTiming::default(),
        }
    }
}

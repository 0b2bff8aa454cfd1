//! Wires C1–C10 into the five public operations: the two reliability
//! evaluations and the conversion-parameter builder run independently,
//! each under its own `with_restored_affinity` envelope.

use crate::affinity::{with_restored_affinity, ProcessState};
use crate::cas_probe;
use crate::carousel;
use crate::config::Config;
use crate::conversion::{self, ConversionParams};
use crate::enclosing::{cas_enclosing_range, carousel_enclosing_range};
use crate::error::{Result, TscError};
use crate::monotonic::{scan_carousel, scan_cas, MonotonicOutcome};
use crate::rate;

/// Result of a reliability evaluation. Populated only when the
/// evaluation returns `Ok`; on `Err`, the caller should inspect
/// `TscError::status()` and discard any prior measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilityResult {
    /// Length of the enclosing delta range: the maximum-shift estimate.
    pub max_shift: i64,
    pub monotonic: bool,
}

/// Result of building conversion parameters.
#[derive(Debug, Clone, Copy)]
pub struct ConversionBuildResult {
    pub params: ConversionParams,
    pub secs_before_wrap: u64,
}

fn base_and_peers(state: &ProcessState) -> (Vec<usize>, usize, Vec<usize>) {
    let cpus = state.allowed_cpus();
    let base = cpus[0];
    let peers = cpus[1..].to_vec();
    (cpus, base, peers)
}

/// Evaluates TSC reliability using the carousel sampler, with the
/// default configuration.
pub fn evaluate_tsc_reliability_carousel() -> Result<ReliabilityResult> {
    evaluate_tsc_reliability_carousel_with_config(&Config::default())
}

/// Same as [`evaluate_tsc_reliability_carousel`], with explicit tunables.
pub fn evaluate_tsc_reliability_carousel_with_config(cfg: &Config) -> Result<ReliabilityResult> {
    with_restored_affinity(|state| {
        let (cpus, base, peers) = base_and_peers(state);
        if cpus.len() <= 1 {
            return Ok(ReliabilityResult {
                max_shift: 0,
                monotonic: true,
            });
        }

        let range = carousel_enclosing_range(base, &peers, cfg.carousel_rounds_range)?;
        let max_shift = range.hi - range.lo;

        let mono_arrays = carousel::sample(&cpus, cfg.carousel_rounds_mono)?;
        match scan_carousel(&mono_arrays)? {
            MonotonicOutcome::Monotonic => Ok(ReliabilityResult {
                max_shift,
                monotonic: true,
            }),
            MonotonicOutcome::Violation { at } => Err(TscError::inconsistency(format!(
                "TSC decreased at carousel position {at}; may indicate wraparound"
            ))),
        }
    })
}

/// Evaluates TSC reliability using CAS-ordered probing, with the default
/// configuration. May additionally fail with a "poor statistics" status
/// if too few enclosing pairs or full loops were observed.
pub fn evaluate_tsc_reliability_cas() -> Result<ReliabilityResult> {
    evaluate_tsc_reliability_cas_with_config(&Config::default())
}

/// Same as [`evaluate_tsc_reliability_cas`], with explicit tunables.
pub fn evaluate_tsc_reliability_cas_with_config(cfg: &Config) -> Result<ReliabilityResult> {
    with_restored_affinity(|state| {
        let (cpus, base, peers) = base_and_peers(state);
        if cpus.len() <= 1 {
            return Ok(ReliabilityResult {
                max_shift: 0,
                monotonic: true,
            });
        }

        let range = cas_enclosing_range(base, &peers, cfg, &cfg.probe)?;
        let max_shift = range.hi - range.lo;

        let mono_arrays = cas_probe::run(&cpus, cfg.cas_probes_mono, &cfg.probe)?;
        let (outcome, loops) = scan_cas(&mono_arrays)?;
        match outcome {
            MonotonicOutcome::Violation { at } => Err(TscError::inconsistency(format!(
                "TSC decreased at sequence {at}; may indicate wraparound"
            ))),
            MonotonicOutcome::Monotonic => {
                if loops < cfg.full_loop_count_threshold {
                    Err(TscError::statistical(format!(
                        "only {loops} full loops observed, need at least {}",
                        cfg.full_loop_count_threshold
                    )))
                } else {
                    Ok(ReliabilityResult {
                        max_shift,
                        monotonic: true,
                    })
                }
            }
        }
    })
}

/// Builds conversion parameters and the seconds-before-wrap estimate,
/// with the default configuration.
pub fn build_conversion_params() -> Result<ConversionBuildResult> {
    build_conversion_params_with_config(&Config::default())
}

/// Same as [`build_conversion_params`], with explicit tunables.
pub fn build_conversion_params_with_config(cfg: &Config) -> Result<ConversionBuildResult> {
    with_restored_affinity(|state| {
        let ticks_per_sec = rate::estimate(cfg.rate_samples, cfg.match_period)?;
        let params = conversion::build_params(ticks_per_sec, cfg.modulus_secs)?;
        let cpus = state.allowed_cpus();
        let secs_before_wrap = conversion::seconds_before_wrap(&cpus, &params)?;
        Ok(ConversionBuildResult {
            params,
            secs_before_wrap,
        })
    })
}

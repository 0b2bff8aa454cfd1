//! Enclosing-Range Computer (C7): for a fixed base CPU, triangulates a
//! delta range against every other allowed CPU and combines them.
//!
//! Sound because a pairwise bound relative to the base implies a
//! factor-of-two bound between any two peers.

use crate::carousel;
use crate::cas_probe;
use crate::config::{Config, ProbeTiming};
use crate::delta_range::{analyze_carousel, analyze_cas, DeltaRange};
use crate::error::Result;

/// Runs the carousel sampler restricted to `{base, peer}` for every peer,
/// intersecting delta ranges into one enclosing range.
pub fn carousel_enclosing_range(base: usize, peers: &[usize], rounds: u32) -> Result<DeltaRange> {
    let mut min_lo = i64::MAX;
    let mut max_hi = i64::MIN;
    for &peer in peers {
        let arrays = carousel::sample(&[base, peer], rounds)?;
        let range = analyze_carousel(&arrays[0], &arrays[1])?;
        min_lo = min_lo.min(range.lo);
        max_hi = max_hi.max(range.hi);
    }
    Ok(DeltaRange {
        lo: min_lo,
        hi: max_hi,
    })
}

/// Runs the CAS-ordered prober restricted to `{base, peer}` for every
/// peer, intersecting delta ranges into one enclosing range.
pub fn cas_enclosing_range(
    base: usize,
    peers: &[usize],
    cfg: &Config,
    timing: &ProbeTiming,
) -> Result<DeltaRange> {
    let mut min_lo = i64::MAX;
    let mut max_hi = i64::MIN;
    for &peer in peers {
        let arrays = cas_probe::run(&[base, peer], cfg.cas_probes_range, timing)?;
        let stats = analyze_cas(&arrays[0], &arrays[1], cfg.delta_range_count_threshold)?;
        min_lo = min_lo.min(stats.range.lo);
        max_hi = max_hi.max(stats.range.hi);
    }
    Ok(DeltaRange {
        lo: min_lo,
        hi: max_hi,
    })
}


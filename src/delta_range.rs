//! Delta-Range Analyzer (C6): derives an interval containing the TSC
//! offset between two CPUs from either a carousel or a CAS-ordered probe
//! stream, intersecting across rounds/sub-sequences.

use crate::error::{Result, TscError};
use crate::probe::Probe;

/// A closed integer interval bounding `TSC_other - TSC_base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaRange {
    pub lo: i64,
    pub hi: i64,
}

impl DeltaRange {
    pub fn intersect(self, other: DeltaRange) -> Option<DeltaRange> {
        let lo = self.lo.max(other.lo);
        let hi = self.hi.min(other.hi);
        if lo <= hi {
            Some(DeltaRange { lo, hi })
        } else {
            None
        }
    }
}

/// Signed difference `a - b`, rejected as an inconsistency if it doesn't
/// fit in `[-i64::MAX, i64::MAX]`.
fn bounded_diff(a: u64, b: u64) -> Result<i64> {
    let diff = a as i128 - b as i128;
    if diff.unsigned_abs() > i64::MAX as u128 {
        return Err(TscError::inconsistency(
            "implausible inter-CPU TSC difference exceeds i64::MAX",
        ));
    }
    Ok(diff as i64)
}

/// Carousel variant: `base` has one extra trailing sample
/// (`base.len() == other.len() + 1`), taken after the final round.
pub fn analyze_carousel(base: &[u64], other: &[u64]) -> Result<DeltaRange> {
    if base.len() != other.len() + 1 {
        return Err(TscError::inconsistency(
            "carousel base array must have exactly one more sample than the peer array",
        ));
    }
    let rounds = other.len();
    if rounds == 0 {
        return Err(TscError::statistical("no carousel rounds to analyze"));
    }

    let mut acc: Option<DeltaRange> = None;
    for i in 0..rounds {
        if base[i + 1] < base[i] {
            return Err(TscError::inconsistency(
                "base TSC decreased within a carousel round; possible wraparound",
            ));
        }
        if i > 0 && other[i] < other[i - 1] {
            return Err(TscError::inconsistency(
                "peer TSC decreased within a carousel round; possible wraparound",
            ));
        }

        let bound_lo = bounded_diff(other[i], base[i + 1])?;
        let bound_hi = bounded_diff(other[i], base[i])?;
        let range = DeltaRange {
            lo: bound_lo,
            hi: bound_hi,
        };

        acc = Some(match acc {
            None => range,
            Some(prev) => prev
                .intersect(range)
                .ok_or_else(|| TscError::inconsistency("carousel delta-range intersection is empty"))?,
        });
    }

    acc.ok_or_else(|| TscError::statistical("no carousel rounds to analyze"))
}

/// Outcome of the CAS-ordered variant: the intersected range plus how many
/// enclosing pairs supported it, for the statistical-significance gate.
#[derive(Debug, Clone, Copy)]
pub struct CasDeltaStats {
    pub range: DeltaRange,
    pub n_pairs: usize,
}

fn check_nondecreasing(probes: &[Probe], label: &str) -> Result<()> {
    for w in probes.windows(2) {
        if w[1].tsc < w[0].tsc {
            return Err(TscError::inconsistency(format!(
                "{label} TSC decreased between successive probes; possible wraparound"
            )));
        }
    }
    Ok(())
}

/// CAS-ordered variant: slides through the merged, seq-ordered stream of
/// `base` and `other` looking for pairs of successive base probes that
/// enclose at least one `other` probe.
pub fn analyze_cas(
    base: &[Probe],
    other: &[Probe],
    count_threshold: usize,
) -> Result<CasDeltaStats> {
    check_nondecreasing(base, "base")?;
    check_nondecreasing(other, "peer")?;

    let mut merged: Vec<(bool, Probe)> = Vec::with_capacity(base.len() + other.len());
    merged.extend(base.iter().map(|&p| (true, p)));
    merged.extend(other.iter().map(|&p| (false, p)));
    merged.sort_by_key(|(_, p)| p.seq);

    let mut acc: Option<DeltaRange> = None;
    let mut n_pairs = 0usize;
    let mut i = 0;
    while i < merged.len() {
        if !merged[i].0 {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        let mut enclosed_lo: Option<u64> = None;
        let mut enclosed_hi: Option<u64> = None;
        while j < merged.len() && !merged[j].0 {
            let tsc = merged[j].1.tsc;
            enclosed_lo = Some(enclosed_lo.map_or(tsc, |lo: u64| lo.min(tsc)));
            enclosed_hi = Some(enclosed_hi.map_or(tsc, |hi: u64| hi.max(tsc)));
            j += 1;
        }

        if j < merged.len() {
            if let (Some(t_lo), Some(t_hi)) = (enclosed_lo, enclosed_hi) {
                let t1 = merged[i].1.tsc;
                let t2 = merged[j].1.tsc;
                if t2 < t1 {
                    return Err(TscError::inconsistency(
                        "base TSC decreased across an enclosing pair",
                    ));
                }
                if (t2 - t1) < (t_hi - t_lo) {
                    return Err(TscError::inconsistency(
                        "peer CPU advanced faster than the enclosing base interval",
                    ));
                }
                let bound_lo = bounded_diff(t_hi, t2)?;
                let bound_hi = bounded_diff(t_lo, t1)?;
                let range = DeltaRange {
                    lo: bound_lo,
                    hi: bound_hi,
                };
                acc = Some(match acc {
                    None => range,
                    Some(prev) => prev.intersect(range).ok_or_else(|| {
                        TscError::inconsistency("CAS delta-range intersection is empty")
                    })?,
                });
                n_pairs += 1;
            }
        }
        i = j;
    }

    match acc {
        Some(range) if n_pairs >= count_threshold => Ok(CasDeltaStats { range, n_pairs }),
        _ => Err(TscError::statistical(format!(
            "only {n_pairs} enclosing pairs found, need at least {count_threshold}"
        ))),
    }
}

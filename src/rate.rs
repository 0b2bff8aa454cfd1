//! Rate Estimator (C9): measures TSC ticks per second via paired timed
//! reads, cleaning outliers with a mean±σ filter.

use std::mem::zeroed;
use std::time::Duration;

use crate::error::{Result, TscError};
use crate::tsc::read_tsc;

/// Reads `CLOCK_MONOTONIC_RAW`, in nanoseconds since an unspecified
/// epoch. Unlike `CLOCK_MONOTONIC` (what `std::time::Instant` wraps on
/// Linux), this clock is immune to NTP frequency slewing, which matters
/// here because the slewing would otherwise bias the measured tick rate.
fn monotonic_raw_ns() -> Result<i128> {
    let mut ts: libc::timespec = unsafe { zeroed() };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts) };
    if rc != 0 {
        return Err(TscError::environment(format!(
            "clock_gettime(CLOCK_MONOTONIC_RAW) failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(ts.tv_sec as i128 * 1_000_000_000 + ts.tv_nsec as i128)
}

/// One (wall-clock, TSC) reading pair.
fn timed_read() -> Result<(i128, u64)> {
    // Read wall time first, then TSC: syscall overhead biases the wall
    // reading slightly old relative to the TSC, and reading both ends in
    // the same order cancels that bias.
    Ok((monotonic_raw_ns()?, read_tsc()))
}

fn one_sample(match_period: Duration) -> Result<u64> {
    let (t_start, s_start) = timed_read()?;
    let match_period_ns = match_period.as_nanos() as i128;
    let (t_end, s_end) = loop {
        let (t, s) = timed_read()?;
        if t - t_start >= match_period_ns {
            break (t, s);
        }
    };

    if s_end <= s_start {
        return Err(TscError::inconsistency(
            "TSC did not advance during a rate-estimation sample",
        ));
    }

    let elapsed_ns = (t_end - t_start) as u128;
    if elapsed_ns == 0 {
        return Err(TscError::inconsistency(
            "zero elapsed wall-clock time in a rate-estimation sample",
        ));
    }
    let tick_diff = (s_end - s_start) as u128;
    let scaled = tick_diff * 1_000_000_000u128;
    if scaled / elapsed_ns > u64::MAX as u128 {
        return Err(TscError::inconsistency(
            "tick difference does not fit after scaling to ticks per second",
        ));
    }
    Ok((scaled / elapsed_ns) as u64)
}

/// Welford's incremental mean/variance, then keeps samples within one
/// corrected standard deviation, then averages the kept samples by
/// summing offsets from the minimum (avoiding u64 overflow of the raw
/// sum) before adding the minimum back.
fn clean_outliers(samples: &[u64]) -> Result<u64> {
    if samples.is_empty() {
        return Err(TscError::statistical("no rate samples collected"));
    }

    let mut mean = 0f64;
    let mut m2 = 0f64;
    for (i, &x) in samples.iter().enumerate() {
        let n = (i + 1) as f64;
        let delta = x as f64 - mean;
        mean += delta / n;
        let delta2 = x as f64 - mean;
        m2 += delta * delta2;
    }
    let std_dev = if samples.len() > 1 {
        (m2 / (samples.len() as f64 - 1.0)).sqrt()
    } else {
        0.0
    };

    let kept: Vec<u64> = samples
        .iter()
        .copied()
        .filter(|&x| (x as f64 - mean).abs() <= std_dev)
        .collect();
    if kept.is_empty() {
        return Err(TscError::statistical(
            "every rate sample was rejected by the outlier filter",
        ));
    }

    let min = kept.iter().copied().fold(u64::MAX, u64::min);
    let sum_offsets: u64 = kept.iter().map(|&x| x - min).sum();
    Ok(min + sum_offsets / kept.len() as u64)
}

/// Estimates TSC ticks per second by taking `sample_count` paired timed
/// reads of `match_period` each and filtering outliers.
pub fn estimate(sample_count: usize, match_period: Duration) -> Result<u64> {
    let mut samples = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        match one_sample(match_period) {
            Ok(sample) => samples.push(sample),
            Err(e) => {
                tracing::debug!(error = %e, "rejecting rate sample");
                return Err(e);
            }
        }
    }
    clean_outliers(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_outliers_averages_tight_cluster() {
        let samples = vec![2_000_000_000u64; 30];
        let rate = clean_outliers(&samples).unwrap();
        assert_eq!(rate, 2_000_000_000);
    }

    #[test]
    fn clean_outliers_drops_far_outlier() {
        let mut samples = vec![2_000_000_000u64; 29];
        samples.push(2_000_000_000_000u64); // wildly high outlier
        let rate = clean_outliers(&samples).unwrap();
        // The outlier should be filtered; result stays near the cluster.
        assert!(rate < 2_100_000_000);
    }

    #[test]
    fn clean_outliers_rejects_empty_input() {
        assert!(clean_outliers(&[]).is_err());
    }

    #[test]
    fn estimate_against_real_clock_is_plausible() {
        // A real end-to-end sample on whatever machine runs this test:
        // just sanity-check it lands in a plausible GHz-scale range.
        let rate = estimate(3, Duration::from_millis(20)).expect("estimate should succeed");
        assert!(rate > 100_000_000, "rate implausibly low: {rate}");
        assert!(rate < 100_000_000_000, "rate implausibly high: {rate}");
    }
}

//! Conversion-Parameter Builder (C10): a division-free multiply-shift
//! TSC→nanosecond conversion with bounded error, plus seconds-before-wrap.

use crate::affinity::pin_to;
use crate::error::{Result, TscError};
use crate::tsc::read_tsc;

/// Parameters for the hot-path `ticks_to_ns` conversion. Built once, read
/// many times; small enough to live in registers/cache.
#[derive(Debug, Clone, Copy)]
pub struct ConversionParams {
    pub mult: u64,
    pub shift: u8,
    pub ns_per_tsc_modulus: u64,
    pub tsc_remainder_bits: u8,
    pub tsc_remainder_mask: u64,
}

fn floor_log2(x: u128) -> Option<u32> {
    if x == 0 {
        None
    } else {
        Some(127 - x.leading_zeros())
    }
}

/// Builds conversion parameters for a measured `ticks_per_sec` rate and a
/// configured modulus, in seconds.
pub fn build_params(ticks_per_sec: u64, modulus_secs: u64) -> Result<ConversionParams> {
    let ticks_per_modulus_wide = modulus_secs as u128 * ticks_per_sec as u128;
    if ticks_per_modulus_wide > u64::MAX as u128 || ticks_per_modulus_wide == 0 {
        return Err(TscError::environment(
            "modulus_secs * ticks_per_sec does not fit in u64",
        ));
    }
    let ticks_per_modulus = ticks_per_modulus_wide as u64;

    let mult_bound = u64::MAX / ticks_per_modulus;
    let factor_bound = mult_bound as u128 * ticks_per_sec as u128 / 1_000_000_000u128;
    let shift = floor_log2(factor_bound).ok_or_else(|| {
        TscError::environment("measured rate and modulus yield no usable conversion shift")
    })? as u8;
    let factor = 1u128 << shift;

    let mult_wide = factor * 1_000_000_000u128 / ticks_per_sec as u128;
    if mult_wide > u64::MAX as u128 {
        return Err(TscError::environment(
            "computed multiplier does not fit in u64",
        ));
    }
    let mult = mult_wide as u64;

    let tsc_remainder_bits = floor_log2(ticks_per_modulus as u128).unwrap_or(0) as u8;
    let tsc_modulus = 1u64 << tsc_remainder_bits;
    let tsc_remainder_mask = tsc_modulus - 1;
    // Deliberately (tsc_modulus * mult) >> shift, not a direct
    // tsc_modulus * 10^9 / ticks_per_sec: every equal-length TSC range
    // must receive the same nanosecond worth, trading best-case accuracy
    // for accuracy uniformity.
    let ns_per_tsc_modulus = ((tsc_modulus as u128 * mult as u128) >> shift) as u64;

    Ok(ConversionParams {
        mult,
        shift,
        ns_per_tsc_modulus,
        tsc_remainder_bits,
        tsc_remainder_mask,
    })
}

/// Converts a raw TSC value into nanoseconds using only shifts, masks,
/// multiplications, and additions. By construction of `build_params`,
/// the multiplications below cannot overflow `u64` for any representable
/// `tsc`.
#[inline]
pub fn ticks_to_ns(tsc: u64, params: &ConversionParams) -> u64 {
    let whole = (tsc >> params.tsc_remainder_bits) * params.ns_per_tsc_modulus;
    let frac = ((tsc & params.tsc_remainder_mask) * params.mult) >> params.shift;
    whole + frac
}

/// Pin-visits every allowed CPU, reads its TSC, and returns the number of
/// whole seconds remaining before the highest-observed counter wraps
/// past `u64::MAX`.
pub fn seconds_before_wrap(cpus: &[usize], params: &ConversionParams) -> Result<u64> {
    let mut max_tsc = 0u64;
    for &cpu in cpus {
        pin_to(cpu)?;
        let t = read_tsc();
        if t > max_tsc {
            max_tsc = t;
        }
    }
    let remaining_ticks = u64::MAX - max_tsc;
    Ok(ticks_to_ns(remaining_ticks, params) / 1_000_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_conversion_is_within_tolerance() {
        let ticks_per_sec = 2_000_000_000u64;
        let params = build_params(ticks_per_sec, 10).unwrap();
        let ns = ticks_to_ns(ticks_per_sec, &params);
        // 0.2 ms tolerance per hour of measured duration (here: 1 second).
        let tolerance_ns = 200_000u64 / 3600;
        let expected = 1_000_000_000u64;
        assert!(
            ns.abs_diff(expected) <= tolerance_ns.max(1),
            "ns={ns}, expected={expected}"
        );
    }

    #[test]
    fn one_hour_round_trip_within_0_2ms() {
        let ticks_per_sec = 3_333_333_333u64;
        let params = build_params(ticks_per_sec, 10).unwrap();
        let ticks = ticks_per_sec * 3600;
        let ns = ticks_to_ns(ticks, &params);
        let expected = 3600u64 * 1_000_000_000;
        assert!(ns.abs_diff(expected) <= 200_000, "ns={ns}, expected={expected}");
    }

    #[test]
    fn ideal_two_ghz_half_second() {
        let params = build_params(2_000_000_000, 10).unwrap();
        let ns = ticks_to_ns(1_000_000_000, &params);
        assert!(ns.abs_diff(500_000_000) <= 1, "ns={ns}");
    }

    #[test]
    fn no_overflow_for_max_tsc() {
        let params = build_params(3_000_000_000, 10).unwrap();
        // Should not panic for any representable tsc value.
        let _ = ticks_to_ns(u64::MAX, &params);
    }
}

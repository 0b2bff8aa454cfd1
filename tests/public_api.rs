//! End-to-end tests against the public API. Several of these touch real
//! hardware (TSC reads, CPU affinity) and adapt their expectations to
//! however many CPUs the test host actually exposes, per the crate's
//! documented single-CPU short-circuit.

use std::mem::{size_of, zeroed};
use std::time::Duration;

use quickcheck_macros::quickcheck;

use tscwall::{
    build_conversion_params_with_config, build_params, evaluate_tsc_reliability_cas_with_config,
    evaluate_tsc_reliability_carousel, evaluate_tsc_reliability_carousel_with_config,
    ticks_to_ns, Config, ProbeTiming, Status,
};

#[quickcheck]
fn ticks_to_ns_is_monotonic_in_tsc(a: u32, b: u32) -> bool {
    let params = build_params(2_000_000_000, 10).unwrap();
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    ticks_to_ns(lo as u64, &params) <= ticks_to_ns(hi as u64, &params)
}

/// `ticks_to_ns` truncates its fractional nanosecond on every call, so
/// doubling the tick count can't be exactly additive, but the two
/// truncations can only disagree by a single nanosecond.
#[quickcheck]
fn ticks_to_ns_doubling_is_additive_within_one_ns(t: u16) -> bool {
    let params = build_params(2_000_000_000, 10).unwrap();
    let single = ticks_to_ns(t as u64, &params);
    let doubled = ticks_to_ns(2 * t as u64, &params);
    doubled.abs_diff(2 * single) <= 1
}

#[test]
fn ticks_to_ns_of_zero_is_zero() {
    let params = build_params(3_333_333_333, 10).unwrap();
    assert_eq!(ticks_to_ns(0, &params), 0);
}

#[test]
fn carousel_evaluation_succeeds_on_this_host() {
    let result = evaluate_tsc_reliability_carousel().expect("carousel evaluation should succeed");
    assert!(result.monotonic);
    assert!(result.max_shift >= 0);
}

#[test]
fn build_conversion_params_produces_a_plausible_rate() {
    let cfg = Config {
        rate_samples: 5,
        match_period: Duration::from_millis(20),
        ..Config::default()
    };
    let result =
        build_conversion_params_with_config(&cfg).expect("conversion build should succeed");
    assert!(result.secs_before_wrap > 0);
}

fn allowed_cpu_count() -> usize {
    unsafe {
        let mut set: libc::cpu_set_t = zeroed();
        if libc::sched_getaffinity(0, size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return 1;
        }
        (0..libc::CPU_SETSIZE as usize)
            .filter(|&c| libc::CPU_ISSET(c, &set))
            .count()
    }
}

#[test]
fn single_cpu_affinity_short_circuits_carousel_evaluation() {
    let mut set: libc::cpu_set_t = unsafe { zeroed() };
    unsafe { libc::CPU_SET(0, &mut set) };
    let rc =
        unsafe { libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set as *const _) };
    assert_eq!(rc, 0, "failed to pin test thread to cpu 0");

    let result = evaluate_tsc_reliability_carousel_with_config(&Config::default())
        .expect("single-cpu evaluation should succeed trivially");
    assert!(result.monotonic);
    assert_eq!(result.max_shift, 0);
}

#[test]
fn cas_evaluation_under_a_tight_cancellation_budget_reports_generic_error() {
    if allowed_cpu_count() < 2 {
        eprintln!("skipping: test host exposes fewer than two CPUs");
        return;
    }

    let cfg = Config {
        cas_probes_range: 50_000_000,
        cas_probes_mono: 50_000_000,
        probe: ProbeTiming {
            run_budget: Duration::from_millis(10),
            join_poll: Duration::from_millis(1),
            cancel_budget: Duration::from_millis(10),
        },
        ..Config::default()
    };

    let err = evaluate_tsc_reliability_cas_with_config(&cfg)
        .expect_err("an impossibly large probe count should exceed the cancellation budget");
    assert_eq!(err.status(), Status::GenericError);
}

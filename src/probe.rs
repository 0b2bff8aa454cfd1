//! The `Probe` entity shared by the CAS-ordered prober, delta-range
//! analyzer, and monotonicity evaluator.

/// A single TSC reading tagged with its globally ordered sequence number.
///
/// Immutable once produced. `seq` is dense: across one run's probe
/// arrays, every value in `0..(k * probes_per_cpu)` appears exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub tsc: u64,
    pub seq: u64,
}

// Copyright 2021 TiKV Project Authors. Licensed under Apache-2.0.

//! Empirically verifies that the hardware Time-Stamp Counter (TSC) is
//! usable as a wall-clock source across every CPU a process is allowed
//! to run on, and builds the division-free parameters needed to convert
//! raw TSC reads into nanoseconds.
//!
//! Two independent evaluation strategies are offered:
//!
//! - [`evaluate_tsc_reliability_carousel`]: cheap, migrates one thread
//!   round-robin across CPUs.
//! - [`evaluate_tsc_reliability_cas`]: more expensive, races one thread
//!   per CPU through a shared atomic sequence counter for tighter delta
//!   bounds and statistical confidence from full-loop counting.
//!
//! [`build_conversion_params`] measures the TSC's tick rate and returns
//! [`ConversionParams`] for the hot-path [`ticks_to_ns`] conversion.
//! [`read_tsc`] is the raw one-instruction counter read underlying every
//! other operation in this crate.
//!
//! Every public evaluation captures the calling thread's CPU affinity on
//! entry and restores it before returning, on every exit path.

mod affinity;
mod carousel;
mod cas_probe;
mod config;
mod conversion;
mod delta_range;
mod enclosing;
mod error;
mod monotonic;
mod probe;
mod rate;
mod reliability;
mod supervisor;
mod tsc;

pub use config::{Config, ProbeTiming};
pub use conversion::{build_params, ticks_to_ns, ConversionParams};
pub use error::{ErrorKind, Result, Status, TscError};
pub use reliability::{
    build_conversion_params, build_conversion_params_with_config, evaluate_tsc_reliability_cas,
    evaluate_tsc_reliability_cas_with_config, evaluate_tsc_reliability_carousel,
    evaluate_tsc_reliability_carousel_with_config, ConversionBuildResult, ReliabilityResult,
};
pub use tsc::read_tsc;

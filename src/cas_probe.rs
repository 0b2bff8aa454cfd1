//! CAS-Ordered Prober (C4): one thread per allowed CPU, racing through a
//! shared sequence counter via atomic compare-and-swap.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::affinity::pin_to;
use crate::config::ProbeTiming;
use crate::error::{Result, TscError};
use crate::probe::Probe;
use crate::supervisor::run_supervised;
use crate::tsc::read_tsc;

struct ThreadOutcome {
    complete: bool,
    probes: Vec<Probe>,
}

/// Runs `probes_per_cpu` CAS-ordered probes on each CPU in `cpus`,
/// returning one array per CPU such that the union of their `seq` fields
/// is exactly `0..(cpus.len() * probes_per_cpu)`.
///
/// A single allowed CPU short-circuits to one empty array with no probe
/// threads created, per the boundary contract.
pub fn run(cpus: &[usize], probes_per_cpu: usize, timing: &ProbeTiming) -> Result<Vec<Vec<Probe>>> {
    let k = cpus.len();
    if k <= 1 {
        return Ok(vec![Vec::new(); k]);
    }

    let seq_counter = Arc::new(CachePadded::new(AtomicU64::new(0)));
    let ready = Arc::new(CachePadded::new(AtomicU32::new(0)));
    let target = k as u32;

    let bodies: Vec<Box<dyn FnOnce(Arc<AtomicBool>) -> ThreadOutcome + Send>> = cpus
        .iter()
        .map(|&cpu| {
            let seq_counter = seq_counter.clone();
            let ready = ready.clone();
            Box::new(move |abort: Arc<AtomicBool>| -> ThreadOutcome {
                probe_thread(cpu, probes_per_cpu, target, &seq_counter, &ready, &abort)
            }) as Box<dyn FnOnce(Arc<AtomicBool>) -> ThreadOutcome + Send>
        })
        .collect();

    let (outputs, mut report) = run_supervised(bodies, timing);

    let mut arrays = Vec::with_capacity(k);
    for output in outputs {
        match output {
            Some(outcome) if outcome.complete => arrays.push(outcome.probes),
            Some(_) => {
                report.nonzero_exits += 1;
                arrays.push(Vec::new());
            }
            None => arrays.push(Vec::new()),
        }
    }

    if !report.is_clean() {
        return Err(TscError::supervisor(format!(
            "probe supervisor failures: failed_creations={}, nonzero_exits={}, detached={}, timed_out={}",
            report.failed_creations, report.nonzero_exits, report.detached, report.timed_out
        )));
    }

    for probes in &arrays {
        check_first_last_distinct(probes)?;
    }

    Ok(arrays)
}

/// Consistency gate from the `ProbeArray` data model: `tsc` may repeat
/// within an array, but the first and last entries must differ, or the
/// CPU produced no usable signal across the whole run.
fn check_first_last_distinct(probes: &[Probe]) -> Result<()> {
    if let (Some(first), Some(last)) = (probes.first(), probes.last()) {
        if probes.len() > 1 && first.tsc == last.tsc {
            return Err(TscError::inconsistency(
                "tsc did not advance between the first and last probe on a cpu",
            ));
        }
    }
    Ok(())
}

fn probe_thread(
    cpu: usize,
    probes_per_cpu: usize,
    target: u32,
    seq_counter: &AtomicU64,
    ready: &AtomicU32,
    abort: &AtomicBool,
) -> ThreadOutcome {
    if let Err(e) = pin_to(cpu) {
        tracing::warn!(cpu, error = %e, "probe thread failed to pin");
        return ThreadOutcome {
            complete: false,
            probes: Vec::new(),
        };
    }

    // Startup barrier: every thread pins first, then spins until all
    // threads have signalled readiness, to minimize the window where
    // some CPUs would produce probes alone.
    ready.fetch_add(1, Ordering::AcqRel);
    while ready.load(Ordering::Acquire) < target {
        std::hint::spin_loop();
    }

    let mut probes = Vec::with_capacity(probes_per_cpu);
    while probes.len() < probes_per_cpu {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        loop {
            let s = seq_counter.load(Ordering::Acquire);
            // The full fence is mandatory: the TSC read has no data
            // dependency on the counter, so the compiler or CPU may
            // otherwise reorder it outside the CAS window.
            std::sync::atomic::fence(Ordering::SeqCst);
            let t = read_tsc();
            if seq_counter
                .compare_exchange(s, s + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                probes.push(Probe { tsc: t, seq: s });
                break;
            }
            if abort.load(Ordering::Relaxed) {
                return ThreadOutcome {
                    complete: false,
                    probes,
                };
            }
        }
    }

    ThreadOutcome {
        complete: probes.len() == probes_per_cpu,
        probes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_timing() -> ProbeTiming {
        ProbeTiming {
            run_budget: Duration::from_secs(5),
            join_poll: Duration::from_millis(5),
            cancel_budget: Duration::from_millis(100),
        }
    }

    #[test]
    fn single_cpu_short_circuits_with_no_threads() {
        let arrays = run(&[0], 1000, &fast_timing()).expect("single-cpu run should succeed");
        assert_eq!(arrays, vec![Vec::<Probe>::new()]);
    }

    #[test]
    fn constant_tsc_across_a_cpus_probes_is_inconsistency() {
        let stuck = vec![
            Probe { tsc: 500, seq: 0 },
            Probe { tsc: 500, seq: 1 },
            Probe { tsc: 500, seq: 2 },
        ];
        let err = check_first_last_distinct(&stuck).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Inconsistency);
    }

    #[test]
    fn advancing_tsc_passes_the_first_last_gate() {
        let advancing = vec![
            Probe { tsc: 100, seq: 0 },
            Probe { tsc: 100, seq: 1 },
            Probe { tsc: 200, seq: 2 },
        ];
        assert!(check_first_last_distinct(&advancing).is_ok());
    }
}

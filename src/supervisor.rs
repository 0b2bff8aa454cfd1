//! Probe-Thread Supervisor (C5): launch / barrier-start / timeout-cancel /
//! join / detach-on-stuck, generic over what the threads actually do.
//!
//! Kept independent of CPU affinity, sequence counters, and TSCs so its
//! state machine is unit-testable without real hardware pinning. The
//! CAS-Ordered Prober (`cas_probe`) is the only caller that plugs in a
//! body that pins, barrier-waits, and runs the CAS probe loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crate::config::ProbeTiming;

/// Aggregated failure counts from one supervised run, per the crate's
/// error-aggregation contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisorReport {
    pub failed_creations: usize,
    /// Always 0: cancellation here is a single atomic store, which cannot
    /// itself fail. Kept for shape-parity with the spec's error
    /// aggregation, which names "failed cancels" as its own bucket.
    pub failed_cancels: usize,
    pub nonzero_exits: usize,
    pub detached: usize,
    pub timed_out: bool,
}

impl SupervisorReport {
    pub fn is_clean(&self) -> bool {
        self.failed_creations == 0
            && self.failed_cancels == 0
            && self.nonzero_exits == 0
            && self.detached == 0
            && !self.timed_out
    }
}

type Body<T> = Box<dyn FnOnce(Arc<AtomicBool>) -> T + Send>;

/// Launches one thread per entry in `bodies`, each receiving a shared
/// cooperative-cancellation flag. Waits up to `timing.run_budget`; on
/// timeout, sets the cancellation flag and waits up to
/// `timing.cancel_budget` more before giving up on stragglers and
/// detaching them (dropping the `JoinHandle` without joining).
///
/// If the i-th thread fails to spawn, the cancellation flag is set
/// immediately, cancelling every thread already launched (indices
/// `0..i`) by construction; there is no index arithmetic to get wrong.
pub fn run_supervised<T: Send + 'static>(
    bodies: Vec<Body<T>>,
    timing: &ProbeTiming,
) -> (Vec<Option<T>>, SupervisorReport) {
    let abort = Arc::new(AtomicBool::new(false));
    let mut report = SupervisorReport::default();
    let total = bodies.len();
    let mut handles: Vec<Option<thread::JoinHandle<T>>> = Vec::with_capacity(total);

    for (i, body) in bodies.into_iter().enumerate() {
        let abort_clone = abort.clone();
        match thread::Builder::new()
            .name(format!("tscwall-probe-{i}"))
            .spawn(move || body(abort_clone))
        {
            Ok(handle) => handles.push(Some(handle)),
            Err(spawn_err) => {
                tracing::warn!(thread_index = i, error = %spawn_err, "probe thread failed to start");
                report.failed_creations += 1;
                abort.store(true, Ordering::Release);
                break;
            }
        }
    }
    while handles.len() < total {
        handles.push(None);
    }

    wait_until(&handles, Instant::now() + timing.run_budget, timing.join_poll);

    if !all_finished(&handles) {
        report.timed_out = true;
        tracing::warn!("probe run budget exceeded; requesting cancellation");
        abort.store(true, Ordering::Release);
        wait_until(
            &handles,
            Instant::now() + timing.cancel_budget,
            timing.join_poll,
        );
    }

    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle {
            None => outputs.push(None),
            Some(h) => {
                if h.is_finished() {
                    match h.join() {
                        Ok(value) => outputs.push(Some(value)),
                        Err(_) => {
                            report.nonzero_exits += 1;
                            outputs.push(None);
                        }
                    }
                } else {
                    report.detached += 1;
                    tracing::error!("probe thread did not join within cancel budget; detaching");
                    outputs.push(None);
                    // Intentionally not joined: `h` is dropped here, leaking
                    // the underlying OS thread as a detached straggler.
                }
            }
        }
    }

    (outputs, report)
}

fn all_finished<T>(handles: &[Option<thread::JoinHandle<T>>]) -> bool {
    handles
        .iter()
        .flatten()
        .all(|h| h.is_finished())
}

fn wait_until<T>(
    handles: &[Option<thread::JoinHandle<T>>],
    deadline: Instant,
    poll: std::time::Duration,
) {
    loop {
        if all_finished(handles) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(poll.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_timing() -> ProbeTiming {
        ProbeTiming {
            run_budget: Duration::from_millis(80),
            join_poll: Duration::from_millis(5),
            cancel_budget: Duration::from_millis(80),
        }
    }

    #[test]
    fn all_threads_complete_within_budget() {
        let bodies: Vec<Body<u32>> = (0..4)
            .map(|i| Box::new(move |_abort: Arc<AtomicBool>| i) as Body<u32>)
            .collect();
        let (outputs, report) = run_supervised(bodies, &fast_timing());
        assert!(report.is_clean());
        assert_eq!(outputs, vec![Some(0), Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn stuck_thread_is_cancelled_then_detached() {
        // This worker ignores the cancellation flag entirely, forcing the
        // supervisor through the full cancel-budget timeout and into the
        // detach path.
        let bodies: Vec<Body<()>> = vec![Box::new(|_abort: Arc<AtomicBool>| {
            thread::sleep(Duration::from_secs(10));
        })];
        let (outputs, report) = run_supervised(bodies, &fast_timing());
        assert!(report.timed_out);
        assert_eq!(report.detached, 1);
        assert_eq!(outputs, vec![None]);
    }

    #[test]
    fn cooperative_worker_honors_cancellation() {
        let bodies: Vec<Body<bool>> = vec![Box::new(|abort: Arc<AtomicBool>| {
            loop {
                if abort.load(Ordering::Relaxed) {
                    return true;
                }
                thread::sleep(Duration::from_millis(2));
            }
        })];
        let (outputs, report) = run_supervised(bodies, &fast_timing());
        assert!(report.timed_out);
        assert_eq!(report.detached, 0);
        assert_eq!(outputs, vec![Some(true)]);
    }
}

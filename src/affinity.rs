//! Process/System Probe (C1) and CPU Pinning (C2).
//!
//! Captures the calling thread's CPU affinity once, lets the rest of the
//! crate narrow it to single CPUs, and restores it on every exit path.

use std::mem::{size_of, zeroed};

use crate::error::{Result, TscError};
use crate::tsc::cache_line_size;

/// A CPU affinity mask, wrapping the platform's `cpu_set_t`.
#[derive(Clone)]
pub struct CpuSet {
    set: libc::cpu_set_t,
}

impl CpuSet {
    pub fn empty() -> Self {
        Self {
            set: unsafe { zeroed() },
        }
    }

    pub fn insert(&mut self, cpu: usize) {
        unsafe { libc::CPU_SET(cpu, &mut self.set) };
    }

    pub fn contains(&self, cpu: usize) -> bool {
        unsafe { libc::CPU_ISSET(cpu, &self.set) }
    }

    /// The CPU indices set in this mask, in ascending order.
    pub fn iter(&self, n_cpus: usize) -> Vec<usize> {
        (0..n_cpus).filter(|&c| self.contains(c)).collect()
    }
}

/// Affinity and machine facts captured at the start of a public operation,
/// to be restored before it returns.
pub struct ProcessState {
    pub n_cpus: usize,
    pub initial_cpu: usize,
    pub initial_mask: CpuSet,
    pub cache_line_size: usize,
}

impl ProcessState {
    /// The CPU indices this process is allowed to run on, in ascending order.
    pub fn allowed_cpus(&self) -> Vec<usize> {
        self.initial_mask.iter(self.n_cpus)
    }
}

/// Captures the current thread's CPU, affinity mask, CPU count, and the
/// machine's cache-line size.
pub fn capture_state() -> Result<ProcessState> {
    let n_cpus = configured_cpus()?;
    let initial_cpu = current_cpu()?;
    let initial_mask = current_affinity(n_cpus)?;
    let cache_line_size = cache_line_size()?;
    Ok(ProcessState {
        n_cpus,
        initial_cpu,
        initial_mask,
        cache_line_size,
    })
}

/// Restores affinity to exactly what `capture_state` observed.
///
/// Pins to `initial_cpu` alone first, to maximize the chance of returning
/// to that physical CPU and its warm caches, then widens to `initial_mask`.
/// Both steps must succeed; failure here is fatal to the enclosing
/// operation even if it otherwise completed successfully.
pub fn restore_state(state: &ProcessState) -> Result<()> {
    pin_to(state.initial_cpu).map_err(|e| {
        TscError::restoration(format!(
            "failed to restore affinity to initial cpu {}: {}",
            state.initial_cpu, e
        ))
    })?;
    set_affinity(&state.initial_mask).map_err(|e| {
        TscError::restoration(format!("failed to restore initial affinity mask: {e}"))
    })
}

/// Pins the calling thread to a single CPU.
pub fn pin_to(cpu: usize) -> Result<()> {
    let mut set = CpuSet::empty();
    set.insert(cpu);
    set_affinity(&set)
}

fn set_affinity(set: &CpuSet) -> Result<()> {
    let rc = unsafe {
        libc::sched_setaffinity(0, size_of::<libc::cpu_set_t>(), &set.set as *const _)
    };
    if rc != 0 {
        Err(TscError::environment(format!(
            "sched_setaffinity failed: {}",
            std::io::Error::last_os_error()
        )))
    } else {
        Ok(())
    }
}

fn current_affinity(n_cpus: usize) -> Result<CpuSet> {
    let _ = n_cpus;
    let mut set: libc::cpu_set_t = unsafe { zeroed() };
    let rc = unsafe { libc::sched_getaffinity(0, size_of::<libc::cpu_set_t>(), &mut set) };
    if rc != 0 {
        return Err(TscError::environment(format!(
            "sched_getaffinity failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(CpuSet { set })
}

fn current_cpu() -> Result<usize> {
    let rc = unsafe { libc::sched_getcpu() };
    if rc < 0 {
        Err(TscError::environment(format!(
            "sched_getcpu failed: {}",
            std::io::Error::last_os_error()
        )))
    } else {
        Ok(rc as usize)
    }
}

fn configured_cpus() -> Result<usize> {
    let rc = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if rc <= 0 {
        Err(TscError::environment("sysconf(_SC_NPROCESSORS_CONF) failed"))
    } else {
        Ok(rc as usize)
    }
}

/// Runs `f` with the process's affinity captured beforehand and restored
/// afterward on every exit path. A restoration failure is fatal even when
/// `f` succeeded: leaving the process pinned to one CPU would be an
/// invisible side effect on the caller.
pub fn with_restored_affinity<T>(f: impl FnOnce(&ProcessState) -> Result<T>) -> Result<T> {
    let state = capture_state()?;
    let outcome = f(&state);
    match restore_state(&state) {
        Ok(()) => outcome,
        Err(restore_err) => {
            tracing::error!(error = %restore_err, "affinity restoration failed");
            Err(restore_err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_set_insert_and_contains() {
        let mut set = CpuSet::empty();
        assert!(!set.contains(0));
        set.insert(0);
        assert!(set.contains(0));
        assert!(!set.contains(1));
    }

    #[test]
    fn capture_and_restore_round_trips() {
        let state = capture_state().expect("capture_state should succeed under test");
        restore_state(&state).expect("restore_state should succeed under test");
        let after = current_affinity(state.n_cpus).expect("re-query affinity");
        for cpu in state.allowed_cpus() {
            assert!(after.contains(cpu));
        }
    }
}

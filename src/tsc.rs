//! The hardware TSC read primitive and the one piece of host-specific
//! trivia the rest of the crate needs: the machine's cache-line size.
//!
//! The TSC read itself is out of scope for this crate's design, since it
//! is a one-instruction hardware read, so it is implemented here only at
//! its interface, the same way the teacher's `tsc_now.rs` does it.

use std::fs::read_to_string;

use crate::error::{Result, TscError};

/// Reads the current value of the Time-Stamp Counter on the calling CPU.
#[inline]
pub fn read_tsc() -> u64 {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::x86_64::_rdtsc()
    }
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::x86::_rdtsc()
    }
}

/// The machine's cache-line size, in bytes.
///
/// Treated as a single value for the whole machine; this crate is
/// documented as intended for homogeneous CPUs.
pub fn cache_line_size() -> Result<usize> {
    let path = "/sys/devices/system/cpu/cpu0/cache/index0/coherency_line_size";
    read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| TscError::environment("cannot determine cache-line size from sysfs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_tsc_advances() {
        let a = read_tsc();
        let b = read_tsc();
        assert!(b >= a);
    }
}

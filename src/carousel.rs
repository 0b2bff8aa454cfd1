//! Carousel Sampler (C3): a single thread migrated round-robin across a
//! fixed CPU list, reading the TSC once per stop.

use crate::affinity::pin_to;
use crate::error::Result;
use crate::tsc::read_tsc;

/// Samples `cpus` for `rounds` rounds, round-robin.
///
/// `cpus[0]` gets an extra trailing sample taken after the final round, so
/// `arrays[0].len() == rounds + 1` while every other array has length
/// `rounds`. Any pinning failure aborts the run.
pub fn sample(cpus: &[usize], rounds: u32) -> Result<Vec<Vec<u64>>> {
    let mut arrays: Vec<Vec<u64>> = cpus
        .iter()
        .map(|_| Vec::with_capacity(rounds as usize + 1))
        .collect();

    for _ in 0..rounds {
        for (i, &cpu) in cpus.iter().enumerate() {
            pin_to(cpu)?;
            arrays[i].push(read_tsc());
        }
    }

    pin_to(cpus[0])?;
    arrays[0].push(read_tsc());

    Ok(arrays)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_sample_length_contract() {
        // Single-CPU carousel never migrates but still honors the length
        // contract: arrays[0] has rounds + 1 samples.
        let arrays = sample(&[0], 5).expect("pinning to cpu 0 should succeed under test");
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays[0].len(), 6);
    }
}

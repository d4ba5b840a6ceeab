//! Thread-local RNG state capture/restore for deterministic recompute
//! (spec §3 `has_saved_rng`/`saved_rng_blob`, §9 "RNG capture").
//!
//! The op library consults [`next_seed`] whenever a stochastic op needs a
//! fresh seed. Checkpointing a node that depends on such an op must capture
//! this counter *before* the snapshot and restore it *before* recompute, or
//! the recomputed activation silently diverges from the original.

use std::cell::Cell;

thread_local! {
    static RNG_COUNTER: Cell<u64> = Cell::new(0);
}

/// Returns the next seed in this thread's stochastic-op sequence, advancing
/// the counter.
pub fn next_seed() -> u64 {
    RNG_COUNTER.with(|c| {
        let v = c.get();
        c.set(v.wrapping_add(1));
        v
    })
}

/// Captures the current counter as an opaque byte blob.
pub fn capture() -> Vec<u8> {
    RNG_COUNTER.with(|c| c.get().to_le_bytes().to_vec())
}

/// Restores the counter from a blob previously produced by [`capture`].
pub fn restore(blob: &[u8]) {
    if blob.len() != 8 {
        log::error!("rng blob has unexpected length {}, ignoring", blob.len());
        return;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(blob);
    RNG_COUNTER.with(|c| c.set(u64::from_le_bytes(bytes)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_then_restore_rewinds_counter() {
        let _ = next_seed();
        let _ = next_seed();
        let snapshot = capture();
        let _ = next_seed();
        let _ = next_seed();
        restore(&snapshot);
        assert_eq!(next_seed(), u64::from_le_bytes(snapshot.try_into().unwrap()));
    }
}

//! End-to-end scenario 3: capturing snapshots then evicting non-checkpoint
//! activations does not change the backward result.

mod common;

use gradflow::{auto_checkpoint_every_n, backward, capture_checkpoint_snapshots, evict_non_checkpoint_values};

#[test]
fn eviction_preserves_backward_correctness() {
    let (baseline_loss, baseline_params) = common::build_dense_stack(8);
    backward(&baseline_loss, None).unwrap();

    let (evicted_loss, evicted_params) = common::build_dense_stack(8);
    auto_checkpoint_every_n(&evicted_loss, 2);
    capture_checkpoint_snapshots(&evicted_loss);
    evict_non_checkpoint_values(&evicted_loss);
    backward(&evicted_loss, None).unwrap();

    for (a, b) in baseline_params.iter().zip(evicted_params.iter()) {
        assert!(common::grads_close(a, b, 1e-5), "grad mismatch beyond tolerance");
    }
}

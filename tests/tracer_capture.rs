//! End-to-end scenario 5: a small MLP forward pass built inside a capture
//! scope is fully recovered by the tracer, in dependency order.

use gradflow::{make_tensor, make_tracer, param, CaptureGuard, Node, Op, Tensor};

#[test]
fn capture_scope_topo_sorts_leaves_before_loss_and_isolates_output() {
    let tracer = make_tracer();

    let loss = {
        let _guard = CaptureGuard::new(&tracer);

        let x = param(Tensor::from_rows(vec![vec![1.0, -2.0, 0.5]]), Some("x"));
        let w1 = param(
            Tensor::from_rows(vec![vec![0.1, 0.2], vec![0.3, 0.4], vec![0.5, 0.6]]),
            Some("w1"),
        );
        let b1 = param(Tensor::from_rows(vec![vec![0.01, -0.02]]), Some("b1"));
        let w2 = param(Tensor::from_rows(vec![vec![1.0], vec![-1.0]]), Some("w2"));
        let b2 = param(Tensor::from_rows(vec![vec![0.05]]), Some("b2"));
        let y = make_tensor(Tensor::from_rows(vec![vec![1.0]]), Some("y"), false);

        let pre1 = Node::new(Op::MatMul, vec![x, w1], Tensor::empty(), true, None);
        let biased1 = Node::new(Op::Add, vec![pre1, b1], Tensor::empty(), true, None);
        let activated = Node::new(Op::Gelu, vec![biased1], Tensor::empty(), true, None);
        let pre2 = Node::new(Op::MatMul, vec![activated, w2], Tensor::empty(), true, None);
        let biased2 = Node::new(Op::Add, vec![pre2, b2], Tensor::empty(), true, None);
        let loss = Node::new(Op::MseLoss, vec![biased2, y], Tensor::empty(), true, None);

        tracer.mark_output(&loss);
        loss
    };

    // Nothing created outside the guard should show up in the capture.
    let _untracked = param(Tensor::scalar(42.0), None);

    let outs = tracer.outputs();
    assert_eq!(outs.len(), 1);
    assert_eq!(outs[0].borrow().id, loss.borrow().id);

    let order = tracer.topo_sort();
    let ids: Vec<_> = order.iter().map(|n| n.borrow().id).collect();
    assert!(!ids.contains(&_untracked.borrow().id));

    let pos_loss = ids.iter().position(|&id| id == loss.borrow().id).unwrap();
    assert_eq!(pos_loss, ids.len() - 1, "loss (the marked output) must be last");

    // Every leaf appears somewhere before the final node.
    for node in tracer.captured_nodes() {
        if node.borrow().op == Op::Leaf {
            let leaf_pos = ids.iter().position(|&id| id == node.borrow().id).unwrap();
            assert!(leaf_pos < pos_loss);
        }
    }
}

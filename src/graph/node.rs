//! Node entity (spec §3).

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ops::Op;
use crate::tensor::Tensor;

/// Unique, process-wide node identity. Used for dedup in the tracer and for
/// error messages; carries no ordering guarantee by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

fn next_id() -> NodeId {
    NodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Occupancy-only marker for a checkpoint's saved-input slot. Its *presence*,
/// not its contents, gates recomputation (spec §3, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedInputSlot {
    Empty,
    Recorded,
}

/// One value in the dataflow graph.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub op: Op,
    pub inputs: Vec<NodeRef>,
    pub value: Tensor,
    pub grad: Tensor,
    pub requires_grad: bool,
    pub is_checkpoint: bool,
    pub saved_input_tensors: Vec<Tensor>,
    pub saved_inputs: Vec<SavedInputSlot>,
    pub has_saved_rng: bool,
    pub saved_rng_blob: Option<Vec<u8>>,
    pub tape: Vec<Tensor>,
    pub debug_name: Option<String>,
    /// Bumped every time `value` is overwritten (forward, recompute). Lets
    /// downstream in-place reasoning detect staleness (spec §4.5 step 5,
    /// §5 "version-tracking layer").
    pub version: u64,
}

pub type NodeRef = Rc<RefCell<Node>>;

impl Node {
    pub fn new_leaf(value: Tensor, requires_grad: bool, debug_name: Option<String>) -> NodeRef {
        Self::new(Op::Leaf, Vec::new(), value, requires_grad, debug_name)
    }

    pub fn new(
        op: Op,
        inputs: Vec<NodeRef>,
        value: Tensor,
        requires_grad: bool,
        debug_name: Option<String>,
    ) -> NodeRef {
        let node = Node {
            id: next_id(),
            op,
            inputs,
            grad: Tensor::empty(),
            value,
            requires_grad,
            is_checkpoint: false,
            saved_input_tensors: Vec::new(),
            saved_inputs: Vec::new(),
            has_saved_rng: false,
            saved_rng_blob: None,
            tape: Vec::new(),
            debug_name,
            version: 0,
        };
        let node_ref = Rc::new(RefCell::new(node));
        crate::hooks::on_node_created(&node_ref);
        node_ref
    }

    pub fn label(&self) -> crate::error::NodeLabel {
        crate::error::NodeLabel {
            id: self.id,
            op: self.op.name(),
        }
    }
}

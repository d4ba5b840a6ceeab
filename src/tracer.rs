//! Graph tracer: thread-scoped node-creation capture (spec §4.4).

use std::collections::HashSet;
use std::sync::Arc;

use spin::Mutex;

use crate::graph::{NodeId, NodeRef};
use crate::hooks::{pop_node_created_hook, push_node_created_hook};

#[derive(Default)]
struct TracerState {
    captured: Vec<NodeRef>,
    captured_ids: HashSet<NodeId>,
    outputs: Vec<NodeRef>,
    output_ids: HashSet<NodeId>,
}

/// Captures every node created within a scoped region on the current
/// thread, in insertion order, deduplicated by node identity.
///
/// Safe to share across threads: a single internal mutex guards the
/// insertion list, dedup set, and output markers (spec §4.4, §5). The
/// observer-callback stack that feeds it is per-thread; a tracer installs
/// itself only in the thread that calls [`Tracer::start`].
#[derive(Clone)]
pub struct Tracer {
    state: Arc<Mutex<TracerState>>,
}

pub fn make_tracer() -> Tracer {
    Tracer {
        state: Arc::new(Mutex::new(TracerState::default())),
    }
}

impl Tracer {
    /// Installs this tracer's observer on the current thread's hook stack.
    /// Nesting is supported; the most recently started tracer on a thread
    /// receives node-creation events until it (or an inner tracer) stops.
    pub fn start(&self) {
        let state = self.state.clone();
        push_node_created_hook(Box::new(move |node: &NodeRef| {
            let mut s = state.lock();
            let id = node.borrow().id;
            if s.captured_ids.insert(id) {
                s.captured.push(node.clone());
            }
        }));
    }

    /// Pops the top observer off the current thread's hook stack.
    pub fn stop(&self) {
        pop_node_created_hook();
    }

    pub fn captured_nodes(&self) -> Vec<NodeRef> {
        self.state.lock().captured.clone()
    }

    pub fn mark_output(&self, node: &NodeRef) {
        let mut s = self.state.lock();
        let id = node.borrow().id;
        if s.output_ids.insert(id) {
            s.outputs.push(node.clone());
        }
    }

    /// Explicit outputs in capture order if any were marked; otherwise the
    /// sinks of the captured subgraph (captured nodes not used as an input
    /// by any other captured node); otherwise the last captured node.
    pub fn outputs(&self) -> Vec<NodeRef> {
        let s = self.state.lock();
        if !s.outputs.is_empty() {
            return s.outputs.clone();
        }

        let mut referenced: HashSet<NodeId> = HashSet::new();
        for node in &s.captured {
            for parent in &node.borrow().inputs {
                referenced.insert(parent.borrow().id);
            }
        }
        let sinks: Vec<NodeRef> = s
            .captured
            .iter()
            .filter(|n| !referenced.contains(&n.borrow().id))
            .cloned()
            .collect();
        if !sinks.is_empty() {
            return sinks;
        }

        s.captured.last().cloned().into_iter().collect()
    }

    /// Parent-before-child order restricted to the captured set. DFS from
    /// each detected output over inputs filtered to the captured set,
    /// emitting post-order then reversed; nodes unreachable from any output
    /// are appended afterward so none are dropped.
    pub fn topo_sort(&self) -> Vec<NodeRef> {
        let outputs = self.outputs();
        let s = self.state.lock();
        let captured_ids: HashSet<NodeId> = s.captured.iter().map(|n| n.borrow().id).collect();

        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut post_order = Vec::new();
        for out in &outputs {
            visit(out, &captured_ids, &mut visited, &mut post_order);
        }
        post_order.reverse();

        for node in &s.captured {
            let id = node.borrow().id;
            if visited.insert(id) {
                post_order.push(node.clone());
            }
        }

        post_order
    }

    pub fn clear(&self) {
        let mut s = self.state.lock();
        s.captured.clear();
        s.captured_ids.clear();
        s.outputs.clear();
        s.output_ids.clear();
    }
}

fn visit(
    node: &NodeRef,
    captured_ids: &HashSet<NodeId>,
    visited: &mut HashSet<NodeId>,
    post_order: &mut Vec<NodeRef>,
) {
    let id = node.borrow().id;
    if !visited.insert(id) {
        return;
    }
    let inputs = node.borrow().inputs.clone();
    for parent in &inputs {
        if captured_ids.contains(&parent.borrow().id) {
            visit(parent, captured_ids, visited, post_order);
        }
    }
    post_order.push(node.clone());
}

/// RAII scope: starts `tracer` on construction, stops it on drop.
pub struct CaptureGuard<'a> {
    tracer: &'a Tracer,
}

impl<'a> CaptureGuard<'a> {
    pub fn new(tracer: &'a Tracer) -> Self {
        tracer.start();
        CaptureGuard { tracer }
    }
}

impl<'a> Drop for CaptureGuard<'a> {
    fn drop(&mut self) {
        self.tracer.stop();
    }
}

//! Thread-local "node created" callback stack (spec §4.6).
//!
//! The sole coupling between op constructors and the tracer/diagnostic
//! subsystems: `Node::new` calls [`on_node_created`] unconditionally, and
//! whichever observer is on top of the calling thread's stack (if any) is
//! invoked. Pushing/popping is LIFO; pairing `push`/`pop` is the caller's
//! responsibility (mirrors the source's discipline per spec §9).

use std::cell::RefCell;

use crate::graph::NodeRef;

pub type Hook = Box<dyn Fn(&NodeRef)>;

thread_local! {
    static HOOKS: RefCell<Vec<Hook>> = RefCell::new(Vec::new());
}

/// Pushes a new observer onto this thread's stack. O(1).
pub fn push_node_created_hook(hook: Hook) {
    HOOKS.with(|h| h.borrow_mut().push(hook));
}

/// Pops the top observer off this thread's stack, regardless of identity.
pub fn pop_node_created_hook() {
    HOOKS.with(|h| {
        h.borrow_mut().pop();
    });
}

/// Invokes the top-of-stack observer, if any, with the newly created node.
pub fn on_node_created(node: &NodeRef) {
    HOOKS.with(|h| {
        if let Some(hook) = h.borrow().last() {
            hook(node);
        }
    });
}

//! Cooperative cancellation shared between pipeline stages.
//!
//! A token can be raised by the interrupt handler installed with
//! [`install_interrupt_handler`], or by a stage that has already failed and
//! wants its sibling work to stop. Stages that need a local stop signal take
//! a [`CancellationToken::child`]: raising the child leaves the parent
//! untouched, while raising the parent stops every child.

use log::warn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit code for a run stopped by `SIGINT` or `SIGTERM`.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// A cloneable flag that, once raised, asks every stage to stop at its next
/// checkpoint. Work already in flight is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<Self>>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a token that observes this one but can be raised on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Raise the flag for this token, its clones and its children.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested here or on any ancestor.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_deref()
                .is_some_and(Self::is_cancelled)
    }
}

/// Raise `token` on the first `SIGINT`/`SIGTERM`; exit at once on the second.
///
/// # Errors
///
/// Returns the `ctrlc` error when a handler is already installed or the
/// platform refuses the registration.
pub fn install_interrupt_handler(token: &CancellationToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            warn!("second interrupt received; exiting immediately");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        warn!("interrupt received; stopping at the next checkpoint");
        token.cancel();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_cancellation() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn children_observe_their_parent() {
        let root = CancellationToken::new();
        let child = root.child();
        let grandchild = child.child();
        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn raising_a_child_leaves_the_parent_running() {
        let root = CancellationToken::new();
        let child = root.child();
        let sibling_view = child.clone();
        child.cancel();
        assert!(sibling_view.is_cancelled());
        assert!(!root.is_cancelled());
    }
}

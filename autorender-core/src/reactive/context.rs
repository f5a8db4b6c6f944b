//! Reactive Context
//!
//! The reactive context tracks which observer is currently running.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the read is recorded against the observer on top of the stack.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When an observer runs, we push an entry for it. Reads append to the top
//! entry only, so nested observers keep separate dependency sets. When the
//! guard drops the entry is popped, even if the computation panicked.
//!
//! [`untrack`] pushes an entry without a subscriber; reads inside it are
//! not recorded anywhere.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::key::PropertyKey;
use super::SubscriberId;

/// Reads recorded by a single execution. Most renders touch a handful of
/// properties, so they stay inline.
pub type Dependencies = SmallVec<[PropertyKey; 8]>;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The observer being executed, `None` for an untracked section.
    subscriber_id: Option<SubscriberId>,
    /// Properties read so far, in read order, possibly repeated.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    ///
    /// While this context is on top of the stack, every reactive read is
    /// recorded against it.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: Dependencies::new(),
            });
        });

        Self { subscriber_id }
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the subscriber the next read would be recorded against.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber_id)
        })
    }

    /// Record a read of the given property.
    pub fn track(key: PropertyKey) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber_id.is_some() {
                    entry.dependencies.push(key);
                }
            }
        });
    }

    /// Get a copy of the reads recorded in the current context.
    #[cfg(test)]
    fn get_dependencies() -> Vec<PropertyKey> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.to_vec())
                .unwrap_or_default()
        })
    }

    /// Move the recorded reads out of this context.
    ///
    /// Must be called while this guard is still the top of the stack.
    pub fn take_dependencies(&self) -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(entry) => {
                    debug_assert_eq!(entry.subscriber_id, self.subscriber_id);
                    std::mem::take(&mut entry.dependencies)
                }
                None => Dependencies::new(),
            }
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

/// Run `f` without recording any reactive reads it performs.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::push(None);
    f()
}

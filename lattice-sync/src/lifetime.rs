//! Lifetimes
//!
//! A [`Lifetime`] is a teardown scope. Signals, subscriptions and action
//! handlers register cleanup callbacks against the lifetime that owns them;
//! terminating the lifetime runs those callbacks and so unregisters
//! everything at once. There is no separate cancellation token.
//!
//! # Contract
//!
//! - Callbacks run exactly once, in **reverse registration order** (LIFO).
//! - A callback registered on an already terminated lifetime runs
//!   immediately.
//! - [`terminate`](Lifetime::terminate) is idempotent.
//! - A child created with [`create_child`](Lifetime::create_child) is
//!   terminated by its parent. The parent tears the child down at the point
//!   where the child was created in the parent's LIFO order, so everything
//!   registered on the parent after the child still runs first.
//! - A child that ends before its parent takes its teardown entry off the
//!   parent, so short-lived children never pile up on a long-lived root.
//!   Any other callback can be taken off the same way with
//!   [`cancel`](Lifetime::cancel).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Counter for generating unique lifetime IDs.
static LIFETIME_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Counter for generating callback registration keys.
static CALLBACK_KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

type Callback = Box<dyn FnOnce() + Send>;

/// Identifies one callback registered with [`Lifetime::on_terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackKey(u64);

impl CallbackKey {
    fn next() -> Self {
        Self(CALLBACK_KEY_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct State {
    terminated: bool,
    /// Insertion order is registration order.
    callbacks: IndexMap<CallbackKey, Callback>,
}

struct Inner {
    id: u64,
    /// The parent and the key of this lifetime's entry in its callbacks.
    parent: Option<(Lifetime, CallbackKey)>,
    state: Mutex<State>,
}

/// A cloneable handle to a teardown scope.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<Inner>,
}

impl Lifetime {
    /// Create a new root lifetime.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    fn with_parent(parent: Option<(Lifetime, CallbackKey)>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: LIFETIME_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                parent,
                state: Mutex::new(State {
                    terminated: false,
                    callbacks: IndexMap::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&Lifetime> {
        self.inner.parent.as_ref().map(|(parent, _)| parent)
    }

    /// Whether `ancestor` is this lifetime's parent, grandparent, and so on.
    pub fn is_descendant_of(&self, ancestor: &Lifetime) -> bool {
        let mut current = self.parent();
        while let Some(lifetime) = current {
            if lifetime == ancestor {
                return true;
            }
            current = lifetime.parent();
        }
        false
    }

    /// Create a lifetime that ends no later than this one.
    pub fn create_child(&self) -> Lifetime {
        let key = CallbackKey::next();
        let child = Self::with_parent(Some((self.clone(), key)));
        let weak: Weak<Inner> = Arc::downgrade(&child.inner);
        self.register(key, move || {
            if let Some(inner) = weak.upgrade() {
                Lifetime { inner }.terminate();
            }
        });
        child
    }

    /// Register a callback to run when this lifetime terminates.
    ///
    /// The returned key can [`cancel`](Self::cancel) the callback while it
    /// has not run yet.
    pub fn on_terminate<F>(&self, callback: F) -> CallbackKey
    where
        F: FnOnce() + Send + 'static,
    {
        let key = CallbackKey::next();
        self.register(key, callback);
        key
    }

    fn register<F>(&self, key: CallbackKey, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.terminated {
            drop(state);
            callback();
            return;
        }
        state.callbacks.insert(key, Box::new(callback));
    }

    /// Drop a registered callback without running it. Returns `false` if it
    /// already ran or was cancelled.
    pub fn cancel(&self, key: CallbackKey) -> bool {
        self.inner.state.lock().callbacks.shift_remove(&key).is_some()
    }

    /// Number of callbacks waiting for this lifetime to end.
    pub fn callback_count(&self) -> usize {
        self.inner.state.lock().callbacks.len()
    }

    /// Run all registered callbacks, newest first.
    pub fn terminate(&self) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            std::mem::take(&mut state.callbacks)
        };

        if let Some((parent, key)) = &self.inner.parent {
            parent.cancel(*key);
        }

        tracing::debug!(lifetime = self.id(), callbacks = callbacks.len(), "terminating lifetime");
        for (_, callback) in callbacks.into_iter().rev() {
            callback();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state.lock().terminated
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Lifetime {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Lifetime {}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("id", &self.id())
            .field("parent", &self.parent().map(Lifetime::id))
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |name: &'static str| -> Callback {
            let log = log_clone.clone();
            Box::new(move || log.lock().push(name))
        };
        (log, make)
    }

    #[test]
    fn callbacks_run_in_reverse_order() {
        let (log, make) = recorder();
        let lifetime = Lifetime::new();
        lifetime.on_terminate(make("first"));
        lifetime.on_terminate(make("second"));
        lifetime.on_terminate(make("third"));

        lifetime.terminate();
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn terminate_is_idempotent() {
        let (log, make) = recorder();
        let lifetime = Lifetime::new();
        lifetime.on_terminate(make("once"));

        lifetime.terminate();
        lifetime.terminate();
        assert_eq!(*log.lock(), vec!["once"]);
        assert!(lifetime.is_terminated());
    }

    #[test]
    fn late_registration_runs_immediately() {
        let (log, make) = recorder();
        let lifetime = Lifetime::new();
        lifetime.terminate();

        lifetime.on_terminate(make("late"));
        assert_eq!(*log.lock(), vec!["late"]);
    }

    #[test]
    fn parent_terminates_children() {
        let (log, make) = recorder();
        let parent = Lifetime::new();
        parent.on_terminate(make("parent-before"));
        let child = parent.create_child();
        child.on_terminate(make("child"));
        let grandchild = child.create_child();
        parent.on_terminate(make("parent-after"));

        assert!(grandchild.is_descendant_of(&parent));
        assert!(!parent.is_descendant_of(&child));

        parent.terminate();
        assert!(child.is_terminated());
        assert!(grandchild.is_terminated());
        assert_eq!(*log.lock(), vec!["parent-after", "child", "parent-before"]);
    }

    #[test]
    fn child_can_end_early() {
        let parent = Lifetime::new();
        let child = parent.create_child();
        child.terminate();

        assert!(!parent.is_terminated());
        parent.terminate();
        assert!(child.is_terminated());
    }

    #[test]
    fn child_of_terminated_parent_is_born_terminated() {
        let parent = Lifetime::new();
        parent.terminate();
        assert!(parent.create_child().is_terminated());
    }

    #[test]
    fn ended_children_leave_no_callbacks_behind() {
        let root = Lifetime::new();
        for _ in 0..10_000 {
            let child = root.create_child();
            child.on_terminate(|| {});
            child.terminate();
        }
        assert_eq!(root.callback_count(), 0);

        let survivor = root.create_child();
        assert_eq!(root.callback_count(), 1);
        root.terminate();
        assert!(survivor.is_terminated());
    }

    #[test]
    fn cancelled_callback_never_runs() {
        let (log, make) = recorder();
        let lifetime = Lifetime::new();
        lifetime.on_terminate(make("kept"));
        let key = lifetime.on_terminate(make("cancelled"));

        assert!(lifetime.cancel(key));
        assert!(!lifetime.cancel(key));
        lifetime.terminate();
        assert_eq!(*log.lock(), vec!["kept"]);
    }
}

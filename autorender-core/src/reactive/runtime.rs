//! Reactive Runtime
//!
//! The runtime is the single source of truth for which observers depend on
//! which reactive properties.
//!
//! # How It Works
//!
//! 1. When an observer is created, it registers with the runtime and keeps
//!    the returned handle. Dropping the handle unregisters it.
//!
//! 2. When an observer finishes an execution, it hands the runtime the full
//!    set of properties it read. The runtime diffs that set against the
//!    previous one: stale subscriptions are removed, new ones added.
//!
//! 3. When a property is written, the runtime looks up every subscriber of
//!    the written keys and calls [`Reaction::react`] on each, once.
//!
//! # Thread Safety
//!
//! The registry lives behind a global `RwLock`. The lock is always released
//! before reactions run, so a reaction may freely read or write reactive
//! objects, or register and drop other observers.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexSet;
use parking_lot::RwLock;
use tracing::trace;

use super::key::{Key, ObjectId, PropertyKey};
use super::subscriber::SubscriberId;

/// Something that wants to hear about writes to the properties it read.
pub trait Reaction: Send + Sync {
    /// Get the subscriber ID for this reaction.
    fn subscriber_id(&self) -> SubscriberId;

    /// Called after a property in the current subscription set changed.
    fn react(&self);
}

/// Handle to a registered reaction.
///
/// Dropping this handle unregisters the reaction and all its subscriptions.
#[derive(Debug)]
pub struct ReactionHandle {
    subscriber_id: SubscriberId,
}

impl ReactionHandle {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactionHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

#[derive(Default)]
struct Registry {
    /// Live reactions, held weakly so the registry never keeps one alive.
    reactions: HashMap<SubscriberId, Weak<dyn Reaction>>,
    /// Property -> subscribers, grouped by object so dropping an object is
    /// a single removal.
    subscribers: HashMap<ObjectId, HashMap<Key, IndexSet<SubscriberId>>>,
    /// Subscriber -> properties it currently depends on.
    dependencies: HashMap<SubscriberId, IndexSet<PropertyKey>>,
}

impl Registry {
    fn unsubscribe(&mut self, subscriber_id: SubscriberId, property: &PropertyKey) {
        if let Some(keys) = self.subscribers.get_mut(&property.object) {
            if let Some(subs) = keys.get_mut(&property.key) {
                subs.shift_remove(&subscriber_id);
                if subs.is_empty() {
                    keys.remove(&property.key);
                }
            }
            if keys.is_empty() {
                self.subscribers.remove(&property.object);
            }
        }
    }

    fn subscribe(&mut self, subscriber_id: SubscriberId, property: &PropertyKey) {
        self.subscribers
            .entry(property.object)
            .or_default()
            .entry(property.key.clone())
            .or_default()
            .insert(subscriber_id);
    }

    fn clear(&mut self, subscriber_id: SubscriberId) {
        if let Some(old) = self.dependencies.remove(&subscriber_id) {
            for property in &old {
                self.unsubscribe(subscriber_id, property);
            }
        }
    }
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// The global reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a reaction with the runtime.
    ///
    /// Returns a handle that unregisters the reaction when dropped.
    pub fn register(reaction: &Arc<dyn Reaction>) -> ReactionHandle {
        let id = reaction.subscriber_id();

        registry()
            .write()
            .reactions
            .insert(id, Arc::downgrade(reaction));

        ReactionHandle { subscriber_id: id }
    }

    fn unregister(id: SubscriberId) {
        let mut registry = registry().write();
        registry.reactions.remove(&id);
        registry.clear(id);
    }

    /// Check whether a reaction is still registered.
    pub fn is_registered(id: SubscriberId) -> bool {
        registry().read().reactions.contains_key(&id)
    }

    /// Replace a subscriber's dependency set with `properties`.
    ///
    /// Properties no longer read are unsubscribed, newly read ones are
    /// subscribed, unchanged ones are left alone. Ignored for reactions that
    /// are no longer registered, so a run that finishes after disposal
    /// cannot resubscribe.
    pub fn replace_dependencies(
        subscriber_id: SubscriberId,
        properties: impl IntoIterator<Item = PropertyKey>,
    ) {
        let next: IndexSet<PropertyKey> = properties.into_iter().collect();
        let mut registry = registry().write();

        if !registry.reactions.contains_key(&subscriber_id) {
            return;
        }

        let previous = registry
            .dependencies
            .remove(&subscriber_id)
            .unwrap_or_default();

        let mut removed = 0usize;
        for property in previous.difference(&next) {
            registry.unsubscribe(subscriber_id, property);
            removed += 1;
        }
        let mut added = 0usize;
        for property in next.difference(&previous) {
            registry.subscribe(subscriber_id, property);
            added += 1;
        }

        trace!(?subscriber_id, added, removed, total = next.len(), "dependencies replaced");

        if !next.is_empty() {
            registry.dependencies.insert(subscriber_id, next);
        }
    }

    /// Remove all dependencies for a subscriber.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        registry().write().clear(subscriber_id);
    }

    /// Properties the subscriber currently depends on.
    pub fn dependencies_of(subscriber_id: SubscriberId) -> Vec<PropertyKey> {
        registry()
            .read()
            .dependencies
            .get(&subscriber_id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers of a single property.
    pub fn subscriber_count(property: &PropertyKey) -> usize {
        registry()
            .read()
            .subscribers
            .get(&property.object)
            .and_then(|keys| keys.get(&property.key))
            .map(IndexSet::len)
            .unwrap_or(0)
    }

    /// Notify every subscriber of the given keys of `object`.
    ///
    /// A subscriber of several of the keys is notified once.
    pub fn notify(object: ObjectId, keys: &[Key]) {
        // Collect under the lock, react after releasing it.
        let reactions: Vec<Arc<dyn Reaction>> = {
            let registry = registry().read();
            let Some(by_key) = registry.subscribers.get(&object) else {
                return;
            };

            let mut ids = IndexSet::new();
            for key in keys {
                if let Some(subs) = by_key.get(key) {
                    ids.extend(subs.iter().copied());
                }
            }

            ids.iter()
                .filter_map(|id| registry.reactions.get(id))
                .filter_map(Weak::upgrade)
                .collect()
        };

        trace!(?object, reactions = reactions.len(), "property write");

        for reaction in reactions {
            reaction.react();
        }
    }

    /// Drop every subscription to `object`. Called when the object itself
    /// is dropped.
    pub fn forget_object(object: ObjectId) {
        let Some(lock) = REGISTRY.get() else {
            return;
        };
        let mut registry = lock.write();
        let Some(by_key) = registry.subscribers.remove(&object) else {
            return;
        };

        for (key, subs) in by_key {
            let property = PropertyKey::new(object, key);
            for id in subs {
                if let Some(deps) = registry.dependencies.get_mut(&id) {
                    deps.shift_remove(&property);
                    if deps.is_empty() {
                        registry.dependencies.remove(&id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockReaction {
        id: SubscriberId,
        reacted: AtomicUsize,
    }

    impl MockReaction {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: SubscriberId::new(),
                reacted: AtomicUsize::new(0),
            })
        }

        fn register(self: &Arc<Self>) -> ReactionHandle {
            let reaction: Arc<dyn Reaction> = self.clone();
            Runtime::register(&reaction)
        }

        fn reacted(&self) -> usize {
            self.reacted.load(Ordering::SeqCst)
        }
    }

    impl Reaction for MockReaction {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn react(&self) {
            self.reacted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn field(object: ObjectId, name: &str) -> PropertyKey {
        PropertyKey::new(object, Key::field(name))
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let reaction = MockReaction::new();
        let handle = reaction.register();

        assert!(Runtime::is_registered(reaction.id));

        drop(handle);

        assert!(!Runtime::is_registered(reaction.id));
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let object = ObjectId::next();
        let reader = MockReaction::new();
        let bystander = MockReaction::new();
        let _reader_handle = reader.register();
        let _bystander_handle = bystander.register();

        Runtime::replace_dependencies(reader.id, [field(object, "count")]);
        Runtime::replace_dependencies(bystander.id, [field(object, "other")]);

        Runtime::notify(object, &[Key::field("count")]);

        assert_eq!(reader.reacted(), 1);
        assert_eq!(bystander.reacted(), 0);
    }

    #[test]
    fn notify_reaches_each_subscriber_once() {
        let object = ObjectId::next();
        let reaction = MockReaction::new();
        let _handle = reaction.register();

        Runtime::replace_dependencies(
            reaction.id,
            [field(object, "a"), PropertyKey::new(object, Key::Iterate)],
        );
        Runtime::notify(object, &[Key::field("a"), Key::Iterate]);

        assert_eq!(reaction.reacted(), 1);
    }

    #[test]
    fn replacing_dependencies_drops_stale_ones() {
        let object = ObjectId::next();
        let reaction = MockReaction::new();
        let _handle = reaction.register();

        Runtime::replace_dependencies(reaction.id, [field(object, "a"), field(object, "b")]);
        Runtime::replace_dependencies(reaction.id, [field(object, "b"), field(object, "c")]);

        assert_eq!(Runtime::subscriber_count(&field(object, "a")), 0);
        assert_eq!(Runtime::subscriber_count(&field(object, "b")), 1);
        assert_eq!(Runtime::subscriber_count(&field(object, "c")), 1);
        assert_eq!(
            Runtime::dependencies_of(reaction.id),
            vec![field(object, "b"), field(object, "c")]
        );
    }

    #[test]
    fn unregistered_reactions_cannot_resubscribe() {
        let object = ObjectId::next();
        let reaction = MockReaction::new();
        drop(reaction.register());

        Runtime::replace_dependencies(reaction.id, [field(object, "a")]);

        assert_eq!(Runtime::subscriber_count(&field(object, "a")), 0);
        assert!(Runtime::dependencies_of(reaction.id).is_empty());
    }

    #[test]
    fn runtime_clears_dependencies() {
        let object = ObjectId::next();
        let reaction = MockReaction::new();
        let _handle = reaction.register();

        Runtime::replace_dependencies(reaction.id, [field(object, "a")]);
        Runtime::clear_dependencies(reaction.id);

        assert_eq!(Runtime::subscriber_count(&field(object, "a")), 0);
        Runtime::notify(object, &[Key::field("a")]);
        assert_eq!(reaction.reacted(), 0);
    }

    #[test]
    fn forgetting_an_object_removes_its_edges() {
        let object = ObjectId::next();
        let other = ObjectId::next();
        let reaction = MockReaction::new();
        let _handle = reaction.register();

        Runtime::replace_dependencies(reaction.id, [field(object, "a"), field(other, "b")]);
        Runtime::forget_object(object);

        assert_eq!(Runtime::subscriber_count(&field(object, "a")), 0);
        assert_eq!(Runtime::dependencies_of(reaction.id), vec![field(other, "b")]);
    }
}

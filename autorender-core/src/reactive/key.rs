//! Property keys.
//!
//! A tracked read is recorded as a [`PropertyKey`]: the object that was read
//! plus which part of it. Named fields are tracked individually; structural
//! reads (listing keys, taking the length) are tracked under
//! [`Key::Iterate`] so that adding or removing a field reaches them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a reactive object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

/// The part of an object a read depended on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A single named property.
    Field(Arc<str>),
    /// The set of property names.
    Iterate,
}

impl Key {
    pub fn field(name: &str) -> Self {
        Key::Field(Arc::from(name))
    }
}

/// A single trackable location: one key of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    pub object: ObjectId,
    pub key: Key,
}

impl PropertyKey {
    pub fn new(object: ObjectId, key: Key) -> Self {
        Self { object, key }
    }
}

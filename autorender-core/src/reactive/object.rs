//! Reactive Objects
//!
//! A [`ReactiveObject`] is a map of named properties whose reads and writes
//! are visible to the tracking engine. Reads made while an observer runs are
//! recorded against that observer; writes notify every observer whose last
//! run read the written property.
//!
//! Leaves are `serde_json::Value`s. Nested JSON objects are stored as child
//! reactive objects, so a render that only reads `user.name` is not
//! re-rendered when `user.age` changes.
//!
//! Cloning a `ReactiveObject` shares the underlying state; every clone is
//! the same object as far as tracking is concerned.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::context::{untrack, ReactiveContext};
use super::key::{Key, ObjectId, PropertyKey};
use super::runtime::Runtime;
use crate::error::{Error, Result};

#[derive(Clone)]
enum Field {
    Value(Value),
    Object(ReactiveObject),
}

impl Field {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Field::Object(ReactiveObject::from_map(map)),
            other => Field::Value(other),
        }
    }

    fn same_as(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Value(a), Field::Value(b)) => a == b,
            (Field::Object(a), Field::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Convert to a plain value. Tracks reads of nested objects.
    fn to_value(&self) -> Value {
        match self {
            Field::Value(value) => value.clone(),
            Field::Object(object) => object.snapshot(),
        }
    }
}

struct ObjectInner {
    id: ObjectId,
    fields: RwLock<IndexMap<String, Field>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        Runtime::forget_object(self.id);
    }
}

/// A map of properties with tracked reads and notifying writes.
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Arc<ObjectInner>,
}

/// Make `object` reactive.
///
/// Any value that serializes to a JSON object is accepted. Passing a
/// `ReactiveObject` returns that same object rather than wrapping it again.
pub fn reactive<T>(object: &T) -> Result<ReactiveObject>
where
    T: Serialize + Any,
{
    if let Some(existing) = (object as &dyn Any).downcast_ref::<ReactiveObject>() {
        return Ok(existing.clone());
    }
    ReactiveObject::from_value(serde_json::to_value(object)?)
}

impl ReactiveObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::from_fields(IndexMap::new())
    }

    fn from_fields(fields: IndexMap<String, Field>) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                id: ObjectId::next(),
                fields: RwLock::new(fields),
            }),
        }
    }

    /// Wrap a JSON map. Nested maps become child objects.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self::from_fields(
            map.into_iter()
                .map(|(key, value)| (key, Field::from_value(value)))
                .collect(),
        )
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(Error::NotAnObject {
                found: value_kind(&other),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self, key: Key) {
        ReactiveContext::track(PropertyKey::new(self.inner.id, key));
    }

    fn field(&self, key: &str) -> Option<Field> {
        self.track(Key::field(key));
        self.inner.fields.read().get(key).cloned()
    }

    /// Read a property.
    ///
    /// Nested objects are returned as plain snapshots; reading them this way
    /// depends on every key inside.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.field(key).map(|field| field.to_value())
    }

    /// Read a property and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Read a nested object property, keeping it reactive.
    pub fn child(&self, key: &str) -> Option<ReactiveObject> {
        match self.field(key)? {
            Field::Object(object) => Some(object),
            Field::Value(_) => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Property names, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.track(Key::Iterate);
        self.inner.fields.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.track(Key::Iterate);
        self.inner.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Plain copy of the whole object. Depends on every key.
    pub fn snapshot(&self) -> Value {
        self.track(Key::Iterate);
        let fields: Vec<(String, Field)> = self
            .inner
            .fields
            .read()
            .iter()
            .map(|(key, field)| (key.clone(), field.clone()))
            .collect();

        let mut map = Map::with_capacity(fields.len());
        for (key, field) in fields {
            self.track(Key::field(&key));
            map.insert(key, field.to_value());
        }
        Value::Object(map)
    }

    fn write(&self, key: &str, field: Field) {
        let (changed, added, _previous) = {
            let mut fields = self.inner.fields.write();
            match fields.get_mut(key) {
                Some(current) if current.same_as(&field) => (false, false, None),
                Some(current) => {
                    let previous = std::mem::replace(current, field);
                    (true, false, Some(previous))
                }
                None => {
                    fields.insert(key.to_owned(), field);
                    (true, true, None)
                }
            }
        };

        if changed {
            self.notify(key, added);
        }
    }

    fn notify(&self, key: &str, structural: bool) {
        if structural {
            Runtime::notify(self.inner.id, &[Key::field(key), Key::Iterate]);
        } else {
            Runtime::notify(self.inner.id, &[Key::field(key)]);
        }
    }

    /// Write a property. Objects are stored as child reactive objects.
    ///
    /// Writing a value equal to the current one notifies nobody.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if value.is_object() && self.holds_equal_object(key, &value) {
            return;
        }
        self.write(key, Field::from_value(value));
    }

    /// Whether `key` holds a child object whose content equals `value`.
    fn holds_equal_object(&self, key: &str, value: &Value) -> bool {
        let current = self.inner.fields.read().get(key).cloned();
        match current {
            Some(Field::Object(child)) => untrack(|| child.snapshot()) == *value,
            _ => false,
        }
    }

    /// Serialize `value` and write it.
    pub fn set_from<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// Store an existing reactive object as a nested property.
    pub fn set_object(&self, key: &str, object: ReactiveObject) {
        self.write(key, Field::Object(object));
    }

    /// Compute a new value from the current one and write it.
    ///
    /// The read of the current value is not tracked.
    pub fn update(&self, key: &str, f: impl FnOnce(Option<Value>) -> Value) {
        let current = untrack(|| self.get(key));
        self.set(key, f(current));
    }

    /// Remove a property, returning its last value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.fields.write().shift_remove(key)?;
        self.notify(key, true);
        Some(untrack(|| removed.to_value()))
    }

    /// Remove every property.
    pub fn clear(&self) {
        let removed: Vec<String> = {
            let mut fields = self.inner.fields.write();
            fields.drain(..).map(|(key, _)| key).collect()
        };
        if removed.is_empty() {
            return;
        }

        let keys: Vec<Key> = removed
            .iter()
            .map(|key| Key::field(key))
            .chain(std::iter::once(Key::Iterate))
            .collect();
        Runtime::notify(self.inner.id, &keys);
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ReactiveObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ReactiveObject {}

impl Serialize for ReactiveObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("id", &self.inner.id)
            .field("value", &untrack(|| self.snapshot()))
            .finish()
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! The capability set every typed event implements.
//!
//! A typed event names itself with a stable wire identifier and renders its
//! own fields as a JSON object. Equality and hashing are structural: two
//! events are equal when they declare the same type id and their data is
//! deep-equal, whatever concrete Rust types produced them.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use murmur_protocol::{JsonObject, deep_eq, structural_hash};
use serde::Serialize;
use serde_json::Value;

use crate::error::{SerializationError, ValidationError};
use crate::metadata::EventMetadata;

/// Upcast helper so trait objects can be downcast to their concrete variant.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub trait TypedEvent: AsAny + fmt::Debug {
    /// Stable wire identifier of this variant. Never empty.
    fn event_type(&self) -> &str;

    /// The variant's own domain fields.
    ///
    /// Must not contain the type id; the envelope carries it.
    fn fields(&self) -> Result<JsonObject, SerializationError>;

    /// Timestamp and metadata bag, for variants that compose one.
    fn metadata(&self) -> Option<&EventMetadata> {
        None
    }

    /// Domain rules checked before broadcast. Fail-fast on the first rule.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Envelope `data`: the fields, plus `createdAt`/`metadata` when the
    /// variant carries an [`EventMetadata`].
    fn to_data(&self) -> Result<JsonObject, SerializationError> {
        let mut data = self.fields()?;
        if let Some(metadata) = self.metadata() {
            metadata.fold_into(&mut data);
        }
        Ok(data)
    }
}

impl dyn TypedEvent {
    pub fn is<T: TypedEvent>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: TypedEvent>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Recover the concrete variant behind a shared event.
pub fn downcast_event<T: TypedEvent>(event: Arc<dyn TypedEvent>) -> Option<Arc<T>> {
    event.into_any().downcast::<T>().ok()
}

fn data_value<E: TypedEvent + ?Sized>(event: &E) -> Value {
    // An event whose data cannot be rendered compares as null data.
    event.to_data().map_or(Value::Null, Value::Object)
}

/// Structural equality: same type id and deep-equal data.
pub fn events_equal<A, B>(a: &A, b: &B) -> bool
where
    A: TypedEvent + ?Sized,
    B: TypedEvent + ?Sized,
{
    a.event_type() == b.event_type() && deep_eq(&data_value(a), &data_value(b))
}

/// Hash consistent with [`events_equal`].
pub fn event_hash<E: TypedEvent + ?Sized>(event: &E) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    event.event_type().hash(&mut hasher);
    structural_hash(&data_value(event)).hash(&mut hasher);
    hasher.finish()
}

impl PartialEq for dyn TypedEvent {
    fn eq(&self, other: &Self) -> bool {
        events_equal(self, other)
    }
}

impl Eq for dyn TypedEvent {}

impl Hash for dyn TypedEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(event_hash(self));
    }
}

/// Implement `PartialEq`, `Eq` and `Hash` for a variant in terms of the
/// structural contract.
#[macro_export]
macro_rules! structural_event_eq {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ::std::cmp::PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    $crate::contract::events_equal(self, other)
                }
            }

            impl ::std::cmp::Eq for $ty {}

            impl ::std::hash::Hash for $ty {
                fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                    state.write_u64($crate::contract::event_hash(self));
                }
            }
        )+
    };
}

/// Render any `Serialize` struct as a variant's fields.
pub fn fields_from_serde<T: Serialize + ?Sized>(value: &T) -> Result<JsonObject, SerializationError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(SerializationError::custom(format!(
            "event fields must serialize to an object, got {other}"
        ))),
    }
}

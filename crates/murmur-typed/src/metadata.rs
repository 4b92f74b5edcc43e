//! Creation timestamp, metadata bag, and validation helpers.
//!
//! Variants opt in by owning an [`EventMetadata`] and returning it from
//! [`TypedEvent::metadata`]. The bag travels inside envelope `data` under the
//! reserved `createdAt` and `metadata` keys, next to the domain fields.

use std::collections::HashMap;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use murmur_protocol::JsonObject;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::contract::TypedEvent;
use crate::error::ValidationError;

pub const CREATED_AT_KEY: &str = "createdAt";
pub const METADATA_KEY: &str = "metadata";

/// Keys variants must not use for their own fields.
pub const RESERVED_KEYS: [&str; 2] = [CREATED_AT_KEY, METADATA_KEY];

#[derive(Debug, Clone, Default)]
pub struct EventMetadata {
    created_at: OnceLock<DateTime<Utc>>,
    entries: HashMap<String, Value>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from envelope data. A missing or malformed `createdAt` is
    /// assigned lazily on first access, like a fresh event.
    pub fn restore(data: &JsonObject) -> Self {
        let created_at = data
            .get(CREATED_AT_KEY)
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map_or_else(OnceLock::new, OnceLock::from);
        let entries = data
            .get(METADATA_KEY)
            .and_then(Value::as_object)
            .map(|bag| bag.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self {
            created_at,
            entries,
        }
    }

    /// Creation time. Assigned on first access and frozen thereafter.
    pub fn created_at(&self) -> DateTime<Utc> {
        *self.created_at.get_or_init(Utc::now)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Typed lookup. A value of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Returns whether the key was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write `createdAt` (epoch millis) and, if non-empty, the bag into `data`.
    pub fn fold_into(&self, data: &mut JsonObject) {
        data.insert(
            CREATED_AT_KEY.to_owned(),
            Value::from(self.created_at().timestamp_millis()),
        );
        if !self.entries.is_empty() {
            let bag: JsonObject = self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            data.insert(METADATA_KEY.to_owned(), Value::Object(bag));
        }
    }
}

/// Strip the reserved keys and deserialize the remaining fields.
pub fn decode_fields<T: DeserializeOwned>(data: &JsonObject) -> Result<T, serde_json::Error> {
    let mut fields = data.clone();
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    serde_json::from_value(Value::Object(fields))
}

/// Whether base validation demands non-empty fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataPolicy {
    #[default]
    RequireNonEmpty,
    AllowEmpty,
}

/// Checks shared by every variant: a non-empty type id, fields that render,
/// no reserved keys among them, and non-empty fields unless allowed.
///
/// Variants call this first from [`TypedEvent::validate`], then apply their
/// own rules.
pub fn validate_base<E: TypedEvent + ?Sized>(
    event: &E,
    policy: DataPolicy,
) -> Result<(), ValidationError> {
    if event.event_type().is_empty() {
        return Err(ValidationError::new("event type id must not be empty"));
    }
    let fields = event
        .fields()
        .map_err(|err| ValidationError::new(format!("event data is not serializable: {err}")))?;
    if event.metadata().is_some()
        && let Some(key) = RESERVED_KEYS.iter().find(|key| fields.contains_key(**key))
    {
        return Err(ValidationError::field(*key, "reserved for event metadata"));
    }
    if policy == DataPolicy::RequireNonEmpty && fields.is_empty() {
        return Err(ValidationError::new("event data must not be empty"));
    }
    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::field(field, "must not be empty"));
    }
    Ok(())
}

pub fn require_min_len(field: &str, value: &str, min: usize) -> Result<(), ValidationError> {
    if value.chars().count() < min {
        return Err(ValidationError::field(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    Ok(())
}

pub fn require_in_range<T>(
    field: &str,
    value: T,
    range: RangeInclusive<T>,
) -> Result<(), ValidationError>
where
    T: PartialOrd + Display,
{
    if !range.contains(&value) {
        return Err(ValidationError::field(
            field,
            format!(
                "{value} is outside {}..={}",
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(())
}

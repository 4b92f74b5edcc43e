//! Sample variants shared by unit tests.

use murmur_protocol::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::contract::{TypedEvent, fields_from_serde};
use crate::error::{BoxError, SerializationError, ValidationError};
use crate::metadata::{
    DataPolicy, EventMetadata, decode_fields, require_in_range, require_min_len,
    require_non_empty, validate_base,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: String,
    pub amount: i64,
}

impl OrderCreated {
    pub fn new(order_id: &str, amount: i64) -> Self {
        Self {
            order_id: order_id.to_owned(),
            amount,
        }
    }

    pub fn from_data(data: &JsonObject) -> Result<Self, BoxError> {
        Ok(decode_fields(data)?)
    }
}

impl TypedEvent for OrderCreated {
    fn event_type(&self) -> &str {
        "order_created"
    }

    fn fields(&self) -> Result<JsonObject, SerializationError> {
        fields_from_serde(self)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_base(self, DataPolicy::default())?;
        require_non_empty("orderId", &self.order_id)?;
        require_in_range("amount", self.amount, 0..=1_000_000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvent {
    pub user_id: String,
}

impl UserEvent {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_owned(),
        }
    }

    pub fn from_data(data: &JsonObject) -> Result<Self, BoxError> {
        Ok(decode_fields(data)?)
    }
}

impl TypedEvent for UserEvent {
    fn event_type(&self) -> &str {
        "user_event"
    }

    fn fields(&self) -> Result<JsonObject, SerializationError> {
        fields_from_serde(self)
    }
}

/// Free-text note carrying a metadata bag.
#[derive(Debug, Clone)]
pub struct Note {
    pub text: String,
    meta: EventMetadata,
}

impl Note {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            meta: EventMetadata::new(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut EventMetadata {
        &mut self.meta
    }

    pub fn from_data(data: &JsonObject) -> Result<Self, BoxError> {
        let text = data
            .get("text")
            .and_then(Value::as_str)
            .ok_or("note requires a string `text`")?;
        Ok(Self {
            text: text.to_owned(),
            meta: EventMetadata::restore(data),
        })
    }
}

impl TypedEvent for Note {
    fn event_type(&self) -> &str {
        "note"
    }

    fn fields(&self) -> Result<JsonObject, SerializationError> {
        let mut fields = JsonObject::new();
        fields.insert("text".to_owned(), json!(self.text));
        Ok(fields)
    }

    fn metadata(&self) -> Option<&EventMetadata> {
        Some(&self.meta)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        validate_base(self, DataPolicy::default())?;
        require_min_len("text", &self.text, 3)
    }
}

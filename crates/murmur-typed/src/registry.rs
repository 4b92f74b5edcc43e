//! Type registry: wire type id ↔ variant ↔ factory bindings.
//!
//! The registry is an explicit value. Components take an `Arc<TypeRegistry>`
//! so tests can build isolated instances; [`TypeRegistry::global`] is only a
//! conventional default for applications that want one process-wide table.
//!
//! Invariants:
//! - A type id is bound to at most one [`VariantTag`] at a time.
//! - Re-registering the same `(type id, variant)` replaces the factory.
//! - A variant may be bound to several type ids. Its canonical id is the most
//!   recently registered one still bound.
//!
//! Mutations run under a write lock with no suspension points inside, so no
//! reader observes a half-applied registration. Factories are invoked after
//! the lock is released.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use indexmap::{IndexMap, IndexSet};
use murmur_protocol::JsonObject;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::contract::{TypedEvent, downcast_event};
use crate::error::{BoxError, TypedEventError, TypedEventResult};

/// Identity of a concrete event variant, captured explicitly at the
/// registration call site.
#[derive(Clone, Copy)]
pub struct VariantTag {
    id: TypeId,
    name: &'static str,
}

impl VariantTag {
    pub fn of<T: TypedEvent>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for VariantTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VariantTag {}

impl Hash for VariantTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VariantTag").field(&self.name).finish()
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Turns envelope `data` back into an event.
pub type EventFactory =
    Arc<dyn Fn(&JsonObject) -> Result<Arc<dyn TypedEvent>, BoxError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub type_count: usize,
    pub variant_count: usize,
    pub type_ids: Vec<String>,
    pub variants: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    factories: IndexMap<String, EventFactory>,
    variants: IndexMap<String, VariantTag>,
    type_ids: IndexMap<VariantTag, IndexSet<String>>,
}

#[derive(Default)]
pub struct TypeRegistry {
    state: RwLock<RegistryState>,
}

static GLOBAL: LazyLock<Arc<TypeRegistry>> = LazyLock::new(|| Arc::new(TypeRegistry::new()));

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL.clone()
    }

    /// Bind `type_id` to `variant` and its factory.
    ///
    /// An empty `type_id` fails with [`TypedEventError::EmptyTypeId`], not
    /// [`TypedEventError::RegistrationConflict`]; the conflict error is kept
    /// for ids already bound to another variant. Re-registering the same pair
    /// replaces the factory and makes `type_id` the variant's canonical id.
    pub fn register(
        &self,
        type_id: impl Into<String>,
        variant: VariantTag,
        factory: EventFactory,
    ) -> TypedEventResult<()> {
        let type_id = type_id.into();
        if type_id.is_empty() {
            return Err(TypedEventError::EmptyTypeId);
        }

        let mut guard = self.state.write();
        let state = &mut *guard;
        if let Some(existing) = state.variants.get(&type_id)
            && *existing != variant
        {
            warn!(
                type_id = %type_id,
                existing = %existing,
                attempted = %variant,
                "type id already bound to another variant"
            );
            return Err(TypedEventError::RegistrationConflict {
                type_id,
                existing: *existing,
                attempted: variant,
            });
        }

        state.factories.insert(type_id.clone(), factory);
        state.variants.insert(type_id.clone(), variant);
        let ids = state.type_ids.entry(variant).or_default();
        ids.shift_remove(&type_id);
        ids.insert(type_id.clone());
        info!(type_id = %type_id, variant = %variant, "event type registered");
        Ok(())
    }

    /// Register `T` under `type_id` with a factory producing `T` directly.
    pub fn register_variant<T, F>(&self, type_id: impl Into<String>, factory: F) -> TypedEventResult<()>
    where
        T: TypedEvent,
        F: Fn(&JsonObject) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let erased: EventFactory =
            Arc::new(move |data| factory(data).map(|event| Arc::new(event) as Arc<dyn TypedEvent>));
        self.register(type_id, VariantTag::of::<T>(), erased)
    }

    /// Returns whether anything was removed.
    pub fn unregister(&self, type_id: &str) -> bool {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let had_factory = state.factories.shift_remove(type_id).is_some();
        let variant = state.variants.shift_remove(type_id);
        if let Some(variant) = variant {
            let now_unbound = state.type_ids.get_mut(&variant).is_some_and(|ids| {
                ids.shift_remove(type_id);
                ids.is_empty()
            });
            if now_unbound {
                state.type_ids.shift_remove(&variant);
            }
        }
        let removed = had_factory || variant.is_some();
        if removed {
            info!(type_id, "event type unregistered");
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.factories.clear();
        state.variants.clear();
        state.type_ids.clear();
        debug!("type registry cleared");
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.state.read().factories.contains_key(type_id)
    }

    /// The variant bound to `type_id`.
    pub fn get_type(&self, type_id: &str) -> Option<VariantTag> {
        self.state.read().variants.get(type_id).copied()
    }

    /// Canonical type id of `variant`: the most recent binding.
    pub fn type_id_for(&self, variant: VariantTag) -> Option<String> {
        self.state
            .read()
            .type_ids
            .get(&variant)
            .and_then(|ids| ids.last().cloned())
    }

    pub fn type_id_of<T: TypedEvent>(&self) -> Option<String> {
        self.type_id_for(VariantTag::of::<T>())
    }

    /// Every type id bound to `variant`, oldest first.
    pub fn type_ids_for(&self, variant: VariantTag) -> Vec<String> {
        self.state
            .read()
            .type_ids
            .get(&variant)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Decode `data` with the factory bound to `type_id`.
    ///
    /// Unknown type ids yield `Ok(None)`. A failing factory is wrapped in
    /// [`TypedEventError::RegistryFactory`].
    pub fn create_from_json(
        &self,
        type_id: &str,
        data: &JsonObject,
    ) -> TypedEventResult<Option<Arc<dyn TypedEvent>>> {
        if type_id.is_empty() {
            return Err(TypedEventError::EmptyTypeId);
        }
        let factory = self.state.read().factories.get(type_id).cloned();
        let Some(factory) = factory else {
            debug!(type_id, "no factory registered");
            return Ok(None);
        };
        match factory(data) {
            Ok(event) => Ok(Some(event)),
            Err(source) => {
                warn!(type_id, error = %source, "event factory failed");
                Err(TypedEventError::RegistryFactory {
                    type_id: type_id.to_owned(),
                    source,
                })
            }
        }
    }

    /// As [`create_from_json`](Self::create_from_json), and `Ok(None)` when
    /// the decoded event is not a `T`.
    pub fn create_from_json_as<T: TypedEvent>(
        &self,
        type_id: &str,
        data: &JsonObject,
    ) -> TypedEventResult<Option<Arc<T>>> {
        Ok(self
            .create_from_json(type_id, data)?
            .and_then(downcast_event::<T>))
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            type_count: state.factories.len(),
            variant_count: state.type_ids.len(),
            type_ids: state.factories.keys().cloned().collect(),
            variants: state.type_ids.keys().map(|v| v.name().to_owned()).collect(),
        }
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TypeRegistry")
            .field("variants", &state.variants)
            .finish_non_exhaustive()
    }
}

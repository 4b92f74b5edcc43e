//! Stream transformers: raw received events in, typed events out.
//!
//! Three shapes share one per-item pipeline:
//!
//! 1. recognize the envelope shape, silently dropping anything else;
//! 2. match the `type` against the transformer's target (a fixed id, a
//!    registry-resolved id, or an include/exclude [`TypeFilter`]);
//! 3. decode `data`. Only this step can fail, and failures follow
//!    [`TransformOptions`]: the error callback always sees them, then the item
//!    is dropped (skip policy) or the stream ends with the error (fail-fast).
//!
//! Every call to `bind` starts independent work over its own source stream.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_stream::stream;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use murmur_protocol::{Envelope, JsonObject, PeerId, ReceivedEvent};
use serde_json::Value;
use tracing::{debug, warn};

use crate::contract::TypedEvent;
use crate::error::{BoxError, TypedEventError, TypedEventResult};
use crate::registry::{TypeRegistry, VariantTag};

/// Typed output stream. Yields `Err` at most once, as its last item.
pub type TypedEventStream<T> = BoxStream<'static, TypedEventResult<T>>;

/// Invoked for every per-item decode failure with the raw item, the error,
/// and where it happened.
pub type ErrorCallback =
    Arc<dyn Fn(&ReceivedEvent, &TypedEventError, &DecodeContext) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformerKind {
    Explicit,
    Registered,
    MultiType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeContext {
    pub type_id: String,
    pub transformer: TransformerKind,
    pub from_peer: PeerId,
}

#[derive(Clone)]
pub struct TransformOptions {
    pub skip_errors: bool,
    pub on_error: Option<ErrorCallback>,
}

impl TransformOptions {
    /// End the stream on the first decode failure instead of skipping it.
    pub fn fail_fast(mut self) -> Self {
        self.skip_errors = false;
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ReceivedEvent, &TypedEventError, &DecodeContext) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            skip_errors: true,
            on_error: None,
        }
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("skip_errors", &self.skip_errors)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Include/exclude filter on envelope type ids. Exclusion always wins; an
/// include set, when present, is a strict allow-list.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl TypeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, type_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .get_or_insert_with(HashSet::new)
            .extend(type_ids.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, type_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(type_ids.into_iter().map(Into::into));
        self
    }

    pub fn allows(&self, type_id: &str) -> bool {
        if self.exclude.contains(type_id) {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|include| include.contains(type_id))
    }
}

struct DecodeFailure {
    error: TypedEventError,
    context: DecodeContext,
}

/// Shared driver: `decode` returns `None` for non-members.
fn drive<S, T, F>(source: S, options: TransformOptions, mut decode: F) -> TypedEventStream<T>
where
    S: Stream<Item = ReceivedEvent> + Send + 'static,
    T: Send + 'static,
    F: FnMut(&ReceivedEvent) -> Option<Result<T, DecodeFailure>> + Send + 'static,
{
    Box::pin(stream! {
        let mut source = Box::pin(source);
        while let Some(item) = source.next().await {
            match decode(&item) {
                None => {}
                Some(Ok(event)) => yield Ok(event),
                Some(Err(failure)) => {
                    if let Some(callback) = &options.on_error {
                        callback(&item, &failure.error, &failure.context);
                    }
                    if !options.skip_errors {
                        warn!(
                            type_id = %failure.context.type_id,
                            error = %failure.error,
                            "decode failure ends typed stream"
                        );
                        yield Err(failure.error);
                        break;
                    }
                    warn!(
                        type_id = %failure.context.type_id,
                        from_peer = %failure.context.from_peer,
                        error = %failure.error,
                        "dropping undecodable event"
                    );
                }
            }
        }
    })
}

fn stream_failure(
    item: &ReceivedEvent,
    type_id: &str,
    transformer: TransformerKind,
    source: BoxError,
) -> DecodeFailure {
    DecodeFailure {
        error: TypedEventError::StreamDecode {
            type_id: type_id.to_owned(),
            source,
        },
        context: DecodeContext {
            type_id: type_id.to_owned(),
            transformer,
            from_peer: item.from_peer.clone(),
        },
    }
}

/// Envelope `data` as an object; anything else is a decode failure.
fn object_data(data: &Value) -> Result<&JsonObject, BoxError> {
    data.as_object()
        .ok_or_else(|| format!("envelope data must be an object, got {data}").into())
}

/// Unwrap a registry factory failure to its original cause.
fn factory_cause(error: TypedEventError) -> BoxError {
    match error {
        TypedEventError::RegistryFactory { source, .. } => source,
        other => Box::new(other),
    }
}

/// Decoder applied by the explicit transformer.
pub type Factory<T> = Arc<dyn Fn(&JsonObject) -> Result<T, BoxError> + Send + Sync>;

/// Single-type transformer with a fixed type id and an explicit factory.
pub struct TypedEventTransformer<T> {
    type_id: String,
    factory: Factory<T>,
    options: TransformOptions,
}

impl<T: Send + 'static> TypedEventTransformer<T> {
    pub fn new<F>(type_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&JsonObject) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            type_id: type_id.into(),
            factory: Arc::new(factory),
            options: TransformOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn bind<S>(&self, source: S) -> TypedEventStream<T>
    where
        S: Stream<Item = ReceivedEvent> + Send + 'static,
    {
        let type_id = self.type_id.clone();
        let factory = self.factory.clone();
        drive(source, self.options.clone(), move |item| {
            let (event_type, data) = Envelope::parts(item.payload())?;
            if event_type != type_id {
                return None;
            }
            let decoded = object_data(data).and_then(|data| factory(data));
            Some(decoded.map_err(|source| {
                stream_failure(item, &type_id, TransformerKind::Explicit, source)
            }))
        })
    }
}

/// Single-type transformer whose type id comes from the registry.
pub struct RegisteredEventTransformer<T> {
    registry: Arc<TypeRegistry>,
    type_id: String,
    options: TransformOptions,
    _variant: PhantomData<fn() -> T>,
}

impl<T: TypedEvent> RegisteredEventTransformer<T> {
    /// Fails with [`TypedEventError::UnregisteredType`] when `T` has no
    /// registered type id.
    pub fn new(registry: Arc<TypeRegistry>, options: TransformOptions) -> TypedEventResult<Self> {
        let variant = VariantTag::of::<T>();
        let type_id = registry
            .type_id_for(variant)
            .ok_or(TypedEventError::UnregisteredType { variant })?;
        Ok(Self {
            registry,
            type_id,
            options,
            _variant: PhantomData,
        })
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn bind<S>(&self, source: S) -> TypedEventStream<Arc<T>>
    where
        S: Stream<Item = ReceivedEvent> + Send + 'static,
    {
        let registry = self.registry.clone();
        let type_id = self.type_id.clone();
        drive(source, self.options.clone(), move |item| {
            let (event_type, data) = Envelope::parts(item.payload())?;
            if event_type != type_id {
                return None;
            }
            let decoded = object_data(data).and_then(|data| {
                match registry.create_from_json_as::<T>(&type_id, data) {
                    Ok(Some(event)) => Ok(event),
                    Ok(None) => Err(BoxError::from(format!(
                        "`{type_id}` no longer decodes to {}",
                        VariantTag::of::<T>()
                    ))),
                    Err(error) => Err(factory_cause(error)),
                }
            });
            Some(decoded.map_err(|source| {
                stream_failure(item, &type_id, TransformerKind::Registered, source)
            }))
        })
    }
}

/// Transformer over every registered type, with include/exclude filtering.
pub struct MultiTypeTransformer {
    registry: Arc<TypeRegistry>,
    filter: TypeFilter,
    options: TransformOptions,
}

impl MultiTypeTransformer {
    pub fn new(registry: Arc<TypeRegistry>, filter: TypeFilter, options: TransformOptions) -> Self {
        Self {
            registry,
            filter,
            options,
        }
    }

    pub fn bind<S>(&self, source: S) -> TypedEventStream<Arc<dyn TypedEvent>>
    where
        S: Stream<Item = ReceivedEvent> + Send + 'static,
    {
        let registry = self.registry.clone();
        let filter = self.filter.clone();
        drive(source, self.options.clone(), move |item| {
            let (event_type, data) = Envelope::parts(item.payload())?;
            if !filter.allows(event_type) {
                return None;
            }
            let data = match object_data(data) {
                Ok(data) => data,
                // Only registered types are members; others stay silent.
                Err(source) if registry.is_registered(event_type) => {
                    return Some(Err(stream_failure(
                        item,
                        event_type,
                        TransformerKind::MultiType,
                        source,
                    )));
                }
                Err(_) => return None,
            };
            match registry.create_from_json(event_type, data) {
                Ok(Some(event)) => Some(Ok(event)),
                Ok(None) => {
                    debug!(type_id = event_type, "skipping unregistered event type");
                    None
                }
                Err(TypedEventError::EmptyTypeId) => None,
                Err(error) => Some(Err(stream_failure(
                    item,
                    event_type,
                    TransformerKind::MultiType,
                    factory_cause(error),
                ))),
            }
        })
    }
}

/// Transformer shortcuts on any raw received-event stream.
pub trait ReceivedEventStreamExt: Stream<Item = ReceivedEvent> + Sized + Send + 'static {
    fn typed_events<T, F>(
        self,
        type_id: impl Into<String>,
        factory: F,
        options: TransformOptions,
    ) -> TypedEventStream<T>
    where
        T: Send + 'static,
        F: Fn(&JsonObject) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        TypedEventTransformer::new(type_id, factory)
            .with_options(options)
            .bind(self)
    }

    fn registered_events<T: TypedEvent>(
        self,
        registry: Arc<TypeRegistry>,
        options: TransformOptions,
    ) -> TypedEventResult<TypedEventStream<Arc<T>>> {
        Ok(RegisteredEventTransformer::<T>::new(registry, options)?.bind(self))
    }

    fn registered_events_filtered(
        self,
        registry: Arc<TypeRegistry>,
        filter: TypeFilter,
        options: TransformOptions,
    ) -> TypedEventStream<Arc<dyn TypedEvent>> {
        MultiTypeTransformer::new(registry, filter, options).bind(self)
    }
}

impl<S> ReceivedEventStreamExt for S where S: Stream<Item = ReceivedEvent> + Send + 'static {}

//! Handler table: wire name → type-erased handler, plus the any-handler.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::client::error::ClientError;
use crate::protocol::{AnyPayload, InboundMessage, Payload, TypeRegistry};

/// A handler whose payload type has been erased.
pub(crate) trait ErasedHandler: Send + Sync {
    /// Start handling `payload`; `None` if it is not the handler's type.
    fn call(&self, payload: AnyPayload) -> Option<BoxFuture<'static, ()>>;
}

struct TypedHandler<T, F> {
    handler: F,
    _payload: PhantomData<fn(Arc<T>)>,
}

impl<T, F, Fut> ErasedHandler for TypedHandler<T, F>
where
    T: Payload,
    F: Fn(Arc<T>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, payload: AnyPayload) -> Option<BoxFuture<'static, ()>> {
        let typed = payload.downcast::<T>().ok()?;
        Some((self.handler)(typed).boxed())
    }
}

/// Catch-all handler invoked for every decoded message.
pub(crate) struct AnyHandler(Box<dyn Fn(InboundMessage) -> BoxFuture<'static, ()> + Send + Sync>);

impl AnyHandler {
    pub(crate) fn call(&self, message: InboundMessage) -> BoxFuture<'static, ()> {
        (self.0)(message)
    }
}

/// Handlers owned by one client.
#[derive(Default)]
pub(crate) struct HandlerTable {
    typed: DashMap<String, Arc<dyn ErasedHandler>>,
    any: ArcSwapOption<AnyHandler>,
}

impl HandlerTable {
    /// Register `handler` for the wire name of `T`, replacing any previous one.
    pub(crate) fn register<T, F, Fut>(&self, registry: &TypeRegistry, handler: F) -> Result<(), ClientError>
    where
        T: Payload,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(type_name) = registry.type_name_of::<T>() else {
            return Err(ClientError::UnregisteredHandler {
                rust_type: std::any::type_name::<T>(),
            });
        };

        let erased: Arc<dyn ErasedHandler> = Arc::new(TypedHandler {
            handler,
            _payload: PhantomData,
        });
        if self.typed.insert(type_name.to_string(), erased).is_some() {
            tracing::debug!(type_name, "Replaced request handler");
        }
        Ok(())
    }

    pub(crate) fn set_any<F, Fut>(&self, handler: F)
    where
        F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed = AnyHandler(Box::new(move |message: InboundMessage| handler(message).boxed()));
        self.any.store(Some(Arc::new(boxed)));
    }

    pub(crate) fn any(&self) -> Option<Arc<AnyHandler>> {
        self.any.load_full()
    }

    /// Handler for `type_name`, cloned out so no map lock is held while it runs.
    pub(crate) fn get(&self, type_name: &str) -> Option<Arc<dyn ErasedHandler>> {
        self.typed.get(type_name).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn len(&self) -> usize {
        self.typed.len()
    }
}

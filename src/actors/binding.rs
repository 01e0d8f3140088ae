//! Handler bindings.
//!
//! A binding captures an actor type and a message type behind a type-erased
//! closure, so handlers of different actors and messages can live in the same
//! table. The closure receives the message as `Box<dyn Any>` and is the one
//! calling `Respond::handle` or `Receive::handle` on the concrete actor.

use crate::actors::assistant::Assistant;
use crate::error::DispatchError;
use crate::scheduler::panic_message;
use crate::{Message, Receive, Respond};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub(crate) type Erased = Box<dyn Any + Send>;

pub(crate) type Invoke =
    Arc<dyn Fn(Assistant, Erased) -> BoxFuture<'static, Result<Erased, DispatchError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Responder,
    Observer,
}

/// One registered handler: which actor type owns it, which message it takes and how to call it.
#[derive(Clone)]
pub(crate) struct HandlerBinding {
    pub(crate) owner: &'static str,
    pub(crate) owner_id: TypeId,
    pub(crate) descriptor: &'static str,
    pub(crate) kind: HandlerKind,
    pub(crate) invoke: Invoke,
}

impl HandlerBinding {
    pub(crate) fn responder<A: Respond<M>, M: Message>() -> HandlerBinding {
        let invoke: Invoke = Arc::new(|assistant: Assistant, message: Erased| {
            async move {
                let descriptor = M::descriptor();
                let message = downcast::<M>(descriptor, message)?;
                let instances = assistant.instances();

                let mut actor = instances.take_or_activate::<A>(assistant.identity()).await;
                let outcome = AssertUnwindSafe(<A as Respond<M>>::handle(
                    &mut *actor,
                    message,
                    &assistant,
                ))
                .catch_unwind()
                .await;
                instances.restore(assistant.identity(), actor);

                match outcome {
                    Ok(response) => Ok(Box::new(response) as Erased),
                    Err(panic) => Err(DispatchError::Handler {
                        descriptor: descriptor.to_string(),
                        message: panic_message(panic),
                    }),
                }
            }
            .boxed()
        });

        HandlerBinding {
            owner: std::any::type_name::<A>(),
            owner_id: TypeId::of::<A>(),
            descriptor: M::descriptor(),
            kind: HandlerKind::Responder,
            invoke,
        }
    }

    pub(crate) fn observer<A: Receive<M>, M: Message>() -> HandlerBinding {
        let invoke: Invoke = Arc::new(|assistant: Assistant, message: Erased| {
            async move {
                let descriptor = M::descriptor();
                let message = downcast::<M>(descriptor, message)?;
                let instances = assistant.instances();

                let mut actor = instances.take_or_activate::<A>(assistant.identity()).await;
                let outcome = AssertUnwindSafe(<A as Receive<M>>::handle(
                    &mut *actor,
                    message,
                    &assistant,
                ))
                .catch_unwind()
                .await;
                instances.restore(assistant.identity(), actor);

                match outcome {
                    Ok(()) => Ok(Box::new(()) as Erased),
                    Err(panic) => Err(DispatchError::Handler {
                        descriptor: descriptor.to_string(),
                        message: panic_message(panic),
                    }),
                }
            }
            .boxed()
        });

        HandlerBinding {
            owner: std::any::type_name::<A>(),
            owner_id: TypeId::of::<A>(),
            descriptor: M::descriptor(),
            kind: HandlerKind::Observer,
            invoke,
        }
    }
}

impl Debug for HandlerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "HandlerBinding ({:?} {} on {})",
            self.kind, self.descriptor, self.owner
        )
    }
}

pub(crate) fn downcast<T: 'static>(descriptor: &str, value: Erased) -> Result<T, DispatchError> {
    value
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| DispatchError::TypeMismatch {
            descriptor: descriptor.to_string(),
        })
}

use dashmap::{mapref::entry::Entry, DashMap};
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

type Subscriber = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Local subscriptions to dispatched messages and dispatch results, keyed by type.
///
/// Subscribers are for observability. They run on the dispatching task, outside the
/// scene worker, and never take part in the response.
#[derive(Clone, Default)]
pub(crate) struct MessageBroker {
    subscribers: Arc<DashMap<TypeId, Vec<Subscriber>>>,
}

impl MessageBroker {
    pub(crate) fn new() -> MessageBroker {
        MessageBroker::default()
    }

    pub(crate) fn register<T: 'static, F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber: Subscriber = Arc::new(move |value: &dyn Any| {
            if let Some(value) = value.downcast_ref::<T>() {
                callback(value);
            }
        });

        match self.subscribers.entry(TypeId::of::<T>()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().push(subscriber);
            }
            Entry::Vacant(entry) => {
                entry.insert(vec![subscriber]);
            }
        };
    }

    pub(crate) fn publish<T: 'static>(&self, value: &T) {
        // Cloned so no shard lock is held while subscribers run.
        let subscribers = match self.subscribers.get(&TypeId::of::<T>()) {
            Some(subscribers) => subscribers.clone(),
            None => return,
        };

        let value = value as &dyn Any;

        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(value))).is_err() {
                warn!(
                    message = std::any::type_name::<T>(),
                    "subscriber panicked"
                );
            }
        }
    }
}

impl Debug for MessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageBroker ({} types)", self.subscribers.len())
    }
}

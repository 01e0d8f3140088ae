use crate::Actor;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct InstanceKey {
    actor: TypeId,
    identity: String,
}

impl InstanceKey {
    pub(crate) fn of<A: Actor>(identity: &str) -> InstanceKey {
        InstanceKey {
            actor: TypeId::of::<A>(),
            identity: identity.to_string(),
        }
    }
}

/// Cache of activated actors, one per actor type and identity.
///
/// Instances are taken out of the cache while a handler runs and put back
/// afterwards. Only the scene worker does that, so an identity is never
/// activated twice.
#[derive(Clone, Default)]
pub(crate) struct Instances {
    actors: Arc<DashMap<InstanceKey, Box<dyn Any + Send + Sync>>>,
}

impl Instances {
    pub(crate) fn new() -> Instances {
        Instances::default()
    }

    /// Returns the cached instance for `identity`, activating it on first access.
    pub(crate) async fn take_or_activate<A: Actor>(&self, identity: &str) -> Box<A> {
        let key = InstanceKey::of::<A>(identity);

        if let Some((_, actor)) = self.actors.remove(&key) {
            match actor.downcast::<A>() {
                Ok(actor) => return actor,
                // Keys carry the TypeId of A, so this cannot happen
                Err(_) => unreachable!(),
            }
        }

        debug!(
            actor = std::any::type_name::<A>(),
            identity, "activating actor"
        );

        Box::new(A::activate(identity).await)
    }

    pub(crate) fn restore<A: Actor>(&self, identity: &str, actor: Box<A>) {
        self.actors.insert(InstanceKey::of::<A>(identity), actor);
    }

    pub(crate) fn contains<A: Actor>(&self, identity: &str) -> bool {
        self.actors.contains_key(&InstanceKey::of::<A>(identity))
    }

    pub(crate) fn len(&self) -> usize {
        self.actors.len()
    }
}

impl Debug for Instances {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Instances ({})", self.actors.len())
    }
}

use crate::actors::assistant::Assistant;
use crate::actors::binding::{downcast, Erased, HandlerBinding, HandlerKind, Invoke};
use crate::actors::instances::Instances;
use crate::broker::MessageBroker;
use crate::error::DispatchError;
use crate::scheduler::{QueueConfig, TaskQueue};
use crate::transport::envelope::Envelope;
use crate::{Actor, Message, Receive, Respond};
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

type RemoteDispatch =
    Arc<dyn Fn(Scene, String, Value) -> BoxFuture<'static, Result<Value, DispatchError>> + Send + Sync>;

/// Everything registered for one message descriptor.
struct MessageRoute {
    responders: Vec<HandlerBinding>,
    observers: Vec<HandlerBinding>,
    // Decodes a wire payload into the concrete message and dispatches it.
    remote: RemoteDispatch,
}

impl MessageRoute {
    fn new<M: Message>() -> MessageRoute {
        let remote: RemoteDispatch = Arc::new(|scene: Scene, identity: String, payload: Value| {
            async move {
                let descriptor = M::descriptor();
                let message = serde_json::from_value::<M>(payload).map_err(|source| {
                    DispatchError::Decode {
                        descriptor: descriptor.to_string(),
                        source,
                    }
                })?;

                let response = scene.dispatch(identity, message).await?;

                serde_json::to_value(&response).map_err(|source| DispatchError::Encode {
                    descriptor: descriptor.to_string(),
                    source,
                })
            }
            .boxed()
        });

        MessageRoute {
            responders: Vec::new(),
            observers: Vec::new(),
            remote,
        }
    }
}

/// Registration table for a [`Scene`].
///
/// Every handler is wired explicitly: which actor type answers or observes which message.
///
/// ```rust,no_run
/// # use troupe::{Actor, Assistant, Message, Respond, Scene};
/// # use async_trait::async_trait;
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Default)]
/// # struct Counter(u64);
/// # #[async_trait]
/// # impl Actor for Counter {
/// #     async fn activate(_: &str) -> Self { Counter::default() }
/// # }
/// # #[derive(Debug, Clone, Serialize, Deserialize)]
/// # struct Add(u64);
/// # impl Message for Add { type Response = u64; }
/// # #[async_trait]
/// # impl Respond<Add> for Counter {
/// #     async fn handle(&mut self, message: Add, _: &Assistant) -> u64 { self.0 += message.0; self.0 }
/// # }
/// let scene = Scene::builder()
///     .capacity(50)
///     .responder::<Counter, Add>()
///     .build();
/// ```
pub struct SceneBuilder {
    config: QueueConfig,
    queue: Option<TaskQueue>,
    routes: HashMap<&'static str, MessageRoute>,
}

impl SceneBuilder {
    fn new() -> SceneBuilder {
        SceneBuilder {
            config: QueueConfig::default(),
            queue: None,
            routes: HashMap::new(),
        }
    }

    /// Runs the scene on an existing queue instead of creating one.
    pub fn queue(mut self, queue: TaskQueue) -> SceneBuilder {
        self.queue = Some(queue);
        self
    }

    /// Settings of the queue created by `build`, usually `NodeConfig::queue`. Ignored when a
    /// queue is provided.
    pub fn config(mut self, config: QueueConfig) -> SceneBuilder {
        self.config = config;
        self
    }

    /// Capacity of the queue created by `build`. Ignored when a queue is provided.
    pub fn capacity(mut self, capacity: usize) -> SceneBuilder {
        self.config.capacity = capacity;
        self
    }

    /// Makes a message decodable from envelopes even if no handler takes it yet.
    pub fn message<M: Message>(mut self) -> SceneBuilder {
        self.route::<M>();
        self
    }

    /// Registers `A` as the responder for `M`.
    ///
    /// Registering the same actor type twice for a message keeps the last registration.
    pub fn responder<A: Respond<M>, M: Message>(mut self) -> SceneBuilder {
        let binding = HandlerBinding::responder::<A, M>();
        let route = self.route::<M>();

        if let Some(index) = route
            .responders
            .iter()
            .position(|registered| registered.owner_id == binding.owner_id)
        {
            warn!(
                actor = binding.owner,
                descriptor = binding.descriptor,
                "responder registered twice, keeping the last one"
            );
            route.responders.remove(index);
        }

        route.responders.push(binding);
        self
    }

    /// Registers `A` as an observer of `M`.
    pub fn observer<A: Receive<M>, M: Message>(mut self) -> SceneBuilder {
        let binding = HandlerBinding::observer::<A, M>();
        self.route::<M>().observers.push(binding);
        self
    }

    fn route<M: Message>(&mut self) -> &mut MessageRoute {
        self.routes
            .entry(M::descriptor())
            .or_insert_with(MessageRoute::new::<M>)
    }

    pub fn build(self) -> Scene {
        let (queue, owns_queue) = match self.queue {
            Some(queue) => (queue, false),
            None => (TaskQueue::new(self.config), true),
        };

        for (descriptor, route) in self.routes.iter() {
            debug!(
                descriptor,
                responders = route.responders.len(),
                observers = route.observers.len(),
                "message registered"
            );
        }

        Scene {
            inner: Arc::new(SceneInner {
                queue,
                owns_queue,
                routes: self.routes,
                instances: Instances::new(),
                broker: MessageBroker::new(),
            }),
        }
    }
}

struct SceneInner {
    queue: TaskQueue,
    owns_queue: bool,
    routes: HashMap<&'static str, MessageRoute>,
    instances: Instances,
    broker: MessageBroker,
}

impl Drop for SceneInner {
    fn drop(&mut self) {
        // A queue passed to the builder may still serve others.
        if self.owns_queue {
            self.queue.close();
        }
    }
}

/// Scene is the local actor runtime: it owns the handler table, the activated actors and the
/// queue every handler runs on.
///
/// All handlers of a scene run one at a time, in the order their messages were dispatched, so
/// an actor never sees two messages at once. Clone it freely, clones share everything.
#[derive(Clone)]
pub struct Scene {
    inner: Arc<SceneInner>,
}

impl Scene {
    pub fn builder() -> SceneBuilder {
        SceneBuilder::new()
    }

    /// Sends a message to `identity` and waits for the responder's answer.
    ///
    /// Observers of the message run after the responder, without being awaited. If no
    /// responder is registered the observers still run and `DispatchError::NoHandler` is
    /// returned.
    pub async fn dispatch<M: Message>(
        &self,
        identity: impl Into<String>,
        message: M,
    ) -> Result<M::Response, DispatchError> {
        self.enqueue(identity.into(), message, None)?.await
    }

    /// Same as `dispatch`, but answered by the responder of actor type `A` when several actor
    /// types respond to `M`.
    pub async fn send_to<A: Respond<M>, M: Message>(
        &self,
        identity: impl Into<String>,
        message: M,
    ) -> Result<M::Response, DispatchError> {
        self.enqueue(identity.into(), message, Some(TypeId::of::<A>()))?
            .await
    }

    /// Hands a message to the observers of `identity` only. Returns how many were queued.
    pub fn notify<M: Message>(&self, identity: impl Into<String>, message: M) -> usize {
        let identity = identity.into();

        self.inner.broker.publish(&message);

        let route = match self.inner.routes.get(M::descriptor()) {
            Some(route) => route,
            None => return 0,
        };

        let count = route.observers.len();
        self.schedule_observers(identity, observer_jobs(&route.observers, &message));

        count
    }

    /// Decodes an envelope received from a peer and dispatches it.
    ///
    /// Unknown descriptors and undecodable payloads are rejected before anything is queued.
    pub async fn dispatch_envelope(&self, envelope: &Envelope) -> Result<Value, DispatchError> {
        let remote = match self.inner.routes.get(envelope.descriptor.as_str()) {
            Some(route) => route.remote.clone(),
            None => {
                return Err(DispatchError::UnknownDescriptor(
                    envelope.descriptor.clone(),
                ))
            }
        };

        remote(self.clone(), envelope.name.clone(), envelope.message.clone()).await
    }

    /// Calls `callback` with every dispatched message of type `T` and every dispatch result of
    /// type `T`.
    pub fn subscribe<T: 'static, F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.broker.register::<T, F>(callback);
    }

    /// Whether some actor answers `M` in this scene.
    pub fn has_responder<M: Message>(&self) -> bool {
        self.inner
            .routes
            .get(M::descriptor())
            .map(|route| !route.responders.is_empty())
            .unwrap_or(false)
    }

    /// Descriptors of every registered message.
    pub fn descriptors(&self) -> Vec<&'static str> {
        let mut descriptors: Vec<_> = self.inner.routes.keys().copied().collect();
        descriptors.sort_unstable();
        descriptors
    }

    /// Registered handlers for a descriptor, as `(actor type, kind)` pairs.
    pub fn handlers(&self, descriptor: &str) -> Vec<(&'static str, HandlerKind)> {
        match self.inner.routes.get(descriptor) {
            Some(route) => route
                .responders
                .iter()
                .chain(route.observers.iter())
                .map(|binding| (binding.owner, binding.kind))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether `identity` has been activated for actor type `A`.
    ///
    /// An instance is briefly absent from the cache while one of its handlers runs.
    pub fn is_active<A: Actor>(&self, identity: &str) -> bool {
        self.inner.instances.contains::<A>(identity)
    }

    pub fn active_instances(&self) -> usize {
        self.inner.instances.len()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// Closes the underlying queue. Pending and later dispatches fail with `DispatchError::Closed`.
    pub fn close(&self) {
        self.inner.queue.close();
    }

    pub(crate) fn instances(&self) -> &Instances {
        &self.inner.instances
    }

    /// Queues the responder and the observers of a message as one job and returns the future of
    /// the response. The job is queued before this returns, so submission order is the call
    /// order.
    pub(crate) fn enqueue<M: Message>(
        &self,
        identity: String,
        message: M,
        owner: Option<TypeId>,
    ) -> Result<BoxFuture<'static, Result<M::Response, DispatchError>>, DispatchError> {
        let descriptor = M::descriptor();

        debug!(identity = identity.as_str(), descriptor, "dispatching message");

        self.inner.broker.publish(&message);

        let route = match self.inner.routes.get(descriptor) {
            Some(route) => route,
            None => {
                return Err(DispatchError::NoHandler {
                    descriptor: descriptor.to_string(),
                })
            }
        };

        let responder = match owner {
            Some(owner) => route
                .responders
                .iter()
                .rev()
                .find(|binding| binding.owner_id == owner),
            None => route.responders.last(),
        };

        let observers = observer_jobs(&route.observers, &message);

        let responder = match responder {
            Some(binding) => binding.invoke.clone(),
            None => {
                self.schedule_observers(identity, observers);

                return Err(DispatchError::NoHandler {
                    descriptor: descriptor.to_string(),
                });
            }
        };

        let (sender, receiver) = oneshot::channel();
        let assistant = Assistant::new(self.clone(), identity);
        let message: Erased = Box::new(message);

        // Observers share the responder's job and run right after it.
        let job = self.inner.queue.submit(move || async move {
            let _ = sender.send(responder(assistant.clone(), message).await);
            run_observers(assistant, observers).await;
        });

        let scene = self.clone();

        Ok(async move {
            let response = match receiver.await {
                Ok(response) => response?,
                Err(oneshot::Canceled) => {
                    return Err(match job.await {
                        Err(error) => DispatchError::from_task(descriptor, error),
                        Ok(()) => DispatchError::Closed,
                    })
                }
            };
            let response = downcast::<M::Response>(descriptor, response)?;

            scene.inner.broker.publish(&response);

            Ok(response)
        }
        .boxed())
    }

    fn schedule_observers(&self, identity: String, observers: Vec<ObserverJob>) {
        if observers.is_empty() {
            return;
        }

        let assistant = Assistant::new(self.clone(), identity);

        // Nobody waits for observers, failures are logged by `run_observers`.
        let _ = self
            .inner
            .queue
            .submit(move || run_observers(assistant, observers));
    }
}

/// An observer invocation with its own copy of the message.
struct ObserverJob {
    owner: &'static str,
    invoke: Invoke,
    message: Erased,
}

fn observer_jobs<M: Message>(observers: &[HandlerBinding], message: &M) -> Vec<ObserverJob> {
    observers
        .iter()
        .map(|binding| ObserverJob {
            owner: binding.owner,
            invoke: binding.invoke.clone(),
            message: Box::new(message.clone()),
        })
        .collect()
}

async fn run_observers(assistant: Assistant, observers: Vec<ObserverJob>) {
    for job in observers {
        if let Err(error) = (job.invoke)(assistant.clone(), job.message).await {
            warn!(actor = job.owner, %error, "observer failed");
        }
    }
}

impl Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scene (messages: {}, instances: {}, {:?})",
            self.inner.routes.len(),
            self.inner.instances.len(),
            self.inner.queue
        )
    }
}

use crate::actors::assistant::Assistant;
use crate::actors::message::Message;
use crate::Actor;
use async_trait::async_trait;

/// This Trait allow Actors to receive messages and, additionally, respond to them.
///
/// A type implementing `Respond<M>` is a *responder* for `M`: the value it returns is handed back
/// to whoever sent the message, on this process or on a peer. Register it with
/// [`SceneBuilder::responder`](./struct.SceneBuilder.html#method.responder).
///
/// ## Note about concurrency
///
/// All handlers of a scene run one after the other on the same worker. Don't await a dispatch to
/// another actor from inside a handler: the awaited message is queued behind the handler that is
/// waiting for it. Use [`Assistant::tell`](./struct.Assistant.html#method.tell) instead.
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use serde::{Deserialize, Serialize};
/// # use troupe::Actor;
/// # #[derive(Debug, Default)]
/// # struct Employee {
/// #     salary: u32,
/// # }
/// #
/// # #[async_trait]
/// # impl Actor for Employee {
/// #     async fn activate(_: &str) -> Self {
/// #         Employee::default()
/// #     }
/// # }
/// use troupe::{Assistant, Message, Respond};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct SalaryChanged(u32);
///
/// impl Message for SalaryChanged {
///     type Response = String;
/// }
///
/// #[async_trait]
/// impl Respond<SalaryChanged> for Employee {
///     async fn handle(&mut self, message: SalaryChanged, _: &Assistant) -> String {
///         self.salary = message.0;
///         String::from("Thanks!")
///     }
/// }
/// ```
#[async_trait]
pub trait Respond<M: Message>: Sized + Actor {
    /// This method is called each time a message is received.
    async fn handle(&mut self, message: M, assistant: &Assistant) -> M::Response;
}

/// This Trait allow Actors to observe messages without responding to them.
///
/// Observers run after the responder of the same message (if any) and the sender never waits
/// for them. Any number of observers can be registered for the same message, see
/// [`SceneBuilder::observer`](./struct.SceneBuilder.html#method.observer).
#[async_trait]
pub trait Receive<M: Message>: Sized + Actor {
    /// This method is called each time a message is received.
    async fn handle(&mut self, message: M, assistant: &Assistant);
}

use async_trait::async_trait;
use std::fmt::Debug;

/// The main Trait from this crate.
///
/// This Trait enable your structs to be used as actors.
/// You will need to implement [`Respond`](./trait.Respond.html) or [`Receive`](./trait.Receive.html)
/// for every message the actor accepts, and register those handlers in a
/// [`SceneBuilder`](./struct.SceneBuilder.html).
///
/// Actors are addressed by an identity string. The first message sent to an identity activates
/// the actor, after that the same instance handles every message for that identity until the
/// process ends.
///
/// ```rust,no_run
/// use troupe::Actor;
/// use async_trait::async_trait;
///
/// // You can use any normal struct as an actor. It will contain the actor state. No Arc/Mutex
/// // is required as only one message at a time will be handled.
/// #[derive(Debug, Default)]
/// struct Employee {
///     salary: u32,
/// }
///
/// #[async_trait]
/// impl Actor for Employee {
///     // This method allows you to acquire any resource you need and save it.
///     async fn activate(identity: &str) -> Self {
///         println!("Employee {} activated!", identity);
///         Employee::default()
///     }
/// }
/// ```
///
#[async_trait]
pub trait Actor: Sized + Debug + Send + Sync + 'static {
    /// Called on the first message addressed to `identity`.
    async fn activate(identity: &str) -> Self;
}

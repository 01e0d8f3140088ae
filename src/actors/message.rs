use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A message that can be dispatched to actors, locally or through a peer.
///
/// The associated `Response` is what every [`Respond`](./trait.Respond.html) handler for this
/// message returns, so the request/response contract is checked at compile time. Messages that
/// only have observers can use `()`.
///
/// The descriptor names the message on the wire. It defaults to the full type path, so both
/// ends of a call need to be built from the same message definitions. Override it to keep a
/// stable name across crate renames.
///
/// ```rust
/// use serde::{Deserialize, Serialize};
/// use troupe::Message;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Increment(f64);
///
/// impl Message for Increment {
///     type Response = f64;
/// }
///
/// assert!(Increment::descriptor().ends_with("Increment"));
/// ```
pub trait Message: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    type Response: Serialize + DeserializeOwned + Send + 'static;

    fn descriptor() -> &'static str {
        std::any::type_name::<Self>()
    }
}

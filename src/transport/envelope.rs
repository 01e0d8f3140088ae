use crate::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire form of a routed message.
///
/// ```json
/// {"name": "calculator-1", "descriptor": "demo::Increment", "message": 5.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical identity of the target actor.
    pub name: String,
    /// Descriptor of the message type, see [`Message::descriptor`].
    pub descriptor: String,
    /// The message itself.
    pub message: Value,
}

impl Envelope {
    pub fn new<M: Message>(name: impl Into<String>, message: &M) -> serde_json::Result<Envelope> {
        Ok(Envelope {
            name: name.into(),
            descriptor: M::descriptor().to_string(),
            message: serde_json::to_value(message)?,
        })
    }

    /// Whether this envelope carries an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.descriptor == M::descriptor()
    }

    pub fn decode<M: Message>(&self) -> serde_json::Result<M> {
        M::deserialize(&self.message)
    }
}

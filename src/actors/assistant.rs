use crate::actors::instances::Instances;
use crate::scene::Scene;
use crate::Message;
use async_std::task;
use std::fmt::Debug;
use tracing::warn;

/// This object is provided to the handle method in [Respond](./trait.Respond.html) and
/// [Receive](./trait.Receive.html) traits for each message that an Actor receives.
///
/// The Actor's assistant knows the identity being served and allows sending messages to other
/// actors of the same scene without waiting for them.
///
/// ```rust,no_run
/// # use troupe::{Actor, Assistant, Message, Receive};
/// # use async_trait::async_trait;
/// # use serde::{Deserialize, Serialize};
/// #
/// # #[derive(Debug, Default)]
/// # struct Employee {
/// #     salary: u32,
/// #     manager: String,
/// # }
/// #
/// # #[async_trait]
/// # impl Actor for Employee {
/// #     async fn activate(_: &str) -> Self {
/// #         Employee::default()
/// #     }
/// # }
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct SalaryChanged(u32);
///
/// impl Message for SalaryChanged {
///     type Response = ();
/// }
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct SayByeForever(String);
///
/// impl Message for SayByeForever {
///     type Response = ();
/// }
///
/// #[async_trait]
/// impl Receive<SalaryChanged> for Employee {
///     async fn handle(&mut self, message: SalaryChanged, assistant: &Assistant) {
///         if self.salary > message.0 {
///             assistant.tell(self.manager.clone(), SayByeForever("Betrayer!".to_string()));
///         }
///
///         self.salary = message.0;
///     }
/// }
/// ```
///
pub struct Assistant {
    scene: Scene,
    identity: String,
}

impl Assistant {
    pub(crate) fn new(scene: Scene, identity: String) -> Assistant {
        Assistant { scene, identity }
    }

    /// Returns the identity of the actor being served.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queues a message for another identity without waiting for the response.
    ///
    /// The message is queued behind the current handler, so it runs once the current handler
    /// returns. Failures are logged.
    pub fn tell<M: Message>(&self, identity: impl Into<String>, message: M) {
        let identity = identity.into();

        // Without a responder only the observers run, nothing to wait for.
        if let Ok(pending) = self.scene.enqueue(identity.clone(), message, None) {
            task::spawn(async move {
                if let Err(error) = pending.await {
                    warn!(identity = identity.as_str(), %error, "told message failed");
                }
            });
        }
    }

    /// Queues a message for the observers of another identity.
    pub fn notify<M: Message>(&self, identity: impl Into<String>, message: M) {
        self.scene.notify(identity, message);
    }

    pub(crate) fn instances(&self) -> &Instances {
        self.scene.instances()
    }
}

impl Clone for Assistant {
    fn clone(&self) -> Self {
        Assistant {
            scene: self.scene.clone(),
            identity: self.identity.clone(),
        }
    }
}

impl Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Assistant for {}", self.identity)
    }
}

//! HTTP transport between peers.
//!
//! A request is a JSON [`Envelope`] posted to a single route. The receiving side decodes it,
//! dispatches it to its own [`Scene`](crate::Scene) and answers with the JSON response.

pub(crate) mod communicator;
pub(crate) mod envelope;

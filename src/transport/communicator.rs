use crate::error::{DispatchError, TransportError};
use crate::scene::Scene;
use crate::transport::envelope::Envelope;
use crate::Message;
use serde::Deserialize;
use serde_json::Value;
use std::convert::TryFrom;
use std::fmt::Debug;
use std::time::Duration;
use tide::http::mime;
use tide::{Body, Request, Response, StatusCode};
use tracing::{debug, warn};

/// Outbound client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    /// Upper bound for a whole call, connection included.
    #[serde(with = "crate::config::millis")]
    pub timeout: Duration,
    /// Pooled keep-alive connections kept per peer.
    pub max_connections_per_host: usize,
}

impl Default for CommunicatorConfig {
    fn default() -> CommunicatorConfig {
        CommunicatorConfig {
            timeout: Duration::from_secs(15),
            max_connections_per_host: 50,
        }
    }
}

/// Sends envelopes to peers and answers the ones peers send here.
///
/// Outbound calls share one pooled HTTP client. Inbound calls are dispatched to the scene the
/// communicator was built with.
#[derive(Clone)]
pub struct Communicator {
    client: surf::Client,
    scene: Scene,
    timeout: Duration,
}

impl Communicator {
    pub fn new(scene: Scene, config: CommunicatorConfig) -> Result<Communicator, TransportError> {
        let client = surf::Config::new()
            .set_http_keep_alive(true)
            .set_max_connections_per_host(config.max_connections_per_host)
            // Bounded by `send` itself, so expiry is always reported as a timeout.
            .set_timeout(None);

        let client = surf::Client::try_from(client)
            .map_err(|error| TransportError::Client(error.to_string()))?;

        Ok(Communicator {
            client,
            scene,
            timeout: config.timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Posts `message` for `identity` to `url` and decodes the response.
    ///
    /// A malformed `url` fails with `TransportError::InvalidUrl` before anything is sent.
    /// When the timeout expires the in-flight request is dropped and
    /// `TransportError::Timeout` is returned.
    pub async fn send<M: Message>(
        &self,
        url: &str,
        identity: &str,
        message: &M,
    ) -> Result<M::Response, TransportError> {
        let target = surf::Url::parse(url).map_err(|error| TransportError::InvalidUrl {
            url: url.to_string(),
            message: error.to_string(),
        })?;
        let envelope = Envelope::new(identity, message).map_err(TransportError::Encode)?;
        let payload = serde_json::to_vec(&envelope).map_err(TransportError::Encode)?;

        debug!(url, identity, descriptor = M::descriptor(), "sending envelope");

        let call = async {
            let request = surf::RequestBuilder::new(surf::http::Method::Post, target)
                .content_type(surf::http::mime::JSON)
                .body(surf::Body::from_bytes(payload))
                .build();

            let mut response = self
                .client
                .send(request)
                .await
                .map_err(|error| TransportError::Request {
                    url: url.to_string(),
                    message: error.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: u16::from(status),
                });
            }

            let body = response
                .body_bytes()
                .await
                .map_err(|error| TransportError::Request {
                    url: url.to_string(),
                    message: error.to_string(),
                })?;

            serde_json::from_slice::<M::Response>(&body).map_err(|source| TransportError::Decode {
                url: url.to_string(),
                source,
            })
        };

        match async_std::future::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Mounts the inbound route on `app`: `POST route` dispatches envelopes, `OPTIONS route`
    /// answers an empty 200.
    pub fn subscribe<State>(&self, app: &mut tide::Server<State>, route: &str)
    where
        State: Clone + Send + Sync + 'static,
    {
        let scene = self.scene.clone();

        app.at(route)
            .post(move |mut request: Request<State>| {
                let scene = scene.clone();

                async move {
                    let body = request.body_bytes().await?;
                    Ok(answer(&scene, &body).await)
                }
            })
            .options(|_: Request<State>| async { Ok(Response::new(StatusCode::Ok)) });

        debug!(route, "transport route mounted");
    }
}

impl Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Communicator (timeout: {:?})", self.timeout)
    }
}

async fn answer(scene: &Scene, body: &[u8]) -> Response {
    let envelope = match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(%error, "malformed envelope");
            return reply(StatusCode::BadRequest, &Value::Null);
        }
    };

    match scene.dispatch_envelope(&envelope).await {
        Ok(value) => reply(StatusCode::Ok, &value),
        Err(error) => {
            warn!(
                name = envelope.name.as_str(),
                descriptor = envelope.descriptor.as_str(),
                %error,
                "inbound dispatch failed"
            );
            reply(status_of(&error), &Value::Null)
        }
    }
}

fn reply(status: StatusCode, value: &Value) -> Response {
    let mut response = Response::new(status);
    response.set_body(Body::from_string(value.to_string()));
    response.set_content_type(mime::JSON);
    response
}

pub(crate) fn status_of(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::Decode { .. } | DispatchError::TypeMismatch { .. } => StatusCode::BadRequest,
        DispatchError::UnknownDescriptor(_) | DispatchError::NoHandler { .. } => {
            StatusCode::NotFound
        }
        DispatchError::Evicted { .. } | DispatchError::Closed => StatusCode::ServiceUnavailable,
        DispatchError::Handler { .. } | DispatchError::Encode { .. } => {
            StatusCode::InternalServerError
        }
    }
}

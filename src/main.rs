use async_std::task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use troupe::{
    Actor, Assistant, Message, Node, NodeConfig, PeerDirectory, Receive, Respond, Scene,
};

#[derive(Debug, Default)]
struct Calculator {
    total: f64,
    operations: Vec<String>,
}

#[async_trait]
impl Actor for Calculator {
    async fn activate(identity: &str) -> Self {
        info!(identity, "calculator activated");
        Calculator::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Increment(f64);

impl Message for Increment {
    type Response = OperationResponse;

    fn descriptor() -> &'static str {
        "calculator.increment"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Decrement(f64);

impl Message for Decrement {
    type Response = OperationResponse;

    fn descriptor() -> &'static str {
        "calculator.decrement"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Summary;

impl Message for Summary {
    type Response = OperationResponse;

    fn descriptor() -> &'static str {
        "calculator.summary"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OperationResponse {
    value: f64,
    operation: String,
}

#[async_trait]
impl Respond<Increment> for Calculator {
    async fn handle(&mut self, message: Increment, _: &Assistant) -> OperationResponse {
        self.total += message.0;
        self.operations.push(format!("+{}", message.0));

        OperationResponse {
            value: self.total,
            operation: "Increment".to_string(),
        }
    }
}

#[async_trait]
impl Respond<Decrement> for Calculator {
    async fn handle(&mut self, message: Decrement, _: &Assistant) -> OperationResponse {
        self.total -= message.0;
        self.operations.push(format!("-{}", message.0));

        OperationResponse {
            value: self.total,
            operation: "Decrement".to_string(),
        }
    }
}

#[async_trait]
impl Respond<Summary> for Calculator {
    async fn handle(&mut self, _: Summary, assistant: &Assistant) -> OperationResponse {
        info!(
            identity = assistant.identity(),
            operations = ?self.operations,
            "summary"
        );

        OperationResponse {
            value: self.total,
            operation: "Summary".to_string(),
        }
    }
}

/// Keeps a count of the operations applied to each calculator.
#[derive(Debug, Default)]
struct Audit {
    operations: u64,
}

#[async_trait]
impl Actor for Audit {
    async fn activate(_: &str) -> Self {
        Audit::default()
    }
}

#[async_trait]
impl Receive<Increment> for Audit {
    async fn handle(&mut self, message: Increment, assistant: &Assistant) {
        self.operations += 1;
        info!(
            identity = assistant.identity(),
            amount = message.0,
            count = self.operations,
            "increment"
        );
    }
}

#[async_trait]
impl Receive<Decrement> for Audit {
    async fn handle(&mut self, message: Decrement, assistant: &Assistant) {
        self.operations += 1;
        info!(
            identity = assistant.identity(),
            amount = message.0,
            count = self.operations,
            "decrement"
        );
    }
}

fn watch_membership(directory: &PeerDirectory) {
    let created = directory.created();
    let dropped = directory.dropped();

    task::spawn(async move {
        while let Ok(peer) = created.recv().await {
            info!(address = %peer.address, port = peer.port, "peer joined");
        }
    });

    task::spawn(async move {
        while let Ok(peer) = dropped.recv().await {
            info!(
                address = %peer.address,
                hostname = peer.hostname.as_deref().unwrap_or("unknown"),
                "peer left"
            );
        }
    });
}

#[async_std::main]
async fn main() -> Result<(), troupe::Error> {
    // RUST_LOG overrides the default filter, e.g. RUST_LOG=troupe=trace
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,troupe=debug")),
        )
        .init();

    let config = NodeConfig::from_env()?;

    let scene = Scene::builder()
        .config(config.queue.clone())
        .responder::<Calculator, Increment>()
        .responder::<Calculator, Decrement>()
        .responder::<Calculator, Summary>()
        .observer::<Audit, Increment>()
        .observer::<Audit, Decrement>()
        .build();

    let node = Node::new(scene, config)?;

    let _beacon = if node.config().discovery {
        let beacon = node.start_discovery().await?;
        watch_membership(beacon.directory());
        Some(beacon)
    } else {
        None
    };

    node.serve().await
}

#![allow(dead_code)]

use async_std::net::TcpStream;
use async_std::task;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use troupe::{Actor, Assistant, Message, Receive, Respond, Scene, SceneBuilder};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
pub struct CalculatorActor {
    total: f64,
    operations: Vec<String>,
}

#[async_trait]
impl Actor for CalculatorActor {
    async fn activate(_: &str) -> Self {
        CalculatorActor::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Increment(pub f64);

impl Message for Increment {
    type Response = OperationResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decrement(pub f64);

impl Message for Decrement {
    type Response = OperationResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary;

impl Message for Summary {
    type Response = OperationResponse;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History;

impl Message for History {
    type Response = Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub value: f64,
    pub operation: String,
}

#[async_trait]
impl Respond<Increment> for CalculatorActor {
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
impl Respond<Decrement> for CalculatorActor {
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
impl Respond<Summary> for CalculatorActor {
    async fn handle(&mut self, _: Summary, _: &Assistant) -> OperationResponse {
        OperationResponse {
            value: self.total,
            operation: "Summary".to_string(),
        }
    }
}

#[async_trait]
impl Respond<History> for CalculatorActor {
    async fn handle(&mut self, _: History, _: &Assistant) -> Vec<String> {
        self.operations.clone()
    }
}

/// Counts the increments seen for its identity.
#[derive(Debug, Default)]
pub struct Tally {
    seen: u64,
}

#[async_trait]
impl Actor for Tally {
    async fn activate(_: &str) -> Self {
        Tally::default()
    }
}

#[async_trait]
impl Receive<Increment> for Tally {
    async fn handle(&mut self, _: Increment, _: &Assistant) {
        self.seen += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TallyCount;

impl Message for TallyCount {
    type Response = u64;
}

#[async_trait]
impl Respond<TallyCount> for Tally {
    async fn handle(&mut self, _: TallyCount, _: &Assistant) -> u64 {
        self.seen
    }
}

static RUNNING: AtomicUsize = AtomicUsize::new(0);
static OVERLAPS: AtomicUsize = AtomicUsize::new(0);

/// Reports the task it runs on, and whether another handler was running at the same time.
#[derive(Debug, Default)]
pub struct WorkerWitness;

#[async_trait]
impl Actor for WorkerWitness {
    async fn activate(_: &str) -> Self {
        WorkerWitness
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhichWorker;

impl Message for WhichWorker {
    type Response = String;
}

#[async_trait]
impl Respond<WhichWorker> for WorkerWitness {
    async fn handle(&mut self, _: WhichWorker, _: &Assistant) -> String {
        if RUNNING.fetch_add(1, Ordering::SeqCst) != 0 {
            OVERLAPS.fetch_add(1, Ordering::SeqCst);
        }

        task::sleep(Duration::from_millis(2)).await;
        let worker = task::current().id().to_string();

        RUNNING.fetch_sub(1, Ordering::SeqCst);
        worker
    }
}

pub fn overlapping_handlers() -> usize {
    OVERLAPS.load(Ordering::SeqCst)
}

/// Sleeps for the given number of milliseconds before answering.
#[derive(Debug, Default)]
pub struct Sleeper;

#[async_trait]
impl Actor for Sleeper {
    async fn activate(_: &str) -> Self {
        Sleeper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nap(pub u64);

impl Message for Nap {
    type Response = u64;
}

#[async_trait]
impl Respond<Nap> for Sleeper {
    async fn handle(&mut self, message: Nap, _: &Assistant) -> u64 {
        task::sleep(Duration::from_millis(message.0)).await;
        message.0
    }
}

pub fn calculator() -> SceneBuilder {
    Scene::builder()
        .responder::<CalculatorActor, Increment>()
        .responder::<CalculatorActor, Decrement>()
        .responder::<CalculatorActor, Summary>()
        .responder::<CalculatorActor, History>()
}

pub fn free_tcp_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("no free tcp port")
}

pub fn free_udp_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .and_then(|socket| socket.local_addr())
        .map(|addr| addr.port())
        .expect("no free udp port")
}

/// Serves `app` on a free loopback port and waits until it accepts connections.
pub async fn listen<State>(app: tide::Server<State>) -> SocketAddr
where
    State: Clone + Send + Sync + 'static,
{
    let addr = SocketAddr::from(([127, 0, 0, 1], free_tcp_port()));

    task::spawn(async move { app.listen(addr).await });

    for _ in 0..200 {
        if TcpStream::connect(addr).await.is_ok() {
            return addr;
        }
        task::sleep(Duration::from_millis(10)).await;
    }

    panic!("server on {} never came up", addr);
}

mod common;

use async_trait::async_trait;
use common::*;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use troupe::{Actor, Assistant, DispatchError, HandlerKind, Message, NodeConfig, Respond, Scene};

#[async_std::test]
async fn calculator_keeps_a_running_total() {
    init_tracing();
    let scene = calculator().build();

    let first = scene.dispatch("calc", Increment(5.0)).await.unwrap();
    let second = scene.dispatch("calc", Increment(2.0)).await.unwrap();
    let third = scene.dispatch("calc", Decrement(1.0)).await.unwrap();
    let summary = scene.dispatch("calc", Summary).await.unwrap();

    assert_eq!(first.value, 5.0);
    assert_eq!(second.value, 7.0);
    assert_eq!(third.value, 6.0);
    assert_eq!(third.operation, "Decrement");
    assert_eq!(summary.value, 6.0);
    assert_eq!(summary.operation, "Summary");
    assert_eq!(
        scene.dispatch("calc", History).await.unwrap(),
        vec!["+5", "+2", "-1"]
    );
}

#[async_std::test]
async fn identities_keep_their_own_state() {
    let scene = calculator().build();

    scene.dispatch("left", Increment(10.0)).await.unwrap();
    scene.dispatch("right", Decrement(3.0)).await.unwrap();
    scene.dispatch("left", Increment(1.0)).await.unwrap();

    assert_eq!(scene.dispatch("left", Summary).await.unwrap().value, 11.0);
    assert_eq!(scene.dispatch("right", Summary).await.unwrap().value, -3.0);
    assert!(scene.is_active::<CalculatorActor>("left"));
    assert!(!scene.is_active::<CalculatorActor>("nobody"));
    assert_eq!(scene.active_instances(), 2);
}

#[async_std::test]
async fn concurrent_dispatches_run_one_at_a_time_on_one_worker() {
    let scene = Scene::builder()
        .responder::<WorkerWitness, WhichWorker>()
        .build();

    let calls = (0..20).map(|i| {
        let scene = scene.clone();
        async move { scene.dispatch(format!("worker-{}", i % 4), WhichWorker).await }
    });

    let workers: HashSet<String> = join_all(calls)
        .await
        .into_iter()
        .map(|worker| worker.unwrap())
        .collect();

    assert_eq!(workers.len(), 1);
    assert_eq!(overlapping_handlers(), 0);
}

#[async_std::test]
async fn observers_run_after_the_responder() {
    let scene = calculator()
        .observer::<Tally, Increment>()
        .responder::<Tally, TallyCount>()
        .build();

    for _ in 0..3 {
        scene.dispatch("shared", Increment(1.0)).await.unwrap();
    }

    // Queued behind the three observer jobs.
    assert_eq!(scene.dispatch("shared", TallyCount).await.unwrap(), 3);
    assert_eq!(
        scene.handlers(Increment::descriptor()),
        vec![
            (std::any::type_name::<CalculatorActor>(), HandlerKind::Responder),
            (std::any::type_name::<Tally>(), HandlerKind::Observer),
        ]
    );
}

#[async_std::test]
async fn notify_only_reaches_observers() {
    let scene = calculator()
        .observer::<Tally, Increment>()
        .responder::<Tally, TallyCount>()
        .build();

    assert_eq!(scene.notify("quiet", Increment(4.0)), 1);

    assert_eq!(scene.dispatch("quiet", TallyCount).await.unwrap(), 1);
    assert_eq!(scene.dispatch("quiet", Summary).await.unwrap().value, 0.0);
}

#[async_std::test]
async fn messages_without_responder_are_rejected() {
    let scene = Scene::builder().observer::<Tally, Increment>().build();

    assert!(!scene.has_responder::<Increment>());
    assert!(matches!(
        scene.dispatch("x", Increment(1.0)).await,
        Err(DispatchError::NoHandler { .. })
    ));
    assert!(matches!(
        scene.dispatch("x", Summary).await,
        Err(DispatchError::NoHandler { .. })
    ));
}

#[derive(Debug, Default)]
struct Fragile {
    attempts: u32,
}

#[async_trait]
impl Actor for Fragile {
    async fn activate(_: &str) -> Self {
        Fragile::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Attempt {
    explode: bool,
}

impl Message for Attempt {
    type Response = u32;
}

#[async_trait]
impl Respond<Attempt> for Fragile {
    async fn handle(&mut self, message: Attempt, _: &Assistant) -> u32 {
        self.attempts += 1;

        if message.explode {
            panic!("attempt {} exploded", self.attempts);
        }

        self.attempts
    }
}

#[async_std::test]
async fn a_panicking_handler_keeps_the_actor_and_the_worker() {
    let scene = Scene::builder().responder::<Fragile, Attempt>().build();

    match scene.dispatch("f", Attempt { explode: true }).await {
        Err(DispatchError::Handler { message, .. }) => assert_eq!(message, "attempt 1 exploded"),
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(scene.dispatch("f", Attempt { explode: false }).await.unwrap(), 2);
}

#[derive(Debug, Default)]
struct English;

#[derive(Debug, Default)]
struct French;

#[async_trait]
impl Actor for English {
    async fn activate(_: &str) -> Self {
        English
    }
}

#[async_trait]
impl Actor for French {
    async fn activate(_: &str) -> Self {
        French
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Greet;

impl Message for Greet {
    type Response = String;
}

#[async_trait]
impl Respond<Greet> for English {
    async fn handle(&mut self, _: Greet, assistant: &Assistant) -> String {
        format!("hello {}", assistant.identity())
    }
}

#[async_trait]
impl Respond<Greet> for French {
    async fn handle(&mut self, _: Greet, assistant: &Assistant) -> String {
        format!("bonjour {}", assistant.identity())
    }
}

#[async_std::test]
async fn responders_of_different_actor_types_coexist() {
    let scene = Scene::builder()
        .responder::<English, Greet>()
        .responder::<French, Greet>()
        .build();

    assert_eq!(
        scene.send_to::<English, _>("ada", Greet).await.unwrap(),
        "hello ada"
    );
    assert_eq!(
        scene.send_to::<French, _>("ada", Greet).await.unwrap(),
        "bonjour ada"
    );
    // The last registered responder answers untyped dispatches.
    assert_eq!(scene.dispatch("ada", Greet).await.unwrap(), "bonjour ada");
}

#[async_std::test]
async fn registering_the_same_responder_twice_keeps_one() {
    let scene = Scene::builder()
        .responder::<English, Greet>()
        .responder::<English, Greet>()
        .build();

    assert_eq!(scene.handlers(Greet::descriptor()).len(), 1);
}

#[derive(Debug, Default)]
struct Relay;

#[async_trait]
impl Actor for Relay {
    async fn activate(_: &str) -> Self {
        Relay
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Forward {
    to: String,
    amount: f64,
}

impl Message for Forward {
    type Response = ();
}

#[async_trait]
impl Respond<Forward> for Relay {
    async fn handle(&mut self, message: Forward, assistant: &Assistant) {
        assistant.tell(message.to, Increment(message.amount));
    }
}

#[async_std::test]
async fn actors_can_tell_other_actors() {
    let scene = calculator().responder::<Relay, Forward>().build();

    scene
        .dispatch(
            "relay",
            Forward {
                to: "target".to_string(),
                amount: 9.0,
            },
        )
        .await
        .unwrap();

    assert_eq!(scene.dispatch("target", Summary).await.unwrap().value, 9.0);
}

#[async_std::test]
async fn subscribers_see_messages_and_responses() {
    let scene = calculator().build();
    let messages = Arc::new(AtomicUsize::new(0));
    let responses = Arc::new(AtomicUsize::new(0));

    {
        let messages = messages.clone();
        scene.subscribe(move |_: &Increment| {
            messages.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let responses = responses.clone();
        scene.subscribe(move |response: &OperationResponse| {
            if response.operation == "Increment" {
                responses.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    scene.dispatch("s", Increment(1.0)).await.unwrap();
    scene.dispatch("s", Increment(1.0)).await.unwrap();
    scene.dispatch("s", Summary).await.unwrap();

    assert_eq!(messages.load(Ordering::SeqCst), 2);
    assert_eq!(responses.load(Ordering::SeqCst), 2);
}

#[async_std::test]
async fn descriptors_list_every_registered_message() {
    let scene = calculator().message::<Greet>().build();

    let descriptors = scene.descriptors();

    assert_eq!(descriptors.len(), 5);
    assert!(descriptors.contains(&Greet::descriptor()));
    assert!(!scene.has_responder::<Greet>());
}

#[async_std::test]
async fn the_configured_queue_sizes_the_scene() {
    let config = NodeConfig::from_json(r#"{"queue": {"capacity": 7}}"#).unwrap();

    let scene = calculator().config(config.queue.clone()).build();

    assert_eq!(scene.queue().capacity(), 7);
    assert_eq!(scene.dispatch("calc", Increment(1.0)).await.unwrap().value, 1.0);
}

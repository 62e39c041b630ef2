//! Integration tests for the QueueBroker.
//!
//! Publishers and consumers talk to a broker over loopback TCP; these tests
//! cover routing by binding, backlog while no consumer is connected,
//! distribution across consumers, and the health socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use zeromq::prelude::*;
use zeromq::{ReqSocket, ZmqMessage};

use herald_bus::broker::{BrokerConfig, QueueBroker};
use herald_bus::transport::Transport;
use herald_bus::{
    Binding, Envelope, NotificationPublisher, PublisherSettings, QueueReceiver, QueueSender,
    ZmqQueueReceiver, ZmqQueueSender,
};
use herald_core::{Channel, EnrichedEvent, Role};

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

/// Helper: start broker in background, return it with its task handle.
async fn start_broker(config: BrokerConfig) -> (Arc<QueueBroker>, tokio::task::JoinHandle<()>) {
    let broker = Arc::new(QueueBroker::new(config));
    let runner = broker.clone();
    let handle = tokio::spawn(async move {
        let _ = runner.run().await;
    });
    tokio::time::sleep(SETTLE).await;
    (broker, handle)
}

fn envelope(routing_key: &str, n: u32) -> Envelope {
    Envelope::json("notifications.exchange", routing_key, &n).unwrap()
}

#[tokio::test]
async fn broker_routes_bound_envelopes_to_consumer() {
    let (broker, handle) = start_broker(BrokerConfig::tcp("127.0.0.1", 16500, 16501, 16502)).await;

    let sender = ZmqQueueSender::connect(&Transport::tcp("127.0.0.1", 16500))
        .await
        .unwrap();
    let receiver = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16501))
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    let env = envelope("notifications.broadcast", 7);
    let id = env.message_id;
    sender.send(env).await.unwrap();

    let received = timeout(TIMEOUT, receiver.recv())
        .await
        .expect("timed out waiting for routed envelope")
        .unwrap();
    assert_eq!(received.message_id, id);
    assert_eq!(received.decode_json::<u32>().unwrap(), 7);
    assert_eq!(broker.metrics().forwarded(), 1);

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

#[tokio::test]
async fn broker_discards_unroutable_envelopes() {
    let (broker, handle) = start_broker(BrokerConfig::tcp("127.0.0.1", 16510, 16511, 16512)).await;

    let sender = ZmqQueueSender::connect(&Transport::tcp("127.0.0.1", 16510))
        .await
        .unwrap();
    let receiver = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16511))
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    // wrong routing key, then wrong exchange, then one that routes
    sender.send(envelope("audit.log", 1)).await.unwrap();
    sender
        .send(Envelope::json("other.exchange", "notifications.broadcast", &2u32).unwrap())
        .await
        .unwrap();
    sender.send(envelope("notifications.email", 3)).await.unwrap();

    let received = timeout(TIMEOUT, receiver.recv())
        .await
        .expect("timed out waiting for routed envelope")
        .unwrap();
    assert_eq!(received.decode_json::<u32>().unwrap(), 3);
    assert_eq!(broker.metrics().unroutable(), 2);
    assert_eq!(broker.metrics().received(), 3);

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

#[tokio::test]
async fn broker_holds_envelopes_until_a_consumer_connects() {
    let (broker, handle) = start_broker(BrokerConfig::tcp("127.0.0.1", 16520, 16521, 16522)).await;

    let sender = ZmqQueueSender::connect(&Transport::tcp("127.0.0.1", 16520))
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    for n in 0..3u32 {
        sender.send(envelope("notifications.broadcast", n)).await.unwrap();
    }
    tokio::time::sleep(SETTLE).await;
    assert_eq!(broker.metrics().forwarded(), 0);

    let receiver = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16521))
        .await
        .unwrap();

    for n in 0..3u32 {
        let received = timeout(TIMEOUT, receiver.recv())
            .await
            .expect("timed out waiting for held envelope")
            .unwrap();
        assert_eq!(received.decode_json::<u32>().unwrap(), n);
    }

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

#[tokio::test]
async fn broker_spreads_work_across_consumers() {
    let (broker, handle) = start_broker(BrokerConfig::tcp("127.0.0.1", 16530, 16531, 16532)).await;

    let sender = ZmqQueueSender::connect(&Transport::tcp("127.0.0.1", 16530))
        .await
        .unwrap();
    let rx1 = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16531))
        .await
        .unwrap();
    let rx2 = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16531))
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    let total = 10u32;
    for n in 0..total {
        sender.send(envelope("notifications.broadcast", n)).await.unwrap();
    }

    let drain = |rx: ZmqQueueReceiver| {
        tokio::spawn(async move {
            let mut count = 0u32;
            while let Ok(Ok(_)) = timeout(Duration::from_millis(500), rx.recv()).await {
                count += 1;
            }
            count
        })
    };
    let (c1, c2) = tokio::join!(drain(rx1), drain(rx2));
    let (c1, c2) = (c1.unwrap(), c2.unwrap());

    assert_eq!(c1 + c2, total, "every envelope delivered exactly once");
    assert!(c1 > 0 && c2 > 0, "both consumers got work: {c1} / {c2}");

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

#[tokio::test]
async fn broker_honours_custom_binding() {
    let cfg = BrokerConfig::tcp("127.0.0.1", 16540, 16541, 16542)
        .with_binding(Binding::new("notifications.exchange", "notifications.#"));
    let (broker, handle) = start_broker(cfg).await;

    let sender = ZmqQueueSender::connect(&Transport::tcp("127.0.0.1", 16540))
        .await
        .unwrap();
    let receiver = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16541))
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    sender.send(envelope("notifications.email.urgent", 9)).await.unwrap();
    let received = timeout(TIMEOUT, receiver.recv()).await.unwrap().unwrap();
    assert_eq!(received.routing_key, "notifications.email.urgent");

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

#[tokio::test]
async fn published_event_reaches_consumer_through_broker() {
    let (broker, handle) = start_broker(BrokerConfig::tcp("127.0.0.1", 16550, 16551, 16552)).await;

    let sender = ZmqQueueSender::connect(&Transport::tcp("127.0.0.1", 16550))
        .await
        .unwrap();
    let receiver = ZmqQueueReceiver::connect(&Transport::tcp("127.0.0.1", 16551))
        .await
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    let publisher = NotificationPublisher::new(
        Arc::new(sender),
        PublisherSettings {
            exchange: "notifications.exchange".into(),
            routing_key: "notifications.broadcast".into(),
            source: "broker-test".into(),
            timeout: TIMEOUT,
        },
    );
    let event = EnrichedEvent {
        event_type: "credential.revoked".into(),
        actor_role: Role::Issuer,
        recipients: vec!["a@x.com".into()],
        subject: "Revoked".into(),
        body: "Your credential was revoked.".into(),
        channels: vec![Channel::Email, Channel::InApp],
        recipient_roles: vec![Role::Learner],
        metadata: None,
    };
    let receipt = publisher.publish(&event).await.unwrap();

    let received = timeout(TIMEOUT, receiver.recv()).await.unwrap().unwrap();
    assert_eq!(received.message_id, receipt.message_id);
    assert_eq!(received.header("event_type"), Some("credential.revoked"));
    assert_eq!(received.header("source"), Some("broker-test"));
    assert_eq!(received.decode_json::<EnrichedEvent>().unwrap(), event);

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

#[tokio::test]
async fn broker_health_check_responds() {
    let (broker, handle) = start_broker(BrokerConfig::tcp("127.0.0.1", 16560, 16561, 16562)).await;

    let mut req = ReqSocket::new();
    req.connect("tcp://127.0.0.1:16562").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ping: ZmqMessage = "ping".into();
    req.send(ping).await.unwrap();

    let reply = timeout(TIMEOUT, req.recv())
        .await
        .expect("health check timed out")
        .unwrap();
    let reply_str = String::from_utf8(reply.get(0).unwrap().to_vec()).unwrap();
    assert_eq!(reply_str, "ok");

    broker.shutdown();
    let _ = timeout(TIMEOUT, handle).await;
}

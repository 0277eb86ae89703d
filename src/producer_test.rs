use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::broker::AckLevel;
use crate::codec::{TypedValue, ValueType};
use crate::lifecycle::{BrokerEvent, ConnectionState};
use crate::producer::{ProducerConfig, ProducerNode};
use crate::record::OutboundRecord;
use crate::status::{StatusFill, StatusShape};
use crate::testing::{MockBehavior, MockBroker};

fn config(topic: &str) -> ProducerConfig {
  ProducerConfig {
    topic: Some(topic.to_string()),
    ..ProducerConfig::default()
  }
}

fn record(payload: &str) -> OutboundRecord {
  OutboundRecord {
    payload: Some(TypedValue::Text(payload.to_string())),
    ..OutboundRecord::default()
  }
}

async fn wait_for(node: &ProducerNode, state: ConnectionState) {
  for _ in 0..200 {
    if node.state() == state {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("node stuck in {:?}, wanted {state:?}", node.state());
}

#[tokio::test]
async fn test_init_reaches_ready_without_subscribing() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  assert_eq!(broker.calls(), vec!["producer", "connect"]);
}

#[tokio::test]
async fn test_send_captures_the_resolved_request() {
  let broker = Arc::new(MockBroker::new());
  let config = ProducerConfig {
    acknowledge: AckLevel::Leader,
    value_type: ValueType::Text,
    ..config("metrics")
  };
  let mut node = ProducerNode::new(config, Some(Arc::clone(&broker) as _));
  let mut delivered = node.delivered().unwrap();

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  node.handle_input(record("21.5")).await;

  let sent = broker.sent();
  assert_eq!(sent.len(), 1);
  assert_eq!(sent[0].topic, "metrics");
  assert_eq!(sent[0].acks, AckLevel::Leader);
  assert_eq!(sent[0].messages.len(), 1);

  let echoed = timeout(Duration::from_secs(1), delivered.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(echoed.payload, Some(TypedValue::Text("21.5".to_string())));
}

#[tokio::test]
async fn test_send_reports_activity_statuses() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));
  let mut status = node.status_updates().unwrap();

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;
  node.handle_input(record("x")).await;

  let mut updates = Vec::new();
  while let Ok(update) = status.try_recv() {
    updates.push((update.fill, update.shape, update.text));
  }
  assert!(updates.contains(&(StatusFill::Blue, StatusShape::Ring, "Sending".to_string())));
  assert!(updates.contains(&(StatusFill::Green, StatusShape::Dot, "Sent".to_string())));
}

#[tokio::test]
async fn test_input_is_dropped_before_ready() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));

  node.handle_input(record("early")).await;

  assert!(broker.sent().is_empty());
  assert_eq!(broker.calls(), Vec::<String>::new());
}

#[tokio::test]
async fn test_payload_less_input_is_dropped() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;
  node.handle_input(OutboundRecord::default()).await;

  assert!(broker.sent().is_empty());
}

#[tokio::test]
async fn test_adaptation_failure_goes_to_the_error_channel() {
  let broker = Arc::new(MockBroker::new());
  // No static topic and no record topic: adaptation must fail.
  let mut node = ProducerNode::new(ProducerConfig::default(), Some(Arc::clone(&broker) as _));
  let mut errors = node.errors().unwrap();

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;
  node.handle_input(record("orphan")).await;

  let failed = timeout(Duration::from_secs(1), errors.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(
    failed.record.payload,
    Some(TypedValue::Text("orphan".to_string()))
  );
  assert!(broker.sent().is_empty());
}

#[tokio::test]
async fn test_rejected_send_goes_to_the_error_channel() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));
  let mut delivered = node.delivered().unwrap();
  let mut errors = node.errors().unwrap();

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  broker.set_behavior(MockBehavior {
    fail_send: true,
    ..MockBehavior::default()
  });
  node.handle_input(record("x")).await;

  let failed = timeout(Duration::from_secs(1), errors.recv())
    .await
    .unwrap()
    .unwrap();
  assert!(failed.error.contains("refused"));
  assert!(delivered.try_recv().is_err());
}

#[tokio::test]
async fn test_static_key_and_headers_are_applied() {
  let broker = Arc::new(MockBroker::new());
  let config = ProducerConfig {
    key: Some("device-7".to_string()),
    key_type: ValueType::Text,
    headers: [("origin".to_string(), "edge".to_string())].into(),
    ..config("metrics")
  };
  let mut node = ProducerNode::new(config, Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;
  node.handle_input(record("x")).await;

  let sent = broker.sent();
  let message = &sent[0].messages[0];
  assert_eq!(
    message.key,
    Some(TypedValue::Bytes(bytes::Bytes::from_static(b"device-7")))
  );
  assert_eq!(message.headers["origin"], "edge");
}

#[tokio::test]
async fn test_connection_loss_pauses_sending() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  broker.emit(BrokerEvent::Disconnected);
  wait_for(&node, ConnectionState::Offline).await;

  node.handle_input(record("while-offline")).await;
  assert!(broker.sent().is_empty());

  broker.emit(BrokerEvent::Connected);
  wait_for(&node, ConnectionState::Ready).await;
  node.handle_input(record("after-recovery")).await;
  assert_eq!(broker.sent().len(), 1);
}

#[tokio::test]
async fn test_close_disconnects_and_reports_terminal_state() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  node.close().await.unwrap();
  assert_eq!(node.state(), ConnectionState::Disconnected);
  assert!(broker.calls().contains(&"disconnect".to_string()));
}

#[tokio::test]
async fn test_failed_disconnect_surfaces_a_shutdown_error() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ProducerNode::new(config("metrics"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  broker.set_behavior(MockBehavior {
    fail_disconnect: true,
    ..MockBehavior::default()
  });
  assert!(node.close().await.is_err());
}

#[tokio::test]
async fn test_failed_connect_reports_init_error() {
  let broker = Arc::new(MockBroker::new());
  broker.set_behavior(MockBehavior {
    fail_connect: true,
    ..MockBehavior::default()
  });
  let mut node = ProducerNode::new(config("metrics"), Some(broker));

  let error = node.init().await.unwrap_err();
  assert_eq!(error.phase, "connect");
  assert_eq!(node.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_missing_broker_leaves_the_node_inert() {
  let mut node = ProducerNode::new(config("metrics"), None);
  let mut status = node.status_updates().unwrap();

  let update = status.try_recv().unwrap();
  assert_eq!(update.fill, StatusFill::Red);
  assert_eq!(update.text, "Broker is missing.");

  node.init().await.unwrap();
  node.handle_input(record("x")).await;
  assert_eq!(node.state(), ConnectionState::Uninitialized);
}

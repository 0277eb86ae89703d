use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::codec::{ByteOrder, TypedValue, ValueType};
use crate::consumer::{ConsumerConfig, ConsumerNode, ConsumerTuning};
use crate::lifecycle::{BrokerEvent, ConnectionState};
use crate::record::RawRecord;
use crate::status::StatusFill;
use crate::testing::{MockBehavior, MockBroker};

fn config(topic: &str) -> ConsumerConfig {
  ConsumerConfig {
    topic: topic.to_string(),
    group_id: Some("group-1".to_string()),
    ..ConsumerConfig::default()
  }
}

async fn wait_for(node: &ConsumerNode, state: ConnectionState) {
  for _ in 0..200 {
    if node.state() == state {
      return;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("node stuck in {:?}, wanted {state:?}", node.state());
}

#[tokio::test]
async fn test_init_reaches_ready() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  assert_eq!(
    broker.calls(),
    vec!["consumer", "connect", "subscribe:readings", "run"]
  );
}

#[tokio::test]
async fn test_subscription_notice_carries_topic_and_group() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(config("readings"), Some(broker));
  let mut notices = node.notices().unwrap();

  node.init().await.unwrap();

  let notice = timeout(Duration::from_secs(1), notices.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(notice.topic, "readings");
  assert_eq!(notice.group_id, "group-1");
}

#[tokio::test]
async fn test_group_id_is_generated_when_absent() {
  let config = ConsumerConfig {
    topic: "readings".to_string(),
    ..ConsumerConfig::default()
  };
  let node = ConsumerNode::new(config, Some(Arc::new(MockBroker::new())));
  assert!(node.group_id().starts_with("kafkaweave_"));
}

#[tokio::test]
async fn test_delivered_records_are_adapted() {
  let broker = Arc::new(MockBroker::new());
  let config = ConsumerConfig {
    value_type: ValueType::Int32(ByteOrder::Big),
    ..config("readings")
  };
  let mut node = ConsumerNode::new(config, Some(Arc::clone(&broker) as _));
  let mut records = node.records().unwrap();

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  broker.deliver(RawRecord {
    topic: "readings".to_string(),
    partition: 0,
    key: None,
    value: Some(Bytes::from_static(&[0x00, 0x00, 0x00, 0x2A])),
    headers: HashMap::new(),
  });

  let record = timeout(Duration::from_secs(1), records.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(record.topic, "readings");
  assert_eq!(record.payload.value, Some(TypedValue::Int32(42)));
  assert_eq!(record.payload.headers, None);
}

#[tokio::test]
async fn test_undecodable_header_goes_to_the_error_channel() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::clone(&broker) as _));
  let mut errors = node.errors().unwrap();

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  let mut headers = HashMap::new();
  headers.insert("bad".to_string(), Bytes::from_static(&[0xFF, 0xFE]));
  let raw = RawRecord {
    topic: "readings".to_string(),
    partition: 0,
    key: None,
    value: Some(Bytes::from_static(b"x")),
    headers,
  };
  broker.deliver(raw.clone());

  let failed = timeout(Duration::from_secs(1), errors.recv())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(failed.record, raw);
  assert!(!failed.error.is_empty());
}

#[tokio::test]
async fn test_connection_loss_and_recovery() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  broker.emit(BrokerEvent::Disconnected);
  wait_for(&node, ConnectionState::Offline).await;

  broker.emit(BrokerEvent::Connected);
  wait_for(&node, ConnectionState::Ready).await;
}

#[tokio::test]
async fn test_request_timeout_fails_the_node() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  broker.emit(BrokerEvent::RequestTimeout);
  wait_for(&node, ConnectionState::Failed).await;

  // A late reconnect does not revive a failed node.
  broker.emit(BrokerEvent::Connected);
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert_eq!(node.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_close_disconnects_and_reports_terminal_state() {
  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::clone(&broker) as _));

  node.init().await.unwrap();
  wait_for(&node, ConnectionState::Ready).await;

  node.close().await.unwrap();
  assert_eq!(node.state(), ConnectionState::Disconnected);
  assert!(broker.calls().contains(&"disconnect".to_string()));
}

#[tokio::test]
async fn test_failed_connect_reports_init_error() {
  let broker = Arc::new(MockBroker::new());
  broker.set_behavior(MockBehavior {
    fail_connect: true,
    ..MockBehavior::default()
  });
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::clone(&broker) as _));
  let mut status = node.status_updates().unwrap();

  let error = node.init().await.unwrap_err();
  assert_eq!(error.phase, "connect");
  assert_eq!(node.state(), ConnectionState::Failed);

  let mut texts = Vec::new();
  while let Ok(update) = status.try_recv() {
    texts.push(update.text);
  }
  assert_eq!(texts, vec!["Initializing", "Init error"]);
}

#[tokio::test]
async fn test_failed_subscribe_reports_init_error() {
  let broker = Arc::new(MockBroker::new());
  broker.set_behavior(MockBehavior {
    fail_subscribe: true,
    ..MockBehavior::default()
  });
  let mut node = ConsumerNode::new(config("readings"), Some(broker));

  let error = node.init().await.unwrap_err();
  assert_eq!(error.phase, "subscribe");
  assert_eq!(node.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_missing_broker_leaves_the_node_inert() {
  let mut node = ConsumerNode::new(config("readings"), None);
  let mut status = node.status_updates().unwrap();

  let update = status.try_recv().unwrap();
  assert_eq!(update.fill, StatusFill::Red);
  assert_eq!(update.text, "Broker is missing.");

  node.init().await.unwrap();
  assert_eq!(node.state(), ConnectionState::Uninitialized);

  node.close().await.unwrap();
  assert_eq!(node.state(), ConnectionState::Uninitialized);
}

#[tokio::test]
async fn test_channels_can_only_be_taken_once() {
  let mut node = ConsumerNode::new(config("readings"), Some(Arc::new(MockBroker::new())));
  assert!(node.records().is_some());
  assert!(node.records().is_none());
  assert!(node.status_updates().is_some());
  assert!(node.status_updates().is_none());
}

#[tokio::test]
async fn test_tuning_is_forwarded_only_when_advanced_options_is_set() {
  let tuning = ConsumerTuning {
    session_timeout_ms: Some(45_000),
    from_beginning: Some(true),
    ..ConsumerTuning::default()
  };

  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(
    ConsumerConfig {
      tuning: tuning.clone(),
      ..config("readings")
    },
    Some(Arc::clone(&broker) as _),
  );
  node.init().await.unwrap();
  assert_eq!(broker.consumer_options()[0].session_timeout_ms, None);

  let broker = Arc::new(MockBroker::new());
  let mut node = ConsumerNode::new(
    ConsumerConfig {
      advanced_options: true,
      tuning,
      ..config("readings")
    },
    Some(Arc::clone(&broker) as _),
  );
  node.init().await.unwrap();
  assert_eq!(
    broker.consumer_options()[0].session_timeout_ms,
    Some(45_000)
  );
}

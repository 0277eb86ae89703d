//! Consumer node: subscribes to a topic and emits normalized records.
//!
//! The node owns one [`ConnectionLifecycle`] and one [`InboundMessageAdapter`]
//! and drives the collaborator's connect/subscribe/run sequence. Successful
//! records, failed records, status updates and the post-subscription notice
//! each travel on their own channel so the host can wire them to distinct
//! outputs.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use futures::StreamExt;
use serde::Deserialize;
use tracing::error;

use crate::broker::{BrokerClient, ConsumerHandle, ConsumerOptions, RunOptions, SubscribeOptions};
use crate::codec::ValueType;
use crate::error::{BrokerError, InitError, ShutdownError};
use crate::inbound::InboundMessageAdapter;
use crate::lifecycle::{lock_lifecycle, ConnectionLifecycle, ConnectionState, SharedLifecycle};
use crate::record::{ErrorRecord, FlowRecord, RawRecord};
use crate::status::{StatusFill, StatusShape, StatusUpdate};

/// Advanced consumer tuning, applied only when `advanced_options` is set.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ConsumerTuning {
  /// Session timeout in milliseconds.
  pub session_timeout_ms: Option<u64>,
  /// Rebalance timeout in milliseconds.
  pub rebalance_timeout_ms: Option<u64>,
  /// Heartbeat interval in milliseconds.
  pub heartbeat_interval_ms: Option<u64>,
  /// Metadata max age in milliseconds.
  pub metadata_max_age_ms: Option<u64>,
  /// Whether subscribing may create the topic.
  pub allow_auto_topic_creation: Option<bool>,
  /// Per-partition fetch ceiling in bytes.
  pub max_bytes_per_partition: Option<u32>,
  /// Minimum bytes per fetch response.
  pub min_bytes: Option<u32>,
  /// Maximum bytes per fetch response.
  pub max_bytes: Option<u32>,
  /// Maximum fetch wait in milliseconds.
  pub max_wait_ms: Option<u64>,
  /// Whether to start from the earliest offset.
  pub from_beginning: Option<bool>,
  /// Auto-commit interval in milliseconds.
  pub auto_commit_interval_ms: Option<u64>,
  /// Auto-commit after this many resolved messages.
  pub auto_commit_threshold: Option<u32>,
}

/// Consumer node configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
  /// Optional name for logs and status reporting.
  pub name: Option<String>,
  /// Topic to subscribe to.
  pub topic: String,
  /// Consumer group id; generated when absent.
  pub group_id: Option<String>,
  /// Target type for key decoding.
  pub key_type: ValueType,
  /// Target type for value decoding.
  pub value_type: ValueType,
  /// Enables the advanced tuning block.
  pub advanced_options: bool,
  /// Advanced tuning, applied only when `advanced_options` is set.
  pub tuning: ConsumerTuning,
}

impl Default for ConsumerConfig {
  fn default() -> Self {
    Self {
      name: None,
      topic: String::new(),
      group_id: None,
      key_type: ValueType::Raw,
      value_type: ValueType::Raw,
      advanced_options: false,
      tuning: ConsumerTuning::default(),
    }
  }
}

/// Emitted once the subscription is running, mirroring the original node's
/// second output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionNotice {
  /// The subscribed topic.
  pub topic: String,
  /// The resolved consumer group id.
  pub group_id: String,
}

/// A long-lived consumer node bound to one broker configuration entity.
pub struct ConsumerNode {
  config: ConsumerConfig,
  component: String,
  group_id: String,
  broker: Option<Arc<dyn BrokerClient>>,
  lifecycle: SharedLifecycle,
  adapter: InboundMessageAdapter,
  handle: Option<Box<dyn ConsumerHandle>>,
  status_rx: Option<mpsc::UnboundedReceiver<StatusUpdate>>,
  records_tx: mpsc::UnboundedSender<FlowRecord>,
  records_rx: Option<mpsc::UnboundedReceiver<FlowRecord>>,
  errors_tx: mpsc::UnboundedSender<ErrorRecord<RawRecord>>,
  errors_rx: Option<mpsc::UnboundedReceiver<ErrorRecord<RawRecord>>>,
  notices_tx: mpsc::UnboundedSender<SubscriptionNotice>,
  notices_rx: Option<mpsc::UnboundedReceiver<SubscriptionNotice>>,
  tasks: Vec<JoinHandle<()>>,
}

impl ConsumerNode {
  /// Creates a consumer node.
  ///
  /// When `broker` is absent the node reports a persistent "Broker is
  /// missing." status and stays permanently inert — a deliberate terminal
  /// condition distinct from `Failed`.
  pub fn new(config: ConsumerConfig, broker: Option<Arc<dyn BrokerClient>>) -> Self {
    let component = config
      .name
      .clone()
      .unwrap_or_else(|| "kafka_consumer".to_string());
    let (lifecycle, status_rx) = ConnectionLifecycle::new(component.clone());

    if broker.is_none() {
      error!(component = %component, "broker reference is missing, node will stay inert");
      lifecycle.announce(StatusUpdate::new(
        StatusFill::Red,
        StatusShape::Ring,
        "Broker is missing.",
      ));
    }

    let group_id = config
      .group_id
      .clone()
      .unwrap_or_else(|| format!("kafkaweave_{:08x}", rand::random::<u32>()));
    let adapter = InboundMessageAdapter::new(config.key_type, config.value_type);

    let (records_tx, records_rx) = mpsc::unbounded_channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();

    Self {
      config,
      component,
      group_id,
      broker,
      lifecycle: Arc::new(Mutex::new(lifecycle)),
      adapter,
      handle: None,
      status_rx: Some(status_rx),
      records_tx,
      records_rx: Some(records_rx),
      errors_tx,
      errors_rx: Some(errors_rx),
      notices_tx,
      notices_rx: Some(notices_rx),
      tasks: Vec::new(),
    }
  }

  /// Current lifecycle state.
  pub fn state(&self) -> ConnectionState {
    lock_lifecycle(&self.lifecycle).state()
  }

  /// The consumer group id this node runs under.
  pub fn group_id(&self) -> &str {
    &self.group_id
  }

  /// Takes the status update channel. Yields `None` after the first call.
  pub fn status_updates(&mut self) -> Option<mpsc::UnboundedReceiver<StatusUpdate>> {
    self.status_rx.take()
  }

  /// Takes the normalized record channel. Yields `None` after the first call.
  pub fn records(&mut self) -> Option<mpsc::UnboundedReceiver<FlowRecord>> {
    self.records_rx.take()
  }

  /// Takes the error record channel. Yields `None` after the first call.
  pub fn errors(&mut self) -> Option<mpsc::UnboundedReceiver<ErrorRecord<RawRecord>>> {
    self.errors_rx.take()
  }

  /// Takes the subscription notice channel. Yields `None` after the first
  /// call.
  pub fn notices(&mut self) -> Option<mpsc::UnboundedReceiver<SubscriptionNotice>> {
    self.notices_rx.take()
  }

  /// Runs the asynchronous initialization sequence: create the handle, pump
  /// collaborator events into the lifecycle, connect, subscribe, and start
  /// the consumption loop.
  ///
  /// An inert node (missing broker) returns `Ok(())` without acting.
  ///
  /// # Errors
  ///
  /// Returns an [`InitError`] and transitions to `Failed` when any step of
  /// the sequence fails. The node does not retry on its own.
  pub async fn init(&mut self) -> Result<(), InitError> {
    let Some(broker) = self.broker.clone() else {
      return Ok(());
    };

    let mut handle = match broker.consumer(self.consumer_options()) {
      Ok(handle) => handle,
      Err(source) => return Err(self.init_failure("create", source)),
    };
    lock_lifecycle(&self.lifecycle).begin_initializing();

    let mut events = handle.events();
    let lifecycle = Arc::clone(&self.lifecycle);
    self.tasks.push(tokio::spawn(async move {
      while let Some(event) = events.next().await {
        lifecycle.lock().unwrap_or_else(PoisonError::into_inner).apply(event);
      }
    }));

    if let Err(source) = handle.connect().await {
      return Err(self.init_failure("connect", source));
    }
    if let Err(source) = handle.subscribe(self.subscribe_options()).await {
      return Err(self.init_failure("subscribe", source));
    }
    let mut records = match handle.run(self.run_options()) {
      Ok(records) => records,
      Err(source) => return Err(self.init_failure("run", source)),
    };
    self.handle = Some(handle);

    let adapter = self.adapter.clone();
    let records_tx = self.records_tx.clone();
    let errors_tx = self.errors_tx.clone();
    let lifecycle = Arc::clone(&self.lifecycle);
    let component = self.component.clone();
    self.tasks.push(tokio::spawn(async move {
      // Each record is adapted and forwarded before the next one is polled.
      while let Some(raw) = records.next().await {
        match adapter.adapt(raw.clone()) {
          Ok(record) => {
            let _ = records_tx.send(record);
            lock_lifecycle(&lifecycle).announce(StatusUpdate::new(
              StatusFill::Green,
              StatusShape::Dot,
              "Message received",
            ));
          }
          Err(cause) => {
            error!(component = %component, error = %cause, "message processing failed");
            lock_lifecycle(&lifecycle).announce(StatusUpdate::new(
              StatusFill::Red,
              StatusShape::Ring,
              "Error",
            ));
            let _ = errors_tx.send(ErrorRecord::new(raw, cause));
          }
        }
      }
    }));

    let _ = self.notices_tx.send(SubscriptionNotice {
      topic: self.config.topic.clone(),
      group_id: self.group_id.clone(),
    });
    Ok(())
  }

  /// Requests disconnect from the collaborator, waits for completion, and
  /// transitions to `Disconnected`.
  ///
  /// # Errors
  ///
  /// Returns a [`ShutdownError`] when the collaborator's disconnect fails;
  /// the failure is reported rather than swallowed.
  pub async fn close(&mut self) -> Result<(), ShutdownError> {
    let Some(mut handle) = self.handle.take() else {
      if self.broker.is_some() {
        lock_lifecycle(&self.lifecycle).complete_close();
      }
      return Ok(());
    };
    match handle.disconnect().await {
      Ok(()) => {
        lock_lifecycle(&self.lifecycle).complete_close();
        Ok(())
      }
      Err(source) => {
        error!(component = %self.component, error = %source, "disconnect failed during shutdown");
        Err(ShutdownError(source))
      }
    }
  }

  fn init_failure(&mut self, phase: &'static str, source: BrokerError) -> InitError {
    error!(component = %self.component, phase, error = %source, "initialization failed");
    lock_lifecycle(&self.lifecycle).fail("Init error");
    InitError { phase, source }
  }

  fn consumer_options(&self) -> ConsumerOptions {
    let mut options = ConsumerOptions {
      group_id: self.group_id.clone(),
      ..ConsumerOptions::default()
    };
    if self.config.advanced_options {
      let tuning = &self.config.tuning;
      options.session_timeout_ms = tuning.session_timeout_ms;
      options.rebalance_timeout_ms = tuning.rebalance_timeout_ms;
      options.heartbeat_interval_ms = tuning.heartbeat_interval_ms;
      options.metadata_max_age_ms = tuning.metadata_max_age_ms;
      options.allow_auto_topic_creation = tuning.allow_auto_topic_creation;
      options.max_bytes_per_partition = tuning.max_bytes_per_partition;
      options.min_bytes = tuning.min_bytes;
      options.max_bytes = tuning.max_bytes;
      options.max_wait_ms = tuning.max_wait_ms;
    }
    options
  }

  fn subscribe_options(&self) -> SubscribeOptions {
    SubscribeOptions {
      topic: self.config.topic.clone(),
      from_beginning: self
        .config
        .advanced_options
        .then_some(self.config.tuning.from_beginning)
        .flatten(),
    }
  }

  fn run_options(&self) -> RunOptions {
    if self.config.advanced_options {
      RunOptions {
        auto_commit_interval_ms: self.config.tuning.auto_commit_interval_ms,
        auto_commit_threshold: self.config.tuning.auto_commit_threshold,
      }
    } else {
      RunOptions::default()
    }
  }
}

impl Drop for ConsumerNode {
  fn drop(&mut self) {
    for task in &self.tasks {
      task.abort();
    }
  }
}

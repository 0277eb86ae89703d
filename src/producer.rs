//! Producer node: accepts outbound records and sends them to the broker.
//!
//! Input records are accepted only while the connection is `Ready`; a record
//! without a payload is dropped without producing a send request. Delivered
//! records and failed records travel on separate channels so errors never
//! merge silently with successes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use futures::StreamExt;
use serde::Deserialize;
use tracing::error;

use crate::broker::{AckLevel, BrokerClient, ProducerHandle};
use crate::codec::{TypedValue, ValueType};
use crate::error::{BrokerError, InitError, ShutdownError};
use crate::lifecycle::{lock_lifecycle, ConnectionLifecycle, ConnectionState, SharedLifecycle};
use crate::outbound::{OutboundMessageAdapter, SendDefaults};
use crate::record::{ErrorRecord, OutboundRecord};
use crate::status::{StatusFill, StatusShape, StatusUpdate};

/// Producer node configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
  /// Optional name for logs and status reporting.
  pub name: Option<String>,
  /// Static target topic; overrides the per-record topic when set.
  pub topic: Option<String>,
  /// Static target partition; overrides the per-record partition when set.
  pub partition: Option<i32>,
  /// Static record key; overrides the per-record key when set.
  pub key: Option<String>,
  /// Static headers; override per-record headers when non-empty.
  pub headers: HashMap<String, String>,
  /// Acknowledgment level for every send.
  pub acknowledge: AckLevel,
  /// Response timeout in milliseconds.
  pub response_timeout_ms: Option<u64>,
  /// Source type for key encoding.
  pub key_type: ValueType,
  /// Source type for value encoding.
  pub value_type: ValueType,
}

impl Default for ProducerConfig {
  fn default() -> Self {
    Self {
      name: None,
      topic: None,
      partition: None,
      key: None,
      headers: HashMap::new(),
      acknowledge: AckLevel::default(),
      response_timeout_ms: None,
      key_type: ValueType::Raw,
      value_type: ValueType::Raw,
    }
  }
}

impl ProducerConfig {
  fn send_defaults(&self) -> SendDefaults {
    SendDefaults {
      topic: self.topic.clone(),
      partition: self.partition,
      key: self.key.clone().map(TypedValue::Text),
      headers: self.headers.clone(),
      acks: self.acknowledge,
      response_timeout_ms: self.response_timeout_ms,
    }
  }
}

/// A long-lived producer node bound to one broker configuration entity.
pub struct ProducerNode {
  component: String,
  broker: Option<Arc<dyn BrokerClient>>,
  lifecycle: SharedLifecycle,
  adapter: OutboundMessageAdapter,
  handle: Option<Box<dyn ProducerHandle>>,
  status_rx: Option<mpsc::UnboundedReceiver<StatusUpdate>>,
  delivered_tx: mpsc::UnboundedSender<OutboundRecord>,
  delivered_rx: Option<mpsc::UnboundedReceiver<OutboundRecord>>,
  errors_tx: mpsc::UnboundedSender<ErrorRecord<OutboundRecord>>,
  errors_rx: Option<mpsc::UnboundedReceiver<ErrorRecord<OutboundRecord>>>,
  tasks: Vec<JoinHandle<()>>,
}

impl ProducerNode {
  /// Creates a producer node.
  ///
  /// When `broker` is absent the node reports a persistent "Broker is
  /// missing." status and stays permanently inert — a deliberate terminal
  /// condition distinct from `Failed`.
  pub fn new(config: ProducerConfig, broker: Option<Arc<dyn BrokerClient>>) -> Self {
    let component = config
      .name
      .clone()
      .unwrap_or_else(|| "kafka_producer".to_string());
    let (lifecycle, status_rx) = ConnectionLifecycle::new(component.clone());

    if broker.is_none() {
      error!(component = %component, "broker reference is missing, node will stay inert");
      lifecycle.announce(StatusUpdate::new(
        StatusFill::Red,
        StatusShape::Ring,
        "Broker is missing.",
      ));
    }

    let adapter = OutboundMessageAdapter::new(config.key_type, config.value_type, config.send_defaults());

    let (delivered_tx, delivered_rx) = mpsc::unbounded_channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();

    Self {
      component,
      broker,
      lifecycle: Arc::new(Mutex::new(lifecycle)),
      adapter,
      handle: None,
      status_rx: Some(status_rx),
      delivered_tx,
      delivered_rx: Some(delivered_rx),
      errors_tx,
      errors_rx: Some(errors_rx),
      tasks: Vec::new(),
    }
  }

  /// Current lifecycle state.
  pub fn state(&self) -> ConnectionState {
    lock_lifecycle(&self.lifecycle).state()
  }

  /// Takes the status update channel. Yields `None` after the first call.
  pub fn status_updates(&mut self) -> Option<mpsc::UnboundedReceiver<StatusUpdate>> {
    self.status_rx.take()
  }

  /// Takes the delivered record channel. Yields `None` after the first call.
  pub fn delivered(&mut self) -> Option<mpsc::UnboundedReceiver<OutboundRecord>> {
    self.delivered_rx.take()
  }

  /// Takes the error record channel. Yields `None` after the first call.
  pub fn errors(&mut self) -> Option<mpsc::UnboundedReceiver<ErrorRecord<OutboundRecord>>> {
    self.errors_rx.take()
  }

  /// Runs the asynchronous initialization sequence: create the handle, pump
  /// collaborator events into the lifecycle, and connect. Producers do not
  /// subscribe; they send on demand.
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

    let mut handle = match broker.producer() {
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
    self.handle = Some(handle);
    Ok(())
  }

  /// Accepts one outbound record from the flow.
  ///
  /// Dropped without effect when the node is not `Ready` or the record
  /// carries no payload. The adapted request is sent through the
  /// collaborator; the record is then forwarded on the delivered channel, or
  /// on the error channel with the failure attached.
  pub async fn handle_input(&mut self, record: OutboundRecord) {
    if self.state() != ConnectionState::Ready || record.payload.is_none() {
      return;
    }

    let lifecycle = Arc::clone(&self.lifecycle);
    let delivered_tx = self.delivered_tx.clone();
    let errors_tx = self.errors_tx.clone();
    let component = self.component.clone();

    let request = match self.adapter.adapt(record.clone()) {
      Ok(Some(request)) => request,
      Ok(None) => return,
      Err(cause) => {
        error!(component = %component, error = %cause, "outbound record adaptation failed");
        lock_lifecycle(&lifecycle).announce(StatusUpdate::new(
          StatusFill::Red,
          StatusShape::Ring,
          "Error",
        ));
        let _ = errors_tx.send(ErrorRecord::new(record, cause));
        return;
      }
    };

    let Some(handle) = self.handle.as_mut() else {
      return;
    };

    lock_lifecycle(&lifecycle).announce(StatusUpdate::new(
      StatusFill::Blue,
      StatusShape::Ring,
      "Sending",
    ));
    match handle.send(request).await {
      Ok(()) => {
        lock_lifecycle(&lifecycle).announce(StatusUpdate::new(
          StatusFill::Green,
          StatusShape::Dot,
          "Sent",
        ));
        let _ = delivered_tx.send(record);
      }
      Err(cause) => {
        error!(component = %component, error = %cause, "send failed");
        lock_lifecycle(&lifecycle).announce(StatusUpdate::new(
          StatusFill::Red,
          StatusShape::Ring,
          "Error",
        ));
        let _ = errors_tx.send(ErrorRecord::new(record, cause));
      }
    }
  }

  /// Requests disconnect from the collaborator, waits for completion, and
  /// transitions to `Disconnected`. An in-flight send is not cancelled; the
  /// collaborator drains outstanding operations per its own contract.
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
}

impl Drop for ProducerNode {
  fn drop(&mut self) {
    for task in &self.tasks {
      task.abort();
    }
  }
}

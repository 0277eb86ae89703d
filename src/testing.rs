//! Channel-backed mock broker client for exercising nodes in tests.
//!
//! The mock implements the full collaborator contract without any network:
//! lifecycle events can be injected with [`MockBroker::emit`], inbound records
//! with [`MockBroker::deliver`], sent requests are captured for assertions,
//! and individual operations can be made to fail.

use async_stream::stream;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::broker::{
  BrokerClient, ClientOptions, ConsumerHandle, ConsumerOptions, EventStream, ProducerHandle,
  RecordStream, RunOptions, SubscribeOptions,
};
use crate::error::BrokerError;
use crate::lifecycle::BrokerEvent;
use crate::record::{RawRecord, SendRequest};

/// Which mock operations should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBehavior {
  /// Fail `connect` calls.
  pub fail_connect: bool,
  /// Fail `subscribe` calls.
  pub fail_subscribe: bool,
  /// Fail `disconnect` calls.
  pub fail_disconnect: bool,
  /// Fail `send` calls.
  pub fail_send: bool,
}

#[derive(Debug, Default)]
struct MockState {
  behavior: Mutex<MockBehavior>,
  calls: Mutex<Vec<String>>,
  sent: Mutex<Vec<SendRequest>>,
  consumer_options: Mutex<Vec<ConsumerOptions>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
  fn record_call(&self, call: impl Into<String>) {
    lock(&self.calls).push(call.into());
  }
}

/// A channel-backed [`BrokerClient`] for tests.
pub struct MockBroker {
  options: ClientOptions,
  state: Arc<MockState>,
  event_tx: broadcast::Sender<BrokerEvent>,
  record_tx: mpsc::UnboundedSender<RawRecord>,
  record_rx: Mutex<Option<mpsc::UnboundedReceiver<RawRecord>>>,
}

impl Default for MockBroker {
  fn default() -> Self {
    Self::new()
  }
}

impl MockBroker {
  /// Creates a mock with default client options.
  pub fn new() -> Self {
    let (event_tx, _) = broadcast::channel(64);
    let (record_tx, record_rx) = mpsc::unbounded_channel();
    Self {
      options: ClientOptions::default(),
      state: Arc::new(MockState::default()),
      event_tx,
      record_tx,
      record_rx: Mutex::new(Some(record_rx)),
    }
  }

  /// Injects a lifecycle event into every subscribed handle.
  pub fn emit(&self, event: BrokerEvent) {
    let _ = self.event_tx.send(event);
  }

  /// Queues a raw record for delivery through the consumer run loop.
  pub fn deliver(&self, record: RawRecord) {
    let _ = self.record_tx.send(record);
  }

  /// Sets which operations fail.
  pub fn set_behavior(&self, behavior: MockBehavior) {
    *lock(&self.state.behavior) = behavior;
  }

  /// All requests captured from `send`, in order.
  pub fn sent(&self) -> Vec<SendRequest> {
    lock(&self.state.sent).clone()
  }

  /// All collaborator operations invoked, in order.
  pub fn calls(&self) -> Vec<String> {
    lock(&self.state.calls).clone()
  }

  /// The consumer options each consumer handle was created with.
  pub fn consumer_options(&self) -> Vec<ConsumerOptions> {
    lock(&self.state.consumer_options).clone()
  }
}

impl BrokerClient for MockBroker {
  fn options(&self) -> &ClientOptions {
    &self.options
  }

  fn consumer(&self, options: ConsumerOptions) -> Result<Box<dyn ConsumerHandle>, BrokerError> {
    self.state.record_call("consumer");
    lock(&self.state.consumer_options).push(options);
    let records = lock(&self.record_rx).take();
    Ok(Box::new(MockConsumerHandle {
      state: Arc::clone(&self.state),
      event_tx: self.event_tx.clone(),
      records,
    }))
  }

  fn producer(&self) -> Result<Box<dyn ProducerHandle>, BrokerError> {
    self.state.record_call("producer");
    Ok(Box::new(MockProducerHandle {
      state: Arc::clone(&self.state),
      event_tx: self.event_tx.clone(),
    }))
  }
}

fn subscribe_events(event_tx: &broadcast::Sender<BrokerEvent>) -> EventStream {
  let mut events = event_tx.subscribe();
  Box::pin(stream! {
    while let Ok(event) = events.recv().await {
      yield event;
    }
  })
}

struct MockConsumerHandle {
  state: Arc<MockState>,
  event_tx: broadcast::Sender<BrokerEvent>,
  records: Option<mpsc::UnboundedReceiver<RawRecord>>,
}

#[async_trait::async_trait]
impl ConsumerHandle for MockConsumerHandle {
  async fn connect(&mut self) -> Result<(), BrokerError> {
    self.state.record_call("connect");
    if lock(&self.state.behavior).fail_connect {
      return Err(BrokerError::Connection("mock connect refused".to_string()));
    }
    let _ = self.event_tx.send(BrokerEvent::Connected);
    Ok(())
  }

  async fn disconnect(&mut self) -> Result<(), BrokerError> {
    self.state.record_call("disconnect");
    if lock(&self.state.behavior).fail_disconnect {
      return Err(BrokerError::Connection("mock disconnect refused".to_string()));
    }
    Ok(())
  }

  async fn subscribe(&mut self, options: SubscribeOptions) -> Result<(), BrokerError> {
    self.state.record_call(format!("subscribe:{}", options.topic));
    if lock(&self.state.behavior).fail_subscribe {
      return Err(BrokerError::Rejected("mock subscribe refused".to_string()));
    }
    Ok(())
  }

  fn events(&mut self) -> EventStream {
    subscribe_events(&self.event_tx)
  }

  fn run(&mut self, _options: RunOptions) -> Result<RecordStream, BrokerError> {
    self.state.record_call("run");
    let records = self
      .records
      .take()
      .ok_or_else(|| BrokerError::Rejected("run already started".to_string()))?;
    Ok(Box::pin(UnboundedReceiverStream::new(records)))
  }
}

struct MockProducerHandle {
  state: Arc<MockState>,
  event_tx: broadcast::Sender<BrokerEvent>,
}

#[async_trait::async_trait]
impl ProducerHandle for MockProducerHandle {
  async fn connect(&mut self) -> Result<(), BrokerError> {
    self.state.record_call("connect");
    if lock(&self.state.behavior).fail_connect {
      return Err(BrokerError::Connection("mock connect refused".to_string()));
    }
    let _ = self.event_tx.send(BrokerEvent::Connected);
    Ok(())
  }

  async fn disconnect(&mut self) -> Result<(), BrokerError> {
    self.state.record_call("disconnect");
    if lock(&self.state.behavior).fail_disconnect {
      return Err(BrokerError::Connection("mock disconnect refused".to_string()));
    }
    Ok(())
  }

  fn events(&mut self) -> EventStream {
    subscribe_events(&self.event_tx)
  }

  async fn send(&mut self, request: SendRequest) -> Result<(), BrokerError> {
    self.state.record_call("send");
    if lock(&self.state.behavior).fail_send {
      return Err(BrokerError::Rejected("mock send refused".to_string()));
    }
    lock(&self.state.sent).push(request);
    Ok(())
  }
}

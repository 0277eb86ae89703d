//! Broker configuration surface and the external client collaborator contract.
//!
//! The actual wire client is not implemented here. Nodes consume exactly the
//! operations and events declared by [`BrokerClient`] and its handles; retry,
//! partitioning and security internals stay behind the collaborator. A
//! channel-backed implementation for tests lives in [`crate::testing`].

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;

use crate::error::{BrokerError, ConfigError, SelectorError};
use crate::lifecycle::BrokerEvent;
use crate::record::{RawRecord, SendRequest};

/// Stream of connectivity events raised by a broker client handle.
pub type EventStream = Pin<Box<dyn Stream<Item = BrokerEvent> + Send>>;

/// Stream of raw records delivered by a running consumer handle.
pub type RecordStream = Pin<Box<dyn Stream<Item = RawRecord> + Send>>;

/// Verbosity forwarded to the underlying client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  /// Suppress client library logging entirely.
  None,
  /// Errors only.
  Error,
  /// Warnings and errors.
  Warn,
  /// Informational and above.
  #[default]
  Info,
  /// Full debug output.
  Debug,
}

/// How many broker replicas must confirm a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckLevel {
  /// All in-sync replicas.
  #[default]
  All,
  /// No acknowledgment.
  None,
  /// The partition leader only.
  Leader,
}

impl AckLevel {
  /// Wire value understood by Kafka-style brokers.
  pub const fn wire_value(self) -> i32 {
    match self {
      AckLevel::All => -1,
      AckLevel::None => 0,
      AckLevel::Leader => 1,
    }
  }
}

impl FromStr for AckLevel {
  type Err = SelectorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "all" => Ok(AckLevel::All),
      "none" => Ok(AckLevel::None),
      "leader" => Ok(AckLevel::Leader),
      other => Err(SelectorError {
        what: "acknowledge",
        value: other.to_string(),
      }),
    }
  }
}

impl fmt::Display for AckLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AckLevel::All => write!(f, "all"),
      AckLevel::None => write!(f, "none"),
      AckLevel::Leader => write!(f, "leader"),
    }
  }
}

/// Retry tuning forwarded to the client library when advanced retry is on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  /// Upper bound for a single retry delay, in milliseconds.
  pub max_retry_time_ms: u64,
  /// Initial retry delay, in milliseconds.
  pub initial_retry_time_ms: u64,
  /// Randomization factor applied to each delay.
  pub factor: f64,
  /// Exponential multiplier between attempts.
  pub multiplier: u32,
  /// Maximum number of attempts.
  pub retries: u32,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retry_time_ms: 30_000,
      initial_retry_time_ms: 300,
      factor: 0.2,
      multiplier: 2,
      retries: 5,
    }
  }
}

/// Authentication mode for the broker connection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum BrokerAuth {
  /// No authentication.
  #[default]
  None,
  /// Mutual TLS with certificate and key files.
  Tls {
    /// Path to the CA certificate.
    ca_cert: PathBuf,
    /// Path to the client certificate.
    client_cert: PathBuf,
    /// Path to the client private key.
    private_key: PathBuf,
    /// Optional private key passphrase.
    #[serde(default)]
    passphrase: Option<String>,
  },
  /// SASL with a mechanism and credentials.
  Sasl {
    /// SASL mechanism, e.g. "plain" or "scram-sha-256".
    #[serde(default = "default_sasl_mechanism")]
    mechanism: String,
    /// SASL username.
    username: String,
    /// SASL password.
    password: String,
    /// Whether to wrap the connection in TLS.
    #[serde(default)]
    ssl: bool,
  },
}

fn default_sasl_mechanism() -> String {
  "plain".to_string()
}

/// Shared broker connection configuration, one per broker entity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
  /// Endpoint list, separated by commas and/or whitespace.
  pub brokers: String,
  /// Client identifier reported to the broker.
  pub client_id: String,
  /// Client library log verbosity.
  pub log_level: LogLevel,
  /// Connection establishment timeout in milliseconds.
  pub connection_timeout_ms: u64,
  /// Request timeout in milliseconds.
  pub request_timeout_ms: u64,
  /// Enables the advanced retry block.
  pub advanced_retry: bool,
  /// Retry tuning, applied only when `advanced_retry` is set.
  pub retry: RetryConfig,
  /// Authentication mode and credentials.
  pub auth: BrokerAuth,
  /// Suppresses the client library's default-partitioner warning. Passed at
  /// construction instead of mutating process-wide environment.
  pub suppress_partitioner_warning: bool,
}

impl Default for BrokerConfig {
  fn default() -> Self {
    Self {
      brokers: "localhost:9092".to_string(),
      client_id: "kafkaweave".to_string(),
      log_level: LogLevel::default(),
      connection_timeout_ms: 1_000,
      request_timeout_ms: 30_000,
      advanced_retry: false,
      retry: RetryConfig::default(),
      auth: BrokerAuth::None,
      suppress_partitioner_warning: true,
    }
  }
}

impl BrokerConfig {
  /// Splits the endpoint list on any run of commas and whitespace.
  ///
  /// Splitting on the general pattern keeps multi-space lists intact instead
  /// of corrupting the first entry the way a single-space replacement would.
  pub fn endpoints(&self) -> Vec<String> {
    self
      .brokers
      .split(|c: char| c == ',' || c.is_whitespace())
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .collect()
  }

  /// Resolves the configuration into options for the client library,
  /// loading credential files for TLS authentication.
  ///
  /// # Errors
  ///
  /// Returns a [`ConfigError`] when a credential file cannot be read.
  pub fn client_options(&self) -> Result<ClientOptions, ConfigError> {
    let auth = match &self.auth {
      BrokerAuth::None => ResolvedAuth::None,
      BrokerAuth::Tls {
        ca_cert,
        client_cert,
        private_key,
        passphrase,
      } => ResolvedAuth::Tls {
        ca: read_credential(ca_cert)?,
        cert: read_credential(client_cert)?,
        key: read_credential(private_key)?,
        passphrase: passphrase.clone(),
      },
      BrokerAuth::Sasl {
        mechanism,
        username,
        password,
        ssl,
      } => ResolvedAuth::Sasl {
        mechanism: mechanism.clone(),
        username: username.clone(),
        password: password.clone(),
        ssl: *ssl,
      },
    };

    Ok(ClientOptions {
      endpoints: self.endpoints(),
      client_id: self.client_id.clone(),
      log_level: self.log_level,
      connection_timeout_ms: self.connection_timeout_ms,
      request_timeout_ms: self.request_timeout_ms,
      retry: self.advanced_retry.then(|| self.retry.clone()),
      auth,
      suppress_partitioner_warning: self.suppress_partitioner_warning,
    })
  }
}

fn read_credential(path: &Path) -> Result<String, ConfigError> {
  std::fs::read_to_string(path).map_err(|source| ConfigError::CredentialIo {
    path: path.display().to_string(),
    source,
  })
}

/// Fully resolved options handed to the broker client at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
  /// Broker endpoints.
  pub endpoints: Vec<String>,
  /// Client identifier.
  pub client_id: String,
  /// Client library log verbosity.
  pub log_level: LogLevel,
  /// Connection establishment timeout in milliseconds.
  pub connection_timeout_ms: u64,
  /// Request timeout in milliseconds.
  pub request_timeout_ms: u64,
  /// Retry tuning, present only when advanced retry was enabled.
  pub retry: Option<RetryConfig>,
  /// Resolved authentication material.
  pub auth: ResolvedAuth,
  /// Suppresses the client library's default-partitioner warning.
  pub suppress_partitioner_warning: bool,
}

impl Default for ClientOptions {
  fn default() -> Self {
    Self {
      endpoints: vec!["localhost:9092".to_string()],
      client_id: "kafkaweave".to_string(),
      log_level: LogLevel::default(),
      connection_timeout_ms: 1_000,
      request_timeout_ms: 30_000,
      retry: None,
      auth: ResolvedAuth::None,
      suppress_partitioner_warning: true,
    }
  }
}

/// Authentication material with credential files already loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResolvedAuth {
  /// No authentication.
  #[default]
  None,
  /// Mutual TLS material.
  Tls {
    /// CA certificate contents.
    ca: String,
    /// Client certificate contents.
    cert: String,
    /// Client private key contents.
    key: String,
    /// Optional private key passphrase.
    passphrase: Option<String>,
  },
  /// SASL credentials.
  Sasl {
    /// SASL mechanism.
    mechanism: String,
    /// SASL username.
    username: String,
    /// SASL password.
    password: String,
    /// Whether the connection is TLS-wrapped.
    ssl: bool,
  },
}

/// Options for creating a consumer handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsumerOptions {
  /// Consumer group id.
  pub group_id: String,
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
}

/// Options for a topic subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscribeOptions {
  /// Topic to subscribe to.
  pub topic: String,
  /// Whether to start from the earliest offset.
  pub from_beginning: Option<bool>,
}

/// Options for the message consumption loop.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunOptions {
  /// Auto-commit interval in milliseconds.
  pub auto_commit_interval_ms: Option<u64>,
  /// Auto-commit after this many resolved messages.
  pub auto_commit_threshold: Option<u32>,
}

/// The shared broker client collaborator.
///
/// One instance per broker configuration entity, shared read-only as a
/// connection factory by every node referencing it. The handles it creates
/// are exclusively owned, one per node.
pub trait BrokerClient: Send + Sync {
  /// The options this client was constructed with.
  fn options(&self) -> &ClientOptions;

  /// Creates an exclusively owned consumer handle.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the client cannot create the handle.
  fn consumer(&self, options: ConsumerOptions) -> Result<Box<dyn ConsumerHandle>, BrokerError>;

  /// Creates an exclusively owned producer handle.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the client cannot create the handle.
  fn producer(&self) -> Result<Box<dyn ProducerHandle>, BrokerError>;
}

/// Exclusively owned consumer-side connection handle.
#[async_trait]
pub trait ConsumerHandle: Send {
  /// Establishes the connection.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the connection cannot be established.
  async fn connect(&mut self) -> Result<(), BrokerError>;

  /// Tears the connection down, draining outstanding operations first.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when teardown fails.
  async fn disconnect(&mut self) -> Result<(), BrokerError>;

  /// Subscribes to a topic.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the subscription is rejected.
  async fn subscribe(&mut self, options: SubscribeOptions) -> Result<(), BrokerError>;

  /// Subscribes to connectivity events. The subscription is registered at
  /// call time; events raised before the call are not replayed.
  fn events(&mut self) -> EventStream;

  /// Starts the consumption loop, yielding raw records in delivery order.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the loop cannot be started.
  fn run(&mut self, options: RunOptions) -> Result<RecordStream, BrokerError>;
}

/// Exclusively owned producer-side connection handle.
#[async_trait]
pub trait ProducerHandle: Send {
  /// Establishes the connection.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the connection cannot be established.
  async fn connect(&mut self) -> Result<(), BrokerError>;

  /// Tears the connection down, draining outstanding sends first.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when teardown fails.
  async fn disconnect(&mut self) -> Result<(), BrokerError>;

  /// Subscribes to connectivity events. The subscription is registered at
  /// call time; events raised before the call are not replayed.
  fn events(&mut self) -> EventStream;

  /// Appends the request's messages to the broker.
  ///
  /// # Errors
  ///
  /// Returns a [`BrokerError`] when the write is rejected or times out.
  async fn send(&mut self, request: SendRequest) -> Result<(), BrokerError>;
}

//! # KafkaWeave
//!
//! Connector core for wiring a flow-based automation host to Apache-Kafka
//! style brokers.
//!
//! The crate provides the pieces with real engineering content behind a
//! broker integration, leaving the wire protocol to an external client
//! collaborator:
//!
//! - **Typed codec**: bidirectional conversion between opaque byte buffers
//!   and a fixed catalog of semantic value types (JSON, text, booleans,
//!   fixed-width integers and floats in both byte orders).
//! - **Connection lifecycle**: the state machine every producer and consumer
//!   node owns, translating asynchronous collaborator events into states and
//!   operator-visible status updates.
//! - **Message adapters**: inbound raw-record normalization and outbound
//!   send-request resolution with static-override precedence.
//! - **Nodes**: producer and consumer orchestration over the
//!   [`broker::BrokerClient`] collaborator contract, with success and failure
//!   records delivered on separate channels.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kafkaweave::consumer::{ConsumerConfig, ConsumerNode};
//! use kafkaweave::testing::MockBroker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Arc::new(MockBroker::new());
//! let config = ConsumerConfig {
//!   topic: "readings".to_string(),
//!   ..ConsumerConfig::default()
//! };
//! let mut node = ConsumerNode::new(config, Some(broker));
//! let mut records = node.records().expect("records channel");
//! node.init().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Broker configuration surface and the client collaborator contract.
pub mod broker;
/// Bidirectional typed binary codec for keys and values.
pub mod codec;
/// Consumer node orchestration.
pub mod consumer;
/// Error taxonomy.
pub mod error;
/// Inbound record adaptation.
pub mod inbound;
/// Connection lifecycle state machine.
pub mod lifecycle;
/// Outbound record adaptation.
pub mod outbound;
/// Producer node orchestration.
pub mod producer;
/// Record shapes at the node boundaries.
pub mod record;
/// Operator-visible status indications.
pub mod status;
/// Mock broker client for tests.
pub mod testing;

pub use broker::{AckLevel, BrokerClient, BrokerConfig, LogLevel};
pub use codec::{ByteOrder, TypedValue, ValueType};
pub use lifecycle::{BrokerEvent, ConnectionState};
pub use record::{FlowRecord, OutboundRecord, RawRecord};
pub use status::{StatusFill, StatusShape, StatusUpdate};

#[cfg(test)]
mod consumer_test;
#[cfg(test)]
mod producer_test;

//! Record shapes exchanged at the node boundaries.
//!
//! Four shapes exist: the raw record as delivered by the broker client, the
//! normalized record handed to a flow, the outbound record a flow submits,
//! and the send request handed back to the broker client. Records are
//! produced fresh per message and not retained after delivery.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

use crate::broker::AckLevel;
use crate::codec::TypedValue;

/// A record as received from the broker client, before adaptation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
  /// Topic the record was read from.
  pub topic: String,
  /// Partition the record was read from.
  pub partition: i32,
  /// Raw key bytes, if the record carried a key.
  pub key: Option<Bytes>,
  /// Raw value bytes, if the record carried a value.
  pub value: Option<Bytes>,
  /// Header byte-map as delivered by the broker.
  pub headers: HashMap<String, Bytes>,
}

/// Decoded payload of a normalized inbound record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordPayload {
  /// Decoded key, or raw bytes when no conversion applied.
  pub key: Option<TypedValue>,
  /// Decoded value, or raw bytes when no conversion applied.
  pub value: Option<TypedValue>,
  /// String headers. `None` means the broker record carried no headers at
  /// all, which is distinguishable from an explicitly empty mapping.
  pub headers: Option<HashMap<String, String>>,
}

/// A normalized record delivered to the flow by a consumer node.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
  /// Topic the record was read from.
  pub topic: String,
  /// Partition the record was read from.
  pub partition: i32,
  /// Decoded payload.
  pub payload: RecordPayload,
}

/// A record submitted to a producer node by the flow.
///
/// All routing fields are optional; static node configuration takes
/// precedence over them when set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutboundRecord {
  /// Target topic, unless the node configuration provides one.
  pub topic: Option<String>,
  /// Target partition, unless the node configuration provides one.
  pub partition: Option<i32>,
  /// Record key, unless the node configuration provides one.
  pub key: Option<TypedValue>,
  /// Record headers, used when the node configuration has none.
  pub headers: HashMap<String, String>,
  /// Record payload. A record without a payload produces no send request.
  pub payload: Option<TypedValue>,
}

/// One message within a send request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
  /// Encoded key.
  pub key: Option<TypedValue>,
  /// Explicit partition, if any.
  pub partition: Option<i32>,
  /// String headers.
  pub headers: HashMap<String, String>,
  /// Encoded value.
  pub value: TypedValue,
}

/// A fully resolved request handed to the broker client for sending.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
  /// Resolved target topic.
  pub topic: String,
  /// Acknowledgment level for the write.
  pub acks: AckLevel,
  /// Per-request response timeout in milliseconds.
  pub timeout_ms: Option<u64>,
  /// The messages to append.
  pub messages: Vec<OutboundMessage>,
}

/// A failed record: the original record plus the failure description.
///
/// Error records travel on a channel distinct from successful records so a
/// flow can route and inspect failures without stopping the node.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord<R> {
  /// The record that failed.
  pub record: R,
  /// Human-readable failure description.
  pub error: String,
  /// When the failure was observed.
  pub at: DateTime<Utc>,
}

impl<R> ErrorRecord<R> {
  /// Wraps a record with its failure description.
  pub fn new(record: R, error: impl fmt::Display) -> Self {
    Self {
      record,
      error: error.to_string(),
      at: Utc::now(),
    }
  }
}

//! Adapts flow records into broker send requests.

use std::collections::HashMap;

use crate::broker::AckLevel;
use crate::codec::{self, TypedValue, ValueType};
use crate::error::{AdaptError, ValidationError};
use crate::record::{OutboundMessage, OutboundRecord, SendRequest};

/// Static per-node send configuration.
///
/// Every field set here takes precedence over the corresponding field on an
/// incoming record.
#[derive(Debug, Clone, Default)]
pub struct SendDefaults {
  /// Static target topic.
  pub topic: Option<String>,
  /// Static target partition.
  pub partition: Option<i32>,
  /// Static record key.
  pub key: Option<TypedValue>,
  /// Static headers; used instead of record headers when non-empty.
  pub headers: HashMap<String, String>,
  /// Acknowledgment level for every send.
  pub acks: AckLevel,
  /// Response timeout in milliseconds.
  pub response_timeout_ms: Option<u64>,
}

/// Producer-side adapter resolving and encoding outbound records.
#[derive(Debug, Clone)]
pub struct OutboundMessageAdapter {
  key_type: ValueType,
  value_type: ValueType,
  defaults: SendDefaults,
}

impl OutboundMessageAdapter {
  /// Creates an adapter with the configured source types and static
  /// overrides.
  pub fn new(key_type: ValueType, value_type: ValueType, defaults: SendDefaults) -> Self {
    Self {
      key_type,
      value_type,
      defaults,
    }
  }

  /// Resolves one outbound record into a send request.
  ///
  /// Static configuration wins over per-record fields for key, topic,
  /// partition and headers. A record without a payload produces `Ok(None)` —
  /// the required short-circuit, not an error.
  ///
  /// # Errors
  ///
  /// Returns [`ValidationError::MissingTopic`] wrapped in [`AdaptError`] when
  /// no topic resolves from either source, or a conversion failure when the
  /// key or value cannot be encoded as the configured type.
  pub fn adapt(&self, record: OutboundRecord) -> Result<Option<SendRequest>, AdaptError> {
    let Some(payload) = record.payload else {
      return Ok(None);
    };

    let key = match self.defaults.key.clone().or(record.key) {
      Some(key) => Some(codec::encode(key, self.key_type)?),
      None => None,
    };
    let value = codec::encode(payload, self.value_type)?;

    let topic = self
      .defaults
      .topic
      .clone()
      .or(record.topic)
      .ok_or(ValidationError::MissingTopic)?;
    let partition = self.defaults.partition.or(record.partition);
    let headers = if self.defaults.headers.is_empty() {
      record.headers
    } else {
      self.defaults.headers.clone()
    };

    Ok(Some(SendRequest {
      topic,
      acks: self.defaults.acks,
      timeout_ms: self.defaults.response_timeout_ms,
      messages: vec![OutboundMessage {
        key,
        partition,
        headers,
        value,
      }],
    }))
  }
}

//! Adapts raw broker records into normalized flow records.

use std::collections::HashMap;

use crate::codec::{self, TypedValue, ValueType};
use crate::error::ConversionError;
use crate::record::{FlowRecord, RawRecord, RecordPayload};

/// Consumer-side adapter applying the codec to each delivered record.
///
/// Key and value are decoded leniently: a buffer that cannot be converted to
/// the configured target type passes through as raw bytes rather than failing
/// the record. Header values are decoded strictly as UTF-8; a record with an
/// undecodable header is reported as a processing error and left to the
/// caller's discretion — the adapter never retries.
#[derive(Debug, Clone)]
pub struct InboundMessageAdapter {
  key_type: ValueType,
  value_type: ValueType,
}

impl InboundMessageAdapter {
  /// Creates an adapter with the configured key and value target types.
  pub fn new(key_type: ValueType, value_type: ValueType) -> Self {
    Self { key_type, value_type }
  }

  /// Normalizes one raw record.
  ///
  /// Topic and partition are copied verbatim. A record with no headers at
  /// all yields `headers: None`, distinguishable from an explicitly empty
  /// mapping at the output boundary.
  ///
  /// # Errors
  ///
  /// Returns a [`ConversionError`] when a header value is not valid UTF-8.
  pub fn adapt(&self, raw: RawRecord) -> Result<FlowRecord, ConversionError> {
    let key = raw
      .key
      .map(|bytes| codec::decode_lenient(TypedValue::Bytes(bytes), self.key_type));
    let value = raw
      .value
      .map(|bytes| codec::decode_lenient(TypedValue::Bytes(bytes), self.value_type));

    let headers = if raw.headers.is_empty() {
      None
    } else {
      let mut decoded = HashMap::with_capacity(raw.headers.len());
      for (name, bytes) in raw.headers {
        decoded.insert(name, String::from_utf8(bytes.to_vec())?);
      }
      Some(decoded)
    };

    Ok(FlowRecord {
      topic: raw.topic,
      partition: raw.partition,
      payload: RecordPayload { key, value, headers },
    })
  }
}

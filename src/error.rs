//! Error taxonomy for the connector core.
//!
//! Per-message failures (conversion, validation, send rejection) surface as
//! error records on a dedicated channel and never tear down a node. Node-level
//! failures (initialization, shutdown) are returned to the caller driving the
//! node lifecycle.

use thiserror::Error;

use crate::codec::ValueType;

/// A typed payload conversion failed.
///
/// The lenient codec entry points recover from this locally by passing the
/// original buffer through unchanged; the strict entry points propagate it.
#[derive(Error, Debug)]
pub enum ConversionError {
  /// The buffer length does not match the fixed width of the target type.
  #[error("buffer of {actual} byte(s) does not match the {expected}-byte width of {ty}")]
  WidthMismatch {
    /// The requested target type.
    ty: ValueType,
    /// The width the target type requires.
    expected: usize,
    /// The length of the buffer that was offered.
    actual: usize,
  },

  /// The payload is not valid UTF-8 text.
  #[error("payload is not valid UTF-8: {0}")]
  InvalidUtf8(#[from] std::string::FromUtf8Error),

  /// JSON parsing or serialization failed.
  #[error("JSON conversion failed: {0}")]
  Json(#[from] serde_json::Error),

  /// A numeric value does not fit in the fixed width of the target type.
  #[error("value {value} cannot be represented as {ty}")]
  OutOfRange {
    /// The requested target type.
    ty: ValueType,
    /// The offending value, stringified for reporting.
    value: String,
  },

  /// The value's variant cannot be converted to the target type at all.
  #[error("a {actual} value cannot be encoded as {ty}")]
  Incompatible {
    /// The requested target type.
    ty: ValueType,
    /// The variant of the offered value.
    actual: &'static str,
  },
}

/// An outbound record could not be resolved into a valid send request.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
  /// Neither the node configuration nor the incoming record carried a topic.
  #[error("no topic resolved from node configuration or the incoming record")]
  MissingTopic,
}

/// Failure reported while adapting an outbound record.
#[derive(Error, Debug)]
pub enum AdaptError {
  /// The record failed structural validation.
  #[error(transparent)]
  Validation(#[from] ValidationError),

  /// Key or value encoding failed.
  #[error(transparent)]
  Conversion(#[from] ConversionError),
}

/// Failure reported by the broker client collaborator.
#[derive(Error, Debug)]
pub enum BrokerError {
  /// The connection could not be established or was lost.
  #[error("connection failure: {0}")]
  Connection(String),

  /// A request did not complete within the configured timeout.
  #[error("request timed out")]
  Timeout,

  /// The broker rejected an otherwise well-formed request.
  #[error("broker rejected the request: {0}")]
  Rejected(String),
}

/// A node failed to complete its asynchronous initialization sequence.
///
/// The node transitions to the `Failed` state and does not retry on its own.
#[derive(Error, Debug)]
#[error("initialization failed during {phase}: {source}")]
pub struct InitError {
  /// Which initialization step failed.
  pub phase: &'static str,
  /// The underlying collaborator failure.
  #[source]
  pub source: BrokerError,
}

/// Disconnecting from the broker failed while closing a node.
#[derive(Error, Debug)]
#[error("disconnect failed during shutdown: {0}")]
pub struct ShutdownError(#[source] pub BrokerError);

/// A configuration selector string was not recognized.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unrecognized {what} selector '{value}'")]
pub struct SelectorError {
  /// What kind of selector was being parsed.
  pub what: &'static str,
  /// The rejected input.
  pub value: String,
}

/// Broker configuration could not be resolved into client options.
#[derive(Error, Debug)]
pub enum ConfigError {
  /// A TLS credential file could not be read.
  #[error("failed to read credential file '{path}': {source}")]
  CredentialIo {
    /// The path that failed to load.
    path: String,
    /// The underlying I/O error.
    #[source]
    source: std::io::Error,
  },
}

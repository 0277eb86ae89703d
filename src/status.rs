//! Operator-visible status indications.
//!
//! Every node exposes a tri-color status with a short text, mirrored from its
//! connection lifecycle and message activity. Status updates are pushed on a
//! channel so the host can render them without polling.

/// Indicator color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFill {
  /// Terminal or idle.
  Grey,
  /// Error or offline.
  Red,
  /// Connected or delivering.
  Green,
  /// Initializing.
  Yellow,
  /// Operation in flight.
  Blue,
}

/// Indicator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusShape {
  /// Steady condition.
  Ring,
  /// Momentary activity.
  Dot,
}

/// One status notification: indicator plus a short human-readable annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
  /// Indicator color.
  pub fill: StatusFill,
  /// Indicator shape.
  pub shape: StatusShape,
  /// Short annotation, e.g. "Ready" or "Message received".
  pub text: String,
}

impl StatusUpdate {
  /// Creates a status update.
  pub fn new(fill: StatusFill, shape: StatusShape, text: impl Into<String>) -> Self {
    Self {
      fill,
      shape,
      text: text.into(),
    }
  }
}

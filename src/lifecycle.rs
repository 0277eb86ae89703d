//! Connection lifecycle state machine shared by producer and consumer nodes.
//!
//! Each logical client owns one [`ConnectionLifecycle`]. The machine performs
//! no I/O: it records transitions driven by collaborator events and emits one
//! status notification per transition on an unbounded channel. Events that do
//! not define a transition from the current state are logged at debug and
//! otherwise ignored — no state change happens silently.
//!
//! State graph:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready <-> Offline
//!       any non-terminal state  -> Failed        (timeout / init error)
//!       any non-Disconnected    -> Disconnected  (close completed)
//! ```
//!
//! `Disconnected` and `Failed` are terminal for event-driven transitions; a
//! deliberate close still drains `Failed` into `Disconnected`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::status::{StatusFill, StatusShape, StatusUpdate};

/// Connectivity state of a logical broker client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  /// Created, connect sequence not yet started.
  Uninitialized,
  /// Connect sequence in progress.
  Initializing,
  /// Connected and operational.
  Ready,
  /// Connection lost; the collaborator may recover it.
  Offline,
  /// Deliberately closed. Terminal.
  Disconnected,
  /// Timed out or failed during initialization. Terminal for events.
  Failed,
}

impl ConnectionState {
  /// Returns true for states that accept no further event-driven transitions.
  pub const fn is_terminal(self) -> bool {
    matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
  }
}

/// Asynchronous connectivity event raised by the broker client collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerEvent {
  /// The underlying connection was established or re-established.
  Connected,
  /// The underlying connection was lost.
  Disconnected,
  /// A request exceeded the configured timeout.
  RequestTimeout,
}

/// Lifecycle state machine instance owned by a single node.
#[derive(Debug)]
pub struct ConnectionLifecycle {
  component: String,
  state: ConnectionState,
  status_tx: mpsc::UnboundedSender<StatusUpdate>,
}

/// A lifecycle shared between a node and its spawned event pump.
pub(crate) type SharedLifecycle = Arc<Mutex<ConnectionLifecycle>>;

/// Locks a shared lifecycle, recovering the guard if a holder panicked.
pub(crate) fn lock_lifecycle(shared: &SharedLifecycle) -> MutexGuard<'_, ConnectionLifecycle> {
  shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionLifecycle {
  /// Creates a machine in `Uninitialized` plus the receiving end of its
  /// status channel.
  pub fn new(component: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<StatusUpdate>) {
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    (
      Self {
        component: component.into(),
        state: ConnectionState::Uninitialized,
        status_tx,
      },
      status_rx,
    )
  }

  /// Current state.
  pub fn state(&self) -> ConnectionState {
    self.state
  }

  /// Pushes a node-driven status update (message activity, missing broker)
  /// on the same channel as transition notifications.
  pub fn announce(&self, update: StatusUpdate) {
    let _ = self.status_tx.send(update);
  }

  /// Marks the start of the connect sequence.
  pub fn begin_initializing(&mut self) {
    if self.state == ConnectionState::Uninitialized {
      self.transition(
        ConnectionState::Initializing,
        StatusFill::Yellow,
        StatusShape::Ring,
        "Initializing",
      );
    } else {
      debug!(
        component = %self.component,
        state = ?self.state,
        "init requested outside Uninitialized, ignoring"
      );
    }
  }

  /// Applies a collaborator event to the machine.
  pub fn apply(&mut self, event: BrokerEvent) {
    if self.state.is_terminal() {
      debug!(
        component = %self.component,
        state = ?self.state,
        event = ?event,
        "event ignored in terminal state"
      );
      return;
    }

    match event {
      BrokerEvent::Connected => match self.state {
        ConnectionState::Initializing | ConnectionState::Offline => {
          self.transition(ConnectionState::Ready, StatusFill::Green, StatusShape::Ring, "Ready");
        }
        _ => debug!(
          component = %self.component,
          state = ?self.state,
          "connected event without a pending transition"
        ),
      },
      BrokerEvent::Disconnected => match self.state {
        ConnectionState::Ready => {
          self.transition(ConnectionState::Offline, StatusFill::Red, StatusShape::Ring, "Offline");
        }
        _ => debug!(
          component = %self.component,
          state = ?self.state,
          "disconnected event without a pending transition"
        ),
      },
      BrokerEvent::RequestTimeout => {
        error!(component = %self.component, "broker request timed out");
        self.transition(ConnectionState::Failed, StatusFill::Red, StatusShape::Ring, "Timeout");
      }
    }
  }

  /// Records an unrecoverable failure that escaped initialization.
  pub fn fail(&mut self, text: &str) {
    if self.state == ConnectionState::Disconnected {
      debug!(component = %self.component, "failure reported after close, ignoring");
      return;
    }
    self.transition(ConnectionState::Failed, StatusFill::Red, StatusShape::Ring, text);
  }

  /// Records completion of a deliberate close. Terminal.
  pub fn complete_close(&mut self) {
    if self.state == ConnectionState::Disconnected {
      debug!(component = %self.component, "close completed twice, ignoring");
      return;
    }
    self.transition(
      ConnectionState::Disconnected,
      StatusFill::Grey,
      StatusShape::Ring,
      "Disconnected",
    );
  }

  fn transition(&mut self, next: ConnectionState, fill: StatusFill, shape: StatusShape, text: &str) {
    debug!(
      component = %self.component,
      from = ?self.state,
      to = ?next,
      "connection state changed"
    );
    self.state = next;
    self.announce(StatusUpdate::new(fill, shape, text));
  }
}

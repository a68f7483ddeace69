use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

/// Identifies one event on the dispatcher, such as a transport server
/// announcing its shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalId(Cow<'static, str>);

/// Published by the framework once the HTTP server stops accepting
/// connections.
pub const ON_HTTP_SERVER_SHUTDOWN: SignalId = SignalId::from_static("http.server.shutdown");

/// Published by the framework once the gRPC server stops accepting
/// connections.
pub const ON_GRPC_SERVER_SHUTDOWN: SignalId = SignalId::from_static("grpc.server.shutdown");

impl SignalId {
  /// Builds an identifier from a static name without allocating.
  pub const fn from_static(name: &'static str) -> Self {
    Self(Cow::Borrowed(name))
  }

  pub fn new(name: impl Into<String>) -> Self {
    Self(Cow::Owned(name.into()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SignalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&'static str> for SignalId {
  fn from(name: &'static str) -> Self {
    Self::from_static(name)
  }
}

/// The payload published alongside a signal.
pub type SignalPayload = dyn Any + Send + Sync;

/// A handler registered for one signal, invoked on every publication.
pub type SignalHandler = Box<dyn Fn(&SignalPayload) + Send + Sync + 'static>;

/// The event-bus boundary the pool consumes.
///
/// The pool only ever subscribes; publishing stays with the application and
/// its transports.
pub trait Dispatcher: Send + Sync {
  /// Registers `handler` to run on every publication of `signal`.
  fn subscribe(&self, signal: SignalId, handler: SignalHandler);
}

/// In-process dispatcher that invokes handlers synchronously on the
/// publishing thread.
#[derive(Default)]
pub struct SyncDispatcher {
  handlers: RwLock<HashMap<SignalId, Vec<Arc<dyn Fn(&SignalPayload) + Send + Sync + 'static>>>>,
}

impl SyncDispatcher {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publishes `payload` under `signal`, invoking every subscribed handler
  /// before returning.
  ///
  /// The handler list is snapshotted first, so a handler may subscribe
  /// reentrantly without deadlocking on the registry lock.
  pub fn publish(&self, signal: &SignalId, payload: &SignalPayload) {
    let snapshot = {
      let handlers = self.handlers.read();
      handlers.get(signal).cloned().unwrap_or_default()
    };
    trace!(signal = %signal, handler_count = snapshot.len(), "Publishing signal.");
    for handler in snapshot {
      handler(payload);
    }
  }
}

impl Dispatcher for SyncDispatcher {
  fn subscribe(&self, signal: SignalId, handler: SignalHandler) {
    let mut handlers = self.handlers.write();
    let list = handlers.entry(signal.clone()).or_default();
    list.push(Arc::from(handler));
    debug!(signal = %signal, handler_count = list.len(), "Subscribed handler to signal.");
  }
}

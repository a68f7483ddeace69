use crate::dispatcher::{Dispatcher, SignalId};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures_intrusive::sync::ManualResetEvent;
use tracing::{debug, info};

/// Counts down the configured shutdown signals and opens once every
/// distinct one has fired at least once.
///
/// The gate is one-shot: once open it stays open. With zero configured
/// signals it starts open. Duplicate publications of the same signal are
/// counted once; a per-signal latch keeps repeats from decrementing the
/// counter below zero.
#[derive(Clone)]
pub struct ShutdownGate {
  inner: Arc<GateInner>,
}

struct GateInner {
  pool_name: Arc<String>,
  remaining: AtomicUsize,
  opened: ManualResetEvent,
}

impl ShutdownGate {
  /// Registers one counting handler per signal on `dispatcher` and returns
  /// the gate. Signals that fire before anyone waits still count.
  ///
  /// `signals` must already be distinct; the pool builder deduplicates.
  pub(crate) fn subscribe(pool_name: Arc<String>, dispatcher: &dyn Dispatcher, signals: &[SignalId]) -> Self {
    let inner = Arc::new(GateInner {
      pool_name,
      remaining: AtomicUsize::new(signals.len()),
      opened: ManualResetEvent::new(signals.is_empty()),
    });

    for signal in signals {
      let gate = inner.clone();
      let signal_name = signal.clone();
      let fired = AtomicBool::new(false);
      dispatcher.subscribe(
        signal.clone(),
        Box::new(move |_payload| {
          if fired.swap(true, AtomicOrdering::AcqRel) {
            debug!(pool_name = %*gate.pool_name, signal = %signal_name, "Shutdown signal fired again; already counted.");
            return;
          }
          let previous = gate.remaining.fetch_sub(1, AtomicOrdering::AcqRel);
          debug!(
            pool_name = %*gate.pool_name,
            signal = %signal_name,
            remaining = previous - 1,
            "Shutdown signal received."
          );
          if previous == 1 {
            info!(pool_name = %*gate.pool_name, "All shutdown signals received. Gate is open.");
            gate.opened.set();
          }
        }),
      );
    }

    Self { inner }
  }

  /// Resolves once every configured signal has fired. Resolves immediately
  /// if the gate is already open.
  pub async fn opened(&self) {
    self.inner.opened.wait().await;
  }

  /// Whether every configured signal has fired.
  pub fn is_open(&self) -> bool {
    self.inner.opened.is_set()
  }

  /// Number of distinct signals still outstanding.
  pub fn remaining(&self) -> usize {
    self.inner.remaining.load(AtomicOrdering::Acquire)
  }
}

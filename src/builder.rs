use crate::dispatcher::{Dispatcher, SignalId, ON_GRPC_SERVER_SHUTDOWN, ON_HTTP_SERVER_SHUTDOWN};
use crate::error::PoolError;
use crate::pool::JobPool;

use std::sync::Arc;
use std::time::Duration;

/// Default number of workers.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default per-job execution timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configures a [`JobPool`].
///
/// Defaults: [`DEFAULT_CONCURRENCY`] workers, a [`DEFAULT_TIMEOUT`] job
/// timeout, and the pool waits for [`ON_HTTP_SERVER_SHUTDOWN`] and
/// [`ON_GRPC_SERVER_SHUTDOWN`] before an orchestrated run completes, so no
/// job dispatched from an HTTP or gRPC handler is lost to process exit.
#[derive(Debug, Clone)]
pub struct PoolBuilder {
  name: String,
  concurrency: usize,
  timeout: Duration,
  shutdown_signals: Vec<SignalId>,
}

impl Default for PoolBuilder {
  fn default() -> Self {
    Self {
      name: "default".to_string(),
      concurrency: DEFAULT_CONCURRENCY,
      timeout: DEFAULT_TIMEOUT,
      shutdown_signals: vec![ON_HTTP_SERVER_SHUTDOWN, ON_GRPC_SERVER_SHUTDOWN],
    }
  }
}

impl PoolBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Names the pool for logging.
  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Sets the number of worker tasks. Zero is rejected at build time.
  pub fn concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  /// Sets the execution timeout applied to each job's derived context.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Replaces the default shutdown signal set.
  ///
  /// The pool's orchestrated run waits for every distinct signal given
  /// here. An empty set means the gate is satisfied from the start, so an
  /// orchestrated run winds down as soon as it is started.
  pub fn shutdown_signals(mut self, signals: impl IntoIterator<Item = SignalId>) -> Self {
    self.shutdown_signals = signals.into_iter().collect();
    self
  }

  /// Validates the configuration, subscribes the shutdown gate on
  /// `dispatcher` and builds the pool.
  ///
  /// Signals listed more than once count once. Subscription happens here,
  /// at build time, so signals fired before the pool is orchestrated still
  /// reach the gate.
  ///
  /// # Errors
  /// Returns [`PoolError::ZeroConcurrency`] if the worker count is zero.
  pub fn build(self, dispatcher: &dyn Dispatcher) -> Result<Arc<JobPool>, PoolError> {
    let mut distinct: Vec<SignalId> = Vec::with_capacity(self.shutdown_signals.len());
    for signal in self.shutdown_signals {
      if !distinct.contains(&signal) {
        distinct.push(signal);
      }
    }

    JobPool::build(self.name, self.concurrency, self.timeout, distinct, dispatcher)
  }
}

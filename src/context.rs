use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Read access to the type-keyed values a context carries.
pub trait ContextValues {
  /// Untyped lookup by `TypeId`. Prefer [`ContextValues::value`].
  fn value_raw(&self, key: TypeId) -> Option<&(dyn Any + Send + Sync)>;

  /// Returns the value stored under type `T`, if one was attached.
  ///
  /// An absent type is `None`, never a default.
  fn value<T: Send + Sync + 'static>(&self) -> Option<&T>
  where
    Self: Sized,
  {
    self.value_raw(TypeId::of::<T>()).and_then(|value| value.downcast_ref::<T>())
  }
}

/// Read access to the lifetime component of a context.
pub trait ContextLifetime {
  /// The instant after which this context is considered expired, if a
  /// deadline applies.
  fn deadline(&self) -> Option<Instant>;

  /// Whether this context's lifetime has already ended.
  fn is_cancelled(&self) -> bool;

  /// The token backing this context's lifetime.
  fn cancellation_token(&self) -> &CancellationToken;

  /// Resolves once the lifetime ends.
  fn cancelled(&self) -> WaitForCancellationFuture<'_> {
    self.cancellation_token().cancelled()
  }
}

/// Immutable type-keyed storage shared between a request context and every
/// execution context derived from it.
#[derive(Default)]
struct ValueMap {
  entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ValueMap {
  fn with<T: Send + Sync + 'static>(&self, value: T) -> Self {
    let mut entries = self.entries.clone();
    entries.insert(TypeId::of::<T>(), Arc::new(value));
    Self { entries }
  }

  fn get_raw(&self, key: TypeId) -> Option<&(dyn Any + Send + Sync)> {
    self.entries.get(&key).map(|value| &**value)
  }
}

/// The context a job is submitted from, typically scoped to one inbound
/// request.
///
/// Carries type-keyed values plus the request's own lifetime. Cloning is
/// cheap and shares both parts. Cancelling a request context never affects
/// jobs already dispatched from it; they run under their own derived
/// [`JobContext`].
#[derive(Clone, Default)]
pub struct RequestContext {
  values: Arc<ValueMap>,
  lifetime: CancellationToken,
}

impl RequestContext {
  /// An empty context with a fresh lifetime.
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns a new context carrying `value` under its type, sharing this
  /// context's lifetime. The original is unchanged.
  pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Self {
    Self {
      values: Arc::new(self.values.with(value)),
      lifetime: self.lifetime.clone(),
    }
  }

  /// Ends the request lifetime, typically because the originating request
  /// has finished.
  pub fn cancel(&self) {
    self.lifetime.cancel();
  }
}

impl ContextValues for RequestContext {
  fn value_raw(&self, key: TypeId) -> Option<&(dyn Any + Send + Sync)> {
    self.values.get_raw(key)
  }
}

impl ContextLifetime for RequestContext {
  fn deadline(&self) -> Option<Instant> {
    None
  }

  fn is_cancelled(&self) -> bool {
    self.lifetime.is_cancelled()
  }

  fn cancellation_token(&self) -> &CancellationToken {
    &self.lifetime
  }
}

/// Pool-owned deadline driver for one job execution.
///
/// A spawned timer cancels the token once the deadline passes. Releasing
/// the clock aborts the timer and cancels the token, so clones of the
/// execution context held past the job's return observe a terminated
/// lifetime rather than a live timer.
struct TimeoutClock {
  token: CancellationToken,
  deadline: Instant,
  timer: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutClock {
  fn start(timeout: Duration) -> Arc<Self> {
    let token = CancellationToken::new();
    let deadline = Instant::now() + timeout;
    let timer_token = token.clone();
    let timer = tokio::spawn(async move {
      tokio::time::sleep_until(deadline).await;
      timer_token.cancel();
    });
    Arc::new(Self {
      token,
      deadline,
      timer: Mutex::new(Some(timer)),
    })
  }

  fn release(&self) {
    if let Some(timer) = self.timer.lock().take() {
      timer.abort();
    }
    self.token.cancel();
  }
}

impl Drop for TimeoutClock {
  fn drop(&mut self) {
    self.release();
  }
}

/// The context a job function executes under.
///
/// Values are inherited verbatim from the submitting [`RequestContext`].
/// The lifetime is independent of the request: it ends at dispatch time
/// plus the pool's configured timeout, driven by a clock the pool owns.
/// Job functions should observe [`ContextLifetime::cancelled`] and return
/// promptly once it resolves.
#[derive(Clone)]
pub struct JobContext {
  values: Arc<ValueMap>,
  clock: Arc<TimeoutClock>,
}

impl JobContext {
  /// Derives the execution context for one job: shared values, fresh
  /// deadline starting now.
  pub(crate) fn derive(request: &RequestContext, timeout: Duration) -> Self {
    Self {
      values: request.values.clone(),
      clock: TimeoutClock::start(timeout),
    }
  }

  /// Ends this context's lifetime once the job function has returned.
  pub(crate) fn release_clock(&self) {
    self.clock.release();
  }
}

impl ContextValues for JobContext {
  fn value_raw(&self, key: TypeId) -> Option<&(dyn Any + Send + Sync)> {
    self.values.get_raw(key)
  }
}

impl ContextLifetime for JobContext {
  fn deadline(&self) -> Option<Instant> {
    Some(self.clock.deadline)
  }

  fn is_cancelled(&self) -> bool {
    self.clock.token.is_cancelled()
  }

  fn cancellation_token(&self) -> &CancellationToken {
    &self.clock.token
  }
}

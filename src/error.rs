use thiserror::Error;

/// Errors that can occur within the `dispatch_pool` library.
///
/// Submission has no error path: a job either reaches a worker or runs on
/// the submitting task. Failures inside job functions never surface here.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Pool requires a concurrency of at least 1; a zero-worker pool would block every submitter forever")]
  ZeroConcurrency,

  #[error("Pool run loop was already started; run() can only be called once per pool")]
  AlreadyStarted,
}

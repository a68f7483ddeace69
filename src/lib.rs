//! A Tokio-based bounded job pool for dispatching async work from request
//! handlers, with context inheritance, per-job timeouts and event-driven
//! graceful shutdown.
//!
//! Jobs are handed to a fixed set of workers over a rendezvous channel:
//! [`JobPool::submit`] suspends the caller until a worker is free, which
//! bounds the concurrency a flood of requests can create. Each job runs
//! under a [`JobContext`] that inherits the submitting request's values but
//! carries its own timeout, so a finished request never cancels the async
//! work it spawned. The pool's [`ShutdownGate`] keeps an orchestrated run
//! alive until every configured shutdown signal has fired, so jobs
//! dispatched by in-flight handlers are not lost at process exit.

mod builder;
mod context;
mod dispatcher;
mod error;
mod gate;
mod job;
mod pool;
mod run_group;

pub use builder::{PoolBuilder, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT};
pub use context::{ContextLifetime, ContextValues, JobContext, RequestContext};
pub use dispatcher::{
  Dispatcher, SignalHandler, SignalId, SignalPayload, SyncDispatcher, ON_GRPC_SERVER_SHUTDOWN, ON_HTTP_SERVER_SHUTDOWN,
};
pub use error::PoolError;
pub use gate::ShutdownGate;
pub use pool::JobPool;
pub use run_group::{ActorError, RunGroup};

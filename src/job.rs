use crate::context::{JobContext, RequestContext};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

/// The future a job function produces once invoked with its execution context.
pub(crate) type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A boxed job function, ready to be handed to whichever task executes it.
pub(crate) type JobFn = Box<dyn FnOnce(JobContext) -> JobFuture + Send + 'static>;

/// One submitted unit of work: the function to run and the context it was
/// submitted under. Consumed exactly once.
pub(crate) struct Job {
  pub(crate) job_id: u64,
  pub(crate) request: RequestContext,
  pub(crate) function: JobFn,
}

/// What actually travels the rendezvous channel.
///
/// The submitter keeps a clone of the slot. A send that loses the race
/// against channel closure leaves the job inside, where the submitter can
/// take it back and run it inline. The `Option` take is what makes
/// execution exactly-once no matter which side wins.
pub(crate) type JobSlot = Arc<Mutex<Option<Job>>>;

impl Job {
  pub(crate) fn into_slot(self) -> JobSlot {
    Arc::new(Mutex::new(Some(self)))
  }
}

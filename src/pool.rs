use crate::builder::PoolBuilder;
use crate::context::{JobContext, RequestContext};
use crate::dispatcher::{Dispatcher, SignalId};
use crate::error::PoolError;
use crate::gate::ShutdownGate;
use crate::job::{Job, JobFn, JobFuture, JobSlot};
use crate::run_group::RunGroup;

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use kanal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{self, debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

const STATE_IDLE: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Keeps the active-job count correct even when a job panics its worker.
struct ActiveJobGuard<'a> {
  counter: &'a AtomicUsize,
}

impl<'a> ActiveJobGuard<'a> {
  fn new(counter: &'a AtomicUsize) -> Self {
    counter.fetch_add(1, AtomicOrdering::AcqRel);
    Self { counter }
  }
}

impl Drop for ActiveJobGuard<'_> {
  fn drop(&mut self) {
    self.counter.fetch_sub(1, AtomicOrdering::AcqRel);
  }
}

/// A fixed-size set of workers executing jobs handed over a rendezvous
/// channel.
///
/// There is no queue depth beyond the rendezvous point: `submit` suspends
/// its caller until a worker is actually free, which is what bounds the
/// concurrent work a flood of submitters can create. When the run loop is
/// not running, submitted jobs execute on the submitting task instead, so
/// work is never dropped.
///
/// Constructed through [`JobPool::builder`].
pub struct JobPool {
  pool_name: Arc<String>,
  concurrency: usize,
  timeout: Duration,
  shutdown_signals: Vec<SignalId>,
  gate: ShutdownGate,
  job_tx: kanal::AsyncSender<JobSlot>,
  job_rx: kanal::AsyncReceiver<JobSlot>,
  state: AtomicU8,
  active_jobs: Arc<AtomicUsize>,
}

impl JobPool {
  /// Starts configuring a pool. See [`PoolBuilder`] for the defaults.
  pub fn builder() -> PoolBuilder {
    PoolBuilder::new()
  }

  pub(crate) fn build(
    pool_name: String,
    concurrency: usize,
    timeout: Duration,
    shutdown_signals: Vec<SignalId>,
    dispatcher: &dyn Dispatcher,
  ) -> Result<Arc<Self>, PoolError> {
    if concurrency == 0 {
      return Err(PoolError::ZeroConcurrency);
    }

    let pool_name = Arc::new(pool_name);
    let (job_tx, job_rx) = kanal::bounded_async(0);
    let gate = ShutdownGate::subscribe(pool_name.clone(), dispatcher, &shutdown_signals);

    info!(
      pool_name = %*pool_name,
      concurrency,
      timeout_ms = timeout.as_millis() as u64,
      shutdown_signals = shutdown_signals.len(),
      "Job pool created."
    );

    Ok(Arc::new(Self {
      pool_name,
      concurrency,
      timeout,
      shutdown_signals,
      gate,
      job_tx,
      job_rx,
      state: AtomicU8::new(STATE_IDLE),
      active_jobs: Arc::new(AtomicUsize::new(0)),
    }))
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn concurrency(&self) -> usize {
    self.concurrency
  }

  /// The execution timeout applied to every job's context.
  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Number of jobs currently executing, on workers or inline in `submit`.
  pub fn active_job_count(&self) -> usize {
    self.active_jobs.load(AtomicOrdering::Acquire)
  }

  /// Whether the run loop is currently accepting jobs for dispatch.
  pub fn is_running(&self) -> bool {
    self.state.load(AtomicOrdering::Acquire) == STATE_RUNNING
  }

  /// The signals the pool waits for before an orchestrated run completes.
  pub fn shutdown_signals(&self) -> &[SignalId] {
    &self.shutdown_signals
  }

  /// The gate counting down this pool's configured shutdown signals.
  pub fn shutdown_gate(&self) -> &ShutdownGate {
    &self.gate
  }

  /// Hands `function` to the pool for execution under a context derived
  /// from `request`: inherited values, fresh timeout.
  ///
  /// Suspends the caller until a worker accepts the job. If the run loop
  /// is not running (never started, or already stopped), the job executes
  /// on the calling task instead. Submission cannot fail and work is never
  /// dropped; the only cost a submitter ever pays is waiting.
  pub async fn submit<F, Fut>(&self, request: &RequestContext, function: F)
  where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let job_id = NEXT_JOB_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let function: JobFn = Box::new(move |context| Box::pin(function(context)) as JobFuture);
    let job = Job {
      job_id,
      request: request.clone(),
      function,
    };

    if self.state.load(AtomicOrdering::Acquire) != STATE_RUNNING {
      debug!(pool_name = %*self.pool_name, %job_id, "Submit: run loop is not running. Executing job on the submitting task.");
      Self::execute_job(&self.pool_name, self.timeout, &self.active_jobs, job).await;
      return;
    }

    trace!(pool_name = %*self.pool_name, %job_id, "Submit: waiting for a worker to accept the job.");
    let slot = job.into_slot();
    if self.job_tx.send(slot.clone()).await.is_err() {
      // The run loop closed the channel after the state check. The job is
      // still in our half of the slot; reclaim it and run it here.
      let reclaimed = slot.lock().take();
      if let Some(job) = reclaimed {
        debug!(pool_name = %*self.pool_name, %job_id, "Submit: pool stopped while waiting. Executing job on the submitting task.");
        Self::execute_job(&self.pool_name, self.timeout, &self.active_jobs, job).await;
      }
    }
  }

  /// Starts `concurrency` workers and parks until `lifetime` is cancelled,
  /// then closes the job channel and waits for every in-flight job to
  /// finish before returning.
  ///
  /// The run loop is one-shot: a second call returns
  /// [`PoolError::AlreadyStarted`]. Submitters still waiting at the
  /// rendezvous when the lifetime ends are woken and execute their jobs
  /// themselves.
  pub async fn run(&self, lifetime: CancellationToken) -> Result<(), PoolError> {
    if self
      .state
      .compare_exchange(STATE_IDLE, STATE_RUNNING, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
      .is_err()
    {
      warn!(pool_name = %*self.pool_name, "Run: pool run loop was already started.");
      return Err(PoolError::AlreadyStarted);
    }

    info!(pool_name = %*self.pool_name, concurrency = self.concurrency, "Pool run loop starting workers.");

    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(self.concurrency);
    for worker_index in 0..self.concurrency {
      let worker_pool_name = self.pool_name.clone();
      let worker_rx = self.job_rx.clone();
      let worker_active_jobs = self.active_jobs.clone();
      workers.push(tokio::spawn(
        Self::run_worker_loop(worker_pool_name.clone(), worker_index, self.timeout, worker_rx, worker_active_jobs)
          .instrument(info_span!("pool_worker", pool_name = %*worker_pool_name, worker_index)),
      ));
    }

    lifetime.cancelled().await;
    info!(pool_name = %*self.pool_name, "Pool lifetime ended. Closing the job channel and draining workers.");
    let _ = self.job_tx.close();

    let mut panicked_workers = 0usize;
    for (worker_index, worker) in workers.into_iter().enumerate() {
      if let Err(join_error) = worker.await {
        if join_error.is_panic() {
          panicked_workers += 1;
          error!(pool_name = %*self.pool_name, worker_index, "Worker was killed by a panicking job.");
        } else {
          warn!(pool_name = %*self.pool_name, worker_index, "Worker was cancelled externally: {:?}", join_error);
        }
      }
    }

    self.state.store(STATE_STOPPED, AtomicOrdering::Release);
    if panicked_workers > 0 {
      warn!(
        pool_name = %*self.pool_name,
        panicked_workers,
        "Pool run loop stopped. Some workers died to panicking jobs; later submissions ran on fewer workers."
      );
    } else {
      info!(pool_name = %*self.pool_name, "Pool run loop stopped. All workers drained.");
    }
    Ok(())
  }

  /// Registers this pool with `group` as two cooperating actors: a waiter
  /// that ends the pool lifetime once the shutdown gate opens, and the run
  /// loop itself.
  ///
  /// The orchestrated run therefore completes only after every configured
  /// shutdown signal has fired, or after a sibling actor finishes first
  /// and the group interrupts everyone. Driving the pool without an
  /// orchestrator is just [`JobPool::run`] with a caller-owned token.
  pub fn provide_run_group(self: Arc<Self>, group: &mut RunGroup) {
    let lifetime = CancellationToken::new();
    let stop = CancellationToken::new();

    let gate_pool = self.clone();
    let gate_lifetime = lifetime.clone();
    let gate_stop = stop.clone();
    group.add(
      async move {
        tokio::select! {
          biased;

          _ = gate_pool.gate.opened() => {
            info!(pool_name = %*gate_pool.pool_name, "Shutdown gate opened. Ending pool lifetime.");
          }
          _ = gate_stop.cancelled() => {
            debug!(pool_name = %*gate_pool.pool_name, "Gate wait interrupted. Ending pool lifetime.");
          }
        }
        gate_lifetime.cancel();
        Ok(())
      },
      move || stop.cancel(),
    );

    let run_lifetime = lifetime.clone();
    group.add(
      async move {
        self.run(run_lifetime).await?;
        Ok(())
      },
      move || lifetime.cancel(),
    );
  }

  async fn run_worker_loop(
    pool_name: Arc<String>,
    worker_index: usize,
    timeout: Duration,
    job_rx: kanal::AsyncReceiver<JobSlot>,
    active_jobs: Arc<AtomicUsize>,
  ) {
    debug!(name = %*pool_name, worker_index, "Worker started.");

    while let Ok(slot) = job_rx.recv().await {
      // Take the job out before awaiting anything so the slot guard is not
      // held across an await point.
      let accepted = slot.lock().take();
      if let Some(job) = accepted {
        Self::execute_job(&pool_name, timeout, &active_jobs, job).await;
      }
    }

    debug!(name = %*pool_name, worker_index, "Job channel closed. Worker exiting.");
  }

  async fn execute_job(pool_name: &str, timeout: Duration, active_jobs: &AtomicUsize, job: Job) {
    let job_id = job.job_id;
    let context = JobContext::derive(&job.request, timeout);
    let clock_handle = context.clone();
    let _active = ActiveJobGuard::new(active_jobs);

    trace!(pool_name = %pool_name, %job_id, "Job starting.");
    (job.function)(context)
      .instrument(info_span!("job", pool_name = %pool_name, %job_id))
      .await;
    clock_handle.release_clock();
    trace!(pool_name = %pool_name, %job_id, "Job finished.");
  }
}

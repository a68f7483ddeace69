use dispatch_pool::{ContextValues, JobPool, RequestContext, SyncDispatcher};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
struct UserId(u64);

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();

  info!("--- Request Handler Example ---");

  // 1. One process-wide bus and a pool sized for background work.
  let bus = SyncDispatcher::new();
  let pool = JobPool::builder()
    .name("audit")
    .concurrency(2)
    .timeout(Duration::from_secs(3))
    .shutdown_signals(Vec::new())
    .build(&bus)
    .expect("pool configuration is valid");

  // 2. Drive the run loop from a background task; the token ends it.
  let lifetime = CancellationToken::new();
  let run_pool = pool.clone();
  let run_lifetime = lifetime.clone();
  let run_handle = tokio::spawn(async move { run_pool.run(run_lifetime).await });

  // 3. Each "request" hands its audit write to the pool and returns as soon
  //    as a worker accepts it. With two workers, the third handler waits.
  for user in 1..=5u64 {
    let request = RequestContext::new().with_value(UserId(user));
    pool
      .submit(&request, move |job_ctx| async move {
        let user = job_ctx.value::<UserId>().map(|u| u.0).unwrap_or_default();
        info!(user, "Writing audit record.");
        sleep(Duration::from_millis(300)).await;
        info!(user, "Audit record written.");
      })
      .await;
    info!(user, active = pool.active_job_count(), "Handler returned.");
  }

  // 4. Wind the pool down; run returns once the accepted jobs finish.
  lifetime.cancel();
  run_handle
    .await
    .expect("run task is not cancelled")
    .expect("pool shuts down cleanly");
  info!("--- Example Finished ---");
}

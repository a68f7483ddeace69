use dispatch_pool::{JobPool, RequestContext, RunGroup, SignalId, SyncDispatcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

// Application-defined shutdown events replacing the server defaults.
const ON_CONSUMER_DRAINED: SignalId = SignalId::from_static("kafka.consumer.drained");
const ON_SCHEDULER_IDLE: SignalId = SignalId::from_static("scheduler.idle");

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Custom Signals Example ---");

  let bus = Arc::new(SyncDispatcher::new());
  let pool = JobPool::builder()
    .name("reindex")
    .concurrency(2)
    .shutdown_signals([ON_CONSUMER_DRAINED, ON_SCHEDULER_IDLE])
    .build(bus.as_ref())
    .expect("pool configuration is valid");
  info!(signals = ?pool.shutdown_signals(), "Pool waits for custom signals.");

  let mut group = RunGroup::new();
  pool.clone().provide_run_group(&mut group);
  let orchestration = tokio::spawn(group.run());

  let request = RequestContext::new();
  for shard in 0..4u32 {
    pool
      .submit(&request, move |_job_ctx| async move {
        info!(shard, "Rebuilding index shard.");
        sleep(Duration::from_millis(150)).await;
        info!(shard, "Index shard rebuilt.");
      })
      .await;
  }

  let publisher = bus.clone();
  let gate = pool.shutdown_gate().clone();
  tokio::spawn(async move {
    sleep(Duration::from_millis(200)).await;
    publisher.publish(&ON_CONSUMER_DRAINED, &());
    // A repeat of the same signal is counted once.
    publisher.publish(&ON_CONSUMER_DRAINED, &());
    info!(remaining = gate.remaining(), "Consumer drained.");

    sleep(Duration::from_millis(200)).await;
    publisher.publish(&ON_SCHEDULER_IDLE, &());
    info!(remaining = gate.remaining(), "Scheduler idle.");
  });

  orchestration
    .await
    .expect("orchestration task is not cancelled")
    .expect("every actor shut down cleanly");
  info!("--- Example Finished ---");
}

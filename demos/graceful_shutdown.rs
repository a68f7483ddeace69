use dispatch_pool::{
  JobPool, RequestContext, RunGroup, SyncDispatcher, ON_GRPC_SERVER_SHUTDOWN, ON_HTTP_SERVER_SHUTDOWN,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Graceful Shutdown Example ---");

  // 1. The bus is shared between the pool and the (simulated) servers.
  let bus = Arc::new(SyncDispatcher::new());
  let pool = JobPool::builder()
    .name("mailer")
    .concurrency(4)
    .timeout(Duration::from_secs(10))
    .build(bus.as_ref())
    .expect("pool configuration is valid");

  // 2. Register both pool units with the orchestrator and start it.
  let mut group = RunGroup::new();
  pool.clone().provide_run_group(&mut group);
  let orchestration = tokio::spawn(group.run());

  // 3. A request arrives, hands off a slow delivery and ends right away.
  let request = RequestContext::new();
  pool
    .submit(&request, |_job_ctx| async {
      info!("Delivering welcome mail...");
      sleep(Duration::from_millis(800)).await;
      info!("Welcome mail delivered.");
    })
    .await;
  drop(request);
  info!("Request finished; the delivery continues in the pool.");

  // 4. The transports announce their shutdown one after the other. The pool
  //    stays up until the last one has fired.
  let http_bus = bus.clone();
  tokio::spawn(async move {
    sleep(Duration::from_millis(200)).await;
    info!("HTTP server stopped.");
    http_bus.publish(&ON_HTTP_SERVER_SHUTDOWN, &());
  });
  let grpc_bus = bus.clone();
  tokio::spawn(async move {
    sleep(Duration::from_millis(400)).await;
    info!("gRPC server stopped.");
    grpc_bus.publish(&ON_GRPC_SERVER_SHUTDOWN, &());
  });

  // 5. The group returns once both signals fired and the pool has drained.
  orchestration
    .await
    .expect("orchestration task is not cancelled")
    .expect("every actor shut down cleanly");
  info!("--- Example Finished ---");
}

use dispatch_pool::{ContextLifetime, ContextValues, JobPool, RequestContext, SyncDispatcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestTag(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
struct TraceName(&'static str);

// Deliberately not Clone; attached values only need Send + Sync + 'static.
#[derive(Debug)]
struct ConnectionHandle {
  endpoint: &'static str,
}

fn build_idle_pool(name: &str) -> Arc<JobPool> {
  let bus = SyncDispatcher::new();
  JobPool::builder()
    .name(name)
    .concurrency(1)
    .timeout(Duration::from_secs(5))
    .shutdown_signals(Vec::new())
    .build(&bus)
    .unwrap()
}

#[test]
fn test_request_context_values() {
  let base = RequestContext::new();
  assert!(base.value::<RequestTag>().is_none());

  let tagged = base.with_value(RequestTag(1));
  assert_eq!(tagged.value::<RequestTag>(), Some(&RequestTag(1)));
  assert!(
    base.value::<RequestTag>().is_none(),
    "with_value must not mutate the original context"
  );

  // One slot per type; attaching the same type again replaces it.
  let replaced = tagged.with_value(RequestTag(2));
  assert_eq!(replaced.value::<RequestTag>(), Some(&RequestTag(2)));
  assert_eq!(tagged.value::<RequestTag>(), Some(&RequestTag(1)));

  let layered = replaced
    .with_value(TraceName("checkout"))
    .with_value(ConnectionHandle { endpoint: "db-1" });
  assert_eq!(layered.value::<RequestTag>(), Some(&RequestTag(2)));
  assert_eq!(layered.value::<TraceName>(), Some(&TraceName("checkout")));
  assert_eq!(layered.value::<ConnectionHandle>().map(|c| c.endpoint), Some("db-1"));
}

#[test]
fn test_request_context_clones_share_lifetime() {
  let request = RequestContext::new();
  let sibling = request.clone();
  assert!(request.deadline().is_none(), "request contexts carry no deadline");
  assert!(!request.is_cancelled());
  assert!(!sibling.is_cancelled());

  request.cancel();
  assert!(request.is_cancelled());
  assert!(sibling.is_cancelled(), "clones observe the same lifetime");
}

#[tokio::test]
async fn test_job_context_splits_lifetime_from_request() {
  let pool = build_idle_pool("test_pool_context_split");
  let request = RequestContext::new().with_value(RequestTag(9));

  // Cancel before submitting; the derived context must not inherit this.
  request.cancel();

  let executed = Arc::new(AtomicBool::new(false));
  let executed_clone = executed.clone();
  let request_clone = request.clone();
  let before = Instant::now();
  pool
    .submit(&request, move |job_ctx| async move {
      assert!(request_clone.is_cancelled());
      assert!(
        !job_ctx.is_cancelled(),
        "a derived context starts with a fresh lifetime"
      );
      assert_eq!(job_ctx.value::<RequestTag>(), Some(&RequestTag(9)));

      let deadline = job_ctx.deadline().expect("derived contexts always carry a deadline");
      assert!(deadline >= before + Duration::from_secs(5));
      assert!(deadline <= Instant::now() + Duration::from_secs(5));
      executed_clone.store(true, Ordering::SeqCst);
    })
    .await;

  assert!(executed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_job_context_clones_share_clock() {
  let pool = build_idle_pool("test_pool_context_clone");
  let request = RequestContext::new();

  let executed = Arc::new(AtomicBool::new(false));
  let executed_clone = executed.clone();
  pool
    .submit(&request, move |job_ctx| async move {
      let sibling = job_ctx.clone();
      assert_eq!(sibling.deadline(), job_ctx.deadline());

      sibling.cancellation_token().cancel();
      assert!(job_ctx.is_cancelled(), "clones share one execution lifetime");
      executed_clone.store(true, Ordering::SeqCst);
    })
    .await;

  assert!(executed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_job_context_clone_held_past_return_is_cancelled() {
  let pool = build_idle_pool("test_pool_context_release");
  let request = RequestContext::new();

  let escaped = Arc::new(parking_lot::Mutex::new(None));
  let escaped_clone = escaped.clone();
  pool
    .submit(&request, move |job_ctx| async move {
      assert!(!job_ctx.is_cancelled());
      *escaped_clone.lock() = Some(job_ctx.clone());
    })
    .await;

  // The pool releases the clock once the job function returns, so the
  // clone that escaped the job observes an ended lifetime, not a live
  // timer still counting toward the deadline.
  let held = escaped.lock().take().expect("job must have stored its context");
  assert!(
    held.is_cancelled(),
    "a context clone held past the job's return must observe an ended lifetime"
  );
  assert!(held.deadline().is_some(), "the deadline stays readable after release");
}

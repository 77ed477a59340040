use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mercato_core::PeriodicTask;
use tokio_util::sync::CancellationToken;

fn counting_job(
    count: &Arc<AtomicUsize>,
    work: Duration,
) -> impl FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + 'static
{
    let count = Arc::clone(count);
    move || {
        let count = Arc::clone(&count);
        Box::pin(async move {
            count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(work).await;
        })
    }
}

#[tokio::test(start_paused = true)]
async fn slow_runs_skip_overlapping_ticks() {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = PeriodicTask::new("slow", Duration::from_millis(10))
        .run_immediately(true)
        .spawn(counting_job(&count, Duration::from_millis(25)));

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.skipped_ticks() > 0, "overlapping ticks must be skipped");
    assert!(handle.runs() >= 2);
    assert!(handle.runs() < 10, "a run never starts while one is in flight");
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn first_run_waits_one_period_by_default() {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = PeriodicTask::new("delayed", Duration::from_millis(50))
        .spawn(counting_job(&count, Duration::ZERO));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_halts_future_runs() {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = PeriodicTask::new("fast", Duration::from_millis(10))
        .run_immediately(true)
        .spawn(counting_job(&count, Duration::ZERO));

    tokio::time::sleep(Duration::from_millis(35)).await;
    handle.stop().await;
    let after_stop = count.load(Ordering::SeqCst);
    assert!(after_stop >= 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(count.load(Ordering::SeqCst), after_stop);
}

#[tokio::test(start_paused = true)]
async fn external_token_cancels_task() {
    let count = Arc::new(AtomicUsize::new(0));
    let token = CancellationToken::new();
    let handle = PeriodicTask::new("shared", Duration::from_millis(10))
        .with_cancellation(token.clone())
        .spawn(counting_job(&count, Duration::ZERO));

    tokio::time::sleep(Duration::from_millis(25)).await;
    token.cancel();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(handle.is_finished());
    let seen = count.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), seen);
}

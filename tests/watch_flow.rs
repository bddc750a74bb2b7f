use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{advance, timeout};
use watchearn::{
    CompletedView, InMemoryLedger, LedgerError, RewardLedger, StartedView, WatchConfig,
    WatchController, WatchError, WatchEvent, WatchState, WatchSubject,
};

/// Ledger whose completion phase always fails at the transport level.
struct FailingCompleteLedger {
    inner: InMemoryLedger,
}

#[async_trait]
impl RewardLedger for FailingCompleteLedger {
    async fn start_view(&self, subject_id: &str) -> Result<StartedView, LedgerError> {
        self.inner.start_view(subject_id).await
    }

    async fn complete_view(&self, session_id: &str) -> Result<CompletedView, LedgerError> {
        let _ = self.inner.complete_view(session_id).await;
        Err(LedgerError::Transport("connection reset by peer".into()))
    }
}

/// Ledger whose start phase takes a while to resolve.
struct DelayedStartLedger {
    inner: InMemoryLedger,
    delay: Duration,
}

#[async_trait]
impl RewardLedger for DelayedStartLedger {
    async fn start_view(&self, subject_id: &str) -> Result<StartedView, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.start_view(subject_id).await
    }

    async fn complete_view(&self, session_id: &str) -> Result<CompletedView, LedgerError> {
        self.inner.complete_view(session_id).await
    }
}

fn controller_with(ledger: Arc<dyn RewardLedger>) -> WatchController {
    WatchController::new(ledger, WatchConfig::default())
}

async fn next_event(rx: &mut broadcast::Receiver<WatchEvent>) -> WatchEvent {
    rx.recv().await.expect("event stream closed")
}

/// Consume progress events until something else arrives; returns that event
/// and the accumulated milliseconds reported by the last progress seen.
async fn skip_progress(rx: &mut broadcast::Receiver<WatchEvent>) -> (WatchEvent, u64) {
    let mut last_accumulated = 0;
    loop {
        match next_event(rx).await {
            WatchEvent::Progress { accumulated_ms, .. } => last_accumulated = accumulated_ms,
            other => return (other, last_accumulated),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn full_watch_credits_once_and_redirects() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger.clone());
    let mut events = controller.subscribe();

    let snapshot = controller
        .begin_watch(WatchSubject::with_destination(
            "post-1",
            "https://example.com/offer",
        ))
        .await
        .expect("begin_watch");
    assert_eq!(snapshot.state, WatchState::Watching);
    assert!(snapshot.session_id.is_some());
    assert_eq!(snapshot.target_ms, 35_000);

    let mut progress_count = 0;
    let mut last_percent = 0.0;
    let completed = loop {
        match next_event(&mut events).await {
            WatchEvent::Progress { percent, .. } => {
                assert!(percent >= last_percent, "progress went backwards");
                last_percent = percent;
                progress_count += 1;
            }
            other => break other,
        }
    };

    assert!(progress_count >= 170, "expected ~175 ticks, saw {progress_count}");
    match completed {
        WatchEvent::Completed {
            credited_amount, ..
        } => assert!((credited_amount - 0.05).abs() < f64::EPSILON),
        other => panic!("expected completion, got {other:?}"),
    }

    match next_event(&mut events).await {
        WatchEvent::RedirectPending { url, delay_ms } => {
            assert_eq!(url, "https://example.com/offer");
            assert_eq!(delay_ms, 5_000);
        }
        other => panic!("expected pending redirect, got {other:?}"),
    }
    match next_event(&mut events).await {
        WatchEvent::Redirect { url } => assert_eq!(url, "https://example.com/offer"),
        other => panic!("expected redirect, got {other:?}"),
    }

    assert_eq!(ledger.start_calls().await, 1);
    assert_eq!(ledger.complete_calls().await, 1);

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, WatchState::Completed);
    assert_eq!(snapshot.percent, 100.0);
}

#[tokio::test(start_paused = true)]
async fn second_begin_watch_is_rejected() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger.clone());

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("first begin_watch");

    let rejected = controller.begin_watch(WatchSubject::new("post-b")).await;
    assert!(matches!(rejected, Err(WatchError::AlreadyWatching)));
    // the guard fires before the boundary is consulted
    assert_eq!(ledger.start_calls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn begin_watch_is_rejected_while_start_is_in_flight() {
    let ledger = Arc::new(DelayedStartLedger {
        inner: InMemoryLedger::new(0.05, Some(5)),
        delay: Duration::from_secs(1),
    });
    let controller = Arc::new(controller_with(ledger.clone()));

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.begin_watch(WatchSubject::new("post-a")).await })
    };
    // let the spawned start reach its await on the boundary
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let rejected = controller.begin_watch(WatchSubject::new("post-b")).await;
    assert!(matches!(rejected, Err(WatchError::AlreadyWatching)));

    let snapshot = first.await.expect("join").expect("first begin_watch");
    assert_eq!(snapshot.state, WatchState::Watching);
    assert_eq!(ledger.inner.start_calls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_never_calls_the_complete_boundary() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger.clone());
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("begin_watch");
    for _ in 0..5 {
        assert!(matches!(
            next_event(&mut events).await,
            WatchEvent::Progress { .. }
        ));
    }

    controller.cancel_watch().await;
    let (event, _) = skip_progress(&mut events).await;
    assert!(matches!(event, WatchEvent::Cancelled));
    assert_eq!(ledger.complete_calls().await, 0);

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, WatchState::Cancelled);
    assert_eq!(snapshot.accumulated_ms, 0);

    // a second cancel has no further observable effect
    controller.cancel_watch().await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn cancel_after_completion_is_a_no_op() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger.clone());
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("begin_watch");
    let (event, _) = skip_progress(&mut events).await;
    assert!(matches!(event, WatchEvent::Completed { .. }));

    controller.cancel_watch().await;
    assert!(events.try_recv().is_err());
    assert_eq!(ledger.complete_calls().await, 1);

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, WatchState::Completed);
}

#[tokio::test(start_paused = true)]
async fn ineligible_start_leaves_no_session() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger.clone());
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("begin_watch");
    let (event, _) = skip_progress(&mut events).await;
    assert!(matches!(event, WatchEvent::Completed { .. }));

    // the ledger already credited this subject
    let rejected = controller.begin_watch(WatchSubject::new("post-a")).await;
    assert!(matches!(rejected, Err(WatchError::Ineligible(_))));
    assert!(controller.snapshot().await.is_none());

    // a fresh subject is unaffected
    let snapshot = controller
        .begin_watch(WatchSubject::new("post-b"))
        .await
        .expect("second subject");
    assert_eq!(snapshot.state, WatchState::Watching);
}

#[tokio::test(start_paused = true)]
async fn completion_failure_is_explicit_and_never_redirects() {
    let ledger = Arc::new(FailingCompleteLedger {
        inner: InMemoryLedger::new(0.05, Some(5)),
    });
    let controller = controller_with(ledger);
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::with_destination(
            "post-a",
            "https://example.com/offer",
        ))
        .await
        .expect("begin_watch");

    let (event, last_accumulated) = skip_progress(&mut events).await;
    match event {
        WatchEvent::Failed { reason, .. } => assert!(reason.contains("connection reset")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(last_accumulated <= 35_000);

    // no redirect follows a failed settlement
    assert!(timeout(Duration::from_secs(10), events.recv()).await.is_err());

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, WatchState::Failed);
    assert_eq!(snapshot.accumulated_ms, 35_000);
}

#[tokio::test(start_paused = true)]
async fn credited_amount_falls_back_to_the_promise() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, None));
    let controller = controller_with(ledger);
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("begin_watch");

    let (event, _) = skip_progress(&mut events).await;
    match event {
        WatchEvent::Completed {
            credited_amount, ..
        } => assert!((credited_amount - 0.05).abs() < f64::EPSILON),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn hidden_time_is_excluded_from_accumulation() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger.clone());
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("begin_watch");

    let mut before_pause = 0;
    while before_pause < 10_000 {
        match next_event(&mut events).await {
            WatchEvent::Progress { accumulated_ms, .. } => before_pause = accumulated_ms,
            other => panic!("unexpected event {other:?}"),
        }
    }

    controller.set_hidden(true).await;
    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, WatchState::Paused);

    // two minutes hidden; none of it may be credited
    advance(Duration::from_secs(120)).await;
    assert!(events.try_recv().is_err(), "paused timer emitted progress");

    controller.set_hidden(false).await;
    match next_event(&mut events).await {
        WatchEvent::Progress { accumulated_ms, .. } => {
            assert!(
                accumulated_ms <= before_pause + 400,
                "hidden gap was credited: {accumulated_ms} vs {before_pause}"
            );
        }
        other => panic!("unexpected event {other:?}"),
    }

    let (event, _) = skip_progress(&mut events).await;
    assert!(matches!(event, WatchEvent::Completed { .. }));
    assert_eq!(ledger.complete_calls().await, 1);
}

#[tokio::test(start_paused = true)]
async fn redirect_countdown_is_cancellable() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger);
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::with_destination(
            "post-a",
            "https://example.com/offer",
        ))
        .await
        .expect("begin_watch");

    let (event, _) = skip_progress(&mut events).await;
    assert!(matches!(event, WatchEvent::Completed { .. }));
    assert!(matches!(
        next_event(&mut events).await,
        WatchEvent::RedirectPending { .. }
    ));

    controller.cancel_redirect().await;
    assert!(timeout(Duration::from_secs(10), events.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn teardown_releases_the_poll_task() {
    let ledger = Arc::new(InMemoryLedger::new(0.05, Some(5)));
    let controller = controller_with(ledger);
    let mut events = controller.subscribe();

    controller
        .begin_watch(WatchSubject::new("post-a"))
        .await
        .expect("begin_watch");
    assert!(matches!(
        next_event(&mut events).await,
        WatchEvent::Progress { .. }
    ));

    controller.teardown().await;
    assert!(timeout(Duration::from_secs(2), events.recv()).await.is_err());

    let snapshot = controller.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.state, WatchState::Cancelled);

    // the slot is free again afterwards
    let snapshot = controller
        .begin_watch(WatchSubject::new("post-b"))
        .await
        .expect("begin after teardown");
    assert_eq!(snapshot.state, WatchState::Watching);
}

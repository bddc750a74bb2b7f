use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::WatchConfig;
use crate::error::WatchError;
use crate::events::WatchEvent;
use crate::ledger::RewardLedger;
use crate::models::{ViewSession, WatchSnapshot, WatchState, WatchSubject};
use crate::timer::{FocusSignal, FocusTimer};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const SIGNAL_CHANNEL_CAPACITY: usize = 32;

/// The single active session together with the resources bound to it.
struct ActiveWatch {
    session: ViewSession,
    timer: Option<FocusTimer>,
    consumer: Option<JoinHandle<()>>,
    redirect_token: CancellationToken,
    /// Progress frozen at the last terminal transition, for snapshots taken
    /// after the timer has been released.
    final_accumulated_ms: u64,
}

/// Sequences the two-phase watch-to-earn commit: start a view against the
/// ledger, accumulate focused time with a [`FocusTimer`], settle the reward
/// on completion, and guard the invariants the timer alone cannot enforce
/// (one global session, cancel never racing the reward).
pub struct WatchController {
    ledger: Arc<dyn RewardLedger>,
    config: WatchConfig,
    slot: Arc<Mutex<Option<ActiveWatch>>>,
    events: broadcast::Sender<WatchEvent>,
}

impl WatchController {
    pub fn new(ledger: Arc<dyn RewardLedger>, config: WatchConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ledger,
            config,
            slot: Arc::new(Mutex::new(None)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// Start watching `subject`. Fails with [`WatchError::AlreadyWatching`]
    /// while any session is starting, watching, paused, or completing; the
    /// start boundary is the sole authority on eligibility beyond that.
    pub async fn begin_watch(&self, subject: WatchSubject) -> Result<WatchSnapshot, WatchError> {
        let target_ms = self.config.target_ms();

        // Reserve the slot before the first await on the ledger so a second
        // begin_watch during the in-flight start is rejected, not raced.
        {
            let mut slot = self.slot.lock().await;
            if let Some(active) = slot.as_ref() {
                if active.session.state.is_active() {
                    return Err(WatchError::AlreadyWatching);
                }
            }
            if let Some(previous) = slot.take() {
                // a finished session may still be counting down its redirect
                previous.redirect_token.cancel();
            }
            *slot = Some(ActiveWatch {
                session: ViewSession::starting(subject.clone(), target_ms),
                timer: None,
                consumer: None,
                redirect_token: CancellationToken::new(),
                final_accumulated_ms: 0,
            });
        }

        let started = match self.ledger.start_view(&subject.id).await {
            Ok(started) => started,
            Err(err) => {
                // a failed start leaves no session behind
                self.slot.lock().await.take();
                warn!("start refused for subject {}: {err}", subject.id);
                return Err(err.into());
            }
        };

        let mut slot = self.slot.lock().await;
        let reserved = slot
            .as_mut()
            .filter(|active| active.session.state == WatchState::Starting);
        let Some(active) = reserved else {
            // cancel_watch won the race; the server view simply never settles
            info!(
                "view {} for subject {} was cancelled before the start resolved",
                started.session_id, subject.id
            );
            return Err(WatchError::Cancelled);
        };

        info!(
            "view {} started for subject {} (promised {})",
            started.session_id, subject.id, started.reward_amount
        );

        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
        active.session.session_id = Some(started.session_id);
        active.session.reward_amount = started.reward_amount;
        active.session.state = WatchState::Watching;
        active.timer = Some(FocusTimer::start(
            target_ms,
            self.config.slack_ms(),
            self.config.poll_interval,
            signal_tx,
        ));
        active.consumer = Some(self.spawn_signal_consumer(signal_rx, target_ms));

        Ok(snapshot_of(&active.session, 0))
    }

    /// Forward a visibility change to the active session's timer. Duplicate
    /// flaps and non-running states are ignored.
    pub async fn set_hidden(&self, hidden: bool) {
        let mut slot = self.slot.lock().await;
        let Some(active) = slot.as_mut() else {
            return;
        };

        match (active.session.state, hidden) {
            (WatchState::Watching, true) => {
                if let Some(timer) = active.timer.as_ref() {
                    timer.set_hidden(true).await;
                }
                active.session.state = WatchState::Paused;
            }
            (WatchState::Paused, false) => {
                if let Some(timer) = active.timer.as_ref() {
                    timer.set_hidden(false).await;
                }
                active.session.state = WatchState::Watching;
            }
            _ => {}
        }
    }

    /// Abandon the active session without crediting. Permitted while starting,
    /// watching, or paused; once completion has been requested this is a
    /// no-op so a late cancel can never race the reward. Idempotent.
    pub async fn cancel_watch(&self) {
        let mut slot = self.slot.lock().await;
        let Some(active) = slot.as_mut() else {
            return;
        };

        match active.session.state {
            WatchState::Starting => {
                // the in-flight begin_watch sees this and abandons the session
                active.session.state = WatchState::Cancelled;
                active.session.finished_at = Some(Utc::now());
                let _ = self.events.send(WatchEvent::Cancelled);
                info!(
                    "watch for subject {} cancelled before the start resolved",
                    active.session.subject.id
                );
            }
            WatchState::Watching | WatchState::Paused => {
                active.session.state = WatchState::Cancelled;
                active.session.finished_at = Some(Utc::now());
                active.final_accumulated_ms = 0;
                if let Some(mut timer) = active.timer.take() {
                    timer.cancel().await;
                }
                if let Some(consumer) = active.consumer.take() {
                    consumer.abort();
                }
                active.redirect_token.cancel();
                let _ = self.events.send(WatchEvent::Cancelled);
                info!(
                    "watch for subject {} cancelled; nothing credited",
                    active.session.subject.id
                );
            }
            WatchState::Completing
            | WatchState::Completed
            | WatchState::Cancelled
            | WatchState::Failed => {}
        }
    }

    /// Abort a pending post-completion redirect countdown.
    pub async fn cancel_redirect(&self) {
        let slot = self.slot.lock().await;
        if let Some(active) = slot.as_ref() {
            active.redirect_token.cancel();
        }
    }

    /// Read-only progress for rendering. `None` while no session exists.
    pub async fn snapshot(&self) -> Option<WatchSnapshot> {
        let slot = self.slot.lock().await;
        let active = slot.as_ref()?;
        let accumulated_ms = match active.timer.as_ref() {
            Some(timer) => timer.accumulated_ms().await,
            None => active.final_accumulated_ms,
        };
        Some(snapshot_of(&active.session, accumulated_ms))
    }

    /// Release the poll task, the signal consumer, and any pending redirect,
    /// whatever state the session is in. A session that was still active is
    /// marked cancelled without an event; the surface is going away.
    pub async fn teardown(&self) {
        let mut slot = self.slot.lock().await;
        let Some(active) = slot.as_mut() else {
            return;
        };

        if let Some(mut timer) = active.timer.take() {
            timer.cancel().await;
        }
        if let Some(consumer) = active.consumer.take() {
            consumer.abort();
        }
        active.redirect_token.cancel();
        if active.session.state.is_active() {
            active.session.state = WatchState::Cancelled;
            active.session.finished_at = Some(Utc::now());
            active.final_accumulated_ms = 0;
        }
    }

    fn spawn_signal_consumer(
        &self,
        mut signal_rx: mpsc::Receiver<FocusSignal>,
        target_ms: u64,
    ) -> JoinHandle<()> {
        let slot = self.slot.clone();
        let ledger = self.ledger.clone();
        let events = self.events.clone();
        let redirect_delay = self.config.redirect_delay;

        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                match signal {
                    FocusSignal::Progress {
                        percent,
                        accumulated_ms,
                    } => {
                        let _ = events.send(WatchEvent::Progress {
                            percent,
                            accumulated_ms,
                            target_ms,
                        });
                    }
                    FocusSignal::Finished { accumulated_ms } => {
                        complete_session(&slot, &*ledger, &events, redirect_delay, accumulated_ms)
                            .await;
                        break;
                    }
                }
            }
        })
    }
}

impl Drop for WatchController {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.try_lock() {
            if let Some(active) = slot.as_mut() {
                // FocusTimer::drop stops the poll loop
                active.timer.take();
                if let Some(consumer) = active.consumer.take() {
                    consumer.abort();
                }
                active.redirect_token.cancel();
            }
        }
    }
}

/// Two-phase settlement after the timer reports its target reached.
async fn complete_session(
    slot: &Mutex<Option<ActiveWatch>>,
    ledger: &dyn RewardLedger,
    events: &broadcast::Sender<WatchEvent>,
    redirect_delay: Duration,
    accumulated_ms: u64,
) {
    // Claim completion under the slot lock so a racing cancel either wins
    // before this point (and we bail) or becomes a no-op afterwards.
    let (session_id, promised) = {
        let mut guard = slot.lock().await;
        let Some(active) = guard.as_mut() else {
            return;
        };
        if !matches!(
            active.session.state,
            WatchState::Watching | WatchState::Paused
        ) {
            return;
        }
        let Some(session_id) = active.session.session_id.clone() else {
            debug_assert!(false, "settling a session without a server handle");
            active.session.state = WatchState::Failed;
            return;
        };
        active.session.state = WatchState::Completing;
        active.final_accumulated_ms = accumulated_ms;
        (session_id, active.session.reward_amount)
    };

    info!("view {session_id} reached its target; settling with the ledger");

    match ledger.complete_view(&session_id).await {
        Ok(completed) => {
            // the server-reported amount wins; the promise is only a fallback
            let credited = completed
                .credited_cents
                .map(|cents| cents as f64 / 100.0)
                .unwrap_or(promised);
            let finished_at = Utc::now();

            let destination = {
                let mut guard = slot.lock().await;
                let Some(active) = guard.as_mut() else {
                    return;
                };
                active.session.state = WatchState::Completed;
                active.session.credited_amount = Some(credited);
                active.session.finished_at = Some(finished_at);
                // the poll loop already stopped itself; release the handle
                active.timer.take();
                active
                    .session
                    .subject
                    .destination_url
                    .clone()
                    .map(|url| (url, active.redirect_token.clone()))
            };

            info!("view {session_id} credited {credited}");
            let _ = events.send(WatchEvent::Completed {
                session_id,
                credited_amount: credited,
                finished_at,
            });

            if let Some((url, token)) = destination {
                let _ = events.send(WatchEvent::RedirectPending {
                    url: url.clone(),
                    delay_ms: redirect_delay.as_millis() as u64,
                });
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(redirect_delay) => {
                        let _ = events.send(WatchEvent::Redirect { url });
                    }
                }
            }
        }
        Err(err) => {
            // the accumulated time is lost; tell the caller explicitly rather
            // than leaving stale progress on screen
            error!("settlement for view {session_id} failed: {err}");
            {
                let mut guard = slot.lock().await;
                if let Some(active) = guard.as_mut() {
                    active.session.state = WatchState::Failed;
                    active.session.finished_at = Some(Utc::now());
                    active.timer.take();
                }
            }
            let _ = events.send(WatchEvent::Failed {
                session_id,
                reason: err.to_string(),
            });
        }
    }
}

fn snapshot_of(session: &ViewSession, accumulated_ms: u64) -> WatchSnapshot {
    let percent = if session.target_ms == 0 {
        100.0
    } else {
        ((accumulated_ms as f64 / session.target_ms as f64) * 100.0).min(100.0)
    };

    WatchSnapshot {
        state: session.state,
        session_id: session.session_id.clone(),
        subject_id: session.subject.id.clone(),
        accumulated_ms,
        target_ms: session.target_ms,
        percent,
    }
}

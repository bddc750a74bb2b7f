use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::state::{FocusState, FocusStatus, Tick};

/// Signals forwarded from the poll loop to the session controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FocusSignal {
    Progress { percent: f64, accumulated_ms: u64 },
    Finished { accumulated_ms: u64 },
}

/// Owns the poll task that drives a [`FocusState`] toward its target.
///
/// The loop stops itself immediately after producing the finished signal, so
/// completion is delivered at most once per timer; afterwards further ticks
/// are impossible because polling has stopped.
pub struct FocusTimer {
    state: Arc<Mutex<FocusState>>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FocusTimer {
    /// Begin measuring focused time toward `target_ms`, reporting every
    /// processed tick on `signal_tx` at `poll_interval` cadence.
    pub fn start(
        target_ms: u64,
        slack_ms: u64,
        poll_interval: Duration,
        signal_tx: mpsc::Sender<FocusSignal>,
    ) -> Self {
        // Arm the accumulator before spawning so a pause arriving right after
        // construction can never observe an idle state.
        let mut initial = FocusState::new(target_ms, slack_ms);
        initial.begin(Instant::now());
        let state = Arc::new(Mutex::new(initial));

        let cancel_token = CancellationToken::new();
        let loop_state = state.clone();
        let loop_token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => {
                        debug!("focus poll loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let outcome = {
                    let mut guard = loop_state.lock().await;
                    if guard.status == FocusStatus::Paused {
                        // hidden surface: the tick is not accepted and the
                        // anchor stays put; resume() re-arms it
                        continue;
                    }
                    guard.tick(Instant::now())
                };

                match outcome {
                    Tick::Progress {
                        percent,
                        accumulated_ms,
                    } => {
                        let _ = signal_tx
                            .send(FocusSignal::Progress {
                                percent,
                                accumulated_ms,
                            })
                            .await;
                    }
                    Tick::Finished { accumulated_ms } => {
                        let _ = signal_tx.send(FocusSignal::Finished { accumulated_ms }).await;
                        break;
                    }
                    Tick::Ignored => {}
                }
            }
        });

        Self {
            state,
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Map a visibility change onto pause/resume.
    pub async fn set_hidden(&self, hidden: bool) {
        let mut guard = self.state.lock().await;
        if hidden {
            guard.pause();
        } else {
            guard.resume(Instant::now());
        }
    }

    pub async fn accumulated_ms(&self) -> u64 {
        self.state.lock().await.accumulated_ms
    }

    /// Stop polling and discard the accumulator. Idempotent; no finished
    /// signal can be delivered once this returns.
    pub async fn cancel(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.state.lock().await.cancel();
    }
}

impl Drop for FocusTimer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

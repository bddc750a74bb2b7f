use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusStatus {
    Idle,
    Running,
    Paused,
    Finished,
    Cancelled,
}

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Tick processed (accepted, or its gap discarded); still short of target.
    Progress { percent: f64, accumulated_ms: u64 },
    /// Target reached on this tick; the accumulator is now terminal.
    Finished { accumulated_ms: u64 },
    /// Tick observed outside the running state; nothing accumulated.
    Ignored,
}

/// Accumulates focused viewing time toward a target.
///
/// Time is measured as deltas between accepted ticks. A delta at or above the
/// slack bound is a suspend/backgrounding gap and is discarded outright rather
/// than clamped, so wall-clock time that was never focused is never credited.
#[derive(Debug, Clone)]
pub struct FocusState {
    pub status: FocusStatus,
    pub target_ms: u64,
    pub accumulated_ms: u64,
    pub slack_ms: u64,
    pub last_tick_at: Option<Instant>,
}

impl FocusState {
    pub fn new(target_ms: u64, slack_ms: u64) -> Self {
        Self {
            status: FocusStatus::Idle,
            target_ms,
            accumulated_ms: 0,
            slack_ms,
            last_tick_at: None,
        }
    }

    pub fn begin(&mut self, now: Instant) {
        debug_assert!(
            self.status == FocusStatus::Idle,
            "focus accumulator started twice"
        );
        self.accumulated_ms = 0;
        self.status = FocusStatus::Running;
        self.last_tick_at = Some(now);
    }

    pub fn pause(&mut self) {
        if self.status == FocusStatus::Running {
            self.status = FocusStatus::Paused;
        }
    }

    /// Resume after a visibility pause. The tick anchor is re-armed to `now`
    /// so the paused span is never counted.
    pub fn resume(&mut self, now: Instant) {
        if self.status == FocusStatus::Paused {
            self.status = FocusStatus::Running;
            self.last_tick_at = Some(now);
        }
    }

    pub fn tick(&mut self, now: Instant) -> Tick {
        match self.status {
            FocusStatus::Running => {}
            FocusStatus::Idle | FocusStatus::Paused => return Tick::Ignored,
            FocusStatus::Finished | FocusStatus::Cancelled => {
                debug_assert!(false, "tick observed after terminal state");
                return Tick::Ignored;
            }
        }

        // Read-then-write the anchor before anything else so a re-entrant
        // tick can never count the same span twice.
        let delta_ms = match self.last_tick_at.replace(now) {
            Some(prev) => now.saturating_duration_since(prev).as_millis() as u64,
            None => 0,
        };

        if delta_ms < self.slack_ms {
            self.accumulated_ms = self.accumulated_ms.saturating_add(delta_ms).min(self.target_ms);
        }
        // else: missed-tick/suspend gap, excluded from accumulation

        if self.accumulated_ms >= self.target_ms {
            self.status = FocusStatus::Finished;
            return Tick::Finished {
                accumulated_ms: self.accumulated_ms,
            };
        }

        Tick::Progress {
            percent: self.percent(),
            accumulated_ms: self.accumulated_ms,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.target_ms == 0 {
            return 100.0;
        }
        ((self.accumulated_ms as f64 / self.target_ms as f64) * 100.0).min(100.0)
    }

    /// Discard accumulation. Idempotent; safe from any state.
    pub fn cancel(&mut self) {
        self.status = FocusStatus::Cancelled;
        self.accumulated_ms = 0;
        self.last_tick_at = None;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, FocusStatus::Finished | FocusStatus::Cancelled)
    }
}

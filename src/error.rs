use thiserror::Error;

/// Errors surfaced by the external reward-ledger boundary.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger refused to open a view (already earned, cap reached,
    /// subject not promoted). Not retryable for this subject.
    #[error("subject not eligible: {0}")]
    Ineligible(String),

    /// Transport-level failure; the caller may retry.
    #[error("ledger request failed: {0}")]
    Transport(String),

    /// The ledger answered with something we could not interpret.
    #[error("unexpected ledger response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

/// Errors reported to the caller of the watch controller.
#[derive(Error, Debug)]
pub enum WatchError {
    /// A session is already starting, watching, paused, or completing.
    #[error("a watch session is already active")]
    AlreadyWatching,

    /// The start boundary refused the subject.
    #[error("subject not eligible: {0}")]
    Ineligible(String),

    /// A boundary round trip failed. On the completion phase the accumulated
    /// watch time is lost; it is never re-credited without a fresh round trip.
    #[error("ledger request failed: {0}")]
    Network(String),

    /// `cancel_watch` won the race against an in-flight start; the session
    /// was discarded before a server handle existed.
    #[error("the watch was cancelled before the start resolved")]
    Cancelled,

    /// A programming defect, not a runtime condition.
    #[error("watch invariant violated: {0}")]
    InvariantViolation(&'static str),
}

impl From<LedgerError> for WatchError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Ineligible(reason) => WatchError::Ineligible(reason),
            LedgerError::Transport(reason) => WatchError::Network(reason),
            LedgerError::Protocol(reason) => WatchError::Network(reason),
        }
    }
}

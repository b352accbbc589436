use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    // ── Input errors ─────────────────────────────────────────────────────────
    #[error("bad parameter: {0}")]
    BadParameter(String),

    #[error("not an unshielded address")]
    NotAnUnshieldedAddress,

    #[error("network mismatch: expected {expected}, got {got}")]
    NetworkMismatch { expected: String, got: String },

    #[error("bad length: expected {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("checksum mismatch")]
    ChecksumMismatch,

    // ── Derivation errors ────────────────────────────────────────────────────
    #[error("derived key out of range")]
    DerivationOutOfRange,

    // ── Funds errors ─────────────────────────────────────────────────────────
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: u128, available: u128 },

    // ── Transport errors ─────────────────────────────────────────────────────
    #[error("not connected to indexer")]
    NotConnected,

    #[error("stream handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("indexer error {code}: {message}")]
    RemoteError { code: String, message: String },

    #[error("invalid indexer response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    TimedOut,

    // ── Consistency errors ───────────────────────────────────────────────────
    #[error("reorg detected at depth {depth}")]
    ReorgDetected { depth: u64 },

    #[error("cursor regression: stored {stored}, received {received}")]
    CursorRegression { stored: u64, received: u64 },

    // ── Ledger errors ────────────────────────────────────────────────────────
    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("sealing failed: {0}")]
    SealFailed(String),

    #[error("unsealed binding rejected: {0}")]
    UnsealedBindingRejected(String),

    // ── Submission errors ────────────────────────────────────────────────────
    #[error("submission rejected: {reason}")]
    SubmissionRejected { reason: String },

    #[error("transaction expired before inclusion")]
    Expired,

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl WalletError {
    /// Transport-level failures that a retry with backoff may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, WalletError::NotConnected | WalletError::TimedOut)
    }
}

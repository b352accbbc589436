//! ─── Wallet Protocol Constants ──────────────────────────────────────────────
//!
//! Derivation schema, reconciliation depths and retry budgets shared across
//! the workspace.

use crate::types::Balance;

// ── Key derivation ───────────────────────────────────────────────────────────

/// BIP-44 purpose level (hardened).
pub const BIP44_PURPOSE: u32 = 44;

/// Registered coin type for Midnight (hardened).
pub const MIDNIGHT_COIN_TYPE: u32 = 2400;

// ── Transaction building ─────────────────────────────────────────────────────

/// Default TTL window for a freshly built intent, seconds past now.
pub const DEFAULT_TTL_SECS: i64 = 600;

/// Fees are covered by the reserved inputs: the builder reserves
/// `amount + fee` of the transferred token in one selection. Deployed
/// networks currently charge no fee on unshielded transfers, so both
/// terms are zero.
pub const FEE_BASE: Balance = 0;
pub const FEE_PER_OUTPUT: Balance = 0;

// ── Reconciliation ───────────────────────────────────────────────────────────

/// Reorgs at or below this depth are replayed from the fork checkpoint;
/// anything deeper triggers a full resync from cursor 0.
pub const SHALLOW_REORG_DEPTH: u64 = 32;

/// Per-address ring of (block height → cursor) checkpoints kept for
/// shallow-reorg recovery. Bounds sync-state size.
pub const CURSOR_CHECKPOINT_RING: usize = 64;

/// Blocks above a pending transaction's inclusion height before it is
/// considered final.
pub const CONFIRMATION_DEPTH: u64 = 6;

/// Seconds between pending-transaction lifecycle sweeps.
pub const PENDING_TICK_SECS: u64 = 2;

// ── Transport retry budgets ──────────────────────────────────────────────────

/// Attempts per request-channel call before the error surfaces.
pub const REQUEST_ATTEMPTS_MAX: u32 = 4;

/// Attempts to reserve inputs before a transient storage failure surfaces.
pub const RESERVE_RETRY_MAX: u32 = 3;

/// Truncated exponential backoff bounds, milliseconds.
pub const BACKOFF_BASE_MS: u64 = 250;
pub const BACKOFF_MAX_MS: u64 = 10_000;

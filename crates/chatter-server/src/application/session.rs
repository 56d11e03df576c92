//! Per-connection session state shared between cooperating tasks.
//!
//! Each connection runs three tasks — a reader loop, a delivery worker, and
//! an idle monitor — plus the shared broadcaster task that fans messages out
//! to it. They coordinate through the small lock-free primitives defined
//! here rather than through shared locked state:
//!
//! - [`ActivityClock`] – the last-activity timestamp, written by the reader
//!   on every inbound line and read by the idle monitor and the
//!   broadcaster's periodic sweep.
//! - [`ReceivingFlag`] – set by the delivery worker while a transport write
//!   is outstanding; read by the broadcaster's drop policy.
//! - [`EvictionSignal`] – a fire-at-most-once signal from either idle
//!   trigger to the reader loop.
//! - [`Lifecycle`] – the session state machine with an idempotent guard on
//!   the leave transition, so a racing idle eviction and manual disconnect
//!   cannot run the deregistration sequence twice.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chatter_core::SessionId;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Last-activity clock for one session.
///
/// Stores milliseconds elapsed since the clock's creation in an `AtomicU64`,
/// because an [`Instant`] itself cannot be stored atomically. The reader
/// task calls [`touch`](Self::touch) on every inbound line; the idle monitor
/// and the broadcaster sweep call [`idle_for`](Self::idle_for). `Relaxed`
/// ordering is sufficient: a stale read can only delay or hasten an idle
/// check by one scan interval.
pub struct ActivityClock {
    epoch: Instant,
    last_ms: AtomicU64,
}

impl ActivityClock {
    /// Creates a clock whose last activity is "now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    /// Records activity at the current instant.
    pub fn touch(&self) {
        let elapsed = self.epoch.elapsed().as_millis() as u64;
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Time elapsed since the last recorded activity.
    pub fn idle_for(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        let last = self.last_ms.load(Ordering::Relaxed);
        Duration::from_millis(now.saturating_sub(last))
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// True while the session's delivery worker has a transport write
/// outstanding. The broadcaster's `post` consults this flag to decide
/// whether a recipient gets the message immediately or via the slow-reader
/// watcher.
#[derive(Clone, Default)]
pub struct ReceivingFlag(Arc<AtomicBool>);

impl ReceivingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A fire-at-most-once eviction signal.
///
/// Both the per-session idle monitor and the broadcaster's registry sweep
/// may decide a session is idle; whichever calls [`fire`](Self::fire) first
/// wins, and every later call is a no-op. The reader loop awaits
/// [`wait`](Self::wait) alongside its transport reads.
#[derive(Clone, Default)]
pub struct EvictionSignal {
    fired: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl EvictionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. Returns `true` only for the first caller.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_one();
        true
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Completes once the signal has fired. Also completes immediately if it
    /// fired before this call.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// Registry entry for one connected session.
///
/// The `mailbox` sender inside the handle is the only long-lived producer
/// for the session's outbound queue. The connection handler moves it into
/// the broadcaster at registration, and the broadcaster drops it when the
/// session is removed from the registry — that drop is what closes the
/// mailbox, which structurally orders the close after removal and makes a
/// double close impossible.
pub struct SessionHandle {
    pub id: SessionId,
    pub name: String,
    pub mailbox: mpsc::UnboundedSender<String>,
    pub activity: Arc<ActivityClock>,
    pub receiving: ReceivingFlag,
    pub eviction: EvictionSignal,
}

// ── Lifecycle state machine ───────────────────────────────────────────────────

/// Phases a session moves through from accept to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Transport accepted, no identity yet.
    Connecting,
    /// Nickname prompt written; waiting for the first line.
    AwaitingIdentity,
    /// Registered with the broadcaster; relaying messages.
    Active,
    /// Input stream ended (client closed, EOF, or transport error).
    Leaving,
    /// The idle monitor or registry sweep forced the disconnect.
    IdleEvicted,
    /// Transport fully closed in both directions.
    Closed,
}

/// Tracks one session's phase and guards the leave transition.
///
/// `begin_leaving` and `begin_eviction` succeed only from `Active`, so the
/// deregister-then-announce sequence runs exactly once even if eviction and
/// a manual disconnect race each other.
#[derive(Debug)]
pub struct Lifecycle {
    phase: SessionPhase,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Connecting,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// `Connecting` → `AwaitingIdentity`.
    pub fn await_identity(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::Connecting);
        self.phase = SessionPhase::AwaitingIdentity;
    }

    /// `AwaitingIdentity` → `Active`.
    pub fn activate(&mut self) {
        debug_assert_eq!(self.phase, SessionPhase::AwaitingIdentity);
        self.phase = SessionPhase::Active;
    }

    /// `Active` → `Leaving`. Returns `false` if the session already left
    /// the `Active` phase.
    pub fn begin_leaving(&mut self) -> bool {
        if self.phase != SessionPhase::Active {
            return false;
        }
        self.phase = SessionPhase::Leaving;
        true
    }

    /// `Active` → `IdleEvicted`. Returns `false` if the session already
    /// left the `Active` phase.
    pub fn begin_eviction(&mut self) -> bool {
        if self.phase != SessionPhase::Active {
            return false;
        }
        self.phase = SessionPhase::IdleEvicted;
        true
    }

    /// Terminal transition; valid from any phase.
    pub fn close(&mut self) {
        self.phase = SessionPhase::Closed;
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

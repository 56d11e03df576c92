//! The single coordination loop that owns the session registry.
//!
//! Every operation that touches the set of connected sessions — register,
//! deregister, post — is a command on one `mpsc` queue, consumed by one
//! task. Because there is exactly one reader and writer of the registry,
//! mutations and fan-out decisions are totally ordered in arrival order and
//! no lock is needed. The same loop multiplexes a periodic tick that sweeps
//! the registry for idle sessions.
//!
//! # Delivery and the drop policy
//!
//! Fan-out must never stall on one slow recipient. A recipient whose
//! delivery worker has a transport write outstanding (its
//! [`ReceivingFlag`] is set) is handed to a detached watcher task instead of
//! being sent to inline. The watcher polls for up to the configured maximum
//! wait: if the recipient frees up in time the message is delivered late;
//! otherwise it is dropped *for that recipient only* and the drop is logged
//! with sender, recipient, and content. Best-effort delivery to slow
//! readers is the documented contract, not a bug.

use std::time::Duration;

use chatter_core::{arrival_notice, roster_notice, Message, SessionId};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::registry::Registry;
use crate::application::session::{ReceivingFlag, SessionHandle};

/// How often a slow-reader watcher re-checks the receiving flag.
const SLOW_READER_POLL: Duration = Duration::from_millis(10);

/// Timing knobs consumed by the broadcaster and the per-session tasks.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    /// How long a session may stay idle before it is evicted.
    pub idle_timeout: Duration,
    /// How long fan-out will wait for a slow reader before dropping.
    pub max_wait: Duration,
    /// Interval of the idle scans (broadcaster sweep and per-session monitor).
    pub scan_interval: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_wait: Duration::from_secs(2),
            scan_interval: Duration::from_secs(1),
        }
    }
}

/// Requests accepted by the coordination loop.
enum Command {
    Register(SessionHandle),
    Deregister(SessionId),
    Post(Message),
}

/// Cloneable handle for submitting requests to the broadcaster.
///
/// All three operations are fire-and-forget: the loop processes them in
/// arrival order, and none of them can fail once accepted. A send only
/// errors if the broadcaster task itself is gone (server shutdown), which
/// every caller treats as "nothing left to do".
#[derive(Clone)]
pub struct BroadcasterHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl BroadcasterHandle {
    /// Admits a session: it joins the registry, everyone (including the
    /// newcomer) is told it has arrived, then everyone receives the roster.
    pub fn register(&self, session: SessionHandle) {
        let _ = self.tx.send(Command::Register(session));
    }

    /// Removes a session from the registry and closes its mailbox.
    pub fn deregister(&self, id: SessionId) {
        let _ = self.tx.send(Command::Deregister(id));
    }

    /// Fans a message out to every registered session except its sender.
    pub fn post(&self, message: Message) {
        let _ = self.tx.send(Command::Post(message));
    }
}

/// The coordination loop state: the registry plus the timing policy.
pub struct Broadcaster {
    registry: Registry,
    policy: Policy,
}

impl Broadcaster {
    /// Spawns the coordination loop and returns a handle to it.
    ///
    /// The loop runs until every [`BroadcasterHandle`] clone is dropped.
    pub fn spawn(policy: Policy) -> BroadcasterHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let broadcaster = Self {
            registry: Registry::new(),
            policy,
        };
        tokio::spawn(broadcaster.run(rx));
        BroadcasterHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        let mut ticker = tokio::time::interval(self.policy.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Register(session)) => self.register(session),
                    Some(Command::Deregister(id)) => self.deregister(id),
                    Some(Command::Post(message)) => self.post(&message),
                    None => break,
                },
                _ = ticker.tick() => self.tick(),
            }
        }
        debug!("broadcaster loop stopped");
    }

    fn register(&mut self, session: SessionHandle) {
        let name = session.name.clone();
        info!(id = %session.id, name = %name, online = self.registry.len() + 1, "session registered");
        self.registry.insert(session);

        self.fan_out(&Message::from_server(arrival_notice(&name)));
        // Roster snapshot taken immediately after insertion, so the newcomer
        // is always included in it.
        let roster = roster_notice(&self.registry.names());
        self.fan_out(&Message::from_server(roster));
    }

    fn deregister(&mut self, id: SessionId) {
        if let Some(session) = self.registry.remove(id) {
            info!(id = %id, name = %session.name, online = self.registry.len(), "session deregistered");
            // Dropping the handle drops the registry's mailbox sender. That
            // is the one and only close of this session's mailbox, and it
            // happens strictly after the removal above — no later fan-out
            // can pick this session as a target.
            drop(session);
        }
    }

    fn post(&mut self, message: &Message) {
        // The sender's own inbound traffic counts as activity. The reader
        // loop also touches the clock directly, so idle detection does not
        // depend on this command having been processed yet.
        if let Some(sender_id) = message.sender.session_id() {
            if let Some(session) = self.registry.get(sender_id) {
                session.activity.touch();
            }
        }
        self.fan_out(message);
    }

    /// Periodic registry sweep: flags every session idle past the threshold
    /// for eviction. The eviction signal is one-shot, so sweeping a session
    /// that the per-session monitor already flagged is a no-op.
    fn tick(&self) {
        for session in self.registry.handles() {
            if session.activity.idle_for() >= self.policy.idle_timeout && session.eviction.fire() {
                info!(id = %session.id, name = %session.name, "idle session flagged for eviction");
            }
        }
    }

    fn fan_out(&self, message: &Message) {
        let line = message.render();
        let exclude = message.sender.session_id();
        for session in self.registry.handles() {
            if exclude == Some(session.id) {
                continue;
            }
            self.deliver(session, message, line.clone());
        }
    }

    fn deliver(&self, session: &SessionHandle, message: &Message, line: String) {
        if session.receiving.is_set() {
            // Slow reader: hand this recipient off to a watcher so the rest
            // of the fan-out is not held up.
            tokio::spawn(wait_for_slow_reader(
                session.mailbox.clone(),
                session.receiving.clone(),
                line,
                message.sender.display_name().to_string(),
                session.name.clone(),
                message.text.clone(),
                self.policy.max_wait,
            ));
        } else if session.mailbox.send(line).is_err() {
            // The delivery worker dropped its receiver (transport write
            // failed); the session is tearing down and will deregister.
            debug!(id = %session.id, name = %session.name, "mailbox gone, session is tearing down");
        }
    }
}

/// Deferred delivery to one slow recipient.
///
/// Polls the recipient's receiving flag until it clears (deliver late) or
/// the deadline passes (drop, with a server-side log). Holds a clone of the
/// mailbox sender for at most `max_wait`, so a deregistered session's
/// mailbox may close up to that much later; a send to an already-closed
/// mailbox is simply discarded.
async fn wait_for_slow_reader(
    mailbox: mpsc::UnboundedSender<String>,
    receiving: ReceivingFlag,
    line: String,
    sender: String,
    recipient: String,
    content: String,
    max_wait: Duration,
) {
    let deadline = Instant::now() + max_wait;
    loop {
        if !receiving.is_set() {
            if mailbox.send(line).is_err() {
                debug!(recipient = %recipient, "late delivery skipped, mailbox already closed");
            }
            return;
        }
        if Instant::now() >= deadline {
            warn!(
                sender = %sender,
                recipient = %recipient,
                content = %content,
                "message dropped for slow reader"
            );
            return;
        }
        tokio::time::sleep(SLOW_READER_POLL).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

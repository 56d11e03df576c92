//! Per-connection handling: handshake, reader loop, idle monitor, and the
//! delivery worker.
//!
//! Each accepted connection runs as three cooperating tasks:
//!
//! ```text
//! handle_connection (reader loop)
//!   ├─ delivery_worker   -- drains the mailbox onto the write half
//!   └─ idle_monitor      -- fires the eviction signal after the idle timeout
//! ```
//!
//! The reader loop owns the session's lifecycle. It performs the nickname
//! handshake, registers the session (handing the mailbox sender to the
//! broadcaster), relays every inbound line as a `post`, and — on EOF,
//! transport error, or eviction — runs the leave sequence exactly once:
//! deregister, then announce the departure.
//!
//! # Half-close on eviction
//!
//! Tokio's split TCP halves have no per-direction shutdown, so eviction uses
//! the cooperative form: the reader loop simply stops reading, the idle
//! warning travels over a dedicated oneshot to the delivery worker (the
//! owner of the write half), and the worker writes it, shuts the write half
//! down, and exits.

use std::net::SocketAddr;
use std::sync::Arc;

use chatter_core::{
    departure_notice, idle_warning, name_confirmation, nickname_prompt, Message, SessionId,
};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::application::broadcaster::{BroadcasterHandle, Policy};
use crate::application::session::{
    ActivityClock, EvictionSignal, Lifecycle, ReceivingFlag, SessionHandle,
};

/// Drives one client connection from accept to close.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: BroadcasterHandle,
    policy: Policy,
) {
    let (read_half, write_half) = stream.into_split();
    let (mail_tx, mail_rx) = mpsc::unbounded_channel::<String>();
    let (warn_tx, warn_rx) = oneshot::channel::<&'static str>();
    let receiving = ReceivingFlag::new();

    let worker = tokio::spawn(delivery_worker(
        write_half,
        mail_rx,
        receiving.clone(),
        warn_rx,
    ));

    let mut lifecycle = Lifecycle::new();
    let mut lines = BufReader::new(read_half).lines();

    let _ = mail_tx.send(nickname_prompt().to_string());
    lifecycle.await_identity();

    // The first line read is the display name; no validation, no uniqueness
    // check.
    let name = match lines.next_line().await {
        Ok(Some(line)) => trim_cr(line),
        Ok(None) | Err(_) => {
            debug!(%peer, "connection closed before a nickname was read");
            drop(mail_tx);
            let _ = worker.await;
            return;
        }
    };

    let id = SessionId::new_v4();
    let activity = Arc::new(ActivityClock::new());
    let eviction = EvictionSignal::new();

    let _ = mail_tx.send(name_confirmation(&name));

    // Registration transfers the mailbox sender into the registry; from here
    // on, only the broadcaster can produce into (or close) the mailbox.
    broadcaster.register(SessionHandle {
        id,
        name: name.clone(),
        mailbox: mail_tx,
        activity: activity.clone(),
        receiving,
        eviction: eviction.clone(),
    });
    lifecycle.activate();
    info!(%peer, %id, name = %name, "session active");

    let monitor = tokio::spawn(idle_monitor(activity.clone(), eviction.clone(), policy));

    let evicted = read_loop(&mut lines, &broadcaster, id, &name, &activity, &eviction).await;

    monitor.abort();

    let leaving = if evicted {
        lifecycle.begin_eviction()
    } else {
        lifecycle.begin_leaving()
    };
    if leaving {
        if evicted {
            info!(%peer, %id, name = %name, "evicting idle session");
            let _ = warn_tx.send(idle_warning());
        }
        broadcaster.deregister(id);
        broadcaster.post(Message::from_server(departure_notice(&name)));
    }

    // Wait for the worker to drain the mailbox (closed by the deregistration)
    // or finish writing the idle warning, then the transport is fully closed.
    let _ = worker.await;
    lifecycle.close();
    info!(%peer, %id, name = %name, "connection closed");
}

/// Relays inbound lines until EOF, transport error, or eviction.
///
/// Returns `true` if the loop ended because the eviction signal fired.
async fn read_loop(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    broadcaster: &BroadcasterHandle,
    id: SessionId,
    name: &str,
    activity: &ActivityClock,
    eviction: &EvictionSignal,
) -> bool {
    loop {
        tokio::select! {
            read = lines.next_line() => match read {
                Ok(Some(line)) => {
                    // Refresh the clock here as well as in `post`, so idle
                    // detection is accurate even before the broadcaster has
                    // processed the command.
                    activity.touch();
                    broadcaster.post(Message::from_user(id, name, trim_cr(line)));
                }
                Ok(None) => return false,
                Err(e) => {
                    debug!(name = %name, error = %e, "read failed, treating as disconnect");
                    return false;
                }
            },
            _ = eviction.wait() => return true,
        }
    }
}

/// Per-session idle monitor: checks the activity clock every scan interval
/// and fires the eviction signal on the first exceedance, then stops.
async fn idle_monitor(activity: Arc<ActivityClock>, eviction: EvictionSignal, policy: Policy) {
    let mut ticker = tokio::time::interval(policy.scan_interval);
    loop {
        ticker.tick().await;
        if activity.idle_for() >= policy.idle_timeout {
            eviction.fire();
            return;
        }
    }
}

/// Drains the session's mailbox onto the transport.
///
/// The receiving flag is set for the duration of each write; the
/// broadcaster's drop policy reads it to spot a stuck recipient. The worker
/// ends when the mailbox closes (the session was deregistered) or a write
/// fails, and on eviction it writes the final warning and shuts the write
/// half down itself.
pub(crate) async fn delivery_worker<W: AsyncWrite + Unpin>(
    mut transport: W,
    mut mailbox: mpsc::UnboundedReceiver<String>,
    receiving: ReceivingFlag,
    mut warning: oneshot::Receiver<&'static str>,
) {
    let mut warning_pending = true;
    loop {
        tokio::select! {
            line = mailbox.recv() => match line {
                Some(line) => {
                    receiving.set();
                    let result = write_line(&mut transport, &line).await;
                    receiving.clear();
                    if let Err(e) = result {
                        debug!(error = %e, "transport write failed, stopping delivery");
                        break;
                    }
                }
                None => break,
            },
            result = &mut warning, if warning_pending => {
                warning_pending = false;
                if let Ok(text) = result {
                    let _ = write_line(&mut transport, text).await;
                    break;
                }
                // Sender side dropped without an eviction; keep draining the
                // mailbox until it closes.
            }
        }
    }
    let _ = transport.shutdown().await;
}

async fn write_line<W: AsyncWrite + Unpin>(transport: &mut W, line: &str) -> std::io::Result<()> {
    transport.write_all(line.as_bytes()).await?;
    transport.write_all(b"\n").await?;
    transport.flush().await
}

/// Strips one trailing carriage return, for clients that send `\r\n`.
fn trim_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_trim_cr_strips_one_trailing_carriage_return() {
        assert_eq!(trim_cr("hello\r".to_string()), "hello");
        assert_eq!(trim_cr("hello".to_string()), "hello");
        assert_eq!(trim_cr("\r".to_string()), "");
        assert_eq!(trim_cr(String::new()), "");
    }

    #[tokio::test]
    async fn test_delivery_worker_writes_lines_and_ends_on_mailbox_close() {
        let (far_end, near_end) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_warn_tx, warn_rx) = oneshot::channel();

        tx.send("first".to_string()).unwrap();
        tx.send("second".to_string()).unwrap();
        drop(tx);

        let worker = tokio::spawn(delivery_worker(
            near_end,
            rx,
            ReceivingFlag::new(),
            warn_rx,
        ));

        let mut reader = BufReader::new(far_end).lines();
        assert_eq!(reader.next_line().await.unwrap(), Some("first".to_string()));
        assert_eq!(reader.next_line().await.unwrap(), Some("second".to_string()));
        // Mailbox closed: the worker shuts the transport down.
        assert_eq!(reader.next_line().await.unwrap(), None);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_delivery_worker_writes_warning_then_closes() {
        let (far_end, near_end) = tokio::io::duplex(1024);
        let (_tx, rx) = mpsc::unbounded_channel::<String>();
        let (warn_tx, warn_rx) = oneshot::channel();

        let worker = tokio::spawn(delivery_worker(
            near_end,
            rx,
            ReceivingFlag::new(),
            warn_rx,
        ));

        warn_tx.send(idle_warning()).unwrap();

        let mut reader = BufReader::new(far_end).lines();
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some(idle_warning().to_string())
        );
        assert_eq!(reader.next_line().await.unwrap(), None);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_warning_sender_does_not_stop_the_worker() {
        let (far_end, near_end) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::unbounded_channel();
        let (warn_tx, warn_rx) = oneshot::channel::<&'static str>();

        let worker = tokio::spawn(delivery_worker(
            near_end,
            rx,
            ReceivingFlag::new(),
            warn_rx,
        ));

        // A normal (non-evicted) teardown drops the warning sender first.
        drop(warn_tx);
        tx.send("after drop".to_string()).unwrap();

        let mut reader = BufReader::new(far_end).lines();
        assert_eq!(
            reader.next_line().await.unwrap(),
            Some("after drop".to_string())
        );
        drop(tx);
        assert_eq!(reader.next_line().await.unwrap(), None);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_receiving_flag_is_set_while_a_write_is_stuck() {
        // A 4-byte duplex buffer that nobody reads blocks the worker
        // mid-write, which is exactly the "currently receiving" condition
        // the drop policy looks for.
        let (mut far_end, near_end) = tokio::io::duplex(4);
        let (tx, rx) = mpsc::unbounded_channel();
        let (_warn_tx, warn_rx) = oneshot::channel::<&'static str>();
        let receiving = ReceivingFlag::new();

        let _worker = tokio::spawn(delivery_worker(
            near_end,
            rx,
            receiving.clone(),
            warn_rx,
        ));

        tx.send("a line much longer than the buffer".to_string())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(receiving.is_set(), "stuck write must show as receiving");

        // Draining the far end unblocks the write and clears the flag.
        let mut sink = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = far_end.read(&mut buf).await.unwrap();
            sink.extend_from_slice(&buf[..n]);
            if sink.ends_with(b"\n") {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!receiving.is_set());
    }
}

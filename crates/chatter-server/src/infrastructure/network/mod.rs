//! Network infrastructure for the chat server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP listener and runs the accept loop,
//!   spawning one connection handler per client.
//!
//! - **`connection`** – Everything that happens on one accepted connection:
//!   the nickname handshake, the reader loop, the per-session idle monitor,
//!   and the delivery worker that drains the mailbox onto the socket.

pub mod connection;
pub mod listener;

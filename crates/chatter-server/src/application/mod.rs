//! Application layer for the chat server.
//!
//! This layer holds the coordination logic that makes the server correct
//! under concurrency, with no OS calls, no sockets, and no file system
//! access — everything here is driven through channels and shared atomics,
//! so it is fully testable without a network.
//!
//! # Sub-modules
//!
//! - **`broadcaster`** – The single coordination loop that owns the session
//!   registry. All registration, deregistration, and message fan-out flows
//!   through its one command queue, which is what makes registry mutations
//!   race-free without locks.
//!
//! - **`registry`** – The broadcaster's private map of connected sessions.
//!
//! - **`session`** – Per-connection state shared between tasks: the activity
//!   clock, the receiving flag, the one-shot eviction signal, and the
//!   session lifecycle state machine.

pub mod broadcaster;
pub mod registry;
pub mod session;

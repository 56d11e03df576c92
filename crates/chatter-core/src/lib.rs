//! # chatter-core
//!
//! Shared library for the Chatter broadcast server containing the message
//! value type, wall-clock line rendering, and the fixed server notice text.
//!
//! This crate is the pure-domain foundation: it has zero dependencies on
//! sockets, the async runtime, or the file system, so every formatting rule
//! the server puts on the wire can be unit-tested without I/O.
//!
//! - **`message`** – The immutable [`Message`] value (sender, text, creation
//!   time) and its wire rendering `<time>: <sender>: <text>`.
//! - **`notice`** – Builders for the fixed server-to-client lines: the
//!   nickname prompt, arrival/departure notices, the online roster, and the
//!   idle-eviction warning.

pub mod message;
pub mod notice;

pub use message::{Message, Sender, SessionId};
pub use notice::{
    arrival_notice, departure_notice, idle_warning, name_confirmation, nickname_prompt,
    roster_notice,
};

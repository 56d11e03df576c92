//! Infrastructure layer for the chat server.
//!
//! Contains the OS-facing adapters: TCP sockets and file-system
//! configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `chatter_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;

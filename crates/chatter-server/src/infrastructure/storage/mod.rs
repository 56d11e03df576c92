//! File-system storage for the chat server: TOML configuration loading.

pub mod config;

//! Coordination core for the archive worker process: line-delimited packet
//! protocol, subprocess supervision, listener fan-out and worker sessions.

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod proto;
pub mod registry;
pub mod session;
pub mod supervisor;

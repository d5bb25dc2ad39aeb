//! Relaybot - Chat Relay Bot
//!
//! This crate relays text messages from chat users to a text-generation
//! service and back. Each user gets a request quota measured in rolling
//! one-minute windows and a bounded conversation memory that expires after
//! a period of inactivity.

pub mod backend;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ratelimit;
pub mod session;
pub mod state;
pub mod transport;
pub mod user;

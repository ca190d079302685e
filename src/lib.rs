//! Intent action service: maps recognized voice intents to action handlers.

pub mod actions;
pub mod channels;
pub mod config;
pub mod error;
pub mod messages;
pub mod router;
pub mod service;

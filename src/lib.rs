//! mirbot - a modular IRC bot
//!
//! The core keeps one server connection, a SQLite-backed variable store and a
//! registry of behavior modules whose `u_`-prefixed handlers are invoked for
//! protocol events and chat commands.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod modules;

pub use application::errors::BotError;
pub use application::services::{CoreHandle, Disconnect, MirCore};
pub use infrastructure::config::Config;

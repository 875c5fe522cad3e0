//! Platform adapters

pub mod irc;

pub use irc::{IrcConnection, Outbound};

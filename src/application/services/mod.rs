//! Application services - Core engine and what handlers see of it

pub mod command_service;
pub mod core_service;
pub mod handle;

pub use command_service::{CoreCommand, Invocation};
pub use core_service::{Disconnect, MirCore};
pub use handle::{unixtime, CoreHandle};

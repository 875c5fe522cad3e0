//! Domain entities - Core protocol objects with no I/O

pub mod channel;
pub mod event;
pub mod session;

pub use channel::{irc_eq, irc_to_lower, ChannelMembership, JoinedChannel};
pub use event::{is_channel_name, ProtocolEvent, Source};
pub use session::{RegistrationState, Session};

//! Event handling - Line parsing and handler routing

pub mod dispatcher;
pub mod parser;

pub use dispatcher::{command_handler_name, event_handler_name, EventDispatcher, HandlerCall};
pub use parser::{parse_line, CommandParser, ParsedCommand};

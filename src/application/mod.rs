//! Application layer - Use cases and business logic
//! 
//! This layer contains:
//! - Services: The core engine and built-in handlers
//! - Errors: Domain-specific errors
//! - Messaging: Line parsing and handler routing

pub mod errors;
pub mod services;
pub mod messaging;

//! Domain layer - Core protocol model with no I/O
//! 
//! This layer contains:
//! - Entities: Session, channel membership, parsed protocol events
//! - Traits: Abstractions for infrastructure (VariableStore)

pub mod entities;
pub mod traits;

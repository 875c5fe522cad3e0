//! Infrastructure layer - External concerns
//! 
//! This layer contains:
//! - Config: Configuration loading
//! - Database / Storage: Variable persistence
//! - Adapters: The IRC connection
//! - Modules: Loading behavior modules

pub mod config;
pub mod database;
pub mod storage;
pub mod adapters;
pub mod modules;

//! Shared leaf crate for the telegrab bot: configuration, external binary
//! discovery and the job error taxonomy.

pub mod config;
pub mod error;
pub mod platform;

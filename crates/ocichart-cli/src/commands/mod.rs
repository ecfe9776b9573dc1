//! CLI commands

pub mod index;
pub mod pull;
pub mod serve;

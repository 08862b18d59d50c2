//! Command implementations for the Stratum CLI.

pub mod serve;
pub mod setup;
pub mod validate;

//! CLI command implementations.

pub mod init;
pub mod register;
pub mod serve;

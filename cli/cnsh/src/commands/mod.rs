//! CLI command implementations.

pub mod init;
pub mod packages;
pub mod publish;

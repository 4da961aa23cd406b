//! CLI command implementations.

pub mod bundle;
pub mod init;
pub mod preview;

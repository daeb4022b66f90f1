//! # Configuration
//!
//! Server configuration resolved from defaults, files, the environment, and
//! the command line.

pub mod server;

//! The `toolbridge` command-line adapter.
//!
//! Everything here is presentation and wiring; behavior lives in
//! `toolbridge-mcp` and `toolbridge-install`.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliConfig, CliContext, bootstrap};
pub use commands::{CacheCommand, Commands, RegistryCommand, ServersCommand};
pub use error::{CliError, exit_code_for};
pub use parser::Cli;

//! Herald CLI library
//!
//! Everything the `herald` binary needs outside `main`: argument parsing,
//! layered configuration, instance directory setup and the default
//! collaborator set.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod setup;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::{CliError, Result};

//! Command-line checks for SQL scripts.
//!
//! `script-check` splits a script into statements, classifies each one and
//! validates the script against a protected-object list, using the same
//! rules the engine pool applies before running a script.

pub mod commands;
pub mod config;
mod error;
pub mod observability;

pub use commands::{Command, CommandOutput, read_script, run};
pub use error::{Error, Result};

//! CLI command handlers

pub mod commands;

pub use commands::{check, compile, eval, parse_assignment, run};

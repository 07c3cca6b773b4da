//! kvlock command line
//!
//! - `config`: layered configuration (file, environment, arguments)
//! - `startup`: logging bootstrap
//! - `command`: `acquire`, `release` and `run` subcommands

pub mod command;
pub mod config;
pub mod startup;

//! # courier-cli
//!
//! Command-line interface for the Courier agent.
//!
//! ## Commands
//!
//! - `courier start`: run the poll loop (and the status server)
//! - `courier status`: query a running agent's status endpoint
//! - `courier config`: show the effective configuration, secrets redacted
//! - `courier doctor`: validate the configuration
//! - `courier address`: print the ledger address of the configured key

pub mod commands;

pub use commands::Cli;

//! confstore Server - command-line host for the tenant storage core
//!
//! Wires configuration, logging and the storage client together and exposes
//! the storage operations as subcommands.

pub mod cli;
pub mod commands;
pub mod configuration;
pub mod logging;

//! # enzo-cli
//!
//! Library side of the `enzo` binary: configuration loading and the
//! subcommand implementations, kept here so they can be tested.

pub mod commands;
pub mod config;

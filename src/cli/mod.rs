//! Command-line front-ends
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
pub mod interactive;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, CliOutputFormat, CliRemover};

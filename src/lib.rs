#![warn(clippy::uninlined_format_args)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod core;
pub mod env;
pub mod paths;

pub use adapters::inbound::cli::{Cli, Commands};

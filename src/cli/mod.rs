//! Command-line interface

mod commands;

pub use commands::{Cli, Commands, ServeArgs, SweepArgs};

//! Terminal host for the `comfy-setup` binary.
//!
//! The library never touches the terminal itself. This module is the
//! binary's side of the channel: it parses launch flags, answers the
//! install wizard and offers repair tasks as prompts.

pub mod args;
pub mod terminal;

pub use args::Cli;
pub use terminal::{Presets, TerminalHost};

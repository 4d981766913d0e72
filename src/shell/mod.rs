//! Subprocess execution and platform helpers.

pub mod command;
pub mod mock;
pub mod platform;

pub use command::{
    display_command, execute_streaming, CommandOptions, CommandResult, CommandRunner,
    OutputLine, SystemRunner,
};
pub use mock::{Invocation, ScriptedResponse, ScriptedRunner};
pub use platform::{is_executable, parse_system_path, resolve_tool_path, Platform};

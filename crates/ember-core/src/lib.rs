//! Core utilities shared by the renderer crates.

// crate-specific lint exceptions:
#![allow(clippy::needless_pass_by_value)]

mod command_line;
mod console;
mod memory;

pub use command_line::CommandLine;
pub use console::{ConsoleCommand, ConsoleRegistry, CvarFloat, CvarInt, CvarBool};
pub use memory::{Handle, SubmissionPool};

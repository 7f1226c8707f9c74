//! Console front end
//!
//! Keyboard control of a running session, the fixed-length timer display and
//! the overwrite prompt. Raw terminal mode is unix only; elsewhere keys are
//! read line by line.

mod control_loop;
mod prompt;
mod terminal;

pub use control_loop::{run_fixed_length, run_interactive};
pub use prompt::ConsolePrompt;
pub use terminal::{restore_terminal, stdin_key_source};

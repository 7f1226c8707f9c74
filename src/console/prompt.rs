use std::io::{BufRead, Write};

use crate::capture::OverwritePrompt;

/// Asks on stdout and reads a y/n answer from stdin. Anything but `y`/`yes`
/// declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl OverwritePrompt for ConsolePrompt {
    fn confirm(&self, message: &str) -> bool {
        let mut stdout = std::io::stdout();
        if write!(stdout, "{} [y/N] ", message).and_then(|_| stdout.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

//! Single-keypress input from an interactive terminal

use std::io::BufReader;

use super::control_loop::{KeySource, PipedInput};

/// Keys from stdin: raw keypresses on a unix terminal, lines otherwise
pub fn stdin_key_source() -> Box<dyn KeySource> {
    #[cfg(unix)]
    if let Some(terminal) = unix::TerminalInput::new() {
        return Box::new(terminal);
    }

    Box::new(PipedInput::new(BufReader::new(std::io::stdin())))
}

/// Put the terminal back the way it was found. Safe to call from a signal
/// handler thread and more than once.
pub fn restore_terminal() {
    #[cfg(unix)]
    unix::restore();
}

#[cfg(unix)]
mod unix {
    use std::io::Read;
    use std::sync::OnceLock;
    use tracing::{debug, warn};

    use super::KeySource;

    static ORIGINAL: OnceLock<libc::termios> = OnceLock::new();

    /// Unbuffered keypresses without echo. Signal keys (Ctrl+C) keep working.
    pub struct TerminalInput {
        stdin: std::io::Stdin,
    }

    impl TerminalInput {
        /// `None` when stdin is not a terminal or its mode cannot be changed
        pub fn new() -> Option<Self> {
            // SAFETY: plain libc calls on fd 0 with a zeroed termios out-param
            unsafe {
                if libc::isatty(libc::STDIN_FILENO) != 1 {
                    return None;
                }

                let mut attrs: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(libc::STDIN_FILENO, &mut attrs) != 0 {
                    warn!("tcgetattr failed, falling back to line input");
                    return None;
                }
                let original = *ORIGINAL.get_or_init(|| attrs);

                let mut raw = original;
                raw.c_lflag &= !(libc::ICANON | libc::ECHO);
                raw.c_cc[libc::VMIN] = 1;
                raw.c_cc[libc::VTIME] = 0;
                if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) != 0 {
                    warn!("tcsetattr failed, falling back to line input");
                    return None;
                }
            }

            debug!("Terminal switched to single-key input");
            Some(Self {
                stdin: std::io::stdin(),
            })
        }
    }

    impl KeySource for TerminalInput {
        fn read_char(&mut self) -> Option<char> {
            let mut byte = [0u8; 1];
            match self.stdin.lock().read(&mut byte) {
                Ok(1) => Some(char::from(byte[0]).to_ascii_lowercase()),
                _ => None,
            }
        }
    }

    impl Drop for TerminalInput {
        fn drop(&mut self) {
            restore();
        }
    }

    pub fn restore() {
        if let Some(original) = ORIGINAL.get() {
            // SAFETY: restores attributes previously read from the same fd
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, original);
            }
        }
    }
}

/*!
 Helpers for rendering progress messages to the terminal.
*/

/// Emit a message for a long-running step, without a trailing newline
pub fn processing(message: &str) {
    eprint!("\r{message}...");
}

/// Clear the current progress line once a long-running step completes
pub fn done_processing() {
    eprint!("\x1b[2K\r");
}

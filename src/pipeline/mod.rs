//! Turn orchestration: recognition, streaming generation, incremental
//! speech dispatch, and directive execution.

pub mod turn;

pub use turn::TurnRunner;

use std::io::Write;

/// Print streamed text immediately, translating newlines when the terminal
/// is in raw mode (the key loop keeps it raw while a turn is printing).
pub(crate) fn emit(text: &str) {
    let mut out = std::io::stdout();
    if crossterm::terminal::is_raw_mode_enabled().unwrap_or(false) {
        let _ = out.write_all(text.replace('\n', "\r\n").as_bytes());
    } else {
        let _ = out.write_all(text.as_bytes());
    }
    let _ = out.flush();
}

/// `emit` plus a trailing newline.
pub(crate) fn emit_line(text: &str) {
    emit(text);
    emit("\n");
}

//! Push-to-talk interaction loop.
//!
//! The foreground thread owns the terminal and the recorder and blocks on
//! key events. Each finished take is handed to a per-turn thread running
//! transcription and generation; the key loop keeps polling so SPACE can
//! interrupt playback and reclaim the floor mid-reply. The turn thread is
//! always joined before the next turn starts.

use crate::audio::Recorder;
use crate::error::{Result, WispError};
use crate::pipeline::{TurnRunner, emit_line};
use crate::speech::control::SpeechControl;
use crate::speech::worker::InterruptHandle;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the key loop wakes while a turn thread is running.
const TURN_POLL: Duration = Duration::from_millis(50);

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ToggleRecording,
    ClearContext,
    Quit,
    Ignore,
}

fn classify(key: &KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::Ignore;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Action::Quit,
            _ => Action::Ignore,
        };
    }
    match key.code {
        KeyCode::Char(' ') => Action::ToggleRecording,
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('c') => Action::ClearContext,
        _ => Action::Ignore,
    }
}

/// Restores the terminal even when a turn errors out.
struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode().map_err(WispError::Io)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub struct InteractionLoop {
    runner: TurnRunner,
    recorder: Recorder,
    control: Arc<SpeechControl>,
    interrupt: Option<InterruptHandle>,
}

impl InteractionLoop {
    pub fn new(
        runner: TurnRunner,
        recorder: Recorder,
        control: Arc<SpeechControl>,
        interrupt: Option<InterruptHandle>,
    ) -> Self {
        Self {
            runner,
            recorder,
            control,
            interrupt,
        }
    }

    /// Run until the user quits.
    ///
    /// # Errors
    ///
    /// Returns an error when the terminal cannot enter raw mode or key
    /// events cannot be read. Turn-level failures are reported and the
    /// loop returns to idle.
    pub fn run(&mut self) -> Result<()> {
        let _guard = RawModeGuard::new()?;
        emit_line("Ready. SPACE to talk (again to send), c to clear context, q to quit.");

        loop {
            let event = event::read().map_err(WispError::Io)?;
            let Event::Key(key) = event else { continue };
            match classify(&key) {
                Action::Ignore => {}
                Action::Quit => {
                    self.interrupt_speech();
                    break;
                }
                Action::ClearContext => {
                    self.interrupt_speech();
                    self.runner.reset_context();
                    emit_line("Context cleared.");
                }
                Action::ToggleRecording => {
                    if self.recorder.is_recording() {
                        let samples = self.recorder.stop();
                        if self.run_turn(samples)? {
                            break;
                        }
                    } else {
                        self.start_recording();
                    }
                }
            }
        }
        emit_line("Bye.");
        Ok(())
    }

    /// Cut off anything audible or queued before the user takes the floor.
    fn interrupt_speech(&self) {
        match &self.interrupt {
            Some(handle) => handle.interrupt(),
            None => {
                self.control.interrupt();
            }
        }
    }

    fn start_recording(&mut self) {
        self.interrupt_speech();
        match self.recorder.start() {
            Ok(()) => emit_line("Recording... SPACE to send."),
            Err(e) => emit_line(&format!("Cannot record: {e}")),
        }
    }

    /// Run one turn on its own thread while this thread keeps reading keys.
    /// Returns true when the user asked to quit mid-turn.
    fn run_turn(&mut self, samples: Vec<f32>) -> Result<bool> {
        let runner = &mut self.runner;
        let recorder = &mut self.recorder;
        let control = &self.control;
        let interrupt = &self.interrupt;
        let mut quit = false;

        std::thread::scope(|s| {
            let turn = s.spawn(move || {
                if let Err(e) = runner.voice_turn(&samples) {
                    warn!("turn failed: {e}");
                    emit_line(&format!("(turn failed: {e})"));
                }
            });

            while !turn.is_finished() {
                if !event::poll(TURN_POLL).unwrap_or(false) {
                    continue;
                }
                let Ok(Event::Key(key)) = event::read() else {
                    continue;
                };
                match classify(&key) {
                    Action::Quit => {
                        quit = true;
                        match interrupt {
                            Some(handle) => handle.interrupt(),
                            None => {
                                control.interrupt();
                            }
                        }
                    }
                    Action::ToggleRecording => {
                        // The user wants the floor back: void the current
                        // turn and start the next take immediately.
                        match interrupt {
                            Some(handle) => handle.interrupt(),
                            None => {
                                control.interrupt();
                            }
                        }
                        if !recorder.is_recording() {
                            match recorder.start() {
                                Ok(()) => emit_line("\nRecording... SPACE to send."),
                                Err(e) => emit_line(&format!("Cannot record: {e}")),
                            }
                        }
                    }
                    Action::ClearContext | Action::Ignore => {}
                }
            }

            if turn.join().is_err() {
                warn!("turn thread panicked");
            }
        });

        debug!("turn thread joined");
        Ok(quit)
    }
}

/// Line-based text loop for running without audio.
///
/// # Errors
///
/// Returns an error when stdin cannot be read.
pub fn run_chat(runner: &mut TurnRunner) -> Result<()> {
    use std::io::{BufRead, Write};

    emit_line("Type a message, or 'q' to quit.");
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush().ok();

        line.clear();
        if stdin.lock().read_line(&mut line).map_err(WispError::Io)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "q" || text == "quit" || text == "exit" {
            break;
        }
        if text == "clear" {
            runner.reset_context();
            emit_line("Context cleared.");
            continue;
        }

        print!("Wisp: ");
        std::io::stdout().flush().ok();
        if let Err(e) = runner.text_turn(text) {
            emit_line(&format!("(turn failed: {e})"));
        }
    }
    emit_line("Bye.");
    Ok(())
}

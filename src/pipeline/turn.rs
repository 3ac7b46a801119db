//! One conversational turn, end to end: transcription, streamed generation
//! through the tag filter and chunker, incremental speech, and directive
//! execution with a feedback generation.

use crate::context::ContextWindowManager;
use crate::directive::extract::extract;
use crate::directive::filter::StreamingTagFilter;
use crate::directive::Directive;
use crate::engine::{
    ChatMessage, GenerationEngine, GenerationRequest, RecognitionEngine,
};
use crate::error::{Result, WispError};
use crate::pipeline::{emit, emit_line};
use crate::speech::chunk::chunk;
use crate::speech::control::SpeechControl;
use crate::speech::worker::SpeechQueueWorker;
use crate::tools::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owns everything a turn touches. One instance per session; turns run one
/// at a time on whichever thread the interaction loop spawns.
pub struct TurnRunner {
    engine: Box<dyn GenerationEngine>,
    recognition: Option<Box<dyn RecognitionEngine>>,
    worker: Option<SpeechQueueWorker>,
    control: Arc<SpeechControl>,
    context: ContextWindowManager,
    registry: ToolRegistry,
    system_text: String,
    need_system_prompt: bool,
    trim_threshold: f64,
    language: String,
    recognition_timeout: Duration,
}

/// What came out of one streamed reply.
struct StreamedReply {
    raw: String,
    entered_directive: bool,
    hidden_len: usize,
    interrupted: bool,
}

impl TurnRunner {
    pub fn new(
        engine: Box<dyn GenerationEngine>,
        context: ContextWindowManager,
        registry: ToolRegistry,
        control: Arc<SpeechControl>,
        trim_threshold: f64,
    ) -> Self {
        let system_text = crate::prompt::system_prompt(&registry);
        Self {
            engine,
            recognition: None,
            worker: None,
            control,
            context,
            registry,
            system_text,
            need_system_prompt: true,
            trim_threshold,
            language: "en".to_owned(),
            recognition_timeout: Duration::from_secs(30),
        }
    }

    /// Attach the speech queue; without it, turns are text-only.
    #[must_use]
    pub fn with_speech(mut self, worker: SpeechQueueWorker) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attach a recognition engine for voice turns.
    #[must_use]
    pub fn with_recognition(
        mut self,
        recognition: Box<dyn RecognitionEngine>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        self.recognition = Some(recognition);
        self.language = language.into();
        self.recognition_timeout = timeout;
        self
    }

    /// Restore the context snapshot for `key`, or prime a fresh context
    /// with the system prompt and snapshot it for next time. Both paths
    /// soft-fail; the worst case is sending the system prompt inline on
    /// the first turn.
    pub fn begin_session(&mut self, key: &str) {
        if self.context.load_snapshot(self.engine.as_mut(), key) {
            self.need_system_prompt = false;
        } else if self.context.prime(self.engine.as_mut(), &self.system_text) {
            self.need_system_prompt = false;
            self.context.save_snapshot(self.engine.as_ref(), key);
        } else {
            info!("context not primed, system prompt will be sent inline");
        }
        self.context.log_usage(self.engine.as_ref());
    }

    /// Drop the conversation so the next turn starts fresh.
    pub fn reset_context(&mut self) {
        match self.engine.clear_context() {
            Ok(()) => {
                self.need_system_prompt = true;
                info!("context cleared");
            }
            Err(e) => warn!("context clear failed: {e}"),
        }
    }

    /// Transcribe a finished take and run the turn on the result.
    ///
    /// # Errors
    ///
    /// Returns an error when transcription or generation setup fails; the
    /// caller reports it and returns to idle.
    pub fn voice_turn(&mut self, samples: &[f32]) -> Result<()> {
        let Some(recognition) = self.recognition.as_ref() else {
            return Err(WispError::Recognition(
                "no recognition engine configured".to_owned(),
            ));
        };
        if samples.is_empty() {
            emit_line("Nothing recorded.");
            return Ok(());
        }

        let transcript =
            recognition.transcribe(samples, &self.language, self.recognition_timeout)?;
        let transcript = transcript.trim().to_owned();
        if transcript.is_empty() {
            emit_line("No speech detected.");
            return Ok(());
        }

        emit_line(&format!("\nYou: {transcript}"));
        emit("Wisp: ");
        self.text_turn(&transcript)
    }

    /// Stream one reply for `user_text`, speaking it as it arrives, then
    /// execute a directive if the reply carried one.
    ///
    /// # Errors
    ///
    /// Returns an error only when the generation stream cannot be opened.
    /// Mid-stream failures are reported and end the turn gracefully.
    pub fn text_turn(&mut self, user_text: &str) -> Result<()> {
        if self.context.maybe_trim(self.engine.as_mut(), self.trim_threshold) {
            self.need_system_prompt = true;
        }

        let mut messages = Vec::new();
        if self.need_system_prompt {
            messages.push(ChatMessage::system(self.system_text.clone()));
        }
        messages.push(ChatMessage::user(user_text.to_owned()));

        // New turn: ready the speech gate and pin the epoch everything
        // downstream of this turn is tagged with.
        self.control.clear_interrupted();
        let epoch = self.control.current();

        let reply = self.stream_reply(messages, epoch)?;
        self.need_system_prompt = false;
        emit("\n");

        if reply.interrupted {
            debug!("turn interrupted, skipping directive extraction");
            return Ok(());
        }

        if reply.entered_directive {
            match extract(&reply.raw) {
                Some(directive) => self.handle_directive(&directive, user_text, epoch),
                None => debug!(
                    hidden_bytes = reply.hidden_len,
                    "directive block did not yield a valid call"
                ),
            }
        }

        self.context.log_usage(self.engine.as_ref());
        Ok(())
    }

    /// Drive the token stream, printing visible text and enqueueing
    /// sentence chunks as they complete.
    fn stream_reply(&mut self, messages: Vec<ChatMessage>, epoch: u64) -> Result<StreamedReply> {
        let worker = self.worker.as_ref();
        let control = &self.control;
        let recovery = self.engine.recovery_token().map(str::to_owned);

        let mut raw = String::new();
        let mut filter = StreamingTagFilter::new();
        let mut speech_buffer = String::new();
        let mut first_chunk_sent = false;
        let mut interrupted = false;
        let mut stream_error = None;

        let stream = self.engine.generate(GenerationRequest::new(messages))?;
        for token in stream {
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            };
            if recovery.as_deref() == Some(token.as_str()) {
                continue;
            }
            if control.is_stale(epoch) {
                interrupted = true;
                break;
            }

            raw.push_str(&token);
            let visible = filter.push(&token);
            if visible.is_empty() {
                continue;
            }
            emit(&visible);

            if let Some(worker) = worker {
                speech_buffer.push_str(&visible);
                let split = chunk(&speech_buffer, !first_chunk_sent);
                for piece in split.chunks {
                    worker.enqueue(epoch, piece);
                    first_chunk_sent = true;
                }
                speech_buffer = split.remainder;
            }
        }

        if !interrupted {
            let tail = filter.finish();
            if !tail.is_empty() {
                emit(&tail);
                speech_buffer.push_str(&tail);
            }
            if let Some(worker) = worker {
                let remainder = speech_buffer.trim();
                if !remainder.is_empty() {
                    worker.enqueue(epoch, remainder);
                }
            }
        }

        self.engine.record_reply(&raw);

        if let Some(e) = stream_error {
            warn!("generation stream failed: {e}");
            emit_line(&format!("\n(generation failed: {e})"));
        }

        Ok(StreamedReply {
            raw,
            entered_directive: filter.entered_directive(),
            hidden_len: filter.hidden().len(),
            interrupted,
        })
    }

    /// Execute the directive, report and speak the outcome, and feed it
    /// back into the context with a one-token generation.
    fn handle_directive(&mut self, directive: &Directive, user_text: &str, epoch: u64) {
        let outcome = self.registry.execute_directive(directive);

        if outcome.ok {
            let text = outcome.result_text();
            if !text.is_empty() {
                emit_line(&format!("\n[Tool] {text}"));
            }
        } else {
            emit_line(&format!(
                "\n[Tool Error] {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }

        if let Some(worker) = self.worker.as_ref() {
            worker.enqueue(epoch, outcome.spoken_ack());
        }

        // The model sees the outcome next turn; one throwaway token is
        // enough to push it into the context.
        let mut messages = Vec::new();
        if self.context.maybe_trim(self.engine.as_mut(), self.trim_threshold) {
            messages.push(ChatMessage::system(self.system_text.clone()));
            messages.push(ChatMessage::user(user_text.to_owned()));
        }
        messages.push(ChatMessage::user(outcome.feedback_block()));
        let request = GenerationRequest::new(messages).with_max_tokens(1);
        match self.engine.generate(request) {
            Ok(mut stream) => {
                if let Some(Err(e)) = stream.next() {
                    debug!("tool feedback update failed: {e}");
                }
            }
            Err(e) => debug!("tool feedback update failed: {e}"),
        }
    }
}

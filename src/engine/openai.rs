//! OpenAI-compatible streaming generation over HTTP.
//!
//! Works against any `/v1/chat/completions` server (llama.cpp, Ollama,
//! vLLM, the hosted APIs). The adapter owns the conversation history; that
//! history is the "context" the manager trims, snapshots, and restores.

use crate::config::EngineConfig;
use crate::engine::sse::{SseEvent, SseLineParser};
use crate::engine::{ChatMessage, GenerationEngine, GenerationRequest, TokenStream};
use crate::error::{Result, WispError};
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// Rough token estimate: four characters per token plus a small
/// per-message overhead for role framing.
fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| m.content.chars().count() / 4 + 4)
        .sum()
}

pub struct OpenAiEngine {
    config: EngineConfig,
    capacity: usize,
    client: reqwest::blocking::Client,
    history: Vec<ChatMessage>,
}

impl OpenAiEngine {
    pub fn new(config: EngineConfig, capacity: usize) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WispError::Generation(format!("http client build failed: {e}")))?;
        Ok(Self {
            config,
            capacity,
            client,
            history: Vec::new(),
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": self.history,
            "stream": true,
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.temperature.unwrap_or(self.config.temperature),
        })
    }
}

impl GenerationEngine for OpenAiEngine {
    fn generate(&mut self, request: GenerationRequest) -> Result<TokenStream<'_>> {
        self.history.extend(request.messages.iter().cloned());
        let body = self.request_body(&request);

        let mut http = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }
        let response = http
            .send()
            .map_err(|e| WispError::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(WispError::Generation(format!(
                "server returned {status}: {detail}"
            )));
        }

        Ok(Box::new(CompletionStream {
            response,
            parser: SseLineParser::new(),
            pending: VecDeque::new(),
            done: false,
        }))
    }

    fn record_reply(&mut self, text: &str) {
        if !text.is_empty() {
            self.history.push(ChatMessage::assistant(text));
        }
    }

    fn clear_context(&mut self) -> Result<()> {
        self.history.clear();
        Ok(())
    }

    fn context_usage(&self) -> usize {
        estimate_tokens(&self.history)
    }

    fn context_capacity(&self) -> usize {
        self.capacity
    }

    fn save_context(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.history)
            .map_err(|e| WispError::Context(format!("context serialization failed: {e}")))
    }

    fn load_context(&mut self, blob: &[u8]) -> Result<()> {
        let history: Vec<ChatMessage> = serde_json::from_slice(blob)
            .map_err(|e| WispError::Context(format!("context blob rejected: {e}")))?;
        self.history = history;
        Ok(())
    }
}

/// Lazy token iterator over one streamed completion.
struct CompletionStream {
    response: reqwest::blocking::Response,
    parser: SseLineParser,
    pending: VecDeque<String>,
    done: bool,
}

impl CompletionStream {
    fn ingest(&mut self, event: &SseEvent) {
        if event.is_done() {
            self.done = true;
            return;
        }
        match delta_content(event) {
            Some(content) if !content.is_empty() => self.pending.push_back(content),
            Some(_) => {}
            None => debug!("stream event without content delta"),
        }
    }
}

/// Pulls the content delta out of one stream event, if it carries one.
fn delta_content(event: &SseEvent) -> Option<String> {
    let value: Value = serde_json::from_str(&event.data).ok()?;
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

impl Iterator for CompletionStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.done {
                return None;
            }

            let mut buf = [0u8; 4096];
            match self.response.read(&mut buf) {
                Ok(0) => {
                    if let Some(event) = self.parser.flush() {
                        self.ingest(&event);
                    }
                    self.done = true;
                }
                Ok(n) => {
                    for event in self.parser.push(&buf[..n]) {
                        self.ingest(&event);
                        if self.done {
                            break;
                        }
                    }
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(WispError::Generation(format!(
                        "stream read failed: {e}"
                    ))));
                }
            }
        }
    }
}

//! Wire-level contract tests for the OpenAI-compatible engine.
//!
//! A scripted TCP server stands in for the completion endpoint so the
//! blocking client, the SSE parser, and the turn orchestration are
//! exercised over a real socket without a model behind them.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use wisp::config::EngineConfig;
use wisp::context::ContextWindowManager;
use wisp::engine::openai::OpenAiEngine;
use wisp::engine::{ChatMessage, GenerationEngine, GenerationRequest};
use wisp::{SpeechControl, ToolRegistry, TurnRunner};

#[derive(Clone)]
struct Recorded {
    path: String,
    authorization: Option<String>,
    body: Value,
}

struct MockServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    /// Serves the scripted responses in order, one connection each.
    fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = match TcpListener::bind("127.0.0.1:0") {
            Ok(l) => l,
            Err(e) => panic!("bind failed: {e}"),
        };
        let addr = match listener.local_addr() {
            Ok(a) => a,
            Err(e) => panic!("no local addr: {e}"),
        };
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                if let Some(recorded) = read_request(&mut stream) {
                    if let Ok(mut log) = seen.lock() {
                        log.push(recorded);
                    }
                }
                write_response(&mut stream, status, &body);
            }
        });
        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    fn recorded(&self) -> Vec<Recorded> {
        match self.requests.lock() {
            Ok(log) => log.clone(),
            Err(_) => Vec::new(),
        }
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Recorded> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let path = line.split_whitespace().nth(1)?.to_owned();

    let mut content_length = 0usize;
    let mut authorization = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        let lower = header.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().ok()?;
        } else if lower.starts_with("authorization:") {
            authorization = Some(header["authorization:".len()..].trim().to_owned());
        }
    }

    let mut raw = vec![0u8; content_length];
    reader.read_exact(&mut raw).ok()?;
    let body = serde_json::from_slice(&raw).ok()?;
    Some(Recorded {
        path,
        authorization,
        body,
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        500 => "Internal Server Error",
        _ => "Error",
    };
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body.as_bytes());
    let _ = stream.flush();
}

/// One streamed completion: a delta event per token, then the sentinel.
fn sse_reply(tokens: &[&str]) -> String {
    let mut out = String::new();
    for token in tokens {
        let event = json!({"choices": [{"delta": {"content": token}, "finish_reason": null}]});
        out.push_str(&format!("data: {event}\n\n"));
    }
    out.push_str("data: [DONE]\n\n");
    out
}

fn engine_for(server: &MockServer) -> OpenAiEngine {
    let config = EngineConfig::new()
        .with_base_url(server.base_url.clone())
        .with_model("test-model");
    match OpenAiEngine::new(config, 8192) {
        Ok(e) => e,
        Err(e) => panic!("engine should build: {e}"),
    }
}

#[test]
fn streamed_tokens_arrive_in_order() {
    let server = MockServer::start(vec![(200, sse_reply(&["Hel", "lo", " there."]))]);
    let mut engine = engine_for(&server);

    let request = GenerationRequest::new(vec![ChatMessage::user("hi")]);
    let tokens: Vec<String> = match engine.generate(request) {
        Ok(stream) => stream.filter_map(Result::ok).collect(),
        Err(e) => panic!("generate should succeed: {e}"),
    };
    assert_eq!(tokens, vec!["Hel", "lo", " there."]);
}

#[test]
fn request_body_matches_the_wire_format() {
    let server = MockServer::start(vec![(200, sse_reply(&["ok"]))]);
    let mut engine = engine_for(&server);

    let request = GenerationRequest::new(vec![ChatMessage::user("Hello")]).with_max_tokens(64);
    match engine.generate(request) {
        Ok(stream) => {
            let _ = stream.count();
        }
        Err(e) => panic!("generate should succeed: {e}"),
    }

    let requests = server.recorded();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/v1/chat/completions");
    let body = &requests[0].body;
    assert_eq!(body["model"], json!("test-model"));
    assert_eq!(body["stream"], json!(true));
    assert_eq!(body["max_tokens"], json!(64));
    assert_eq!(
        body["messages"],
        json!([{"role": "user", "content": "Hello"}])
    );
    assert!(requests[0].authorization.is_none());
}

#[test]
fn api_key_becomes_a_bearer_header() {
    let server = MockServer::start(vec![(200, sse_reply(&["ok"]))]);
    let config = EngineConfig::new()
        .with_base_url(server.base_url.clone())
        .with_model("test-model")
        .with_api_key("sk-test-123");
    let mut engine = match OpenAiEngine::new(config, 8192) {
        Ok(e) => e,
        Err(e) => panic!("engine should build: {e}"),
    };

    match engine.generate(GenerationRequest::new(vec![ChatMessage::user("x")])) {
        Ok(stream) => {
            let _ = stream.count();
        }
        Err(e) => panic!("generate should succeed: {e}"),
    }

    let requests = server.recorded();
    assert_eq!(
        requests[0].authorization.as_deref(),
        Some("Bearer sk-test-123")
    );
}

#[test]
fn server_error_surfaces_with_status_and_detail() {
    let server = MockServer::start(vec![(500, "model exploded".to_owned())]);
    let mut engine = engine_for(&server);

    match engine.generate(GenerationRequest::new(vec![ChatMessage::user("x")])) {
        Ok(_) => panic!("500 should be an error"),
        Err(e) => {
            let text = e.to_string();
            assert!(text.contains("500"), "missing status in: {text}");
            assert!(text.contains("model exploded"), "missing detail in: {text}");
        }
    }
}

#[test]
fn tokens_after_the_done_sentinel_are_dropped() {
    let late = json!({"choices": [{"delta": {"content": "LATE"}, "finish_reason": null}]});
    let body = format!("{}data: {late}\n\n", sse_reply(&["Hi."]));
    let server = MockServer::start(vec![(200, body)]);
    let mut engine = engine_for(&server);

    let tokens: Vec<String> =
        match engine.generate(GenerationRequest::new(vec![ChatMessage::user("x")])) {
            Ok(stream) => stream.filter_map(Result::ok).collect(),
            Err(e) => panic!("generate should succeed: {e}"),
        };
    assert_eq!(tokens, vec!["Hi."]);
}

#[test]
fn a_directive_turn_makes_a_feedback_request() {
    let reply = sse_reply(&[
        "Sure.",
        " <tool_call>",
        r#"{"name": "math", "arguments": {"op": "add", "numbers": [5, 3]}}"#,
        "</tool_call>",
    ]);
    let feedback = sse_reply(&[" "]);
    let server = MockServer::start(vec![(200, reply), (200, feedback)]);

    let dir = match tempfile::tempdir() {
        Ok(d) => d,
        Err(e) => panic!("tempdir: {e}"),
    };
    let engine = engine_for(&server);
    let mut runner = TurnRunner::new(
        Box::new(engine),
        ContextWindowManager::new(dir.path().to_path_buf()),
        ToolRegistry::with_builtins(),
        Arc::new(SpeechControl::new()),
        0.8,
    );

    match runner.text_turn("what is five plus three") {
        Ok(()) => {}
        Err(e) => panic!("turn should succeed: {e}"),
    }

    let requests = server.recorded();
    assert_eq!(requests.len(), 2, "reply and feedback requests expected");

    let first = &requests[0].body["messages"];
    assert_eq!(first[0]["role"], json!("system"));
    assert_eq!(
        first[1],
        json!({"role": "user", "content": "what is five plus three"})
    );

    let second = &requests[1].body;
    assert_eq!(second["max_tokens"], json!(1));
    let messages = second["messages"].as_array().cloned().unwrap_or_default();
    let last = messages.last().cloned().unwrap_or(Value::Null);
    assert_eq!(last["role"], json!("user"));
    let content = last["content"].as_str().unwrap_or_default();
    assert!(content.starts_with("<tool_response>"), "feedback: {content}");
    assert!(content.contains(r#""ok":true"#), "feedback: {content}");
    assert!(content.contains("8.0"), "feedback: {content}");

    // The reply, directive included, was recorded before the feedback call.
    assert_eq!(messages[2]["role"], json!("assistant"));
    let recorded = messages[2]["content"].as_str().unwrap_or_default();
    assert!(recorded.contains("<tool_call>"));
}

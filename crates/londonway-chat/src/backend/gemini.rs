//! Gemini REST backend.
//!
//! Streams `streamGenerateContent` as server-sent events, accumulating
//! fragments into cumulative text. Multi-turn history is kept client-side and
//! sent with every request.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use londonway_core::config::BackendConfig;
use londonway_core::types::GroundingSource;

use crate::backend::{BackendMode, DeltaStream, ResponseBackend, TextDelta};
use crate::error::BackendError;
use crate::prompts::SYSTEM_INSTRUCTION;

const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const UNTITLED_SOURCE: &str = "Source";

/// Backend that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    system_instruction: Option<String>,
    web_search: bool,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiBackend {
    /// Creates a backend with the default model and no system instruction.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system_instruction: None,
            web_search: true,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Builds a backend from the `[backend]` config section, with the
    /// LondonWay system instruction.
    ///
    /// The configured timeout bounds connecting and each wait for more
    /// response bytes, not the length of a whole stream.
    pub fn from_config(config: &BackendConfig, api_key: impl Into<String>) -> Result<Self, BackendError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unknown(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            ..Self::new(api_key)
        }
        .with_model(&config.model)
        .with_base_url(&config.base_url)
        .with_web_search(config.web_search)
        .with_system_instruction(SYSTEM_INSTRUCTION))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Adds a system instruction that will be sent alongside every request.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Whether `Full` mode requests attach the Google Search tool.
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Number of turns (user + model contents) in the history.
    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{}", self.base_url, self.model, method)
    }

    fn build_request(&self, user: &Content, mode: BackendMode) -> GenerateContentRequest {
        let mut contents = lock(&self.history).clone();
        contents.push(user.clone());

        let tools = if self.web_search && mode.allows_search() {
            vec![Tool::default()]
        } else {
            Vec::new()
        };

        GenerateContentRequest {
            contents,
            system_instruction: self.system_instruction.as_ref().map(|text| Instruction {
                parts: vec![Part::text(text)],
            }),
            tools,
        }
    }

    async fn post(&self, url: String, request: &GenerateContentRequest) -> Result<Response, BackendError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
        Err(map_http_error(status, &body))
    }
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("web_search", &self.web_search)
            .field("history_len", &self.history_len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResponseBackend for GeminiBackend {
    async fn stream(&self, prompt: &str, mode: BackendMode) -> Result<DeltaStream, BackendError> {
        let user = Content::user(prompt);
        let request = self.build_request(&user, mode);
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        debug!(model = %self.model, ?mode, tools = request.tools.len(), "Opening Gemini stream");

        let response = self.post(url, &request).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BackendError::Transient(format!("Stream interrupted: {e}"))))
            .boxed();

        Ok(into_deltas(
            body,
            HistoryCommit {
                history: Arc::clone(&self.history),
                user,
            },
        ))
    }

    async fn complete(&self, prompt: &str, mode: BackendMode) -> Result<String, BackendError> {
        let user = Content::user(prompt);
        let request = self.build_request(&user, mode);
        debug!(model = %self.model, ?mode, "Gemini generateContent");

        let response = self.post(self.endpoint("generateContent"), &request).await?;
        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Unknown(format!("Failed to parse Gemini response: {e}")))?;
        if let Some(error) = &parsed.error {
            return Err(error.to_backend_error());
        }

        let text = parsed.fragment_text();
        if text.is_empty() {
            return Err(BackendError::Unknown(
                "Gemini API returned no text in the response candidates".into(),
            ));
        }
        HistoryCommit {
            history: Arc::clone(&self.history),
            user,
        }
        .commit(&text);
        Ok(text)
    }

    fn reset(&self) {
        let mut history = lock(&self.history);
        info!(turns = history.len(), "Gemini history cleared");
        history.clear();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn transport_error(err: reqwest::Error) -> BackendError {
    let message = format!("Gemini API request failed: {err}");
    if err.is_timeout() || err.is_connect() {
        BackendError::Transient(message)
    } else {
        BackendError::Unknown(message)
    }
}

fn map_http_error(status: StatusCode, body: &str) -> BackendError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or_else(|_| body.to_string());
    BackendError::classify(Some(status.as_u16()), message)
}

// ---- Wire types ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user",
            parts: vec![Part::text(text)],
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: "model",
            parts: vec![Part::text(text)],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Part {
    text: String,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Instruction {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Default, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorBody>,
}

impl GenerateContentResponse {
    /// Text carried by this response (or stream fragment).
    fn fragment_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Web grounding sources, if the fragment carries grounding chunks.
    fn sources(&self) -> Option<Vec<GroundingSource>> {
        let chunks = self
            .candidates
            .first()?
            .grounding_metadata
            .as_ref()?
            .grounding_chunks
            .as_ref()?;

        Some(
            chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .filter_map(|web| {
                    Some(GroundingSource {
                        uri: web.uri.clone()?,
                        title: web
                            .title
                            .clone()
                            .filter(|t| !t.is_empty())
                            .unwrap_or_else(|| UNTITLED_SOURCE.to_string()),
                    })
                })
                .collect(),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ContentResponse>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl ErrorBody {
    fn describe(&self) -> String {
        let msg = self.message.clone().unwrap_or_default();
        match self.status.as_deref() {
            Some(status) if !status.is_empty() => format!("{status}: {msg}"),
            _ => msg,
        }
    }

    fn to_backend_error(&self) -> BackendError {
        BackendError::classify(self.code, self.describe())
    }
}

// ---- Server-sent events ----

/// Line splitter for an SSE body delivered in arbitrary byte chunks.
///
/// Splits on raw bytes so multi-byte characters cut across chunks are only
/// decoded once their line is complete.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseBuffer {
    /// Feed a chunk; returns the data payloads of every event it completes.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.take_line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever remains once the body has ended.
    fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.take_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.flush()
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.flush();
        }
        if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }

    fn flush(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

/// Appends a completed exchange to the shared history.
struct HistoryCommit {
    history: Arc<Mutex<Vec<Content>>>,
    user: Content,
}

impl HistoryCommit {
    fn commit(self, reply: &str) {
        let mut history = lock(&self.history);
        history.push(self.user);
        history.push(Content::model(reply));
    }
}

struct StreamState {
    body: BoxStream<'static, Result<Bytes, BackendError>>,
    sse: SseBuffer,
    ready: VecDeque<Result<TextDelta, BackendError>>,
    text: String,
    commit: Option<HistoryCommit>,
    finished: bool,
}

impl StreamState {
    fn ingest(&mut self, event: &str) {
        if self.finished {
            return;
        }
        let parsed: GenerateContentResponse = match serde_json::from_str(event) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Undecodable Gemini stream event");
                self.fail(BackendError::Unknown(format!("Malformed stream event: {e}")));
                return;
            }
        };
        if let Some(error) = &parsed.error {
            self.fail(error.to_backend_error());
            return;
        }

        let fragment = parsed.fragment_text();
        let sources = parsed.sources();
        if fragment.is_empty() && sources.is_none() {
            return;
        }
        self.text.push_str(&fragment);
        self.ready.push_back(Ok(TextDelta {
            text: self.text.clone(),
            sources,
        }));
    }

    fn fail(&mut self, error: BackendError) {
        self.finished = true;
        self.commit = None;
        self.ready.push_back(Err(error));
    }

    fn end(&mut self) {
        if let Some(event) = self.sse.finish() {
            self.ingest(&event);
        }
        self.finished = true;
        if let Some(commit) = self.commit.take() {
            commit.commit(&self.text);
        }
    }
}

/// Turn a raw SSE body into cumulative deltas. History is committed only
/// when the body ends without error.
fn into_deltas(body: BoxStream<'static, Result<Bytes, BackendError>>, commit: HistoryCommit) -> DeltaStream {
    let state = StreamState {
        body,
        sse: SseBuffer::default(),
        ready: VecDeque::new(),
        text: String::new(),
        commit: Some(commit),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for event in state.sse.push(&chunk) {
                        state.ingest(&event);
                    }
                }
                Some(Err(e)) => state.fail(e),
                None => state.end(),
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GeminiBackend {
        GeminiBackend::new("test-key").with_system_instruction("Be LondonWay.")
    }

    fn commit_into(history: &Arc<Mutex<Vec<Content>>>, prompt: &str) -> HistoryCommit {
        HistoryCommit {
            history: Arc::clone(history),
            user: Content::user(prompt),
        }
    }

    fn body<S: Into<String>>(chunks: Vec<Result<S, BackendError>>) -> BoxStream<'static, Result<Bytes, BackendError>> {
        let chunks: Vec<_> = chunks
            .into_iter()
            .map(|c| c.map(|s| Bytes::from(s.into())))
            .collect();
        stream::iter(chunks).boxed()
    }

    fn event(text: &str) -> String {
        format!(
            "data: {}\r\n\r\n",
            serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]})
        )
    }

    // ---- SSE buffer ----

    #[test]
    fn test_sse_splits_events_across_chunks() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b"data: {\"a\":").is_empty());
        assert_eq!(sse.push(b"1}\n\ndata: {\"b\":2}\n"), vec!["{\"a\":1}"]);
        assert_eq!(sse.push(b"\n"), vec!["{\"b\":2}"]);
        assert_eq!(sse.finish(), None);
    }

    #[test]
    fn test_sse_multibyte_split_across_chunks() {
        let payload = "data: £2.80\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xC2).unwrap() + 1;

        let mut sse = SseBuffer::default();
        assert!(sse.push(&payload[..split]).is_empty());
        assert_eq!(sse.push(&payload[split..]), vec!["£2.80"]);
    }

    #[test]
    fn test_sse_finish_flushes_unterminated_event() {
        let mut sse = SseBuffer::default();
        assert!(sse.push(b": keep-alive\ndata: tail").is_empty());
        assert_eq!(sse.finish().as_deref(), Some("tail"));
    }

    #[test]
    fn test_sse_joins_multiline_data() {
        let mut sse = SseBuffer::default();
        assert_eq!(sse.push(b"data: one\ndata: two\n\n"), vec!["one\ntwo"]);
    }

    // ---- Response parsing ----

    #[test]
    fn test_parse_text_and_sources() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Take the "}, {"text": "Elizabeth line"}]},
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://tfl.gov.uk", "title": "TfL"}},
                    {"web": {"uri": "https://example.com"}},
                    {"retrievedContext": {}}
                ]}
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.fragment_text(), "Take the Elizabeth line");
        assert_eq!(
            parsed.sources().unwrap(),
            vec![
                GroundingSource {
                    uri: "https://tfl.gov.uk".to_string(),
                    title: "TfL".to_string()
                },
                GroundingSource {
                    uri: "https://example.com".to_string(),
                    title: "Source".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_without_grounding_has_no_sources() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#).unwrap();
        assert!(parsed.sources().is_none());
    }

    #[test]
    fn test_http_error_mapping() {
        let body = r#"{"error":{"code":403,"message":"Search tool not allowed","status":"PERMISSION_DENIED"}}"#;
        let err = map_http_error(StatusCode::FORBIDDEN, body);
        assert_eq!(
            err,
            BackendError::Permission("PERMISSION_DENIED: Search tool not allowed".to_string())
        );

        let err = map_http_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert_eq!(err, BackendError::Transient("overloaded".to_string()));

        let err = map_http_error(StatusCode::BAD_REQUEST, "{}");
        assert!(matches!(err, BackendError::Unknown(_)));
    }

    // ---- Request shape ----

    #[test]
    fn test_request_includes_search_tool_only_in_full_mode() {
        let backend = backend();
        let user = Content::user("Route to Bank");

        let full = serde_json::to_value(backend.build_request(&user, BackendMode::Full)).unwrap();
        assert_eq!(full["tools"], serde_json::json!([{"googleSearch": {}}]));
        assert_eq!(full["systemInstruction"]["parts"][0]["text"], "Be LondonWay.");
        assert_eq!(full["contents"][0]["role"], "user");
        assert_eq!(full["contents"][0]["parts"][0]["text"], "Route to Bank");

        let basic = serde_json::to_value(backend.build_request(&user, BackendMode::Degraded)).unwrap();
        assert!(basic.get("tools").is_none());
    }

    #[test]
    fn test_request_respects_disabled_web_search() {
        let backend = backend().with_web_search(false);
        let request = backend.build_request(&Content::user("q"), BackendMode::Full);
        assert!(request.tools.is_empty());
    }

    #[test]
    fn test_request_carries_history_and_reset_clears_it() {
        let backend = backend();
        commit_into(&backend.history, "first").commit("answer");
        assert_eq!(backend.history_len(), 2);

        let request = backend.build_request(&Content::user("second"), BackendMode::Full);
        let roles: Vec<_> = request.contents.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);

        backend.reset();
        assert_eq!(backend.history_len(), 0);
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = BackendConfig {
            model: "gemini-test".to_string(),
            base_url: "http://localhost:9/models/".to_string(),
            web_search: false,
            ..BackendConfig::default()
        };
        let backend = GeminiBackend::from_config(&config, "k").unwrap();
        assert_eq!(backend.model(), "gemini-test");
        assert_eq!(
            backend.endpoint("generateContent"),
            "http://localhost:9/models/gemini-test:generateContent"
        );
        assert!(!backend.web_search);
        assert_eq!(backend.system_instruction.as_deref(), Some(SYSTEM_INSTRUCTION));
    }

    /// Serve one SSE response whose events arrive `gap` apart.
    async fn slow_sse_server(events: Vec<String>, gap: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            for event in events {
                tokio::time::sleep(gap).await;
                socket.write_all(event.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/models")
    }

    #[tokio::test]
    async fn test_stream_longer_than_timeout_is_not_cut_off() {
        let base_url = slow_sse_server(
            vec![event("Take "), event("the "), event("Tube")],
            Duration::from_millis(600),
        )
        .await;
        let config = BackendConfig {
            base_url,
            request_timeout_secs: 1,
            ..BackendConfig::default()
        };
        let backend = GeminiBackend::from_config(&config, "k").unwrap();

        let deltas: Vec<_> = backend
            .stream("q", BackendMode::Full)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(deltas.last(), Some(&Ok(TextDelta::new("Take the Tube"))));
        assert!(deltas.iter().all(Result::is_ok));
        assert_eq!(backend.history_len(), 2);
    }

    // ---- Stream ingestion ----

    #[tokio::test]
    async fn test_deltas_are_cumulative_and_history_committed() {
        let history = Arc::new(Mutex::new(Vec::new()));
        let raw = format!("{}{}", event("Crowding: "), event("Low"));

        let deltas: Vec<_> = into_deltas(body(vec![Ok(raw)]), commit_into(&history, "q"))
            .collect()
            .await;

        assert_eq!(
            deltas,
            vec![Ok(TextDelta::new("Crowding: ")), Ok(TextDelta::new("Crowding: Low"))]
        );
        let history = lock(&history);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Content::model("Crowding: Low"));
    }

    #[tokio::test]
    async fn test_interrupted_stream_fails_and_skips_history() {
        let history = Arc::new(Mutex::new(Vec::new()));
        let deltas: Vec<_> = into_deltas(
            body(vec![
                Ok(event("partial")),
                Err(BackendError::Transient("reset".to_string())),
                Ok("data: never\n\n".to_string()),
            ]),
            commit_into(&history, "q"),
        )
        .collect()
        .await;

        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0], Ok(TextDelta::new("partial")));
        assert!(matches!(deltas[1], Err(BackendError::Transient(_))));
        assert!(lock(&history).is_empty());
    }

    #[tokio::test]
    async fn test_error_event_is_classified() {
        let history = Arc::new(Mutex::new(Vec::new()));
        let deltas: Vec<_> = into_deltas(
            body(vec![Ok(
                "data: {\"error\":{\"code\":403,\"message\":\"denied\",\"status\":\"PERMISSION_DENIED\"}}\n\n",
            )]),
            commit_into(&history, "q"),
        )
        .collect()
        .await;

        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].as_ref().unwrap_err().is_permission());
    }

    #[tokio::test]
    async fn test_stream_without_trailing_newline() {
        let history = Arc::new(Mutex::new(Vec::new()));
        let deltas: Vec<_> = into_deltas(
            body(vec![Ok(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"end\"}]}}]}",
            )]),
            commit_into(&history, "q"),
        )
        .collect()
        .await;

        assert_eq!(deltas, vec![Ok(TextDelta::new("end"))]);
        assert_eq!(lock(&history).len(), 2);
    }
}

//! Ollama HTTP backends
//!
//! - [`OllamaChat`]: `/api/chat` for report generation
//! - [`OllamaOcr`]: `/api/generate` with a fixed OCR instruction
//!
//! Streamed answers are newline-delimited JSON frames; each frame carries a
//! text fragment (`message.content` for chat, `response` for generate) and
//! the last one has `"done": true`.

use crate::capability::{ModelCapability, OcrCapability, TokenStream};
use crate::config::{ModelConfig, OcrConfig};
use crate::error::CapabilityError;
use crate::message::{ChatMessage, ChatRequest, ModelOptions};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

const BACKEND: &str = "ollama";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_LIMIT: usize = 300;

/// Shared HTTP plumbing for one Ollama host
#[derive(Debug, Clone)]
struct Endpoint {
    http: reqwest::Client,
    host: String,
}

impl Endpoint {
    fn new(host: &str) -> Result<Self, CapabilityError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    /// POST `body` and fail on non-success status
    ///
    /// `timeout` bounds the whole exchange; streamed calls pass `None` and
    /// bound only the wait for response headers, see [`Self::stream`].
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, CapabilityError> {
        let url = format!("{}{path}", self.host);
        let mut request = self.http.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        tracing::debug!(%url, "ollama request");

        let response = request.send().await.map_err(|e| transport(&e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CapabilityError::Status {
            backend: BACKEND.to_string(),
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        })
    }

    async fn complete<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<String, CapabilityError> {
        let response = self.post(path, body, Some(timeout)).await?;
        let frame: Frame = response
            .json()
            .await
            .map_err(|e| CapabilityError::Decode(e.to_string()))?;
        frame.into_text().map(|text| text.trim().to_string())
    }

    /// Open a streamed call
    ///
    /// `open_timeout` bounds the wait for response headers only. Gaps between
    /// chunks are bounded by the relay.
    async fn stream<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        open_timeout: Duration,
    ) -> Result<TokenStream, CapabilityError> {
        let response = tokio::time::timeout(open_timeout, self.post(path, body, None))
            .await
            .map_err(|_| {
                tracing::warn!(path, timeout = ?open_timeout, "ollama stream did not open");
                CapabilityError::Transport {
                    backend: BACKEND.to_string(),
                    message: format!("timed out after {open_timeout:?} waiting for response headers"),
                }
            })??;
        Ok(ndjson_tokens(response.bytes_stream()))
    }
}

fn transport(err: &reqwest::Error) -> CapabilityError {
    let message = if err.is_timeout() {
        format!("timed out: {err}")
    } else {
        err.to_string()
    };
    CapabilityError::Transport {
        backend: BACKEND.to_string(),
        message,
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: &'a ModelOptions,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
    options: &'a ModelOptions,
}

/// One response frame of either endpoint
#[derive(Debug, Default, Deserialize)]
struct Frame {
    #[serde(default)]
    message: Option<FrameMessage>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FrameMessage {
    #[serde(default)]
    content: String,
}

impl Frame {
    fn into_text(self) -> Result<String, CapabilityError> {
        if let Some(message) = self.error {
            return Err(CapabilityError::Backend {
                backend: BACKEND.to_string(),
                message,
            });
        }
        Ok(self
            .message
            .map(|m| m.content)
            .or(self.response)
            .unwrap_or_default())
    }
}

struct NdjsonState<B> {
    bytes: Pin<Box<B>>,
    buf: Vec<u8>,
    ready: VecDeque<Result<String, CapabilityError>>,
    finished: bool,
}

impl<B> NdjsonState<B> {
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if self.push_line(&line) {
                self.finished = true;
                self.buf.clear();
                return;
            }
        }
    }

    /// Queue the fragment of one frame; returns true on the final frame
    fn push_line(&mut self, line: &[u8]) -> bool {
        let Ok(text) = std::str::from_utf8(line) else {
            return false;
        };
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable frame");
                return false;
            }
        };
        let done = frame.done;
        match frame.into_text() {
            Ok(fragment) if fragment.is_empty() => done,
            Ok(fragment) => {
                self.ready.push_back(Ok(fragment));
                done
            }
            Err(e) => {
                self.ready.push_back(Err(e));
                true
            }
        }
    }
}

/// Turn an NDJSON byte stream into text fragments
///
/// Frames may be split across network chunks. Undecodable lines are
/// skipped; an `error` frame or a broken body ends the stream with an error.
pub(crate) fn ndjson_tokens<B, T>(bytes: B) -> TokenStream
where
    B: Stream<Item = Result<T, reqwest::Error>> + Send + 'static,
    T: AsRef<[u8]> + Send + 'static,
{
    let state = NdjsonState {
        bytes: Box::pin(bytes),
        buf: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(chunk.as_ref());
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.ready.push_back(Err(transport(&e)));
                }
                None => {
                    st.finished = true;
                    let rest = std::mem::take(&mut st.buf);
                    st.push_line(&rest);
                }
            }
        }
    })
    .boxed()
}

/// Report model served by `/api/chat`
#[derive(Debug, Clone)]
pub struct OllamaChat {
    endpoint: Endpoint,
    model: String,
    timeout: Duration,
}

impl OllamaChat {
    /// Create a client for `model` on `host`
    ///
    /// # Errors
    /// - `CapabilityError::Transport` if the HTTP client cannot be built
    pub fn new(host: &str, model: impl Into<String>, timeout: Duration) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: Endpoint::new(host)?,
            model: model.into(),
            timeout,
        })
    }

    /// Create from configuration
    ///
    /// # Errors
    /// - `CapabilityError::Transport` if the HTTP client cannot be built
    pub fn from_config(config: &ModelConfig) -> Result<Self, CapabilityError> {
        Self::new(&config.host, config.model.clone(), config.timeout())
    }

    fn body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
        ChatBody {
            model: &self.model,
            messages: &request.messages,
            stream,
            options: &request.options,
        }
    }
}

#[async_trait]
impl ModelCapability for OllamaChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, CapabilityError> {
        self.endpoint
            .complete("/api/chat", &self.body(&request, false), self.timeout)
            .await
    }

    async fn stream(&self, request: ChatRequest) -> Result<TokenStream, CapabilityError> {
        self.endpoint
            .stream("/api/chat", &self.body(&request, true), self.timeout)
            .await
    }
}

/// OCR model served by `/api/generate`
#[derive(Debug, Clone)]
pub struct OllamaOcr {
    endpoint: Endpoint,
    model: String,
    prompt: String,
    options: ModelOptions,
    timeout: Duration,
}

impl OllamaOcr {
    /// Create from configuration
    ///
    /// # Errors
    /// - `CapabilityError::Transport` if the HTTP client cannot be built
    pub fn from_config(config: &OcrConfig) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: Endpoint::new(&config.host)?,
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            options: config.options(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn body<'a>(&'a self, image: &'a str, stream: bool) -> GenerateBody<'a> {
        GenerateBody {
            model: &self.model,
            prompt: &self.prompt,
            images: [image],
            stream,
            options: &self.options,
        }
    }
}

#[async_trait]
impl OcrCapability for OllamaOcr {
    fn model(&self) -> &str {
        &self.model
    }

    async fn extract(&self, png_base64: String) -> Result<String, CapabilityError> {
        self.endpoint
            .complete("/api/generate", &self.body(&png_base64, false), self.timeout)
            .await
    }

    async fn extract_stream(&self, png_base64: String) -> Result<TokenStream, CapabilityError> {
        self.endpoint
            .stream("/api/generate", &self.body(&png_base64, true), self.timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + 'static {
        let owned: Vec<_> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    async fn collect(parts: &[&str]) -> Vec<Result<String, String>> {
        ndjson_tokens(chunks(parts))
            .map(|r| r.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn reassembles_frames_split_across_chunks() {
        let out = collect(&[
            "{\"message\":{\"content\":\"Hel\"},\"done\":false}\n{\"mess",
            "age\":{\"content\":\"lo\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}\n",
        ])
        .await;
        assert_eq!(out, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn generate_frames_and_trailing_line_without_newline() {
        let out = collect(&["{\"response\":\"a\"}\n\n", "garbage\n", "{\"response\":\"b\",\"done\":true}"]).await;
        assert_eq!(out, vec![Ok("a".to_string()), Ok("b".to_string())]);
    }

    #[tokio::test]
    async fn stops_after_done_frame() {
        let out = collect(&["{\"response\":\"x\",\"done\":true}\n{\"response\":\"late\"}\n"]).await;
        assert_eq!(out, vec![Ok("x".to_string())]);
    }

    #[tokio::test]
    async fn error_frame_ends_stream() {
        let out = collect(&["{\"response\":\"x\"}\n{\"error\":\"model crashed\"}\n{\"response\":\"y\"}\n"]).await;
        assert_eq!(
            out,
            vec![Ok("x".to_string()), Err("ollama error: model crashed".to_string())]
        );
    }

    /// Accepts connections and never answers
    async fn silent_host() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn stream_open_is_bounded_when_host_never_answers() {
        let host = silent_host().await;
        let chat = OllamaChat::new(&host, "gemma3:27b", Duration::from_millis(200)).unwrap();
        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            options: ModelOptions::default(),
        };

        let opened = tokio::time::timeout(Duration::from_secs(5), chat.stream(request))
            .await
            .expect("opening a stream must not hang");
        let err = opened.err().expect("silent host must fail");
        assert!(matches!(err, CapabilityError::Transport { .. }));
        assert!(err.to_string().contains("timed out"), "{err}");
    }

    #[test]
    fn chat_body_shape() {
        let request = ChatRequest {
            messages: vec![ChatMessage::user("hi")],
            options: ModelOptions {
                num_ctx: Some(14096),
                ..ModelOptions::default()
            },
        };
        let chat = OllamaChat::new("http://localhost:11434/", "gemma3:27b", Duration::from_secs(1)).unwrap();
        let json = serde_json::to_value(chat.body(&request, true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gemma3:27b",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true,
                "options": {"num_ctx": 14096}
            })
        );
        assert_eq!(chat.endpoint.host, "http://localhost:11434");
    }
}

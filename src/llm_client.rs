use crate::settings::LlmProvider;
use crate::streaming::sse::{classify, LineDecoder, LineKind, DONE_SENTINEL};
use crate::streaming::utf8::Utf8Decoder;
use futures_util::stream::{self, Stream, StreamExt};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::env;
use std::pin::Pin;
use thiserror::Error;

// Environment variable name for custom LLM base URL override
const CUSTOM_LLM_BASE_URL_ENV: &str = "HANZI_GLOSS_LLM_BASE_URL";

const SENTENCE_PLACEHOLDER: &str = "${sentence}";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid header value: {0}")]
    InvalidHeader(String),
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Get the effective base URL for a provider.
/// For the "custom" provider, checks the environment variable first.
pub fn get_effective_base_url(provider: &LlmProvider) -> String {
    if provider.id == "custom" {
        if let Ok(env_url) = env::var(CUSTOM_LLM_BASE_URL_ENV) {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                debug!(
                    "Using base URL from environment variable {}: {}",
                    CUSTOM_LLM_BASE_URL_ENV, trimmed
                );
                return trimmed.trim_end_matches('/').to_string();
            }
        }
    }
    provider.base_url.trim_end_matches('/').to_string()
}

/// Reads the API key named by the provider. Only the "custom" provider may
/// run without one.
pub fn api_key_from_env(provider: &LlmProvider) -> Result<String, LlmError> {
    let key = env::var(&provider.api_key_env).unwrap_or_default();
    let key = key.trim().to_string();
    if key.is_empty() && provider.id != "custom" {
        return Err(LlmError::MissingApiKey(provider.api_key_env.clone()));
    }
    Ok(key)
}

pub fn render_prompt(template: &str, sentence: &str) -> String {
    if template.contains(SENTENCE_PLACEHOLDER) {
        template.replace(SENTENCE_PLACEHOLDER, sentence)
    } else {
        format!("{}\n\n{}", template, sentence)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Build headers for API requests
fn build_headers(api_key: &str) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("hanzi-gloss/", env!("CARGO_PKG_VERSION"))),
    );

    if !api_key.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::InvalidHeader(e.to_string()))?,
        );
    }

    Ok(headers)
}

/// Create an HTTP client with provider headers
fn create_client(api_key: &str) -> Result<reqwest::Client, LlmError> {
    let headers = build_headers(api_key)?;
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .build()?)
}

/// Starts a streaming segmentation request and yields the generated text
/// fragments (`choices[0].delta.content`) as they arrive.
///
/// Dropping the returned stream aborts the request.
pub async fn stream_segmentation(
    provider: &LlmProvider,
    api_key: &str,
    sentence: &str,
) -> Result<impl Stream<Item = Result<String, LlmError>>, LlmError> {
    let base_url = get_effective_base_url(provider);
    let url = format!("{}/chat/completions", base_url);

    debug!("Sending streaming chat completion request to: {}", url);

    let client = create_client(api_key)?;

    let request_body = ChatCompletionRequest {
        model: provider.model.clone(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: render_prompt(&provider.prompt_template, sentence),
        }],
        stream: true,
        response_format: ResponseFormat {
            kind: "json_object".to_string(),
        },
    };

    let response = client.post(&url).json(&request_body).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());
        return Err(LlmError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(content_fragments(response.bytes_stream()))
}

struct FragmentState<S> {
    upstream: Pin<Box<S>>,
    decoder: Utf8Decoder,
    lines: LineDecoder,
    ready: VecDeque<String>,
    finished: bool,
}

impl<S> FragmentState<S> {
    /// Queues the content of every complete `data:` line in `text`.
    fn take_lines(&mut self, text: &str) {
        for line in self.lines.push(text) {
            if self.finished {
                break;
            }
            if let Some(content) = parse_data_line(&line.content) {
                self.ready.push_back(content);
            } else if is_done_line(&line.content) {
                self.finished = true;
            }
        }
    }
}

/// Turns a chat-completion event stream into its content fragments.
pub fn content_fragments<S, B, E>(upstream: S) -> impl Stream<Item = Result<String, LlmError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<LlmError>,
{
    let state = FragmentState {
        upstream: Box::pin(upstream),
        decoder: Utf8Decoder::new(),
        lines: LineDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(content) = state.ready.pop_front() {
                return Some((Ok(content), state));
            }
            if state.finished {
                return None;
            }
            match state.upstream.next().await {
                Some(Ok(bytes)) => {
                    let text = state.decoder.decode(bytes.as_ref());
                    state.take_lines(&text);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    let rest = state.decoder.finish();
                    state.take_lines(&rest);
                    if let Some(line) = state.lines.finish().filter(|_| !state.finished) {
                        if let Some(content) = parse_data_line(&line.content) {
                            state.ready.push_back(content);
                        }
                    }
                    state.finished = true;
                }
            }
        }
    })
}

fn is_done_line(line: &str) -> bool {
    matches!(classify(line), LineKind::Data { payload, .. } if payload.trim() == DONE_SENTINEL)
}

fn parse_data_line(line: &str) -> Option<String> {
    let LineKind::Data { payload, .. } = classify(line) else {
        return None;
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return None;
    }
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty()),
        Err(e) => {
            warn!("Skipping malformed completion chunk: {} ({})", payload, e);
            None
        }
    }
}

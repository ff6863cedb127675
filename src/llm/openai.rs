use super::{ChatRequest, LlmError, SamplingParams, StreamChunk};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &crate::config::mask_key(&self.api_key))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    #[serde(flatten)]
    sampling: &'a SamplingParams,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiStreamError>,
}

#[derive(Deserialize)]
struct OpenAiStreamError {
    message: String,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiDelta {
    content: Option<String>,
}

pub async fn chat_stream(
    config: &OpenAiConfig,
    request: &ChatRequest,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError> {
    let client = Client::new();
    let messages: Vec<OpenAiMessage> = request
        .messages
        .iter()
        .map(|m| OpenAiMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();

    let body = OpenAiRequest {
        model: &request.model,
        messages,
        sampling: &request.sampling,
        stream: true,
    };

    let mut req = client
        .post(format!("{}/chat/completions", config.base_url))
        .header("Content-Type", "application/json")
        .json(&body);

    if !config.api_key.is_empty() {
        req = req.header("Authorization", format!("Bearer {}", config.api_key));
    }

    let resp = req.send().await?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status,
            message: text,
        });
    }

    accumulate_stream(resp.bytes_stream(), on_chunk).await
}

/// Fold a server-sent-event byte stream into the full reply text.
///
/// Deltas are appended in arrival order; events without choices or content
/// are skipped. Stops at `[DONE]`, at the first `finish_reason`, or when the
/// transport closes.
pub async fn accumulate_stream<S, B, E>(
    stream: S,
    on_chunk: impl Fn(StreamChunk) + Send,
) -> Result<String, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    LlmError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let mut full_content = String::new();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buffer.extend_from_slice(chunk.as_ref());

        // Only complete lines are decoded so multibyte characters split
        // across transport chunks survive.
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);

            if handle_line(line.trim(), &mut full_content, &on_chunk)? {
                on_chunk(StreamChunk {
                    delta: String::new(),
                    done: true,
                });
                return Ok(full_content);
            }
        }
    }

    // A final event without a trailing newline.
    let tail = String::from_utf8_lossy(&buffer).into_owned();
    handle_line(tail.trim(), &mut full_content, &on_chunk)?;

    on_chunk(StreamChunk {
        delta: String::new(),
        done: true,
    });
    Ok(full_content)
}

/// Returns true once the stream is finished.
fn handle_line(
    line: &str,
    full_content: &mut String,
    on_chunk: &impl Fn(StreamChunk),
) -> Result<bool, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(false);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(true);
    }

    match serde_json::from_str::<OpenAiStreamResponse>(data) {
        Ok(parsed) => {
            if let Some(error) = parsed.error {
                return Err(LlmError::Stream(error.message));
            }
            let Some(choice) = parsed.choices.first() else {
                return Ok(false);
            };
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    full_content.push_str(content);
                    on_chunk(StreamChunk {
                        delta: content.clone(),
                        done: false,
                    });
                }
            }
            Ok(choice.finish_reason.is_some())
        }
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable stream event");
            Ok(false)
        }
    }
}

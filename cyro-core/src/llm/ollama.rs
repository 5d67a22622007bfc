//! Ollama implementation of the [`Provider`](super::Provider) interface.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{ChatOptions, ChatResponse, LlmError, Message, Provider, StreamEvent};

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_CHANNEL_CAPACITY: usize = 10;

/// Talks to an Ollama server over its HTTP API (`/api/chat`, `/api/tags`).
pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: RequestOptions,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: String,
    message: ResponseMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    #[serde(default)]
    name: String,
    #[serde(default)]
    model: String,
}

impl OllamaProvider {
    /// Creates a provider. Empty strings select the `OLLAMA_HOST`
    /// environment variable (falling back to localhost) and the default
    /// model.
    pub fn new(host: String, model: String) -> Self {
        let host = if host.is_empty() {
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
        } else {
            host
        };
        let host = host.trim_end_matches('/').to_string();
        let model = if model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            model
        };

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            host,
            model,
        }
    }

    fn resolve_model<'a>(&'a self, opts: &'a ChatOptions) -> &'a str {
        opts.model.as_deref().unwrap_or(&self.model)
    }

    fn request_options(opts: &ChatOptions) -> RequestOptions {
        RequestOptions {
            temperature: opts.temperature,
            num_predict: (opts.max_tokens > 0).then_some(opts.max_tokens),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> Result<ChatResponse, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidResponse("empty message list".to_string()));
        }

        let model = self.resolve_model(opts);
        debug!(model, messages = messages.len(), "sending chat request");

        let request = ChatRequest {
            model,
            messages,
            stream: false,
            options: Self::request_options(opts),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, "chat request rejected");
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(LlmError::ModelNotFound(model.to_string()));
            }
            return Err(LlmError::InvalidResponse(format!(
                "status {status}: {body}"
            )));
        }

        let body: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        debug!(
            model = %body.model,
            prompt_tokens = body.prompt_eval_count,
            eval_tokens = body.eval_count,
            "chat request completed"
        );

        Ok(ChatResponse {
            content: body.message.content,
            model: body.model,
            tokens_prompt: body.prompt_eval_count,
            tokens_total: body.prompt_eval_count + body.eval_count,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<mpsc::Receiver<StreamEvent>, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidResponse("empty message list".to_string()));
        }

        let model = self.resolve_model(opts).to_string();
        debug!(%model, messages = messages.len(), "starting chat stream");

        let request = ChatRequest {
            model: &model,
            messages,
            stream: true,
            options: Self::request_options(opts),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(LlmError::ModelNotFound(model));
            }
            return Err(LlmError::InvalidResponse(format!("status {status}")));
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = Vec::new();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(StreamEvent {
                                content: String::new(),
                                done: true,
                                error: Some(map_transport_error(e)),
                            })
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                // Ollama streams newline-delimited JSON objects.
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parsed: ChatResponseBody = match serde_json::from_str(line) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            let _ = tx
                                .send(StreamEvent {
                                    content: String::new(),
                                    done: true,
                                    error: Some(LlmError::InvalidResponse(e.to_string())),
                                })
                                .await;
                            return;
                        }
                    };

                    let done = parsed.done;
                    let event = StreamEvent {
                        content: parsed.message.content,
                        done,
                        error: None,
                    };
                    // A failed send means the consumer dropped the receiver;
                    // treat it as cancellation.
                    if tx.send(event).await.is_err() {
                        debug!("chat stream consumer gone, aborting");
                        return;
                    }
                    if done {
                        debug!("chat stream completed");
                        return;
                    }
                }
            }

            // Body ended without a done marker.
            let _ = tx
                .send(StreamEvent {
                    content: String::new(),
                    done: true,
                    error: Some(LlmError::StreamClosed),
                })
                .await;
        });

        Ok(rx)
    }

    async fn heartbeat(&self) -> Result<(), LlmError> {
        debug!("checking ollama heartbeat");
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(HEARTBEAT_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(LlmError::ProviderUnavailable(format!(
                "status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn model_available(&self, model: &str) -> Result<bool, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(HEARTBEAT_TIMEOUT)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(LlmError::ProviderUnavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(tags
            .models
            .iter()
            .any(|m| m.name == model || m.model == model))
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() || e.is_connect() {
        LlmError::ProviderUnavailable(e.to_string())
    } else if e.is_decode() {
        LlmError::InvalidResponse(e.to_string())
    } else {
        LlmError::ProviderUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_falls_back_to_defaults() {
        std::env::remove_var("OLLAMA_HOST");
        let provider = OllamaProvider::new(String::new(), String::new());
        assert_eq!(provider.host, DEFAULT_HOST);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let provider = OllamaProvider::new("http://box:11434/".to_string(), String::new());
        assert_eq!(provider.host, "http://box:11434");
    }

    #[test]
    fn options_model_overrides_default() {
        let provider = OllamaProvider::new(String::new(), "llama3.2".to_string());
        let opts = ChatOptions {
            model: Some("mistral".to_string()),
            ..Default::default()
        };
        assert_eq!(provider.resolve_model(&opts), "mistral");
        assert_eq!(provider.resolve_model(&ChatOptions::default()), "llama3.2");
    }

    #[test]
    fn max_tokens_zero_is_omitted_from_the_wire() {
        let opts = OllamaProvider::request_options(&ChatOptions::default());
        let json = serde_json::to_string(&opts).unwrap();
        assert!(!json.contains("num_predict"));

        let opts = OllamaProvider::request_options(&ChatOptions {
            max_tokens: 128,
            ..Default::default()
        });
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"num_predict\":128"));
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let provider = OllamaProvider::new(String::new(), String::new());
        let result = provider.chat(&[], &ChatOptions::default()).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn unreachable_host_maps_to_provider_unavailable() {
        // Port 1 on loopback refuses connections immediately.
        let provider =
            OllamaProvider::new("http://127.0.0.1:1".to_string(), String::new());
        let messages = vec![Message::new(super::super::Role::User, "ping")];
        let result = provider.heartbeat().await;
        assert!(matches!(result, Err(LlmError::ProviderUnavailable(_))));
        let result = provider.chat(&messages, &ChatOptions::default()).await;
        assert!(matches!(result, Err(LlmError::ProviderUnavailable(_))));
    }
}

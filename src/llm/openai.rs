//! OpenAI-compatible provider.
//!
//! Talks to any endpoint exposing the OpenAI REST surface
//! (`/v1/chat/completions`, `/v1/embeddings`, `/v1/models`). All calls pass
//! through the shared [`CallGate`] for rate limiting and bounded retry.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::config::{AppConfig, LlmConfig};
use crate::core::errors::{RagError, Result};

use super::provider::LlmProvider;
use super::retry::{CallGate, RetryPolicy};
use super::types::ChatRequest;

const PROVIDER_NAME: &str = "openai";

pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    chat_model: String,
    embed_model: String,
    default_temperature: f64,
    client: Client,
    gate: CallGate,
}

impl OpenAiProvider {
    /// Build a provider from config, resolving the credential from the
    /// environment. A missing credential is a `Configuration` error.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = AppConfig::api_key()?;
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::configuration(format!("http client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            default_temperature: config.temperature,
            client,
            gate: CallGate::new(
                config.requests_per_minute,
                RetryPolicy::with_max_retries(config.max_retries),
            ),
        })
    }

    fn chat_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": stream,
            "temperature": request.temperature.unwrap_or(self.default_temperature),
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(s) = &request.stop {
                obj.insert("stop".to_string(), json!(s));
            }
        }

        body
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("{status}: {text}");
            // Rate limits and server-side failures are worth another attempt;
            // anything else in the 4xx range is a caller bug.
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(RagError::service_transient(PROVIDER_NAME, message))
            } else {
                Err(RagError::service(PROVIDER_NAME, message))
            };
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RagError::service(PROVIDER_NAME, format!("invalid json body: {e}")))
    }
}

fn transport_error(err: reqwest::Error) -> RagError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RagError::service_transient(PROVIDER_NAME, err)
    } else {
        RagError::service(PROVIDER_NAME, err)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.base_url);
        match self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let body = self.chat_body(&request, false);

        let payload = self
            .gate
            .run("chat completion", || self.post_json("/v1/chat/completions", &body))
            .await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                RagError::service(PROVIDER_NAME, "chat response missing message content")
            })
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        // Streaming responses are not replayed on failure; only the rate
        // limit applies before the request goes out.
        self.gate.throttle().await;

        let body = self.chat_body(&request, true);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::service(PROVIDER_NAME, format!("stream error: {text}")));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in chunk_str.lines() {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line == "data: [DONE]" {
                                return;
                            }
                            if let Some(data) = line.strip_prefix("data: ") {
                                if let Ok(json) = serde_json::from_str::<Value>(data) {
                                    if let Some(content) =
                                        json["choices"][0]["delta"]["content"].as_str()
                                    {
                                        if !content.is_empty()
                                            && tx.send(Ok(content.to_string())).await.is_err()
                                        {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(transport_error(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.embed_model,
            "input": inputs,
        });

        let payload = self
            .gate
            .run("embedding", || self.post_json("/v1/embeddings", &body))
            .await?;

        let data = payload["data"].as_array().ok_or_else(|| {
            RagError::service(PROVIDER_NAME, "embedding response missing data array")
        })?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let vals = item["embedding"].as_array().ok_or_else(|| {
                RagError::service(PROVIDER_NAME, "embedding entry missing vector")
            })?;
            let vec: Vec<f32> = vals
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            embeddings.push(vec);
        }

        if embeddings.len() != inputs.len() {
            return Err(RagError::service(
                PROVIDER_NAME,
                format!(
                    "embedding count mismatch: sent {}, received {}",
                    inputs.len(),
                    embeddings.len()
                ),
            ));
        }

        Ok(embeddings)
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceConfig;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service unreachable at {0}")]
    Connection(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("service response could not be parsed: {0}")]
    ResponseParsing(String),

    #[error("service returned empty content")]
    EmptyContent,

    #[error("no API key configured ({0} is not set)")]
    MissingApiKey(String),
}

/// One deterministic chat request. `json_mode` asks the service for a strict JSON object.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub prompt: &'a str,
    pub json_mode: bool,
}

/// Text-generation seam used by the classifier and the extractor.
pub trait GenerativeService {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ServiceError>;
}

/// Blocking client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    api_base: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout_secs: u64,
    http: reqwest::blocking::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_key_env: config.api_key_env.clone(),
            timeout_secs: config.timeout_secs,
            http,
        })
    }

    /// Sends a single PNG page alongside an instruction and returns the text reply.
    ///
    /// An empty reply is a valid answer here: blank pages transcribe to nothing.
    pub fn complete_with_image(
        &self,
        model: &str,
        system: &str,
        instruction: &str,
        png_base64: &str,
    ) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/png;base64,{png_base64}"),
                            },
                        },
                        ContentPart::Text { text: instruction },
                    ]),
                },
            ],
            temperature: 0.0,
            response_format: None,
        };

        self.send(&body)
    }

    /// Only a missing `content` is an error; an empty string is returned as is.
    fn send(&self, body: &ChatRequest<'_>) -> Result<String, ServiceError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ServiceError::MissingApiKey(self.api_key_env.clone()));
        };
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    ServiceError::Connection(self.api_base.clone())
                } else if e.is_timeout() {
                    ServiceError::Timeout(self.timeout_secs)
                } else {
                    ServiceError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| ServiceError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ServiceError::EmptyContent)
    }
}

impl GenerativeService for OpenAiClient {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(request.system),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Text(request.prompt),
                },
            ],
            temperature: 0.0,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let content = self.send(&body)?;
        if content.trim().is_empty() {
            return Err(ServiceError::EmptyContent);
        }
        Ok(content)
    }
}

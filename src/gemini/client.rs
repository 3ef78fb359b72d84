use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::sse::SseDecoder;
use super::{
    ChatRequest, Content, FragmentStream, GenerateRequest, GenerationError, GenerativeService,
    Role,
};

/// Header carrying the API key
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    parts: [Part<'a>; 1],
}

impl<'a> WireContent<'a> {
    fn new(role: Option<Role>, text: &'a str) -> Self {
        Self { role, parts: [Part { text }] }
    }
}

impl<'a> From<&'a Content> for WireContent<'a> {
    fn from(content: &'a Content) -> Self {
        Self::new(Some(content.role), &content.text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct WireRequest<'a> {
    system_instruction: WireContent<'a>,
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl<'a> WireRequest<'a> {
    pub(super) fn generate(request: &'a GenerateRequest) -> Self {
        Self {
            system_instruction: WireContent::new(None, &request.system_instruction),
            contents: vec![WireContent::new(Some(Role::User), &request.prompt)],
            generation_config: request
                .temperature
                .map(|temperature| GenerationConfig { temperature: Some(temperature) }),
        }
    }

    pub(super) fn chat(request: &'a ChatRequest) -> Self {
        let mut contents: Vec<WireContent<'a>> =
            request.history.iter().map(WireContent::from).collect();
        contents.push(WireContent::new(Some(Role::User), &request.message));
        Self {
            system_instruction: WireContent::new(None, &request.system_instruction),
            contents,
            generation_config: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ServiceError>,
}

impl WireResponse {
    /// Concatenated text of the first candidate
    pub(super) fn into_text(self) -> Result<String, GenerationError> {
        if let Some(error) = self.error {
            return Err(GenerationError::Service(error.message));
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

/// HTTP client for the Gemini `generateContent` / `streamGenerateContent` endpoints.
/// Built once at startup and shared behind an `Arc`.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            http: Client::builder().build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }

    async fn post(&self, url: &str, body: &WireRequest<'_>) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "generation request rejected");
            return Err(GenerationError::Status { status: status.as_u16(), body });
        }
        Ok(response)
    }

    async fn generate_inner(&self, request: &GenerateRequest) -> Result<String, GenerationError> {
        let url = self.endpoint("generateContent");
        debug!(model = %self.model, "generateContent");
        let response = self.post(&url, &WireRequest::generate(request)).await?;
        let bytes = response.bytes().await?;
        let wire: WireResponse = serde_json::from_slice(&bytes)?;
        wire.into_text()
    }

    async fn stream_inner(&self, request: &ChatRequest) -> Result<FragmentStream, GenerationError> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        debug!(model = %self.model, history = request.history.len(), "streamGenerateContent");
        let response = self.post(&url, &WireRequest::chat(request)).await?;

        let state = (
            Box::pin(response.bytes_stream()),
            SseDecoder::default(),
            VecDeque::new(),
            false,
        );
        let fragments = stream::unfold(state, |(mut bytes, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                    Some(Err(e)) => {
                        done = true;
                        pending.push_back(Err(GenerationError::Transport(e)));
                    }
                    None => {
                        done = true;
                        pending.extend(decoder.finish());
                    }
                }
            }
        });
        Ok(Box::pin(fragments))
    }
}

impl GenerativeService for GeminiClient {
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> BoxFuture<'a, Result<String, GenerationError>> {
        Box::pin(self.generate_inner(request))
    }

    fn stream_chat<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> BoxFuture<'a, Result<FragmentStream, GenerationError>> {
        Box::pin(self.stream_inner(request))
    }
}

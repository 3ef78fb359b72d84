mod client;
mod sse;
#[cfg(test)]
pub(crate) mod testing;

use futures_util::future::BoxFuture;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub use client::GeminiClient;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service error: {0}")]
    Service(String),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Author of a history entry as the service names it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One history entry sent to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub text: String,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, text: text.into() }
    }
}

/// Single-shot generation: prompt + system instruction + temperature
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub system_instruction: String,
    pub prompt: String,
    pub temperature: Option<f32>,
}

/// Chat turn: prior history + system instruction + the new user message
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_instruction: String,
    pub history: Vec<Content>,
    pub message: String,
}

/// Reply fragments in arrival order
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

pub trait GenerativeService: Send + Sync {
    /// Generate a complete reply in one round trip
    fn generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> BoxFuture<'a, Result<String, GenerationError>>;

    /// Open a streamed chat reply
    fn stream_chat<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> BoxFuture<'a, Result<FragmentStream, GenerationError>>;
}

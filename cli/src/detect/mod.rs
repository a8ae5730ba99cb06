//! PII detection through an OpenAI-compatible chat completions endpoint.

mod client;
mod parse;
mod prompt;

pub use client::LlmDetector;
pub use parse::parse_instances;
pub use prompt::{system_prompt, DEFAULT_CATEGORIES};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("detector returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("detector response had no message content")]
    EmptyResponse,
    #[error("could not parse detector output: {0}")]
    Parse(String),
}

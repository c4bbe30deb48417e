use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Terminal failures of a `generate` run, one variant per pipeline stage.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No API key for {provider}. Pass --api-key, set {env_var}, or run `phrasedeck key --set`.")]
    Configuration {
        provider: &'static str,
        env_var: &'static str,
    },
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("Could not extract cards from the model reply: {0}")]
    Extraction(#[from] ExtractionFailure),
    #[error("Could not save cards: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Anything that went wrong during the single completion call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("authentication rejected (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("rate limited (HTTP 429): {message}")]
    RateLimited { message: String },
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("reply was cut off after {max_tokens} tokens")]
    Truncated { max_tokens: u32 },
    #[error("model returned no text")]
    EmptyReply,
    #[error("could not decode completion body: {source}")]
    MalformedEnvelope {
        #[source]
        source: serde_json::Error,
    },
}

/// The reply could not be coerced into a card array.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}. Reply preview: {preview}")]
pub struct ExtractionFailure {
    pub reason: String,
    pub preview: String,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type AppResult<T> = std::result::Result<T, AppError>;

pub mod client;
pub mod extract;
pub mod prompt;
pub mod provider;
pub mod secrets;

pub use client::{ChatClient, Completion, healthcheck};
pub use extract::{Extraction, Strategy, extract_cards};
pub use prompt::{Prompt, build_prompt};
pub use provider::Provider;
pub use secrets::{ApiKeySource, clear_api_key, resolve_api_key, store_api_key};

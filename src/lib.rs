pub mod card;
pub mod commands;
pub mod error;
pub mod export;
pub mod llm;
pub mod logging;
pub mod palette;
pub mod utils;

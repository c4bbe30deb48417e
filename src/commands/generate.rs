use anyhow::Result;
use tracing::{info, warn};

use crate::card::{Card, CardRequest};
use crate::error::{AppError, AppResult};
use crate::export::{SaveOutcome, save_cards_csv};
use crate::llm::{
    ChatClient, Completion, Extraction, Provider, build_prompt, extract_cards, resolve_api_key,
};
use crate::palette::Palette;
use crate::utils::pluralize;

#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub json_mode: bool,
}

pub async fn run(request: CardRequest, options: GenerateOptions) -> Result<SaveOutcome> {
    let provider = options.provider;
    let Some(resolved) = resolve_api_key(options.api_key.as_deref(), provider)? else {
        return Err(AppError::Configuration {
            provider: provider.name(),
            env_var: provider.api_key_env(),
        }
        .into());
    };
    info!(%provider, source = resolved.source.description(), "using API key");

    let mut client = ChatClient::new(provider, resolved.key);
    if !options.json_mode {
        client = client.without_json_mode();
    }

    println!(
        "Generating {} {} expressions at CEFR level {} about {} with translations in {}...",
        Palette::paint(Palette::WARNING, request.count),
        Palette::paint(Palette::INFO, &request.target_language),
        Palette::paint(Palette::INFO, request.level),
        Palette::paint(Palette::INFO, &request.topic),
        Palette::paint(Palette::INFO, &request.native_language),
    );

    let (outcome, first) = generate_and_save(&client, &request).await?;
    report(&outcome, first.as_ref())?;
    Ok(outcome)
}

/// Runs prompt, completion, extraction and export against `backend`.
/// Returns the save outcome and the first card for display.
pub async fn generate_and_save<C: Completion>(
    backend: &C,
    request: &CardRequest,
) -> AppResult<(SaveOutcome, Option<Card>)> {
    let cards = generate_cards(backend, request).await?;
    let outcome = save_cards_csv(&cards, &request.output)?;
    Ok((outcome, cards.into_iter().next()))
}

pub async fn generate_cards<C: Completion>(
    backend: &C,
    request: &CardRequest,
) -> AppResult<Vec<Card>> {
    let prompt = build_prompt(request);
    let reply = backend.complete(&prompt).await?;

    match extract_cards(&reply) {
        Extraction::Cards {
            cards,
            strategy,
            skipped,
        } => {
            info!(%strategy, cards = cards.len(), skipped, "extracted cards from reply");
            if cards.len() != request.count as usize {
                warn!(
                    requested = request.count,
                    received = cards.len(),
                    "model returned a different number of cards than requested"
                );
            }
            Ok(cards)
        }
        Extraction::Failed(failure) => Err(AppError::Extraction(failure)),
    }
}

fn report(outcome: &SaveOutcome, first: Option<&Card>) -> Result<()> {
    match outcome {
        SaveOutcome::NothingToSave => {
            println!("{}", Palette::paint(Palette::WARNING, "No cards to save"));
        }
        SaveOutcome::Saved { rows, path } => {
            println!(
                "Successfully saved {} to {}",
                pluralize("card", *rows),
                Palette::paint(Palette::SUCCESS, path.display())
            );
            if let Some(card) = first {
                println!(
                    "{}\n{}",
                    Palette::dim("Example card:"),
                    serde_json::to_string_pretty(card)?
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CefrLevel;
    use crate::error::GenerationError;
    use crate::llm::Prompt;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct CannedCompletion {
        reply: String,
        seen: Mutex<Vec<Prompt>>,
    }

    impl CannedCompletion {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Completion for CannedCompletion {
        async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(prompt.clone());
            Ok(self.reply.clone())
        }
    }

    struct FailingCompletion;

    impl Completion for FailingCompletion {
        async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
            Err(GenerationError::RateLimited {
                message: "try later".into(),
            })
        }
    }

    fn french_coffee(output: std::path::PathBuf) -> CardRequest {
        CardRequest {
            count: 3,
            topic: "ordering coffee".into(),
            level: CefrLevel::A2,
            output,
            ..CardRequest::new("French")
        }
    }

    const THREE_CARDS: &str = r#"[
        {"expression": "Un café, s'il vous plaît", "context": "counter", "meaning": "A coffee, please", "usage": "Un café, s'il vous plaît.", "translation": "A coffee, please.", "notes": "polite", "cefr_level": "A2"},
        {"expression": "Sur place", "context": "ordering", "meaning": "To have here", "usage": "C'est sur place.", "translation": "It's to have here.", "notes": "", "cefr_level": "A2"},
        {"expression": "À emporter", "context": "ordering", "meaning": "To go", "literal": "to carry away", "usage": "À emporter, merci.", "translation": "To go, thanks.", "notes": "", "cefr_level": "A2"}
    ]"#;

    #[tokio::test]
    async fn three_card_reply_becomes_three_rows() {
        let dir = tempdir().unwrap();
        let request = french_coffee(dir.path().join("coffee.csv"));
        let backend = CannedCompletion::new(THREE_CARDS);

        let (outcome, first) = generate_and_save(&backend, &request).await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        for needle in ["3", "French", "ordering coffee", "A2"] {
            assert!(seen[0].user.contains(needle), "prompt missing {needle}");
        }

        assert_eq!(
            outcome,
            SaveOutcome::Saved {
                rows: 3,
                path: request.output.clone()
            }
        );
        let written = fs::read_to_string(&request.output).unwrap();
        assert_eq!(written.matches("\r\n").count(), 3);
        assert!(written.starts_with("\"Un café, s'il vous plaît\",counter,"));
        assert_eq!(
            first.and_then(|card| card.expression),
            Some("Un café, s'il vous plaît".to_string())
        );
    }

    #[tokio::test]
    async fn wrapped_reply_in_prose_still_saves() {
        let dir = tempdir().unwrap();
        let request = french_coffee(dir.path().join("coffee.csv"));
        let reply = format!("Here are your cards:\n```json\n{{\"cards\": {THREE_CARDS}}}\n```");
        let backend = CannedCompletion::new(&reply);

        let cards = generate_cards(&backend, &request).await.unwrap();
        assert_eq!(cards.len(), 3);
    }

    #[tokio::test]
    async fn generation_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let request = french_coffee(dir.path().join("coffee.csv"));

        let err = generate_and_save(&FailingCompletion, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert!(!request.output.exists());
    }

    #[tokio::test]
    async fn refusal_is_an_extraction_failure() {
        let dir = tempdir().unwrap();
        let request = french_coffee(dir.path().join("coffee.csv"));
        let backend = CannedCompletion::new("I cannot help with that.");

        let err = generate_and_save(&backend, &request).await.unwrap_err();
        match err {
            AppError::Extraction(failure) => {
                assert_eq!(failure.preview, "I cannot help with that.")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!request.output.exists());
    }

    #[tokio::test]
    async fn empty_card_array_saves_nothing() {
        let dir = tempdir().unwrap();
        let request = french_coffee(dir.path().join("coffee.csv"));
        let backend = CannedCompletion::new(r#"{"cards": []}"#);

        let (outcome, first) = generate_and_save(&backend, &request).await.unwrap();
        assert_eq!(outcome, SaveOutcome::NothingToSave);
        assert!(first.is_none());
        assert!(!request.output.exists());
    }
}

use anyhow::{Result, anyhow, bail};

use crate::llm::{Provider, clear_api_key, healthcheck, resolve_api_key, store_api_key};
use crate::llm::secrets::prompt_for_api_key;
use crate::palette::Palette;

pub async fn run(
    provider: Provider,
    set: Option<Option<String>>,
    clear: bool,
    test: bool,
) -> Result<()> {
    let mut action_taken = false;

    if let Some(value) = set {
        let key = match value {
            Some(key) => key,
            None => prompt_for_api_key(provider)?,
        };
        if key.trim().is_empty() {
            bail!("No API key provided; nothing stored.");
        }
        store_api_key(provider, &key)?;
        println!("Stored {provider} API key in the local auth file.");
        action_taken = true;
    }

    if clear {
        if clear_api_key(provider)? {
            println!("Removed the stored {provider} API key.");
        } else {
            println!("No {provider} API key found in the auth file.");
        }
        action_taken = true;
    }

    if test {
        let resolved = resolve_api_key(None, provider)?.ok_or_else(|| {
            anyhow!(
                "No {provider} API key configured. Set {} or run `phrasedeck key --set`.",
                provider.api_key_env()
            )
        })?;
        healthcheck(provider, &resolved.key).await?;
        println!(
            "{} API key from the {} is {}.",
            provider,
            resolved.source.description(),
            Palette::paint(Palette::SUCCESS, "valid")
        );
        action_taken = true;
    }

    if !action_taken {
        bail!("No action provided. Use --set, --clear, or --test.");
    }
    Ok(())
}

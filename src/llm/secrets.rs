use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Password, theme::ColorfulTheme};
use serde::{Deserialize, Serialize};

use super::provider::Provider;
use crate::palette::Palette;
use crate::utils::{get_data_dir, strip_controls_and_escapes, trim_line};

const AUTH_FILE_NAME: &str = "auth.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Flag,
    Environment,
    AuthFile,
}

impl ApiKeySource {
    pub fn description(&self) -> &'static str {
        match self {
            ApiKeySource::Flag => "--api-key flag",
            ApiKeySource::Environment => "environment variable",
            ApiKeySource::AuthFile => "local auth file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApiKey {
    pub key: String,
    pub source: ApiKeySource,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AuthFile {
    #[serde(flatten)]
    providers: HashMap<String, ProviderAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProviderAuth {
    key: String,
}

/// Finds the key for `provider`: explicit flag, then the provider's
/// environment variable, then the local auth file. Blank values are skipped.
pub fn resolve_api_key(
    explicit: Option<&str>,
    provider: Provider,
) -> Result<Option<ResolvedApiKey>> {
    let from_env = env::var(provider.api_key_env()).ok();
    resolve_api_key_from(explicit, from_env.as_deref(), &auth_file_path()?, provider)
}

fn resolve_api_key_from(
    explicit: Option<&str>,
    from_env: Option<&str>,
    auth_path: &Path,
    provider: Provider,
) -> Result<Option<ResolvedApiKey>> {
    if let Some(key) = explicit.and_then(trim_line) {
        return Ok(Some(ResolvedApiKey {
            key: key.to_string(),
            source: ApiKeySource::Flag,
        }));
    }

    if let Some(key) = from_env.and_then(trim_line) {
        return Ok(Some(ResolvedApiKey {
            key: key.to_string(),
            source: ApiKeySource::Environment,
        }));
    }

    let Some(auth) = read_auth_file(auth_path)? else {
        return Ok(None);
    };

    let key = auth
        .providers
        .get(provider.name())
        .and_then(|entry| trim_line(&entry.key))
        .map(|key| ResolvedApiKey {
            key: key.to_string(),
            source: ApiKeySource::AuthFile,
        });
    Ok(key)
}

pub fn store_api_key(provider: Provider, api_key: &str) -> Result<()> {
    store_api_key_at(&auth_file_path()?, provider, api_key)
}

fn store_api_key_at(auth_path: &Path, provider: Provider, api_key: &str) -> Result<()> {
    let trimmed = trim_line(api_key).with_context(|| "Cannot store an empty API key")?;

    let mut auth = read_auth_file(auth_path)?.unwrap_or_default();
    auth.providers.insert(
        provider.name().to_string(),
        ProviderAuth {
            key: trimmed.to_string(),
        },
    );

    write_auth_file(auth_path, &auth)
}

pub fn clear_api_key(provider: Provider) -> Result<bool> {
    clear_api_key_at(&auth_file_path()?, provider)
}

fn clear_api_key_at(auth_path: &Path, provider: Provider) -> Result<bool> {
    let Some(mut auth) = read_auth_file(auth_path)? else {
        return Ok(false);
    };

    if auth.providers.remove(provider.name()).is_none() {
        return Ok(false);
    }

    if auth.providers.is_empty() {
        fs::remove_file(auth_path).with_context(|| {
            format!(
                "Failed to remove empty auth file at {}",
                auth_path.display()
            )
        })?;
        return Ok(true);
    }

    write_auth_file(auth_path, &auth)?;
    Ok(true)
}

pub fn prompt_for_api_key(provider: Provider) -> Result<String> {
    println!(
        "{} to store it locally for future runs.",
        Palette::paint(Palette::SUCCESS, format!("Enter your {provider} API key"))
    );
    println!("{}", Palette::dim("Leave the field blank to cancel."));
    let raw_password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("API Key")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read API key from the terminal")?;

    Ok(strip_controls_and_escapes(&raw_password))
}

fn auth_file_path() -> Result<PathBuf> {
    let data_dir = get_data_dir()?;
    Ok(data_dir.join(AUTH_FILE_NAME))
}

fn read_auth_file(path: &Path) -> Result<Option<AuthFile>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(parse_auth_contents(&contents, path)?),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read auth file at {}", path.display()))
        }
    }
}

fn write_auth_file(path: &Path, value: &AuthFile) -> Result<()> {
    let contents = serialize_auth(value)?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write auth file at {}", path.display()))?;
    Ok(())
}

fn parse_auth_contents(contents: &str, path: &Path) -> Result<Option<AuthFile>> {
    if contents.trim().is_empty() {
        return Ok(Some(AuthFile::default()));
    }

    let parsed: AuthFile = serde_json::from_str(contents)
        .with_context(|| format!("Failed to parse auth file at {}", path.display()))?;
    Ok(Some(parsed))
}

fn serialize_auth(value: &AuthFile) -> Result<String> {
    let contents = serde_json::to_string_pretty(value)?;
    Ok(format!("{}\n", contents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_auth_contents_handles_empty() {
        let path = Path::new("auth.json");
        let parsed = parse_auth_contents("   \n", path).unwrap();
        let auth = parsed.expect("expected auth file for empty contents");
        assert!(auth.providers.is_empty());
    }

    #[test]
    fn serialize_auth_adds_trailing_newline() {
        let mut auth = AuthFile::default();
        auth.providers.insert(
            "deepseek".to_string(),
            ProviderAuth {
                key: "test-key".to_string(),
            },
        );

        let serialized = serialize_auth(&auth).unwrap();
        assert!(serialized.ends_with('\n'));
        assert!(serialized.contains("\"deepseek\""));
    }

    #[test]
    fn flag_beats_environment_and_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        store_api_key_at(&path, Provider::Deepseek, "file-key").unwrap();

        let resolved =
            resolve_api_key_from(Some("flag-key"), Some("env-key"), &path, Provider::Deepseek)
                .unwrap()
                .unwrap();
        assert_eq!(resolved.key, "flag-key");
        assert_eq!(resolved.source, ApiKeySource::Flag);

        let resolved = resolve_api_key_from(None, Some("env-key"), &path, Provider::Deepseek)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key, "env-key");
        assert_eq!(resolved.source, ApiKeySource::Environment);

        let resolved = resolve_api_key_from(Some("  "), Some(""), &path, Provider::Deepseek)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key, "file-key");
        assert_eq!(resolved.source, ApiKeySource::AuthFile);
    }

    #[test]
    fn missing_everywhere_resolves_to_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let resolved = resolve_api_key_from(None, None, &path, Provider::Deepseek).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn keys_are_stored_per_provider() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        store_api_key_at(&path, Provider::Openai, "openai-key").unwrap();

        let deepseek = resolve_api_key_from(None, None, &path, Provider::Deepseek).unwrap();
        assert!(deepseek.is_none());
        let openai = resolve_api_key_from(None, None, &path, Provider::Openai)
            .unwrap()
            .unwrap();
        assert_eq!(openai.key, "openai-key");
    }

    #[test]
    fn overwrite_then_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");

        store_api_key_at(&path, Provider::Deepseek, "fake_key").unwrap();
        store_api_key_at(&path, Provider::Deepseek, " real_key\n").unwrap();

        let resolved = resolve_api_key_from(None, None, &path, Provider::Deepseek)
            .unwrap()
            .unwrap();
        assert_eq!(resolved.key, "real_key");

        assert!(clear_api_key_at(&path, Provider::Deepseek).unwrap());
        assert!(!path.exists());
        assert!(!clear_api_key_at(&path, Provider::Deepseek).unwrap());
    }

    #[test]
    fn clearing_one_provider_keeps_the_other() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        store_api_key_at(&path, Provider::Deepseek, "a").unwrap();
        store_api_key_at(&path, Provider::Openai, "b").unwrap();

        assert!(clear_api_key_at(&path, Provider::Deepseek).unwrap());
        assert!(path.exists());
        let openai = resolve_api_key_from(None, None, &path, Provider::Openai)
            .unwrap()
            .unwrap();
        assert_eq!(openai.key, "b");
    }

    #[test]
    fn storing_blank_key_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        assert!(store_api_key_at(&path, Provider::Deepseek, "   ").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_auth_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auth.json");
        fs::write(&path, "not json").unwrap();
        let err = resolve_api_key_from(None, None, &path, Provider::Deepseek).unwrap_err();
        assert!(err.to_string().contains("Failed to parse auth file"));
    }
}

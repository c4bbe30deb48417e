use std::fmt;

use clap::ValueEnum;

/// Upper bound on reply length; a full deck of cards fits well inside it.
pub const MAX_OUTPUT_TOKENS: u32 = 4000;

/// OpenAI-compatible chat-completion backends the generator can talk to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum Provider {
    #[default]
    Deepseek,
    Openai,
}

impl Provider {
    pub fn name(self) -> &'static str {
        match self {
            Provider::Deepseek => "deepseek",
            Provider::Openai => "openai",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Provider::Deepseek => "https://api.deepseek.com",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }

    pub fn model(self) -> &'static str {
        match self {
            Provider::Deepseek => "deepseek-chat",
            Provider::Openai => "gpt-4o-mini",
        }
    }

    pub fn api_key_env(self) -> &'static str {
        match self {
            Provider::Deepseek => "DEEPSEEK_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
        }
    }

    pub fn supports_json_mode(self) -> bool {
        match self {
            Provider::Deepseek | Provider::Openai => true,
        }
    }

    pub fn chat_completions_url(self) -> String {
        format!("{}/chat/completions", self.base_url().trim_end_matches('/'))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_chat_completions() {
        assert_eq!(
            Provider::Deepseek.chat_completions_url(),
            "https://api.deepseek.com/chat/completions"
        );
        assert_eq!(
            Provider::Openai.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn names_match_cli_values() {
        for provider in Provider::value_variants() {
            let parsed = Provider::from_str(provider.name(), true).unwrap();
            assert_eq!(parsed, *provider);
        }
    }
}

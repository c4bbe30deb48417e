use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One flashcard as returned by the model and written to the CSV export.
///
/// Every field is free-form text. Absence is preserved rather than replaced
/// with a guess, so a card missing `literal` exports an empty cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub cefr_level: Option<String>,
    #[serde(default, deserialize_with = "text_field", skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl Card {
    pub fn get(&self, field: CardField) -> Option<&str> {
        let value = match field {
            CardField::Expression => &self.expression,
            CardField::Context => &self.context,
            CardField::Meaning => &self.meaning,
            CardField::Literal => &self.literal,
            CardField::Usage => &self.usage,
            CardField::Translation => &self.translation,
            CardField::Notes => &self.notes,
            CardField::CefrLevel => &self.cefr_level,
            CardField::AudioUrl => &self.audio_url,
        };
        value.as_deref()
    }

    /// Cells in export order, with absent fields as empty strings.
    pub fn row(&self) -> [&str; CardField::COUNT] {
        CardField::ALL.map(|field| self.get(field).unwrap_or(""))
    }
}

// Models occasionally emit numbers or booleans where text was asked for.
// Scalars are kept as their textual form and `null` counts as absent.
fn text_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
    })
}

/// The fixed, ordered card schema. The order here is the order fields are
/// listed in the prompt and the order of CSV columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CardField {
    Expression,
    Context,
    Meaning,
    Literal,
    Usage,
    Translation,
    Notes,
    CefrLevel,
    AudioUrl,
}

impl CardField {
    pub const COUNT: usize = 9;

    pub const ALL: [CardField; Self::COUNT] = [
        CardField::Expression,
        CardField::Context,
        CardField::Meaning,
        CardField::Literal,
        CardField::Usage,
        CardField::Translation,
        CardField::Notes,
        CardField::CefrLevel,
        CardField::AudioUrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CardField::Expression => "expression",
            CardField::Context => "context",
            CardField::Meaning => "meaning",
            CardField::Literal => "literal",
            CardField::Usage => "usage",
            CardField::Translation => "translation",
            CardField::Notes => "notes",
            CardField::CefrLevel => "cefr_level",
            CardField::AudioUrl => "audio_url",
        }
    }

    /// Fields that do not apply to every expression.
    pub fn is_optional(self) -> bool {
        matches!(self, CardField::Literal | CardField::AudioUrl)
    }
}

impl fmt::Display for CardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CEFR proficiency tiers, ordered from beginner to mastery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum CefrLevel {
    #[value(name = "A1")]
    A1,
    #[value(name = "A2")]
    A2,
    #[default]
    #[value(name = "B1")]
    B1,
    #[value(name = "B2")]
    B2,
    #[value(name = "C1")]
    C1,
    #[value(name = "C2")]
    C2,
}

impl CefrLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CefrLevel::A1 => "A1",
            CefrLevel::A2 => "A2",
            CefrLevel::B1 => "B1",
            CefrLevel::B2 => "B2",
            CefrLevel::C1 => "C1",
            CefrLevel::C2 => "C2",
        }
    }
}

impl fmt::Display for CefrLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_NATIVE_LANGUAGE: &str = "English";
pub const DEFAULT_CARD_COUNT: u32 = 10;
pub const DEFAULT_TOPIC: &str = "general";
pub const DEFAULT_OUTPUT: &str = "anki_cards.csv";

/// Everything one invocation asks the model for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardRequest {
    pub target_language: String,
    pub native_language: String,
    pub count: u32,
    pub topic: String,
    pub level: CefrLevel,
    pub output: PathBuf,
}

impl CardRequest {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
            native_language: DEFAULT_NATIVE_LANGUAGE.to_string(),
            count: DEFAULT_CARD_COUNT,
            topic: DEFAULT_TOPIC.to_string(),
            level: CefrLevel::default(),
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

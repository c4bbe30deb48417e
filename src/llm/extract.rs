//! Recovers a card array from whatever text the model sent back.
//!
//! The reply is untrusted input. Extraction tries, in order:
//!
//! 1. the whole reply as a JSON object holding the card array under `"cards"`
//!    or under any key whose array starts with an object carrying `"expression"`;
//! 2. the whole reply as a bare JSON array;
//! 3. the slice from the first `[` to the last `]` as a JSON array.
//!
//! Nothing here returns an error. A reply that defeats every attempt yields
//! [`Extraction::Failed`] with a bounded preview of the text.

use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::prompt::CARDS_KEY;
use crate::card::{Card, CardField};
use crate::error::ExtractionFailure;
use crate::utils::preview;

pub const PREVIEW_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Array found inside a JSON object.
    WrappedArray,
    /// The reply was a JSON array.
    BareArray,
    /// Array cut out of surrounding prose.
    BracketSlice,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Strategy::WrappedArray => "wrapped array",
            Strategy::BareArray => "bare array",
            Strategy::BracketSlice => "bracket slice",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    Cards {
        cards: Vec<Card>,
        strategy: Strategy,
        /// Array elements that were not JSON objects.
        skipped: usize,
    },
    Failed(ExtractionFailure),
}

impl Extraction {
    pub fn into_result(self) -> Result<Vec<Card>, ExtractionFailure> {
        match self {
            Extraction::Cards { cards, .. } => Ok(cards),
            Extraction::Failed(failure) => Err(failure),
        }
    }
}

pub fn extract_cards(raw: &str) -> Extraction {
    let text = raw.trim();

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            if let Some(items) = find_card_array(map) {
                return collect(items, Strategy::WrappedArray);
            }
            debug!("reply is a JSON object without a card array");
        }
        Ok(Value::Array(items)) => return collect(items, Strategy::BareArray),
        Ok(other) => debug!(kind = json_kind(&other), "reply is JSON of an unexpected shape"),
        Err(err) => debug!(%err, "reply is not valid JSON as a whole"),
    }

    let Some(slice) = bracket_slice(text) else {
        return failed("no JSON array found", raw);
    };
    warn!("falling back to the bracketed slice of the reply");

    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Array(items)) => collect(items, Strategy::BracketSlice),
        Ok(_) => failed("bracketed text is not a JSON array", raw),
        Err(err) => failed(&format!("bracketed text is not valid JSON ({err})"), raw),
    }
}

fn find_card_array(mut map: Map<String, Value>) -> Option<Vec<Value>> {
    if let Some(Value::Array(items)) = map.remove(CARDS_KEY) {
        return Some(items);
    }

    let expression = CardField::Expression.name();
    map.into_iter().find_map(|(key, value)| match value {
        Value::Array(items)
            if items
                .first()
                .and_then(Value::as_object)
                .is_some_and(|first| first.contains_key(expression)) =>
        {
            debug!(%key, "found card array under an unexpected key");
            Some(items)
        }
        _ => None,
    })
}

fn bracket_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (start < end).then(|| &text[start..=end])
}

fn collect(items: Vec<Value>, strategy: Strategy) -> Extraction {
    let total = items.len();
    let cards: Vec<Card> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(_) => serde_json::from_value(item).ok(),
            _ => None,
        })
        .collect();
    let skipped = total - cards.len();
    if skipped > 0 {
        warn!(skipped, "ignored array elements that are not card objects");
    }
    debug!(%strategy, cards = cards.len(), "extracted cards");

    Extraction::Cards {
        cards,
        strategy,
        skipped,
    }
}

fn failed(reason: &str, raw: &str) -> Extraction {
    Extraction::Failed(ExtractionFailure {
        reason: reason.to_string(),
        preview: preview(raw.trim(), PREVIEW_CHARS),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

use crate::card::{CardField, CardRequest};

/// Key the model is asked to wrap its card array in.
pub const CARDS_KEY: &str = "cards";

const SYSTEM_PROMPT_HEADER: &str = r#"You are an expert linguist and language teacher specializing in creating high-quality language learning materials.
You have deep knowledge of the Common European Framework of Reference for Languages (CEFR) levels and can accurately create language content appropriate for each level.

You will output strictly valid JSON with language learning expressions according to the user's requirements.
Your output must be a JSON object with a single key "cards" containing an array of card objects.

Example JSON output format:
"#;

/// The two text blocks sent to the completion endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(request: &CardRequest) -> Prompt {
    Prompt {
        system: build_system_prompt(),
        user: build_user_prompt(request),
    }
}

fn build_system_prompt() -> String {
    let mut prompt = String::from(SYSTEM_PROMPT_HEADER);
    prompt.push_str("{\n  \"cards\": [\n    {\n");
    let lines: Vec<String> = CardField::ALL
        .iter()
        .map(|field| format!("      \"{}\": \"{}\"", field.name(), example_value(*field)))
        .collect();
    prompt.push_str(&lines.join(",\n"));
    prompt.push_str("\n    }\n  ]\n}\n");
    prompt
}

fn example_value(field: CardField) -> &'static str {
    match field {
        CardField::Expression => "Expression in target language",
        CardField::Context => "When/where this is used",
        CardField::Meaning => "Translation or meaning",
        CardField::Literal => "Word-for-word translation if applicable",
        CardField::Usage => "Example sentence",
        CardField::Translation => "Translation of example",
        CardField::Notes => "Cultural context or grammar notes",
        CardField::CefrLevel => "CEFR level",
        CardField::AudioUrl => "URL of a pronunciation recording, if known",
    }
}

fn field_description(field: CardField, request: &CardRequest) -> String {
    let target = &request.target_language;
    let native = &request.native_language;
    match field {
        CardField::Expression => format!("The expression in {target}"),
        CardField::Context => "When/where this expression is typically used".to_string(),
        CardField::Meaning => format!("Translation or meaning in {native}"),
        CardField::Literal => "Word-for-word translation if it's an idiom".to_string(),
        CardField::Usage => "An example sentence using this expression".to_string(),
        CardField::Translation => format!("Translation of the example sentence in {native}"),
        CardField::Notes => "Any cultural context, formality level, or grammar notes".to_string(),
        CardField::CefrLevel => format!(
            "The CEFR level of this expression (should match requested level: {})",
            request.level
        ),
        CardField::AudioUrl => {
            "A URL to a pronunciation recording of the expression, only if you know a real one"
                .to_string()
        }
    }
}

fn build_user_prompt(request: &CardRequest) -> String {
    let CardRequest {
        target_language: target,
        count,
        topic,
        level,
        ..
    } = request;

    let mut prompt = format!(
        "Create {count} useful, everyday expressions in {target} related to {topic} at CEFR level {level}.\n\n"
    );

    prompt.push_str("Each card object must have these fields, in this order:\n");
    for field in CardField::ALL {
        let optional = if field.is_optional() { " (optional)" } else { "" };
        prompt.push_str(&format!(
            "- {}: {}{optional}\n",
            field.name(),
            field_description(field, request)
        ));
    }

    prompt.push_str(&format!(
        "\nMake sure the expressions are:\n\
         - Appropriate for CEFR level {level} learners of {target}\n\
         - Commonly used by native speakers\n\
         - Useful for everyday conversation\n\
         - Varied in formality levels\n\
         - Include some idioms and colloquial phrases if appropriate for the level\n"
    ));

    prompt.push_str(&format!(
        "\nReply with either a JSON object with a single key \"{CARDS_KEY}\" containing an array of {count} card objects, \
         or a bare JSON array of {count} card objects. Output nothing else: no explanations, \
         no markdown fences, no commentary before or after the JSON.\n"
    ));

    prompt
}

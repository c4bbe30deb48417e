use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueHint};

use phrasedeck::card::{
    CardRequest, CefrLevel, DEFAULT_CARD_COUNT, DEFAULT_NATIVE_LANGUAGE, DEFAULT_OUTPUT,
    DEFAULT_TOPIC,
};
use phrasedeck::commands::generate::{self, GenerateOptions};
use phrasedeck::commands::key;
use phrasedeck::llm::Provider;
use phrasedeck::logging::init_logging;
use phrasedeck::palette::Palette;

#[derive(Parser, Debug)]
#[command(
    name = "phrasedeck",
    version,
    about = "Generate language-learning flashcards with an LLM and export them for Anki.",
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true,
    disable_help_subcommand = true
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate cards and write them to a CSV file
    Generate {
        /// Language the expressions are in
        #[arg(long, value_name = "LANG")]
        target_language: String,
        /// Your native language, used for meanings and translations
        #[arg(long, value_name = "LANG", default_value = DEFAULT_NATIVE_LANGUAGE)]
        native_language: String,
        /// Number of cards to generate
        #[arg(
            long,
            value_name = "COUNT",
            default_value_t = DEFAULT_CARD_COUNT,
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        number: u32,
        /// Topic for the expressions
        #[arg(long, default_value = DEFAULT_TOPIC)]
        topic: String,
        /// CEFR proficiency level
        #[arg(long, value_enum, ignore_case = true, default_value_t = CefrLevel::default())]
        cefr_level: CefrLevel,
        /// Output CSV path
        #[arg(
            long,
            value_name = "PATH",
            default_value = DEFAULT_OUTPUT,
            value_hint = ValueHint::FilePath
        )]
        output: PathBuf,
        /// API key (otherwise read from the provider's environment variable or the auth file)
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,
        /// Completion backend
        #[arg(long, value_enum, default_value_t = Provider::default())]
        provider: Provider,
        /// Do not ask the backend for a JSON-only reply
        #[arg(long, default_value_t = false)]
        no_json_mode: bool,
    },
    /// Manage stored API keys
    Key {
        /// Store an API key in the local auth file (prompts when KEY is omitted)
        #[arg(long, value_name = "KEY", num_args = 0..=1, conflicts_with = "clear")]
        set: Option<Option<String>>,
        /// Remove the stored API key from the local auth file
        #[arg(long, conflicts_with = "test")]
        clear: bool,
        /// Verify the configured API key against the provider
        #[arg(long)]
        test: bool,
        /// Which provider's key to manage
        #[arg(long, value_enum, default_value_t = Provider::default())]
        provider: Provider,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("{} {:#}", Palette::paint(Palette::DANGER, "error:"), err);
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Generate {
            target_language,
            native_language,
            number,
            topic,
            cefr_level,
            output,
            api_key,
            provider,
            no_json_mode,
        } => {
            let request = CardRequest {
                target_language,
                native_language,
                count: number,
                topic,
                level: cefr_level,
                output,
            };
            let options = GenerateOptions {
                provider,
                api_key,
                json_mode: !no_json_mode,
            };
            generate::run(request, options).await?;
        }
        Command::Key {
            set,
            clear,
            test,
            provider,
        } => key::run(provider, set, clear, test).await?,
    }

    Ok(())
}

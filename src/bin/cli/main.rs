mod discover;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ko2anki_lib::config::{Config, ConfigOverrides};
use ko2anki_lib::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "ko2anki", about = "Turn KOReader highlights into Anki cloze decks", version)]
struct Cli {
    /// KOReader side-car files or folders to search for `metadata.*.lua`
    #[arg(short, long = "input", value_name = "PATH", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Folder the .apkg files are written to
    #[arg(short, long, value_name = "FOLDER")]
    output: PathBuf,

    /// Deck name template, with {title}, {authors} and {language}
    #[arg(short = 'n', long)]
    deck_name: Option<String>,

    /// Pick the cloze word by length instead of with the language model
    #[arg(long)]
    no_ai: bool,

    /// Put every book into one deck with this name
    #[arg(long, value_name = "NAME")]
    combined: Option<String>,

    /// Shortest word that may be blanked
    #[arg(long)]
    min_word_len: Option<usize>,

    /// Stopword language for every book (default: each book's own)
    #[arg(long)]
    language: Option<String>,

    /// Config file (default: <config dir>/ko2anki/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,
}

#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref()).context("Failed to load config")?;
    config.apply(ConfigOverrides {
        deck_name_template: cli.deck_name,
        no_ai: cli.no_ai,
        min_word_len: cli.min_word_len,
        combined_deck: cli.combined,
        language: cli.language,
    });

    let documents = discover::find_documents(&cli.inputs)?;
    if documents.is_empty() {
        eprintln!("No KOReader highlight files ({}) found.", discover::SIDECAR_PATTERN);
        std::process::exit(1);
    }
    log::info!("Found {} highlight files", documents.len());

    let report = Pipeline::new(config)
        .run(&documents, &cli.output)
        .context("Conversion failed")?;

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&render::summary_json(&report))?);
        }
        OutputFormat::Plain => {
            let use_color = !cli.no_color && std::io::stdout().is_terminal();
            println!("{}", render::summary(&report, use_color));
        }
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

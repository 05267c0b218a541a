//! Replay recorded recognizer messages against a passage
//!
//! Reads a passage (one verse per non-empty line) and a JSON-lines file of
//! inbound recognizer messages, runs every message through a session and
//! prints the progress after each alignment pass.

use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use recite::fuzzy::load_homonyms;
use recite::{
    AlignmentSession, Passage, RecitationConfig, Result, SessionUpdate, SharedHomonyms,
    parse_inbound, results_text, state_vector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// State vector, cursor and recited text per pass
    Text,
    /// One `SessionUpdate` JSON object per pass
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "recite-replay", version, about)]
struct Args {
    /// Passage text file, one verse per line
    #[arg(long)]
    passage: PathBuf,

    /// JSON-lines recognizer messages; `-` reads stdin
    #[arg(long, default_value = "-")]
    messages: String,

    /// Config file (defaults to the user config location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Homonym table path or URL, overriding the config
    #[arg(long)]
    homonyms: Option<String>,

    /// Log level when RUST_LOG is unset, overriding the config
    #[arg(long)]
    log_level: Option<String>,

    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

fn read_passage(path: &Path) -> Result<Passage> {
    let raw = fs::read_to_string(path)?;
    let verses: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    Ok(Passage::from_verses(&verses))
}

fn open_messages(source: &str) -> Result<Box<dyn BufRead>> {
    if source == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    Ok(Box::new(BufReader::new(fs::File::open(source)?)))
}

fn print_update(
    session: &AlignmentSession,
    update: &SessionUpdate,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(update)?),
        OutputFormat::Text => {
            let cursor = update
                .cursor
                .map(|c| format!("{}:{}", c.verse_index, c.word_index))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] {} cursor={} | {}",
                if update.partial { "partial" } else { "final" },
                state_vector(session.marks()),
                cursor,
                results_text(session.passage(), session.marks(), update.cursor)
            );
            if let Some(words) = &update.vocabulary {
                println!("  vocab: {}", words.join(", "));
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RecitationConfig::load(path)?,
        None => RecitationConfig::load_default()?,
    };
    if let Some(source) = args.homonyms.clone() {
        config.homonyms_source = Some(source);
    }

    let level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    recite::logging::init_tracing(&level)?;

    let homonyms = SharedHomonyms::default();
    if let Some(source) = &config.homonyms_source {
        load_homonyms(&homonyms, source).await;
    }

    let passage = read_passage(&args.passage)?;
    info!(
        verses = passage.verse_count(),
        tokens = passage.len(),
        "Passage loaded"
    );

    let mut session = AlignmentSession::new(passage, config, homonyms);
    let reader = open_messages(&args.messages)?;

    let mut applied = 0usize;
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(message) = parse_inbound(&line) else {
            warn!(line = number + 1, "Skipping malformed message");
            continue;
        };
        let update = session.apply_message(&message);
        print_update(&session, &update, args.format)?;
        applied += 1;
    }

    info!(messages = applied, "Replay finished");
    Ok(())
}

mod cluster;
mod config;
mod error;
mod ingest;
mod llm;
mod retriever;
mod search;
mod store;
mod utils;
mod vectorizer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Settings;
use llm::OpenAiClient;
use retriever::Retriever;
use std::path::PathBuf;
use tracing::Level;

/// Keeps a searchable history of question/answer exchanges.
#[derive(Parser, Debug)]
#[command(name = "chat-recall", version, about)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chat database, overriding `database.path`
    #[arg(long, global = true, env = "CHAT_RECALL_DB")]
    db: Option<PathBuf>,

    /// More output per occurrence (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the chat table if it does not exist
    Init,
    /// Ask the completion service and store the exchange
    Ask {
        prompt: String,
        /// Send similar past exchanges along as context
        #[arg(long)]
        with_history: bool,
    },
    /// Find past exchanges similar to a query
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Group stored questions by topic
    Topics {
        #[arg(long)]
        json: bool,
    },
    /// Import exported history from a JSON file
    Import { file: PathBuf },
    /// Print every stored exchange
    History {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured.parse().unwrap_or(Level::WARN),
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Settings::default_config_path);
    let mut settings = Settings::load(config_path.as_deref())?;
    if let Some(db) = cli.db {
        settings.database.path = db;
    }
    init_logging(cli.verbose, &settings.logging.level);

    let completion = settings.completion.clone();
    let db_path = settings.database.path.clone();
    let mut retriever = Retriever::open(settings)
        .with_context(|| format!("Failed to open chat store at {}", db_path.display()))?;

    match cli.command {
        Command::Init => {
            println!(
                "Chat store ready at {} ({} conversations)",
                db_path.display(),
                retriever.count()?
            );
        }
        Command::Ask {
            prompt,
            with_history,
        } => {
            let client = OpenAiClient::new(&completion)?;
            let (_, response) = retriever
                .ask(&client, &prompt, with_history)
                .await
                .context("Failed to get a response")?;
            println!("{response}");
        }
        Command::Search { query, json } => {
            let hits = retriever.search(&query)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No matching conversations.");
            } else {
                for hit in hits {
                    println!("Q: {}", hit.user_input);
                    println!("A: {}\n", hit.response.as_deref().unwrap_or(""));
                }
            }
        }
        Command::Topics { json } => {
            let topics = retriever.cluster_by_topic()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&topics)?);
            } else if topics.is_empty() {
                println!("Not enough conversations to group.");
            } else {
                for (id, members) in &topics {
                    println!("Topic {}", id + 1);
                    for member in members {
                        println!("  - {member}");
                    }
                }
            }
        }
        Command::Import { file } => {
            let written = retriever
                .ingest_file(&file)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            println!("Imported {written} conversations.");
        }
        Command::History { json } => {
            let records = retriever.history()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in records {
                    println!("[{}] {} {}", record.id, record.timestamp, record.user_input);
                    println!("    {}", record.response.as_deref().unwrap_or(""));
                }
            }
        }
    }

    retriever.close()?;
    Ok(())
}

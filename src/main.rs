use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod chat;
mod db;
mod format;
mod models;
mod rank;
mod report;
mod retry;
mod settings;
mod sisu;

use settings::{Settings, SettingsStore};

#[derive(Parser)]
#[command(name = "sisu-medicina")]
#[command(about = "Admission odds tracker for SISU medicine courses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Harvest institutions and course offerings from the SISU API
    Harvest,
    /// Rank course offerings against your saved scores
    Rank {
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export the normalized offerings to CSV
    Export {
        #[arg(long, default_value = "universities.csv")]
        out: PathBuf,
    },
    /// Save your five subject scores
    Scores {
        #[arg(long)]
        linguagens: Option<f64>,
        #[arg(long)]
        humanas: Option<f64>,
        #[arg(long)]
        natureza: Option<f64>,
        #[arg(long)]
        matematica: Option<f64>,
        #[arg(long)]
        redacao: Option<f64>,
        /// Forget all saved scores
        #[arg(long)]
        clear: bool,
    },
    /// Save your preferred states (two-letter codes)
    States {
        states: Vec<String>,
        /// Forget all preferred states
        #[arg(long)]
        clear: bool,
    },
    /// Ask the assistant a question about the dataset
    Chat { question: String },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set to a Postgres instance")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store = SettingsStore::default_location()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Harvest => {
            let client = sisu::SisuClient::new()?;
            let institutions = client.discover_medicine_institutions().await?;
            println!("Found {} institutions with medicine courses.", institutions.len());

            let offerings = client.harvest_course_offerings(&institutions).await?;
            println!("Found {} medicine course offerings.", offerings.len());

            // Persist only after the whole harvest succeeded, so readers never
            // observe a partially refreshed dataset.
            let pool = connect().await?;
            db::upsert_institutions(&pool, &institutions).await?;
            db::upsert_offerings(&pool, &offerings).await?;
            info!(
                institutions = institutions.len(),
                offerings = offerings.len(),
                "harvest persisted"
            );
            println!("Harvest complete.");
        }
        Commands::Rank { limit } => {
            let pool = connect().await?;
            let offerings = db::fetch_offerings(&pool).await?;
            if offerings.is_empty() {
                println!("No offerings stored. Run `sisu-medicina harvest` first.");
                return Ok(());
            }

            let saved = store.load();
            let preferred: HashSet<String> = saved.preferred_states.iter().cloned().collect();
            let ranked = rank::rank(&offerings, &saved.scores, &preferred);

            if !saved.scores.is_complete() {
                println!("Scores incomplete: composite shown as '-' until all five are set.");
            }
            let shown = if limit == 0 { ranked.len() } else { limit };
            for entry in ranked.iter().take(shown) {
                println!(
                    "- [{}] {} ({}, {}-{}) corte {:.2}, sua nota {}, delta {}",
                    rank::status_label(entry.passed),
                    entry.offering.name,
                    entry.offering.short_name,
                    entry.offering.city,
                    entry.offering.state,
                    entry.offering.min_score,
                    rank::format_value(entry.score),
                    rank::format_value(entry.delta),
                );
            }
        }
        Commands::Report { out } => {
            let pool = connect().await?;
            let offerings = db::fetch_offerings(&pool).await?;
            let saved = store.load();
            let preferred: HashSet<String> = saved.preferred_states.iter().cloned().collect();
            let ranked = rank::rank(&offerings, &saved.scores, &preferred);
            let report = report::build_report(&ranked, &saved.scores);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let pool = connect().await?;
            let offerings = db::fetch_offerings(&pool).await?;
            let written = db::export_csv(&offerings, &out)?;
            println!("Exported {written} offerings to {}.", out.display());
        }
        Commands::Scores {
            linguagens,
            humanas,
            natureza,
            matematica,
            redacao,
            clear,
        } => {
            let mut saved = store.load();
            if clear {
                saved.scores = models::UserScores::default();
            }
            apply_score(&mut saved.scores.linguagens, linguagens);
            apply_score(&mut saved.scores.humanas, humanas);
            apply_score(&mut saved.scores.natureza, natureza);
            apply_score(&mut saved.scores.matematica, matematica);
            apply_score(&mut saved.scores.redacao, redacao);
            store.save(&saved)?;
            print_scores(&saved);
            println!("Saved to {}.", store.path().display());
        }
        Commands::States { states, clear } => {
            let mut saved = store.load();
            if clear {
                saved.preferred_states.clear();
            } else if !states.is_empty() {
                saved.preferred_states = states
                    .iter()
                    .map(|state| state.trim().to_uppercase())
                    .collect();
            }
            store.save(&saved)?;
            if saved.preferred_states.is_empty() {
                println!("No preferred states set.");
            } else {
                println!("Preferred states: {}", saved.preferred_states.join(", "));
            }
            println!("Saved to {}.", store.path().display());
        }
        Commands::Chat { question } => {
            let pool = connect().await?;
            let offerings = db::fetch_offerings(&pool).await?;
            let saved = store.load();

            let api_key = std::env::var("GEMINI_API_KEY")
                .context("GEMINI_API_KEY must be set to use the assistant")?;
            let client = chat::GeminiClient::new(api_key)?;
            let messages = vec![chat::ChatMessage {
                role: chat::Role::User,
                content: question,
            }];
            let prompt = chat::build_prompt(&messages, &offerings, Some(&saved.scores));

            match client.generate(&prompt).await {
                Ok(reply) => println!("{}", format::decorate(&reply)),
                Err(err) => {
                    tracing::warn!(error = %err, "assistant call failed");
                    println!("{}", chat::FALLBACK_MESSAGE);
                }
            }
        }
    }

    Ok(())
}

fn apply_score(slot: &mut Option<f64>, value: Option<f64>) {
    if let Some(value) = value {
        *slot = Some(settings::normalize_score(value));
    }
}

fn print_scores(saved: &Settings) {
    let show = |value: Option<f64>| match value {
        Some(value) => format!("{value:.1}"),
        None => "-".to_string(),
    };
    println!(
        "Scores: linguagens {}, humanas {}, natureza {}, matemática {}, redação {}",
        show(saved.scores.linguagens),
        show(saved.scores.humanas),
        show(saved.scores.natureza),
        show(saved.scores.matematica),
        show(saved.scores.redacao),
    );
}

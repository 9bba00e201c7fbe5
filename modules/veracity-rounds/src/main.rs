use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use veracity_common::{Config, RoundError};
use veracity_rounds::{ClaudeAgents, DeceptionController, QuizController, RoundSettings};
use wiki_client::{MediaWikiFetcher, WikiClient};

#[derive(Parser)]
#[command(name = "veracity", about = "Run one audited generation round and print it as JSON")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Record per-stage trace entries on quiz rounds
    #[arg(long, global = true)]
    stage_log: bool,

    /// Override both the round and correction attempt limits
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Two truths and a lie about a topic
    Deception {
        #[arg(long)]
        topic: String,
    },
    /// A sourced multiple-choice question from an encyclopedia page
    Quiz {
        #[arg(long, required_unless_present = "random", conflicts_with = "random")]
        page: Option<String>,

        /// Pick a random page
        #[arg(long)]
        random: bool,
    },
    /// Page titles matching a query, one per line
    Search {
        #[arg(long)]
        query: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive("veracity=info".parse()?)
        .add_directive("wiki_client=info".parse()?);
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Veracity starting...");

    let mut config = Config::from_env()?;
    if cli.stage_log {
        config.stage_log = true;
    }
    if let Some(attempts) = cli.max_attempts {
        config.max_round_attempts = attempts;
        config.max_correction_attempts = attempts;
    }
    config.validate()?;
    config.log_redacted();

    let agents = ClaudeAgents::from_config(&config);
    let settings = RoundSettings::from(&config);

    match cli.command {
        Command::Deception { topic } => {
            let controller = DeceptionController::new(agents, settings);
            print_round(controller.run_round(&topic).await)
        }
        Command::Quiz { page, random } => {
            let fetcher = MediaWikiFetcher::new(&config.wiki_api_url, &config.wiki_user_agent)?;
            let wiki = Arc::new(WikiClient::new(fetcher));
            let controller = QuizController::new(agents, wiki, settings);

            let round = match page {
                Some(title) if !random => controller.run_round(&title).await,
                _ => controller.run_random_round().await,
            };
            print_round(round)
        }
        Command::Search { query, limit } => {
            let fetcher = MediaWikiFetcher::new(&config.wiki_api_url, &config.wiki_user_agent)?;
            let wiki = WikiClient::new(fetcher);
            for title in wiki.search(&query, limit).await? {
                println!("{title}");
            }
            Ok(())
        }
    }
}

fn print_round<T: Serialize>(round: Result<T, RoundError>) -> Result<()> {
    match round {
        Ok(round) => {
            println!("{}", serde_json::to_string_pretty(&round)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, class = ?e.failure_class(), "Round failed");
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}

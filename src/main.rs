//! Tweet-to-Polymarket analysis backend
//!
//! Serves the browser-extension HTTP facade, or runs the analysis pipeline
//! once from the command line.

use clap::{Parser, Subcommand};
use polytweet_backend::{
    client::{PolymarketClient, SearchOutcome},
    config::Config,
    llm::{ChatClient, CohereClient},
    pipeline::Pipeline,
    ranker::RelevanceRanker,
    sentiment::SentimentExtractor,
    server::{self, AppState},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polytweet-backend")]
#[command(about = "Tweet analysis and trading backend for Polymarket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (falls back to environment variables)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP facade
    Serve {
        /// Bind address, overrides the configured one
        #[arg(long)]
        bind: Option<String>,
    },
    /// Analyze a single tweet and print the ranked markets as JSON
    Analyze {
        /// Tweet text to analyze
        tweet: String,

        /// Tweet author
        #[arg(short, long)]
        author: Option<String>,

        /// Number of top markets to return
        #[arg(short, long)]
        top_n: Option<usize>,
    },
    /// Search active markets for a raw query
    Search {
        /// Search query
        query: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.validate()?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Analyze {
            tweet,
            author,
            top_n,
        } => analyze(config, &tweet, author.as_deref(), top_n).await,
        Commands::Search { query } => search(config, &query).await,
    }
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let chat: Arc<dyn ChatClient> = Arc::new(CohereClient::from_config(&config.cohere)?);
    let extractor = SentimentExtractor::new(chat.clone(), &config.pipeline);
    let gamma = polytweet_backend::client::GammaClient::new(
        &config.polymarket.gamma_url,
        config.pipeline.request_timeout_secs,
    )?;
    let ranker = RelevanceRanker::new(
        chat,
        config.pipeline.relevance_max_tokens,
        config.pipeline.relevance_temperature,
        config.pipeline.rate_limit_delay_ms,
    );
    Ok(Pipeline::new(
        extractor,
        gamma,
        ranker,
        config.pipeline.max_markets_to_fetch,
    ))
}

async fn serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&config)?;
    let client = PolymarketClient::new(
        config.polymarket.clone(),
        config.pipeline.request_timeout_secs,
    )?;

    if client.trading_enabled() {
        tracing::info!("trading enabled");
    } else {
        tracing::warn!("no private key configured, trading endpoints disabled");
    }

    let state = AppState {
        pipeline: Arc::new(pipeline),
        client: Arc::new(client),
    };

    let bind_addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    server::serve(state, &bind_addr).await
}

async fn analyze(
    config: Config,
    tweet: &str,
    author: Option<&str>,
    top_n: Option<usize>,
) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&config)?;
    let top_n = top_n.unwrap_or(config.pipeline.top_markets_count);

    let outcome = pipeline.process(tweet, author, top_n).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn search(config: Config, query: &str) -> anyhow::Result<()> {
    let gamma = polytweet_backend::client::GammaClient::new(
        &config.polymarket.gamma_url,
        config.pipeline.request_timeout_secs,
    )?;

    let outcome = gamma.search_active_markets(query).await;
    match &outcome {
        SearchOutcome::Events(events) => {
            tracing::info!("found {} events", events.len());
        }
        SearchOutcome::Other(_) => {
            tracing::warn!("unrecognized response shape");
        }
        SearchOutcome::Error(err) => {
            tracing::error!("search failed: {}", err.error);
        }
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

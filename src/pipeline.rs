//! Tweet-to-market pipeline orchestrator
//!
//! Strictly sequential: sentiment extraction, market search, relevance
//! ranking, report assembly. The only hard stop is a search failure; every
//! other stage degrades and the pipeline still produces a report.

use crate::client::gamma::{GammaClient, SearchOutcome};
use crate::ranker::RelevanceRanker;
use crate::sentiment::SentimentExtractor;
use crate::types::{RankedMarket, SentimentAnalysis, TweetInput};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

const RANKING_METHOD: &str = "AI-powered relevance scoring using Cohere";

/// Final pipeline result: a full report, or an error payload that still
/// carries the tweet echo and the stage-1 sentiment analysis.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PipelineOutcome {
    Report(AnalysisReport),
    Failed(PipelineFailure),
}

impl PipelineOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, PipelineOutcome::Failed(_))
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineFailure {
    pub error: String,
    pub tweet: TweetEcho,
    pub sentiment_analysis: SentimentAnalysis,
}

#[derive(Debug, Serialize)]
pub struct TweetEcho {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub original_tweet: OriginalTweet,
    pub sentiment_analysis: SentimentAnalysis,
    pub ranking_summary: RankingSummary,
    pub top_relevant_markets: Vec<FormattedMarket>,
}

#[derive(Debug, Serialize)]
pub struct OriginalTweet {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RankingSummary {
    pub total_markets_analyzed: usize,
    pub top_markets_returned: usize,
    pub ranking_method: &'static str,
}

/// One ranked market flattened into the report shape
#[derive(Debug, Serialize)]
pub struct FormattedMarket {
    pub rank: usize,
    pub relevance_score: f64,
    pub relevance_explanation: String,
    pub key_matches: Vec<String>,
    pub market_id: String,
    pub title: String,
    /// Truncated for readability
    pub description: String,
    pub slug: String,
    pub active: bool,
    pub closed: bool,
    pub end_date: String,
    pub volume_24hr: Value,
    pub liquidity: Value,
    pub comment_count: Value,
    pub tags: Vec<String>,
    pub prediction_markets: Vec<SubMarketInfo>,
}

#[derive(Debug, Serialize)]
pub struct SubMarketInfo {
    pub question: String,
    pub outcomes: Value,
    pub outcome_prices: Value,
    pub volume: Value,
    pub liquidity: Value,
    pub end_date: String,
}

pub struct Pipeline {
    extractor: SentimentExtractor,
    gamma: GammaClient,
    ranker: RelevanceRanker,
    /// Cap on the ranking pool, one model call per market
    max_markets: usize,
}

impl Pipeline {
    pub fn new(
        extractor: SentimentExtractor,
        gamma: GammaClient,
        ranker: RelevanceRanker,
        max_markets: usize,
    ) -> Self {
        Self {
            extractor,
            gamma,
            ranker,
            max_markets,
        }
    }

    /// Run the full pipeline for one tweet.
    pub async fn process(
        &self,
        tweet_text: &str,
        author: Option<&str>,
        top_n: usize,
    ) -> PipelineOutcome {
        let mut tweet = TweetInput::new(tweet_text);
        if let Some(author) = author {
            tweet = tweet.with_author(author);
        }

        tracing::info!("pipeline start: {:?}", tweet_text);

        let sentiment = self.extractor.extract(&tweet).await;
        tracing::info!(
            "search query {:?}, topics {:?}, confidence {}",
            sentiment.search_query,
            sentiment.key_topics,
            sentiment.confidence
        );

        let outcome = self
            .gamma
            .search_active_markets(&sentiment.search_query)
            .await;

        let mut markets = match outcome {
            SearchOutcome::Events(events) => events,
            SearchOutcome::Other(value) => {
                // Unrecognized response shape: nothing rankable
                tracing::warn!("unrecognized search response shape: {}", value);
                Vec::new()
            }
            SearchOutcome::Error(err) => {
                return PipelineOutcome::Failed(PipelineFailure {
                    error: format!("Polymarket API error: {}", err.error),
                    tweet: TweetEcho {
                        text: tweet.text,
                        author: tweet.author,
                    },
                    sentiment_analysis: sentiment,
                });
            }
        };

        tracing::info!("found {} active markets", markets.len());
        markets.truncate(self.max_markets);
        // The reported analysis count is the pool actually scored
        let total_analyzed = markets.len();

        let ranked = self
            .ranker
            .rank(&tweet.text, &sentiment, markets, top_n)
            .await;

        PipelineOutcome::Report(assemble_report(tweet, sentiment, total_analyzed, ranked))
    }
}

fn assemble_report(
    tweet: TweetInput,
    sentiment: SentimentAnalysis,
    total_analyzed: usize,
    ranked: Vec<RankedMarket>,
) -> AnalysisReport {
    let top_markets_returned = ranked.len();

    let formatted = ranked
        .into_iter()
        .enumerate()
        .map(|(i, r)| format_market(i + 1, r))
        .collect();

    AnalysisReport {
        original_tweet: OriginalTweet {
            text: tweet.text,
            author: tweet.author,
            timestamp: tweet.timestamp.unwrap_or_else(Utc::now),
        },
        sentiment_analysis: sentiment,
        ranking_summary: RankingSummary {
            total_markets_analyzed: total_analyzed,
            top_markets_returned,
            ranking_method: RANKING_METHOD,
        },
        top_relevant_markets: formatted,
    }
}

fn format_market(rank: usize, ranked: RankedMarket) -> FormattedMarket {
    let raw = ranked.market.raw();

    let prediction_markets = ranked
        .market
        .sub_markets()
        .iter()
        .map(|sub| SubMarketInfo {
            question: str_field(sub, "question"),
            outcomes: sub.get("outcomes").cloned().unwrap_or(Value::Null),
            outcome_prices: sub.get("outcomePrices").cloned().unwrap_or(Value::Null),
            volume: sub.get("volume").cloned().unwrap_or(Value::Null),
            liquidity: sub.get("liquidity").cloned().unwrap_or(Value::Null),
            end_date: str_field(sub, "endDate"),
        })
        .collect();

    FormattedMarket {
        rank,
        relevance_score: ranked.score.relevance_score,
        relevance_explanation: ranked.score.relevance_explanation,
        key_matches: ranked.score.key_matches,
        market_id: ranked.score.market_id,
        title: ranked.score.market_title,
        description: ranked.market.description().chars().take(300).collect(),
        slug: ranked.market.slug().to_string(),
        active: raw.get("active").and_then(Value::as_bool).unwrap_or(false),
        closed: raw.get("closed").and_then(Value::as_bool).unwrap_or(true),
        end_date: str_field(raw, "endDate"),
        volume_24hr: raw.get("volume24hr").cloned().unwrap_or(Value::from(0)),
        liquidity: raw.get("liquidity").cloned().unwrap_or(Value::from(0)),
        comment_count: raw.get("commentCount").cloned().unwrap_or(Value::from(0)),
        tags: ranked.market.tag_labels(),
        prediction_markets,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

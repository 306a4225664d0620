//! Relevance ranking of markets against a tweet
//!
//! One model call per market, strictly sequential, with a short pause between
//! calls to stay under the chat API rate limit. A failed call degrades to
//! keyword-overlap scoring for that market only; ranking as a whole never
//! fails.

use crate::llm::{ChatClient, ChatRequest};
use crate::types::{MarketRecord, RankedMarket, RelevanceScore, SentimentAnalysis};
use std::sync::Arc;
use std::time::Duration;

pub struct RelevanceRanker {
    chat: Arc<dyn ChatClient>,
    max_tokens: u32,
    temperature: f64,
    rate_limit_delay: Duration,
}

impl RelevanceRanker {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        max_tokens: u32,
        temperature: f64,
        rate_limit_delay_ms: u64,
    ) -> Self {
        Self {
            chat,
            max_tokens,
            temperature,
            rate_limit_delay: Duration::from_millis(rate_limit_delay_ms),
        }
    }

    /// Score every market against the tweet, sort descending, keep `top_n`.
    ///
    /// Records carrying neither an id nor a title are skipped. Ties keep
    /// arrival order; `top_n` beyond the pool returns the whole pool.
    pub async fn rank(
        &self,
        tweet_text: &str,
        sentiment: &SentimentAnalysis,
        markets: Vec<MarketRecord>,
        top_n: usize,
    ) -> Vec<RankedMarket> {
        if markets.is_empty() {
            return Vec::new();
        }

        tracing::info!("ranking {} markets for relevance", markets.len());

        let mut scored = Vec::with_capacity(markets.len());
        for (i, market) in markets.into_iter().enumerate() {
            if market.id().is_none() && market.title().is_none() {
                tracing::warn!("skipping malformed market record at index {}", i);
                continue;
            }

            if i > 0 && !self.rate_limit_delay.is_zero() {
                tokio::time::sleep(self.rate_limit_delay).await;
            }

            let score = self.score_market(tweet_text, sentiment, &market).await;
            scored.push(RankedMarket { market, score });
        }

        // Stable sort: equal scores keep arrival order
        scored.sort_by(|a, b| {
            b.score
                .relevance_score
                .partial_cmp(&a.score.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_n);

        for (i, ranked) in scored.iter().enumerate() {
            tracing::debug!(
                "  {}. {} (score: {:.2})",
                i + 1,
                ranked.score.market_title,
                ranked.score.relevance_score
            );
        }

        scored
    }

    async fn score_market(
        &self,
        tweet_text: &str,
        sentiment: &SentimentAnalysis,
        market: &MarketRecord,
    ) -> RelevanceScore {
        let prompt = build_relevance_prompt(tweet_text, sentiment, market);

        let request = ChatRequest {
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        match self.chat.chat(&request).await {
            Ok(response) => {
                let (score, explanation, key_matches) = parse_relevance_response(&response);
                RelevanceScore {
                    market_id: market.id().unwrap_or("").to_string(),
                    market_title: market.title().unwrap_or("").to_string(),
                    relevance_score: score,
                    relevance_explanation: explanation,
                    key_matches,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "relevance call failed for market {:?}: {}",
                    market.id(),
                    e
                );
                fallback_score(sentiment, market)
            }
        }
    }
}

fn build_relevance_prompt(
    tweet_text: &str,
    sentiment: &SentimentAnalysis,
    market: &MarketRecord,
) -> String {
    let description: String = market.description().chars().take(500).collect();
    let sentiment_score = sentiment.sentiment_score.unwrap_or(0.0);

    format!(
        r#"Analyze how relevant this prediction market is to the original tweet and sentiment analysis.

ORIGINAL TWEET: "{tweet}"

SENTIMENT ANALYSIS:
- Search Query: "{query}"
- Key Topics: {topics:?}
- Sentiment Score: {score} (where 1.0 = very positive, -1.0 = very negative)

PREDICTION MARKET:
- Title: "{title}"
- Question: "{question}"
- Description: "{description}"
- Tags: {tags:?}

TASK: Rate the relevance of this market to the original tweet on a scale of 0.0 to 1.0:
- 1.0 = Perfect match (market directly relates to tweet's prediction/topic)
- 0.8-0.9 = High relevance (market relates to main theme)
- 0.6-0.7 = Moderate relevance (market relates to some aspects)
- 0.4-0.5 = Low relevance (market somewhat relates)
- 0.0-0.3 = No relevance (market unrelated to tweet)

Consider:
1. Does the market topic match the tweet's subject matter?
2. Do the key topics from sentiment analysis align with market tags/content?
3. Would someone interested in the tweet's topic find this market useful?
4. Is the market's timeframe relevant to the tweet's context?

RESPOND WITH EXACTLY THIS FORMAT:
SCORE: [0.0-1.0]
EXPLANATION: [1-2 sentence explanation of why this score was given]
KEY_MATCHES: [comma-separated list of 2-3 matching elements between tweet and market]"#,
        tweet = tweet_text,
        query = sentiment.search_query,
        topics = sentiment.key_topics,
        score = sentiment_score,
        title = market.title().unwrap_or(""),
        question = market.first_question(),
        description = description,
        tags = market.tag_labels(),
    )
}

/// Parse the `SCORE:` / `EXPLANATION:` / `KEY_MATCHES:` line protocol.
///
/// Unparseable or missing score defaults to 0.0; the score is clamped to
/// [0.0, 1.0]. Lines outside the protocol are ignored.
fn parse_relevance_response(response: &str) -> (f64, String, Vec<String>) {
    let mut score = 0.0;
    let mut explanation = "No explanation provided".to_string();
    let mut key_matches = Vec::new();

    for line in response.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("SCORE:") {
            // NaN/inf parse as valid f64 and would slip through the clamp
            score = rest
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
        } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
            explanation = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("KEY_MATCHES:") {
            key_matches = rest
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    (score, explanation, key_matches)
}

/// Keyword-overlap scoring used when the model call fails: +0.2 per query
/// word found in title+description, +0.1 per topic, clamped to 1.0.
fn fallback_score(sentiment: &SentimentAnalysis, market: &MarketRecord) -> RelevanceScore {
    let haystack = format!(
        "{} {}",
        market.title().unwrap_or(""),
        market.description()
    )
    .to_lowercase();

    let mut score: f64 = 0.0;
    let mut matches = Vec::new();

    for word in sentiment.search_query.to_lowercase().split_whitespace() {
        if haystack.contains(word) {
            score += 0.2;
            matches.push(word.to_string());
        }
    }

    for topic in &sentiment.key_topics {
        if haystack.contains(&topic.to_lowercase()) {
            score += 0.1;
            matches.push(topic.clone());
        }
    }

    matches.truncate(3);

    RelevanceScore {
        market_id: market.id().unwrap_or("").to_string(),
        market_title: market.title().unwrap_or("").to_string(),
        relevance_score: score.min(1.0),
        relevance_explanation: "Fallback scoring based on keyword matching".to_string(),
        key_matches: matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedChat;
    use serde_json::json;

    fn sentiment() -> SentimentAnalysis {
        SentimentAnalysis {
            search_query: "Bitcoin price".to_string(),
            key_topics: vec!["bitcoin".to_string(), "crypto".to_string()],
            sentiment_score: Some(0.8),
            confidence: 0.8,
        }
    }

    fn market(id: &str, title: &str, description: &str) -> MarketRecord {
        MarketRecord(json!({
            "id": id,
            "title": title,
            "description": description,
            "tags": [{"label": "Crypto"}],
            "markets": [{"question": title}]
        }))
    }

    fn ranker(responses: Vec<crate::error::Result<String>>) -> RelevanceRanker {
        RelevanceRanker::new(Arc::new(ScriptedChat::new(responses)), 200, 0.2, 0)
    }

    #[test]
    fn test_parse_well_formed_response() {
        let (score, explanation, matches) = parse_relevance_response(
            "SCORE: 0.9\nEXPLANATION: Direct match on topic.\nKEY_MATCHES: bitcoin, price, crypto",
        );
        assert_eq!(score, 0.9);
        assert_eq!(explanation, "Direct match on topic.");
        assert_eq!(matches, vec!["bitcoin", "price", "crypto"]);
    }

    #[test]
    fn test_parse_unparseable_score_defaults_to_zero() {
        let (score, _, _) = parse_relevance_response("SCORE: very high\nEXPLANATION: x");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_parse_score_clamped() {
        let (high, _, _) = parse_relevance_response("SCORE: 3.7");
        assert_eq!(high, 1.0);
        let (low, _, _) = parse_relevance_response("SCORE: -0.4");
        assert_eq!(low, 0.0);
    }

    #[test]
    fn test_parse_non_finite_score_defaults_to_zero() {
        // "NaN" and "inf" parse as valid f64 but must not leave [0, 1]
        for reply in ["SCORE: NaN", "SCORE: -NaN", "SCORE: inf", "SCORE: -inf"] {
            let (score, _, _) = parse_relevance_response(reply);
            assert_eq!(score, 0.0, "reply {:?} escaped the clamp", reply);
        }
    }

    #[test]
    fn test_parse_missing_lines() {
        let (score, explanation, matches) = parse_relevance_response("some chatter");
        assert_eq!(score, 0.0);
        assert_eq!(explanation, "No explanation provided");
        assert!(matches.is_empty());
    }

    #[test]
    fn test_parse_ignores_surrounding_chatter() {
        let (score, explanation, _) = parse_relevance_response(
            "Sure, here is my assessment:\nSCORE: 0.5\nEXPLANATION: Partial overlap.\nHope that helps!",
        );
        assert_eq!(score, 0.5);
        assert_eq!(explanation, "Partial overlap.");
    }

    #[test]
    fn test_fallback_scoring_accumulates() {
        let m = market("1", "Bitcoin price prediction", "Crypto and bitcoin futures");
        let score = fallback_score(&sentiment(), &m);
        // "bitcoin" +0.2, "price" +0.2, topics "bitcoin" +0.1, "crypto" +0.1
        assert!((score.relevance_score - 0.6).abs() < 1e-9);
        assert_eq!(score.key_matches.len(), 3);
        assert_eq!(
            score.relevance_explanation,
            "Fallback scoring based on keyword matching"
        );
    }

    #[test]
    fn test_fallback_score_clamped_to_one() {
        let mut s = sentiment();
        s.search_query = "a b c d e f".to_string();
        let m = market("1", "a b c d e f", "a b c d e f");
        let score = fallback_score(&s, &m);
        assert_eq!(score.relevance_score, 1.0);
    }

    #[test]
    fn test_fallback_no_overlap_scores_zero() {
        let m = market("1", "Premier League winner", "Football season outcome");
        let score = fallback_score(&sentiment(), &m);
        assert_eq!(score.relevance_score, 0.0);
        assert!(score.key_matches.is_empty());
    }

    #[tokio::test]
    async fn test_rank_orders_by_score_descending() {
        let r = ranker(vec![
            Ok("SCORE: 0.2\nEXPLANATION: Unrelated.\nKEY_MATCHES: none".to_string()),
            Ok("SCORE: 0.9\nEXPLANATION: Strong match.\nKEY_MATCHES: bitcoin".to_string()),
        ]);
        let markets = vec![
            market("fed", "Fed rate hike in 2025?", "Interest rates"),
            market("btc", "Bitcoin to $100k?", "Bitcoin price target"),
        ];
        let ranked = r.rank("BTC is pumping!", &sentiment(), markets, 5).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score.market_id, "btc");
        assert_eq!(ranked[0].score.relevance_score, 0.9);
        assert_eq!(ranked[1].score.market_id, "fed");
    }

    #[tokio::test]
    async fn test_rank_truncates_to_top_n() {
        let r = ranker(vec![
            Ok("SCORE: 0.9".to_string()),
            Ok("SCORE: 0.8".to_string()),
            Ok("SCORE: 0.7".to_string()),
        ]);
        let markets = vec![
            market("1", "A", ""),
            market("2", "B", ""),
            market("3", "C", ""),
        ];
        let ranked = r.rank("t", &sentiment(), markets, 2).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score.market_id, "1");
    }

    #[tokio::test]
    async fn test_rank_skips_records_without_id_and_title() {
        let r = ranker(vec![Ok("SCORE: 0.5".to_string())]);
        let markets = vec![
            MarketRecord(json!({"noise": true})),
            market("1", "Real market", ""),
        ];
        let ranked = r.rank("t", &sentiment(), markets, 5).await;
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score.market_id, "1");
    }

    #[tokio::test]
    async fn test_rank_model_failure_falls_back_per_market() {
        // First call fails, second succeeds
        let r = ranker(vec![
            Err(crate::error::BackendError::Api("down".to_string())),
            Ok("SCORE: 0.3\nEXPLANATION: Weak.\nKEY_MATCHES: crypto".to_string()),
        ]);
        let markets = vec![
            market("btc", "Bitcoin price prediction", "bitcoin market"),
            market("other", "Something else", ""),
        ];
        let ranked = r.rank("t", &sentiment(), markets, 5).await;
        assert_eq!(ranked.len(), 2);
        // Fallback: "bitcoin" +0.2, "price" +0.2, topic "bitcoin" +0.1 = 0.5
        assert_eq!(ranked[0].score.market_id, "btc");
        assert!((ranked[0].score.relevance_score - 0.5).abs() < 1e-9);
        assert_eq!(
            ranked[0].score.relevance_explanation,
            "Fallback scoring based on keyword matching"
        );
    }

    #[tokio::test]
    async fn test_rank_empty_input() {
        let r = ranker(vec![]);
        let ranked = r.rank("t", &sentiment(), Vec::new(), 5).await;
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_rank_ties_keep_arrival_order() {
        let r = ranker(vec![
            Ok("SCORE: 0.5".to_string()),
            Ok("SCORE: 0.5".to_string()),
        ]);
        let markets = vec![market("first", "A", ""), market("second", "B", "")];
        let ranked = r.rank("t", &sentiment(), markets, 5).await;
        assert_eq!(ranked[0].score.market_id, "first");
        assert_eq!(ranked[1].score.market_id, "second");
    }
}

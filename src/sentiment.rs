//! Tweet sentiment extraction
//!
//! Turns raw tweet text into a market search query, key topics, and an
//! optional polarity score via three independent model calls. Each call has
//! its own local fallback, so `extract` never fails: a dead model degrades the
//! result instead of aborting it.

use crate::config::PipelineConfig;
use crate::llm::{ChatClient, ChatRequest};
use crate::types::{SentimentAnalysis, TweetInput};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

/// Confidence reported when the model produced the analysis
const MODEL_CONFIDENCE: f64 = 0.8;
/// Confidence reported when every step fell back to the local heuristic
const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Fixed vocabulary of market-relevant terms for the fallback query
const MARKET_KEYWORDS: &[&str] = &[
    "bitcoin",
    "btc",
    "ethereum",
    "crypto",
    "election",
    "trump",
    "biden",
    "tesla",
    "apple",
    "stock",
    "fed",
    "rates",
    "inflation",
    "gdp",
    "super bowl",
    "world cup",
    "olympics",
    "ai",
    "chatgpt",
    "openai",
];

pub struct SentimentExtractor {
    chat: Arc<dyn ChatClient>,
    max_tokens: u32,
    temperature: f64,
    re_url: Regex,
    re_mention: Regex,
    re_hashtag: Regex,
    re_bangs: Regex,
    re_questions: Regex,
    re_spaces: Regex,
    re_capitalized: Regex,
    re_long_word: Regex,
    re_number: Regex,
}

impl SentimentExtractor {
    pub fn new(chat: Arc<dyn ChatClient>, pipeline: &PipelineConfig) -> Self {
        Self {
            chat,
            max_tokens: pipeline.sentiment_max_tokens,
            temperature: pipeline.sentiment_temperature,
            re_url: Regex::new(r"https?://\S+").unwrap(),
            re_mention: Regex::new(r"@(\w+)").unwrap(),
            re_hashtag: Regex::new(r"#(\w+)").unwrap(),
            re_bangs: Regex::new(r"!{2,}").unwrap(),
            re_questions: Regex::new(r"\?{2,}").unwrap(),
            re_spaces: Regex::new(r"\s+").unwrap(),
            re_capitalized: Regex::new(r"\b[A-Z][a-z]+\b").unwrap(),
            re_long_word: Regex::new(r"\b\w{4,}\b").unwrap(),
            re_number: Regex::new(r"-?\d+\.?\d*").unwrap(),
        }
    }

    /// Analyze a tweet. Never errors: any upstream failure is absorbed by the
    /// per-call fallbacks and reflected in the confidence value.
    pub async fn extract(&self, tweet: &TweetInput) -> SentimentAnalysis {
        let cleaned = self.preprocess(&tweet.text);

        let mut model_succeeded = false;

        let search_query = match self.generate_search_query(&cleaned).await {
            Some(query) if !query.is_empty() => {
                model_succeeded = true;
                query
            }
            _ => self.fallback_query(&tweet.text),
        };

        let key_topics = match self.extract_key_topics(&cleaned).await {
            Some(topics) => {
                model_succeeded = true;
                topics
            }
            None => self.fallback_topics(&tweet.text),
        };

        let sentiment_score = self.score_sentiment(&cleaned).await;
        if sentiment_score.is_some() {
            model_succeeded = true;
        }

        let confidence = if model_succeeded {
            MODEL_CONFIDENCE
        } else {
            FALLBACK_CONFIDENCE
        };

        SentimentAnalysis {
            search_query,
            key_topics,
            sentiment_score,
            confidence,
        }
    }

    /// Strip URLs and mentions, unwrap hashtags, collapse repeated
    /// punctuation and whitespace.
    fn preprocess(&self, text: &str) -> String {
        let text = self.re_url.replace_all(text, "");
        let text = self.re_mention.replace_all(&text, "");
        let text = self.re_hashtag.replace_all(&text, "$1");
        let text = self.re_bangs.replace_all(&text, "!");
        let text = self.re_questions.replace_all(&text, "?");
        let text = self.re_spaces.replace_all(&text, " ");
        text.trim().to_string()
    }

    async fn generate_search_query(&self, text: &str) -> Option<String> {
        let prompt = format!(
            r#"Analyze this tweet and extract the core predictable events, topics, or outcomes that could be found on Polymarket (a prediction market).

Tweet: "{text}"

Generate a concise search query (1-5 words) that would find relevant prediction markets. Focus on:
- Political events, elections, policy outcomes
- Economic indicators, market movements, company performance
- Sports events, entertainment awards, technology releases
- Cryptocurrency, AI developments, social trends

Return ONLY the search query, nothing else.

Examples:
- "Bitcoin price 2024" -> "Bitcoin"
- "Who will win the election?" -> "election 2024"
- "Fed will cut rates soon" -> "Fed rates"

Search query:"#
        );

        match self.chat(&prompt).await {
            Ok(response) => Some(self.clean_search_query(&response)),
            Err(e) => {
                tracing::warn!("search query generation failed: {}", e);
                None
            }
        }
    }

    async fn extract_key_topics(&self, text: &str) -> Option<Vec<String>> {
        let prompt = format!(
            r#"Extract 3-5 key topics from this tweet that relate to predictable future events or market outcomes:

Tweet: "{text}"

Focus on topics that could have prediction markets: political figures, companies, economic indicators, sports events, technology releases, cryptocurrencies, entertainment.

Return topics as a simple comma-separated list, nothing else.

Example: "Bitcoin, Federal Reserve, inflation, 2024 election"

Topics:"#
        );

        match self.chat(&prompt).await {
            Ok(response) => {
                let topics: Vec<String> = response
                    .split(',')
                    .map(str::trim)
                    .filter(|t| t.len() > 1)
                    .take(5)
                    .map(str::to_string)
                    .collect();
                Some(topics)
            }
            Err(e) => {
                tracing::warn!("topic extraction failed: {}", e);
                None
            }
        }
    }

    async fn score_sentiment(&self, text: &str) -> Option<f64> {
        let prompt = format!(
            r#"Analyze the sentiment of this tweet on a scale from -1.0 (very negative) to 1.0 (very positive), with 0.0 being neutral.

Tweet: "{text}"

Consider market optimism or pessimism, bullish or bearish sentiment, and confidence versus uncertainty.

Return only a single number between -1.0 and 1.0:"#
        );

        let request = ChatRequest {
            prompt,
            max_tokens: 10,
            temperature: 0.1,
        };

        match self.chat.chat(&request).await {
            Ok(response) => self
                .re_number
                .find(&response)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|score| score.clamp(-1.0, 1.0)),
            Err(e) => {
                tracing::warn!("sentiment scoring failed: {}", e);
                None
            }
        }
    }

    async fn chat(&self, prompt: &str) -> crate::error::Result<String> {
        self.chat
            .chat(&ChatRequest {
                prompt: prompt.to_string(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            })
            .await
    }

    /// Strip quotes, drop any "search query:" echo, cap at 5 words
    fn clean_search_query(&self, query: &str) -> String {
        let query = query.trim().replace(['"', '\''], "");
        let lower = query.to_lowercase();
        let query = match lower.find(':') {
            Some(idx) if matches!(lower[..idx].trim(), "search query" | "query") => {
                query[idx + 1..].trim().to_string()
            }
            _ => query,
        };

        query
            .split_whitespace()
            .take(5)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Fallback query: known market term, else first capitalized word, else
    /// first word of length >= 4, else "market"
    fn fallback_query(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        if let Some(keyword) = MARKET_KEYWORDS.iter().find(|k| lower.contains(**k)) {
            return keyword.to_string();
        }

        if let Some(m) = self.re_capitalized.find(text) {
            return m.as_str().to_string();
        }

        if let Some(m) = self.re_long_word.find(&lower) {
            return m.as_str().to_string();
        }

        "market".to_string()
    }

    /// Fallback topics: hashtag bodies, mention bodies, and capitalized
    /// words, deduplicated, at most 5. Order is not guaranteed.
    fn fallback_topics(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut topics = Vec::new();

        let candidates = self
            .re_hashtag
            .captures_iter(text)
            .chain(self.re_mention.captures_iter(text))
            .map(|c| c[1].to_string())
            .chain(
                self.re_capitalized
                    .find_iter(text)
                    .map(|m| m.as_str().to_string()),
            );

        for topic in candidates {
            if seen.insert(topic.clone()) {
                topics.push(topic);
                if topics.len() == 5 {
                    break;
                }
            }
        }

        topics
    }
}

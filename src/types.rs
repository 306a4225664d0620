//! Core data types for the tweet-to-market pipeline
//!
//! All of these are transient: constructed for a single request, never
//! persisted, never mutated after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tweet submitted for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetInput {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
}

impl TweetInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: None,
            timestamp: None,
            tweet_id: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

/// Sentiment analysis derived from a tweet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    /// Search query for the market search endpoint (at most 5 words)
    pub search_query: String,
    /// Extracted key topics (at most 5)
    pub key_topics: Vec<String>,
    /// Polarity score in [-1.0, 1.0], None when unavailable
    pub sentiment_score: Option<f64>,
    /// Extraction confidence in [0.0, 1.0]
    pub confidence: f64,
}

/// An event object from the market search endpoint, passed through opaquely.
///
/// The upstream shape is not under our control, so this wraps the raw JSON and
/// exposes read accessors for the handful of fields the ranker and formatter
/// need. Everything else travels untouched to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MarketRecord(pub Value);

impl MarketRecord {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    pub fn description(&self) -> &str {
        self.0
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn slug(&self) -> &str {
        self.0.get("slug").and_then(Value::as_str).unwrap_or("")
    }

    /// Tag labels, e.g. `[{"label": "Crypto"}, ...]` -> `["Crypto", ...]`
    pub fn tag_labels(&self) -> Vec<String> {
        self.0
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.get("label").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sub-markets of the event (individual tradeable questions)
    pub fn sub_markets(&self) -> &[Value] {
        self.0
            .get("markets")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Question text of the first sub-market, if any
    pub fn first_question(&self) -> &str {
        self.sub_markets()
            .first()
            .and_then(|m| m.get("question"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }
}

/// Relevance of one market to the originating tweet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceScore {
    pub market_id: String,
    pub market_title: String,
    /// Always clamped to [0.0, 1.0]
    pub relevance_score: f64,
    pub relevance_explanation: String,
    pub key_matches: Vec<String>,
}

/// A market paired with its relevance score, ordered by rank
#[derive(Debug, Clone)]
pub struct RankedMarket {
    pub market: MarketRecord,
    pub score: RelevanceScore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> MarketRecord {
        MarketRecord(json!({
            "id": "123",
            "title": "Bitcoin to reach $100k in 2025?",
            "description": "Will Bitcoin reach $100,000 by December 31, 2025?",
            "slug": "bitcoin-100k-2025",
            "tags": [{"label": "Cryptocurrency"}, {"label": "Bitcoin"}],
            "markets": [
                {"question": "Will Bitcoin reach $100k in 2025?", "outcomes": "[\"Yes\",\"No\"]"}
            ]
        }))
    }

    #[test]
    fn test_record_accessors() {
        let rec = sample_record();
        assert_eq!(rec.id(), Some("123"));
        assert_eq!(rec.title(), Some("Bitcoin to reach $100k in 2025?"));
        assert_eq!(rec.tag_labels(), vec!["Cryptocurrency", "Bitcoin"]);
        assert_eq!(rec.first_question(), "Will Bitcoin reach $100k in 2025?");
        assert_eq!(rec.sub_markets().len(), 1);
    }

    #[test]
    fn test_record_missing_fields() {
        let rec = MarketRecord(json!({"unexpected": true}));
        assert_eq!(rec.id(), None);
        assert_eq!(rec.title(), None);
        assert_eq!(rec.description(), "");
        assert!(rec.tag_labels().is_empty());
        assert!(rec.sub_markets().is_empty());
        assert_eq!(rec.first_question(), "");
    }

    #[test]
    fn test_record_roundtrip_is_opaque() {
        let raw = json!({"id": "9", "markets": [], "custom_field": {"nested": [1, 2]}});
        let rec = MarketRecord(raw.clone());
        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_tweet_builder() {
        let tweet = TweetInput::new("BTC up").with_author("trader");
        assert_eq!(tweet.text, "BTC up");
        assert_eq!(tweet.author.as_deref(), Some("trader"));
        assert!(tweet.timestamp.is_none());
    }
}

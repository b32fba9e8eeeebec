use serde::{Deserialize, Serialize};
use std::fmt;

/// Difficulty label. The service reports an integer level; older builds sent text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Level(u64),
    Text(String),
}

impl Label {
    /// Level 0 and empty text are the service's "never set" values.
    pub fn is_unset(&self) -> bool {
        match self {
            Label::Level(level) => *level == 0,
            Label::Text(text) => text.trim().is_empty(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Level(level) => write!(f, "{}", level),
            Label::Text(text) => f.write_str(text),
        }
    }
}

/// Aggregate counters and timings reported by `GET /api/stats` and embedded in
/// quote/challenge envelopes. Every field may be missing from a given payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub request_count: Option<u64>,
    pub success_count: Option<u64>,
    pub failure_count: Option<u64>,
    /// scrypt N of the last challenge
    pub last_difficulty: Option<f64>,
    pub last_difficulty_level: Option<Label>,
    pub last_scrypt_r: Option<u64>,
    pub last_scrypt_p: Option<u64>,
    pub estimated_complexity: Option<f64>,
    pub average_solve_time: Option<f64>,
    pub min_solve_time: Option<f64>,
    pub max_solve_time: Option<f64>,
    pub last_solve_time: Option<f64>,
    pub load_test_requests: Option<u64>,
    pub load_test_requests_per_sec: Option<f64>,
    #[serde(default)]
    pub load_test_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub challenge_id: String,
    pub task: String,
    pub difficulty_level: Label,
    pub scrypt_n: u64,
    pub scrypt_r: u64,
    pub scrypt_p: u64,
    pub key_len: u64,
    pub estimated_complexity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "Text", alias = "text")]
    pub text: String,
    #[serde(rename = "Author", alias = "author")]
    pub author: String,
}

/// `GET /api/quote`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub quote: Option<Quote>,
    #[serde(default)]
    pub stats: Option<StatsSnapshot>,
    #[serde(default)]
    pub error: Option<String>,
    /// The challenge that was solved to obtain the quote
    #[serde(default)]
    pub challenge: Option<Challenge>,
}

/// `GET /api/challenge`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChallengeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub challenge: Option<Challenge>,
    #[serde(default)]
    pub stats: Option<StatsSnapshot>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `POST /api/load/start` and `POST /api/load/stop`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToggleResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

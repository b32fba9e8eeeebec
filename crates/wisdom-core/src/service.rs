use crate::types::{
    Challenge, ChallengeResponse, Label, Quote, QuoteResponse, StatsSnapshot, ToggleResponse,
};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Request/response contract of the proof-of-work service.
///
/// An `Err` is a transport failure (request not completed or body not
/// decodable). Application-level failures arrive as `Ok` envelopes with
/// `success == false`.
pub trait ServiceApi: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch_quote(&self) -> ApiFuture<'_, QuoteResponse>;

    fn fetch_challenge(&self) -> ApiFuture<'_, ChallengeResponse>;

    fn start_load(&self) -> ApiFuture<'_, ToggleResponse>;

    fn stop_load(&self) -> ApiFuture<'_, ToggleResponse>;

    fn fetch_stats(&self) -> ApiFuture<'_, StatsSnapshot>;
}

pub const QUOTE_PATH: &str = "api/quote";
pub const CHALLENGE_PATH: &str = "api/challenge";
pub const LOAD_START_PATH: &str = "api/load/start";
pub const LOAD_STOP_PATH: &str = "api/load/stop";
pub const STATS_PATH: &str = "api/stats";

/// HTTP/JSON adapter for the console's `/api/*` endpoints
pub struct HttpService {
    client: reqwest::Client,
    base: Url,
}

impl HttpService {
    pub fn new(base_url: &str, timeout_ms: Option<u64>) -> Result<Self> {
        let mut base =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            anyhow::bail!("Base URL must be http:// or https:// (got {base_url})");
        }
        // endpoint paths are relative, so a prefix like `/wow` must end in a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut builder = reqwest::Client::builder();
        if let Some(ms) = timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.bytes().await?;
        decode_body(status, &body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let response = self.client.post(url).send().await?;
        Self::decode(response).await
    }
}

impl ServiceApi for HttpService {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch_quote(&self) -> ApiFuture<'_, QuoteResponse> {
        Box::pin(self.get(QUOTE_PATH))
    }

    fn fetch_challenge(&self) -> ApiFuture<'_, ChallengeResponse> {
        Box::pin(self.get(CHALLENGE_PATH))
    }

    fn start_load(&self) -> ApiFuture<'_, ToggleResponse> {
        Box::pin(self.post(LOAD_START_PATH))
    }

    fn stop_load(&self) -> ApiFuture<'_, ToggleResponse> {
        Box::pin(self.post(LOAD_STOP_PATH))
    }

    fn fetch_stats(&self) -> ApiFuture<'_, StatsSnapshot> {
        Box::pin(self.get(STATS_PATH))
    }
}

/// The service reports failures inside the JSON body, so the status code is
/// only used to annotate a body that does not decode.
pub fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).with_context(|| {
        if status.is_success() {
            "invalid response body".to_string()
        } else {
            format!("invalid response body (HTTP {})", status)
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Quote,
    Challenge,
    StartLoad,
    StopLoad,
    Stats,
}

/// Injected failure for the next call to an endpoint
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// The request "fails on the wire"
    Transport(String),
    /// The service answers `success: false` with the given message
    Rejected(Option<String>),
}

const MOCK_QUOTES: [(&str, &str); 3] = [
    ("The only true wisdom is in knowing you know nothing.", "Socrates"),
    ("Patience is bitter, but its fruit is sweet.", "Aristotle"),
    ("Well begun is half done.", "Aristotle"),
];

#[derive(Debug, Default)]
struct MockState {
    request_count: u64,
    success_count: u64,
    failure_count: u64,
    last_challenge: Option<Challenge>,
    solve_times: Vec<f64>,
    load_active: bool,
    load_requests: u64,
    load_ticks: u64,
    quote_idx: usize,
    challenge_seq: u64,
    calls: [u64; 5],
    failures: VecDeque<(Endpoint, MockFailure)>,
}

impl MockState {
    fn take_failure(&mut self, endpoint: Endpoint) -> Option<MockFailure> {
        let pos = self.failures.iter().position(|(e, _)| *e == endpoint)?;
        self.failures.remove(pos).map(|(_, f)| f)
    }

    fn next_challenge(&mut self) -> Challenge {
        self.challenge_seq += 1;
        let level = 1 + self.request_count / 10;
        let (n, r, p, key_len) = (16384u64, 8u64, 1u64, 32u64);
        Challenge {
            challenge_id: format!("mock-{:04}", self.challenge_seq),
            task: "Find a nonce whose scrypt hash has the required leading zeros".to_string(),
            difficulty_level: Label::Level(level),
            scrypt_n: n,
            scrypt_r: r,
            scrypt_p: p,
            key_len,
            estimated_complexity: (n * r * p * key_len) as f64 * 16f64.powi(level as i32),
        }
    }

    fn snapshot(&self) -> StatsSnapshot {
        let solved = !self.solve_times.is_empty();
        let total: f64 = self.solve_times.iter().sum();
        let challenge = self.last_challenge.as_ref();
        StatsSnapshot {
            request_count: Some(self.request_count),
            success_count: Some(self.success_count),
            failure_count: Some(self.failure_count),
            last_difficulty: challenge.map(|c| c.scrypt_n as f64),
            last_difficulty_level: challenge.map(|c| c.difficulty_level.clone()),
            last_scrypt_r: challenge.map(|c| c.scrypt_r),
            last_scrypt_p: challenge.map(|c| c.scrypt_p),
            estimated_complexity: challenge.map(|c| c.estimated_complexity),
            average_solve_time: solved.then(|| total / self.solve_times.len() as f64),
            min_solve_time: self.solve_times.iter().copied().reduce(f64::min),
            max_solve_time: self.solve_times.iter().copied().reduce(f64::max),
            last_solve_time: self.solve_times.last().copied(),
            load_test_requests: Some(self.load_requests),
            load_test_requests_per_sec: self.load_active.then(|| {
                if self.load_ticks == 0 {
                    0.0
                } else {
                    self.load_requests as f64 / self.load_ticks as f64
                }
            }),
            load_test_active: self.load_active,
        }
    }
}

/// In-memory stand-in for the service with configurable latency.
///
/// Behaves like the real endpoint: quotes and challenges bump the counters,
/// start/stop toggle the load test, and every stats read while a load test is
/// active advances the simulated load counters.
pub struct MockService {
    delay_ms: u64,
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Pretend a load test was already running before the client attached
    pub fn with_load_active(self) -> Self {
        self.lock().load_active = true;
        self
    }

    /// Make the next call to `endpoint` fail
    pub fn fail_next(&self, endpoint: Endpoint, failure: MockFailure) {
        self.lock().failures.push_back((endpoint, failure));
    }

    /// End the load test server-side, as if it ran out its duration
    pub fn finish_load(&self) {
        self.lock().load_active = false;
    }

    pub fn calls(&self, endpoint: Endpoint) -> u64 {
        self.lock().calls[endpoint as usize]
    }

    pub fn load_active(&self) -> bool {
        self.lock().load_active
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call, wait out the simulated latency and surface any
    /// injected failure.
    async fn enter(&self, endpoint: Endpoint) -> Result<Option<String>> {
        self.lock().calls[endpoint as usize] += 1;
        if self.delay_ms > 0 {
            sleep(Duration::from_millis(self.delay_ms)).await;
        }
        match self.lock().take_failure(endpoint) {
            Some(MockFailure::Transport(msg)) => Err(anyhow::anyhow!(msg)),
            Some(MockFailure::Rejected(msg)) => Ok(Some(msg.unwrap_or_default())),
            None => Ok(None),
        }
    }
}

impl ServiceApi for MockService {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch_quote(&self) -> ApiFuture<'_, QuoteResponse> {
        Box::pin(async move {
            let rejected = self.enter(Endpoint::Quote).await?;
            let mut st = self.lock();
            st.request_count += 1;
            if let Some(msg) = rejected {
                st.failure_count += 1;
                return Ok(QuoteResponse {
                    success: false,
                    error: (!msg.is_empty()).then_some(msg),
                    stats: Some(st.snapshot()),
                    ..Default::default()
                });
            }

            let challenge = st.next_challenge();
            let solve = 0.05 * (1 + st.solve_times.len() % 4) as f64;
            st.solve_times.push(solve);
            st.success_count += 1;
            st.last_challenge = Some(challenge.clone());

            let (text, author) = MOCK_QUOTES[st.quote_idx % MOCK_QUOTES.len()];
            st.quote_idx += 1;
            Ok(QuoteResponse {
                success: true,
                quote: Some(Quote {
                    text: text.to_string(),
                    author: author.to_string(),
                }),
                stats: Some(st.snapshot()),
                error: None,
                challenge: Some(challenge),
            })
        })
    }

    fn fetch_challenge(&self) -> ApiFuture<'_, ChallengeResponse> {
        Box::pin(async move {
            let rejected = self.enter(Endpoint::Challenge).await?;
            let mut st = self.lock();
            if let Some(msg) = rejected {
                return Ok(ChallengeResponse {
                    success: false,
                    error: (!msg.is_empty()).then_some(msg),
                    stats: Some(st.snapshot()),
                    ..Default::default()
                });
            }

            let challenge = st.next_challenge();
            st.last_challenge = Some(challenge.clone());
            Ok(ChallengeResponse {
                success: true,
                challenge: Some(challenge),
                stats: Some(st.snapshot()),
                error: None,
            })
        })
    }

    fn start_load(&self) -> ApiFuture<'_, ToggleResponse> {
        Box::pin(async move {
            let rejected = self.enter(Endpoint::StartLoad).await?;
            let mut st = self.lock();
            if let Some(msg) = rejected {
                return Ok(ToggleResponse {
                    success: false,
                    error: (!msg.is_empty()).then_some(msg),
                });
            }
            if st.load_active {
                return Ok(ToggleResponse {
                    success: false,
                    error: Some("Error starting load test: load test already active".to_string()),
                });
            }
            st.load_active = true;
            st.load_requests = 0;
            st.load_ticks = 0;
            Ok(ToggleResponse {
                success: true,
                error: None,
            })
        })
    }

    fn stop_load(&self) -> ApiFuture<'_, ToggleResponse> {
        Box::pin(async move {
            let rejected = self.enter(Endpoint::StopLoad).await?;
            let mut st = self.lock();
            if let Some(msg) = rejected {
                return Ok(ToggleResponse {
                    success: false,
                    error: (!msg.is_empty()).then_some(msg),
                });
            }
            // Stopping an idle load test is a no-op on the service too
            st.load_active = false;
            Ok(ToggleResponse {
                success: true,
                error: None,
            })
        })
    }

    fn fetch_stats(&self) -> ApiFuture<'_, StatsSnapshot> {
        Box::pin(async move {
            self.enter(Endpoint::Stats).await?;
            let mut st = self.lock();
            if st.load_active {
                st.load_ticks += 1;
                st.load_requests += 14;
                st.request_count += 14;
                st.success_count += 14;
            }
            Ok(st.snapshot())
        })
    }
}

use crate::config::PollConfig;
use crate::poll::{PollLoop, PollState};
use crate::reconcile::{reconcile, DisplayModel};
use crate::service::ServiceApi;
use crate::types::{
    Challenge, ChallengeResponse, Quote, QuoteResponse, StatsSnapshot, ToggleResponse,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// User-triggered operations, one per control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    FetchQuote,
    FetchChallenge,
    StartLoad,
    StopLoad,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::FetchQuote,
        Operation::FetchChallenge,
        Operation::StartLoad,
        Operation::StopLoad,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Operation::FetchQuote => "quote",
            Operation::FetchChallenge => "challenge",
            Operation::StartLoad => "load start",
            Operation::StopLoad => "load stop",
        }
    }

    /// Banner text when the service declines without saying why
    pub fn fallback_error(&self) -> &'static str {
        match self {
            Operation::FetchQuote => "Failed to get quote",
            Operation::FetchChallenge => "Failed to get challenge",
            Operation::StartLoad => "Failed to start load test",
            Operation::StopLoad => "Failed to stop load test",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Why a stats fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsOrigin {
    Startup,
    Manual,
    Tick,
    AfterStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    /// The control is disabled, usually because its operation is in flight
    ControlDisabled(Operation),
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::ControlDisabled(op) => write!(f, "{} control is disabled", op.label()),
        }
    }
}

impl std::error::Error for ConsoleError {}

/// Enabled flags of the four controls plus which operations are outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    enabled: [bool; 4],
    in_flight: [bool; 4],
}

impl Controls {
    pub fn new() -> Self {
        let mut enabled = [true; 4];
        enabled[Operation::StopLoad.index()] = false;
        Self {
            enabled,
            in_flight: [false; 4],
        }
    }

    pub fn is_enabled(&self, op: Operation) -> bool {
        self.enabled[op.index()]
    }

    pub fn is_in_flight(&self, op: Operation) -> bool {
        self.in_flight[op.index()]
    }

    fn load_pair(&self) -> (bool, bool) {
        (
            self.is_enabled(Operation::StartLoad),
            self.is_enabled(Operation::StopLoad),
        )
    }

    fn set(&mut self, op: Operation, enabled: bool) {
        self.enabled[op.index()] = enabled;
    }

    fn begin(&mut self, op: Operation) {
        self.enabled[op.index()] = false;
        self.in_flight[op.index()] = true;
    }

    fn finish(&mut self, op: Operation) {
        self.enabled[op.index()] = true;
        self.in_flight[op.index()] = false;
    }

    /// Mirror the service's load-test state onto the start/stop pair. A control
    /// whose own request is still outstanding stays disabled.
    pub fn apply_load_state(&mut self, active: bool) {
        if !self.is_in_flight(Operation::StartLoad) {
            self.set(Operation::StartLoad, !active);
        }
        if !self.is_in_flight(Operation::StopLoad) {
            self.set(Operation::StopLoad, active);
        }
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new()
    }
}

/// A request the session must issue against the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Operation(Operation),
    Stats { origin: StatsOrigin, epoch: u64 },
}

impl Request {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Request::Operation(op) => Some(*op),
            Request::Stats { .. } => None,
        }
    }

    pub async fn issue(self, service: Arc<dyn ServiceApi>) -> Completion {
        match self {
            Request::Operation(Operation::FetchQuote) => {
                Completion::Quote(service.fetch_quote().await)
            }
            Request::Operation(Operation::FetchChallenge) => {
                Completion::Challenge(service.fetch_challenge().await)
            }
            Request::Operation(Operation::StartLoad) => {
                Completion::StartLoad(service.start_load().await)
            }
            Request::Operation(Operation::StopLoad) => {
                Completion::StopLoad(service.stop_load().await)
            }
            Request::Stats { origin, epoch } => Completion::Stats {
                origin,
                epoch,
                result: service.fetch_stats().await,
            },
        }
    }
}

/// Outcome of a [`Request`], fed back through [`Console::complete`].
#[derive(Debug)]
pub enum Completion {
    Quote(Result<QuoteResponse>),
    Challenge(Result<ChallengeResponse>),
    StartLoad(Result<ToggleResponse>),
    StopLoad(Result<ToggleResponse>),
    Stats {
        origin: StatsOrigin,
        epoch: u64,
        result: Result<StatsSnapshot>,
    },
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleView {
    pub model: DisplayModel,
    pub controls: Controls,
    pub error: Option<String>,
    pub quote: Option<Quote>,
    /// Challenge the service solved to obtain the current quote
    pub solved_challenge: Option<Challenge>,
    pub challenge: Option<Challenge>,
    /// Bumped on every successful challenge fetch; a change means "show it"
    pub challenge_revision: u64,
    pub intent: bool,
    pub poll: PollState,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Owned client state and the request lifecycle around it.
///
/// Every user operation goes through [`Console::begin`], which clears the error
/// banner and disables the control, and [`Console::complete`], which re-enables
/// it, surfaces failures and applies the side effects. Nothing here performs
/// I/O; the session issues the returned [`Request`]s.
///
/// Stats that were requested before the latest successful start/stop (an older
/// epoch) are dropped on arrival so they cannot revive a stale load-test state.
pub struct Console {
    model: DisplayModel,
    controls: Controls,
    error: Option<String>,
    quote: Option<Quote>,
    solved_challenge: Option<Challenge>,
    challenge: Option<Challenge>,
    challenge_revision: u64,
    intent: bool,
    epoch: u64,
    op_epoch: [u64; 4],
    pre_op_pair: [(bool, bool); 4],
    /// A snapshot was applied while the operation was in flight
    observed_in_flight: [bool; 4],
    poll: PollLoop,
    follow_server_idle: bool,
    last_updated: Option<DateTime<Utc>>,
}

impl Console {
    pub fn new(period: Duration, follow_server_idle: bool) -> Self {
        Self {
            model: DisplayModel::new(),
            controls: Controls::new(),
            error: None,
            quote: None,
            solved_challenge: None,
            challenge: None,
            challenge_revision: 0,
            intent: false,
            epoch: 0,
            op_epoch: [0; 4],
            pre_op_pair: [(true, false); 4],
            observed_in_flight: [false; 4],
            poll: PollLoop::new(period),
            follow_server_idle,
            last_updated: None,
        }
    }

    pub fn from_config(config: &PollConfig) -> Self {
        Self::new(config.period(), config.follow_server_idle)
    }

    pub fn model(&self) -> &DisplayModel {
        &self.model
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn quote(&self) -> Option<&Quote> {
        self.quote.as_ref()
    }

    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }

    pub fn challenge_revision(&self) -> u64 {
        self.challenge_revision
    }

    /// Local LoadTestIntent: the user asked for the load test to run
    pub fn intent(&self) -> bool {
        self.intent
    }

    pub fn poll_state(&self) -> PollState {
        self.poll.state()
    }

    pub fn poll(&self) -> &PollLoop {
        &self.poll
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn view(&self) -> ConsoleView {
        ConsoleView {
            model: self.model.clone(),
            controls: self.controls.clone(),
            error: self.error.clone(),
            quote: self.quote.clone(),
            solved_challenge: self.solved_challenge.clone(),
            challenge: self.challenge.clone(),
            challenge_revision: self.challenge_revision,
            intent: self.intent,
            poll: self.poll.state(),
            last_updated: self.last_updated,
        }
    }

    /// Start an operation: clear the banner, disable its control and hand back
    /// the request to issue. Rejected while the control is disabled.
    pub fn begin(&mut self, op: Operation) -> Result<Request, ConsoleError> {
        if !self.controls.is_enabled(op) {
            debug!(op = ?op, "ignoring invocation of disabled control");
            return Err(ConsoleError::ControlDisabled(op));
        }

        self.error = None;
        self.pre_op_pair[op.index()] = self.controls.load_pair();
        self.observed_in_flight[op.index()] = false;
        self.op_epoch[op.index()] = self.epoch;
        self.controls.begin(op);
        debug!(op = ?op, epoch = self.epoch, "operation started");
        Ok(Request::Operation(op))
    }

    /// Out-of-band stats fetch (startup seed or manual refresh)
    pub fn request_stats(&self, origin: StatsOrigin) -> Request {
        Request::Stats {
            origin,
            epoch: self.epoch,
        }
    }

    /// Resolves when the poll timer fires; never while idle.
    pub async fn next_tick(&mut self) {
        self.poll.tick().await
    }

    /// Turn a timer tick into a stats request, unless the previous tick's
    /// fetch is still outstanding.
    pub fn on_tick(&mut self) -> Option<Request> {
        if !self.poll.begin_tick_fetch() {
            debug!("poll tick skipped; previous fetch outstanding");
            return None;
        }
        Some(self.request_stats(StatsOrigin::Tick))
    }

    /// Release the poll timer; used on teardown.
    pub fn shutdown(&mut self) {
        if self.poll.stop() {
            info!("stats polling stopped on shutdown");
        }
    }

    /// Apply a finished request. Returns a follow-up request when the
    /// operation calls for one (the final refresh after a stop).
    pub fn complete(&mut self, completion: Completion) -> Option<Request> {
        match completion {
            Completion::Quote(result) => {
                self.complete_quote(result);
                None
            }
            Completion::Challenge(result) => {
                self.complete_challenge(result);
                None
            }
            Completion::StartLoad(result) => {
                self.complete_toggle(Operation::StartLoad, result);
                None
            }
            Completion::StopLoad(result) => self.complete_toggle(Operation::StopLoad, result),
            Completion::Stats {
                origin,
                epoch,
                result,
            } => {
                self.complete_stats(origin, epoch, result);
                None
            }
        }
    }

    fn complete_quote(&mut self, result: Result<QuoteResponse>) {
        let op = Operation::FetchQuote;
        self.controls.finish(op);
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => return self.fail_transport(op, e),
        };
        match resp.quote {
            Some(quote) if resp.success => {
                info!(author = %quote.author, "quote received");
                self.quote = Some(quote);
                self.solved_challenge = resp.challenge;
                self.apply_operation_stats(op, resp.stats.as_ref());
            }
            _ => self.fail_application(op, resp.error),
        }
    }

    fn complete_challenge(&mut self, result: Result<ChallengeResponse>) {
        let op = Operation::FetchChallenge;
        self.controls.finish(op);
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => return self.fail_transport(op, e),
        };
        match resp.challenge {
            Some(challenge) if resp.success => {
                info!(id = %challenge.challenge_id, n = challenge.scrypt_n, "challenge received");
                self.challenge = Some(challenge);
                self.challenge_revision += 1;
                self.apply_operation_stats(op, resp.stats.as_ref());
            }
            _ => self.fail_application(op, resp.error),
        }
    }

    fn complete_toggle(&mut self, op: Operation, result: Result<ToggleResponse>) -> Option<Request> {
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.rollback(op);
                self.fail_transport(op, e);
                return None;
            }
        };
        if !resp.success {
            self.rollback(op);
            self.fail_application(op, resp.error);
            return None;
        }

        let starting = op == Operation::StartLoad;
        self.intent = starting;
        self.advance_epoch();
        self.controls.finish(op);
        self.controls.apply_load_state(starting);

        if starting {
            if self.poll.ensure_running() {
                info!(period_ms = self.poll.period().as_millis() as u64, "load test started; polling stats");
            }
            None
        } else {
            if self.poll.stop() {
                info!("load test stopped; polling halted");
            }
            Some(self.request_stats(StatsOrigin::AfterStop))
        }
    }

    fn complete_stats(&mut self, origin: StatsOrigin, epoch: u64, result: Result<StatsSnapshot>) {
        if epoch != self.epoch {
            debug!(origin = ?origin, epoch, current = self.epoch, "discarding stale stats");
            return;
        }
        if origin == StatsOrigin::Tick {
            self.poll.end_tick_fetch();
        }
        match result {
            Ok(stats) => self.apply_snapshot(&stats, origin),
            Err(e) => warn!(origin = ?origin, "Error updating stats: {:#}", e),
        }
    }

    fn apply_operation_stats(&mut self, op: Operation, stats: Option<&StatsSnapshot>) {
        let Some(stats) = stats else {
            return;
        };
        if self.op_epoch[op.index()] != self.epoch {
            debug!(op = ?op, "dropping stats from operation started before intent change");
            return;
        }
        self.apply_snapshot(stats, StatsOrigin::Manual);
    }

    fn apply_snapshot(&mut self, stats: &StatsSnapshot, origin: StatsOrigin) {
        self.model = reconcile(&self.model, Some(stats));
        self.last_updated = Some(Utc::now());

        let active = self.model.load_test_active;
        self.controls.apply_load_state(active);
        for op in Operation::ALL {
            if self.controls.is_in_flight(op) {
                self.observed_in_flight[op.index()] = true;
            }
        }

        if active {
            if self.poll.ensure_running() {
                info!(origin = ?origin, "service reports an active load test; polling stats");
            }
        } else if origin == StatsOrigin::Tick && self.poll.is_polling() {
            if self.follow_server_idle {
                self.poll.stop();
                self.intent = false;
                self.advance_epoch();
                info!("load test ended on the service; polling halted");
            } else {
                debug!("service reports no active load test; polling continues until stopped");
            }
        }
    }

    fn advance_epoch(&mut self) {
        self.epoch += 1;
        self.poll.end_tick_fetch();
    }

    /// Put the start/stop pair back as it was before `op` began, unless a
    /// snapshot landed in the meantime; then the pair follows the model.
    fn rollback(&mut self, op: Operation) {
        self.controls.finish(op);
        if self.observed_in_flight[op.index()] {
            self.controls.apply_load_state(self.model.load_test_active);
            return;
        }
        let (start, stop) = self.pre_op_pair[op.index()];
        self.controls.set(Operation::StartLoad, start);
        self.controls.set(Operation::StopLoad, stop);
    }

    fn fail_transport(&mut self, op: Operation, err: anyhow::Error) {
        warn!(op = ?op, "request failed: {:#}", err);
        self.error = Some(format!("Error: {:#}", err));
    }

    fn fail_application(&mut self, op: Operation, message: Option<String>) {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| op.fallback_error().to_string());
        warn!(op = ?op, error = %message, "service declined request");
        self.error = Some(message);
    }
}

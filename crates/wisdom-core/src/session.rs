use crate::controller::{
    Completion, Console, ConsoleError, ConsoleView, Operation, Request, StatsOrigin,
};
use crate::service::ServiceApi;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

/// Input from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Invoke(Operation),
    Refresh,
    Shutdown,
}

/// Drives a [`Console`] against a service.
///
/// Requests run concurrently on a `JoinSet`; their completions, user commands
/// and poll ticks are all applied from this one task, so console state is
/// never touched from two places at once. Every change is published on the
/// watch channel returned by [`Session::new`].
pub struct Session {
    console: Console,
    service: Arc<dyn ServiceApi>,
    tasks: JoinSet<Completion>,
    view_tx: watch::Sender<ConsoleView>,
}

impl Session {
    pub fn new(
        console: Console,
        service: Arc<dyn ServiceApi>,
    ) -> (Self, watch::Receiver<ConsoleView>) {
        let (view_tx, view_rx) = watch::channel(console.view());
        let session = Self {
            console,
            service,
            tasks: JoinSet::new(),
            view_tx,
        };
        (session, view_rx)
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Requests issued but not yet applied
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Seed the display with one stats fetch.
    pub fn start(&mut self) {
        let req = self.console.request_stats(StatsOrigin::Startup);
        self.spawn(req);
    }

    /// Begin `op` and issue its request.
    pub fn invoke(&mut self, op: Operation) -> Result<(), ConsoleError> {
        let req = self.console.begin(op)?;
        self.spawn(req);
        self.publish();
        Ok(())
    }

    /// Apply a command without waiting for its request. Returns `false` for
    /// [`Command::Shutdown`]. Invoking a disabled control is ignored.
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Invoke(op) => {
                let _ = self.invoke(op);
            }
            Command::Refresh => {
                let req = self.console.request_stats(StatsOrigin::Manual);
                self.spawn(req);
            }
            Command::Shutdown => return false,
        }
        self.publish();
        true
    }

    /// Wait until every outstanding request, follow-ups included, has been
    /// applied. Poll ticks are not driven here.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.on_joined(joined);
        }
        self.publish();
    }

    /// Run one command to completion.
    pub async fn execute(&mut self, command: Command) -> ConsoleView {
        self.handle(command);
        self.settle().await;
        self.console.view()
    }

    /// Main loop. Ends on [`Command::Shutdown`] or when every command sender
    /// is gone; the poll timer is released and in-flight requests are aborted.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        info!(service = self.service.name(), "console session started");
        self.start();
        self.publish();

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle(cmd) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.on_joined(joined);
                    self.publish();
                }
                _ = self.console.next_tick() => {
                    if let Some(req) = self.console.on_tick() {
                        self.spawn(req);
                    }
                }
            }
        }

        self.tasks.abort_all();
        self.console.shutdown();
        self.publish();
        info!("console session ended");
        Ok(())
    }

    fn spawn(&mut self, req: Request) {
        debug!(request = ?req, "issuing request");
        let service = Arc::clone(&self.service);
        self.tasks.spawn(req.issue(service));
    }

    fn on_joined(&mut self, joined: std::result::Result<Completion, JoinError>) {
        match joined {
            Ok(completion) => {
                if let Some(follow_up) = self.console.complete(completion) {
                    self.spawn(follow_up);
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!("request task failed: {}", e),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.console.view());
    }
}

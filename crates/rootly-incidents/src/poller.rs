//! Background polling of open incidents for one repository.
//!
//! The poller publishes the latest incident list on a `watch` channel. It
//! polls immediately on [`IncidentPoller::start`] and then on a fixed
//! interval until stopped. Any failure publishes an empty list; polling
//! itself never stops on error.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::IncidentsClient;
use crate::error::IncidentsError;
use crate::types::Incident;

/// Default interval between polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(45);

/// Source of the session cookie used for each poll.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session, or `None` when logged out.
    async fn session(&self) -> Option<String>;
}

/// Fixed session value.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(Option<String>);

impl StaticSession {
    pub fn new(session: impl Into<String>) -> Self {
        Self(Some(session.into()))
    }

    pub fn logged_out() -> Self {
        Self(None)
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn session(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fresh list published; carries its length.
    Updated(usize),
    NotAuthenticated,
    NoRepository,
    Failed(IncidentsError),
}

struct Shared {
    client: IncidentsClient,
    sessions: Arc<dyn SessionProvider>,
    repo: Mutex<Option<String>>,
    incidents: watch::Sender<Vec<Incident>>,
}

impl Shared {
    fn repo(&self) -> Option<String> {
        self.repo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_repo(&self, repo: Option<String>) {
        *self.repo.lock().unwrap_or_else(PoisonError::into_inner) = repo;
    }

    fn publish(&self, incidents: Vec<Incident>) {
        self.incidents.send_replace(incidents);
    }

    async fn poll(&self) -> PollOutcome {
        let Some(session) = self.sessions.session().await else {
            info!(event = "poll.skipped", reason = "not_authenticated");
            self.publish(Vec::new());
            return PollOutcome::NotAuthenticated;
        };
        let Some(repo) = self.repo() else {
            info!(event = "poll.skipped", reason = "no_repository");
            self.publish(Vec::new());
            return PollOutcome::NoRepository;
        };

        debug!(event = "poll.started", repo = %repo);
        match self.client.fetch_incidents(&repo, &session).await {
            Ok(incidents) => {
                let count = incidents.len();
                info!(event = "poll.completed", repo = %repo, count = count);
                self.publish(incidents);
                PollOutcome::Updated(count)
            }
            Err(err) => {
                match &err {
                    IncidentsError::Unauthorized => {
                        warn!(event = "poll.unauthorized", "session expired, log in again")
                    }
                    IncidentsError::ProjectNotFound => {
                        warn!(event = "poll.project_not_found", repo = %repo)
                    }
                    other => warn!(event = "poll.failed", repo = %repo, error = %other),
                }
                self.publish(Vec::new());
                PollOutcome::Failed(err)
            }
        }
    }
}

/// Periodic incident fetcher.
pub struct IncidentPoller {
    shared: Arc<Shared>,
    interval: Duration,
    cancel: Option<CancellationToken>,
}

impl IncidentPoller {
    pub fn new(client: IncidentsClient, sessions: Arc<dyn SessionProvider>) -> Self {
        let (incidents, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                client,
                sessions,
                repo: Mutex::new(None),
                incidents,
            }),
            interval: POLL_INTERVAL,
            cancel: None,
        }
    }

    /// Zero is clamped to one millisecond.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Latest published incidents.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Incident>> {
        self.shared.incidents.subscribe()
    }

    pub fn current(&self) -> Vec<Incident> {
        self.shared.incidents.borrow().clone()
    }

    pub fn repo(&self) -> Option<String> {
        self.shared.repo()
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Start polling `repo`, replacing any running poll loop.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(&mut self, repo: impl Into<String>) {
        self.stop();

        let repo = repo.into();
        info!(event = "poller.started", repo = %repo, interval_ms = self.interval.as_millis() as u64);
        self.shared.set_repo(Some(repo));

        let token = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let child = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    _ = shared.poll() => {}
                }
            }
        });
        self.cancel = Some(token);
    }

    /// Stop polling and forget the repository.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
            self.shared.set_repo(None);
            info!(event = "poller.stopped");
        }
    }

    /// Poll once right now, outside the schedule.
    pub async fn refresh(&self) -> PollOutcome {
        debug!(event = "poll.manual");
        self.shared.poll().await
    }
}

impl Drop for IncidentPoller {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

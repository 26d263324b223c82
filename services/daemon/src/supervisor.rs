//! Owns the channel connection and drives the reconnection state machine.
//!
//! Everything here runs on a single task: connection events, the retry
//! timer, and the health audit are all arms of one `tokio::select!` loop,
//! so reconnection state is only ever mutated from one place and no
//! locking is needed.

use crate::config::Config;
use std::future::Future;
use std::sync::Arc;
use tether_core::client::{Connection, JoinedChannel, Session, SessionClient};
use tether_core::connection::{ConnectionEvent, ConnectionStatus, FailureReason};
use tether_core::policy::{self, RetryDecision};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tracing::{debug, error, info, warn};

/// A connection that has not reported `Ready` for this long is treated as
/// silently degraded and recycled, even if it never emitted `Disconnected`.
const STALE_AFTER: Duration = Duration::from_secs(3600);

/// Pause before the failure exit so in-flight teardown I/O can flush.
const RESTART_GRACE: Duration = Duration::from_secs(2);

/// How the supervisor ended. The binary maps this to the process exit
/// status; relaunching after `Restart` is the external supervisor's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Graceful shutdown, exit with success.
    Shutdown,
    /// Unrecoverable in process, exit with failure.
    Restart,
}

/// Result of handling one event inside the loop.
enum Flow {
    Continue,
    Fatal,
}

/// Mutable reconnection counters, reset only by a fresh `Ready`.
#[derive(Debug, Default)]
struct ReconnectState {
    attempts: u32,
    last_ready: Option<Instant>,
    /// Deadline of the single pending retry. Scheduling a new retry
    /// replaces this, so at most one timer is ever pending.
    retry_at: Option<Instant>,
}

pub struct Supervisor {
    config: Arc<Config>,
    client: Arc<dyn SessionClient>,
    session: Option<Arc<dyn Session>>,
    /// The live handle. Exactly one may exist at a time; `connect` follows
    /// cancel-then-replace semantics.
    conn: Option<Box<dyn Connection>>,
    /// Event stream of the live handle. Cleared whenever the handle is.
    events: Option<mpsc::Receiver<ConnectionEvent>>,
    reconnect: ReconnectState,
    restarting: bool,
}

impl Supervisor {
    pub fn new(config: Arc<Config>, client: Arc<dyn SessionClient>) -> Self {
        Self {
            config,
            client,
            session: None,
            conn: None,
            events: None,
            reconnect: ReconnectState::default(),
            restarting: false,
        }
    }

    /// Runs the supervisor until graceful shutdown or a fatal condition.
    ///
    /// `shutdown` is the termination-signal future; when it resolves, all
    /// pending timers are cancelled and resources are torn down before
    /// returning [`Outcome::Shutdown`].
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Outcome {
        tokio::pin!(shutdown);

        // Initial login, retried indefinitely at the fixed base delay.
        // Failures here happen before any session exists and are assumed
        // transient.
        let client = self.client.clone();
        let config = self.config.clone();
        tokio::select! {
            _ = &mut shutdown => return self.cleanup().await,
            session = Self::login_with_retry(client, config) => {
                self.session = Some(session);
            }
        }

        if let Flow::Fatal = self.connect().await {
            return self.restart().await;
        }

        // The health audit starts only once login has succeeded.
        let mut health = time::interval_at(
            Instant::now() + self.config.health_check_interval,
            self.config.health_check_interval,
        );

        loop {
            let retry_at = self.reconnect.retry_at;
            let flow = tokio::select! {
                biased;
                _ = &mut shutdown => return self.cleanup().await,
                _ = Self::sleep_until_opt(retry_at) => {
                    debug!("Retry timer fired");
                    self.reconnect.retry_at = None;
                    self.connect().await
                }
                event = Self::next_event(&mut self.events) => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        self.events = None;
                        if self.conn.is_none() {
                            Flow::Continue
                        } else if self.session.as_ref().is_some_and(|s| !s.is_alive()) {
                            // The gateway closed the whole session; the
                            // client marks it dead before dropping the
                            // event sender. Same bounded-retry path as any
                            // other connection failure.
                            warn!("Gateway session closed");
                            self.safe_destroy();
                            self.fail(FailureReason::GatewayDisconnect)
                        } else {
                            // The sender vanished with the session still
                            // alive and no lifecycle event: an unobserved
                            // failure. Restart rather than continue in an
                            // unknown state.
                            error!("Connection event stream closed unexpectedly");
                            Flow::Fatal
                        }
                    }
                },
                _ = health.tick() => self.health_tick().await,
            };

            if let Flow::Fatal = flow {
                return self.restart().await;
            }
        }
    }

    async fn login_with_retry(
        client: Arc<dyn SessionClient>,
        config: Arc<Config>,
    ) -> Arc<dyn Session> {
        loop {
            match client.login(&config.token).await {
                Ok(session) => {
                    info!("Login succeeded");
                    return session;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_ms = config.reconnect_base_delay.as_millis() as u64,
                        "Login failed; retrying"
                    );
                    time::sleep(config.reconnect_base_delay).await;
                }
            }
        }
    }

    /// Resolves the target channel and issues a join, replacing any prior
    /// handle. Re-entrant-safe: cancels the pending retry and destroys the
    /// old handle first, so the retry timer and the health audit may both
    /// land here without stacking connections.
    async fn connect(&mut self) -> Flow {
        self.reconnect.retry_at = None;
        self.safe_destroy();
        self.events = None;

        let Some(session) = self.session.clone() else {
            return self.fail(FailureReason::GatewayDisconnect);
        };

        let Some(group) = session.lookup_group(&self.config.group_id) else {
            warn!(group_id = %self.config.group_id, "Target group not found");
            return self.fail(FailureReason::GroupNotFound);
        };

        let Some(channel) = session.lookup_channel(&group, &self.config.channel_id) else {
            warn!(channel_id = %self.config.channel_id, "Target channel not found");
            return self.fail(FailureReason::ChannelNotFound);
        };

        match session.join(&channel).await {
            Ok(JoinedChannel { handle, events }) => {
                info!(channel = %channel.name, "Join issued; waiting for ready");
                self.conn = Some(handle);
                self.events = Some(events);
                Flow::Continue
            }
            Err(e) => self.fail(FailureReason::Connection(e.to_string())),
        }
    }

    fn on_event(&mut self, event: ConnectionEvent) -> Flow {
        match event {
            ConnectionEvent::StatusChange { old, new } => {
                debug!(?old, ?new, "Connection status changed");
                match new {
                    ConnectionStatus::Ready => {
                        info!("Channel connection ready");
                        self.reconnect.attempts = 0;
                        self.reconnect.last_ready = Some(Instant::now());
                        Flow::Continue
                    }
                    ConnectionStatus::Disconnected => {
                        self.safe_destroy();
                        self.events = None;
                        self.fail(FailureReason::Disconnected)
                    }
                    ConnectionStatus::Destroyed => {
                        // Terminal for this handle instance; nothing to do
                        // beyond dropping our reference.
                        self.conn = None;
                        self.events = None;
                        Flow::Continue
                    }
                    ConnectionStatus::Connecting => Flow::Continue,
                }
            }
            ConnectionEvent::Error(message) => {
                // The handle's own lifecycle event follows separately, so
                // it is not destroyed here.
                warn!(error = %message, "Connection error");
                self.fail(FailureReason::Connection(message))
            }
        }
    }

    /// Records a failed attempt and either schedules the single retry
    /// timer or gives up and escalates.
    fn fail(&mut self, reason: FailureReason) -> Flow {
        self.reconnect.attempts += 1;
        match policy::decide(
            self.reconnect.attempts,
            self.config.reconnect_base_delay,
            self.config.max_reconnect_attempts,
        ) {
            RetryDecision::Backoff(delay) => {
                warn!(
                    %reason,
                    attempt = self.reconnect.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Connection failed; retry scheduled"
                );
                self.reconnect.retry_at = Some(Instant::now() + delay);
                Flow::Continue
            }
            RetryDecision::GiveUp => {
                error!(
                    %reason,
                    attempts = self.reconnect.attempts,
                    "Retry budget exhausted; escalating to restart"
                );
                Flow::Fatal
            }
        }
    }

    /// Coarse safety net over the event-driven path: catches a silently
    /// dead session, a stalled reconnection chain, and a connection that
    /// degraded without ever emitting `Disconnected`.
    async fn health_tick(&mut self) -> Flow {
        let session_alive = self.session.as_ref().is_some_and(|s| s.is_alive());
        if !session_alive {
            error!("Health audit: login session is gone");
            return Flow::Fatal;
        }

        if self.conn.is_none() {
            warn!("Health audit: no connection owned; reconnecting");
            return self.connect().await;
        }

        if let Some(last_ready) = self.reconnect.last_ready {
            let since_ready = last_ready.elapsed();
            if since_ready > STALE_AFTER {
                warn!(
                    stale_secs = since_ready.as_secs(),
                    "Health audit: connection stale; recycling"
                );
                // connect() destroys the stale handle before rejoining.
                return self.connect().await;
            }
        }

        Flow::Continue
    }

    /// Destroys the owned handle if there is one. Never fails: the
    /// `Connection::destroy` contract swallows internal errors, and
    /// calling this with no handle is a no-op.
    fn safe_destroy(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.destroy();
        }
    }

    /// Fatal path: tear everything down and yield the failure exit.
    /// Idempotent; a restart already in flight is not re-run.
    async fn restart(&mut self) -> Outcome {
        if self.restarting {
            return Outcome::Restart;
        }
        self.restarting = true;

        error!("Fatal condition: tearing down for process restart");
        self.reconnect.retry_at = None;
        self.safe_destroy();
        self.events = None;
        if let Some(session) = self.session.take() {
            session.destroy().await;
        }
        self.reconnect.attempts = 0;

        time::sleep(RESTART_GRACE).await;
        Outcome::Restart
    }

    /// Graceful shutdown path. Differs from [`Supervisor::restart`] only
    /// in the exit status and the missing grace delay.
    async fn cleanup(&mut self) -> Outcome {
        info!("Shutting down gracefully");
        self.reconnect.retry_at = None;
        self.safe_destroy();
        self.events = None;
        if let Some(session) = self.session.take() {
            session.destroy().await;
        }
        Outcome::Shutdown
    }

    async fn sleep_until_opt(deadline: Option<Instant>) {
        match deadline {
            Some(at) => time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }

    async fn next_event(
        events: &mut Option<mpsc::Receiver<ConnectionEvent>>,
    ) -> Option<ConnectionEvent> {
        match events {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}

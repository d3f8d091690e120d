//! # Connection supervisor: one client, idempotent start/stop, automatic reconnect.
//!
//! [`Supervisor`] is a cheap, cloneable handle. All state lives in a single
//! loop task that processes one input at a time:
//!
//! ```text
//!   Supervisor::start/stop/state ── Command ──┐
//!   Client::subscribe() ───────── ClientEvent ┤
//!   connect()/disconnect() futures ─ Settled ─┼──► supervisor loop ──► Bus<SupervisorEvent>
//!   Backoff::elapsed() ─────────── BackoffStep┘         │
//!                                                       └──► client.connect()/disconnect()
//! ```
//!
//! ## State machine
//! ```text
//! Idle ──start()──► Starting ──ready──► Ready
//!                      │ initial connect failed → Idle (Started{connected: false}, no backoff)
//! Ready ──disconnected (active)──► Disconnected ──Wait──► (timer) ──Retry──► Starting
//! any ──stop()──► Stopping ──disconnect settled──► Stopped
//! backoff exhausted ──► Error ──► Stopping(err) ──► Stopped(err)
//! ```
//!
//! ## Rules
//! - `start()` while active answers with `is_connected()` and issues nothing.
//! - Every `stop()` caller resolves after the single disconnect has completed;
//!   once stopped, further `stop()` calls resolve immediately.
//! - `start()` during an in-flight stop waits for the stop, then starts.
//! - Only drops of an established session drive the backoff; a failed retry
//!   arms the next step, a failed initial connect does not.
//! - Stopping cancels the pending retry timer. The disconnect is issued once every
//!   in-flight connect has settled, so a stop never leaves a late session behind.
//! - A `start()` overtaken by a stop resolves `false`.
//! - After lost client events the loop resyncs from `Client::is_connected()`.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientEvent};
use crate::config::SupervisorConfig;
use crate::error::{ClientError, SupervisorError};
use crate::events::{Bus, Event, SupervisorEvent};
use crate::policies::{Backoff, BackoffStep};

/// Lifecycle state of the supervised connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Starting,
    Ready,
    Disconnected,
    Stopping,
    Stopped,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Starting => "starting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Stopping => "stopping",
            ConnectionState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

enum Command {
    Start(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
    State(oneshot::Sender<ConnectionState>),
}

/// Why a connect was issued.
enum Origin {
    /// `start()` callers waiting for the outcome.
    Start(Vec<oneshot::Sender<bool>>),
    /// A backoff attempt.
    Retry(BackoffStep),
}

/// Completion of a client operation, re-entering the loop.
enum Settled {
    Connect {
        origin: Origin,
        result: Result<(), ClientError>,
    },
    Disconnect(Result<(), ClientError>),
}

/// Handle to the connection supervisor.
///
/// Cloning is cheap; all clones drive the same loop.
#[derive(Clone)]
pub struct Supervisor {
    cmd: mpsc::UnboundedSender<Command>,
    bus: Bus<SupervisorEvent>,
    client: Arc<dyn Client>,
    token: CancellationToken,
}

impl Supervisor {
    /// Spawns the supervisor loop around `client`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(client: Arc<dyn Client>, cfg: &SupervisorConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity);
        let token = CancellationToken::new();
        let (cmd, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            client: Arc::clone(&client),
            bus: bus.clone(),
            backoff: Backoff::new(cfg.backoff),
            state: ConnectionState::Idle,
            active: false,
            stopped: true,
            stop_cause: None,
            stop_waiters: Vec::new(),
            deferred_starts: Vec::new(),
            inflight: FuturesUnordered::new(),
            connecting: 0,
            disconnect_pending: false,
        };
        let events = client.subscribe();
        tokio::spawn(worker.run(rx, events, token.clone()));

        Self {
            cmd,
            bus,
            client,
            token,
        }
    }

    /// Starts the connection; returns whether the initial connect succeeded.
    ///
    /// If already active, returns the current connection status and does nothing else.
    pub async fn start(&self) -> Result<bool, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Start(tx))?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Stops the connection; resolves once the client disconnect has completed.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stop(tx))?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> Result<ConnectionState, SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::State(tx))?;
        rx.await.map_err(|_| SupervisorError::Closed)
    }

    /// Whether the underlying client reports an established session.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Subscribes to lifecycle and traffic events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event<SupervisorEvent>> {
        self.bus.subscribe()
    }

    /// Ends the loop. A still-active connection is disconnected on the way out.
    ///
    /// Pending `start()`/`stop()` callers resolve with [`SupervisorError::Closed`].
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    fn send(&self, cmd: Command) -> Result<(), SupervisorError> {
        self.cmd.send(cmd).map_err(|_| SupervisorError::Closed)
    }
}

/// State owned by the supervisor loop.
struct Worker {
    client: Arc<dyn Client>,
    bus: Bus<SupervisorEvent>,
    backoff: Backoff,
    state: ConnectionState,
    /// Set by `start()`, cleared when a stop begins.
    active: bool,
    /// True when no teardown is in flight and the connection is not active.
    stopped: bool,
    stop_cause: Option<SupervisorError>,
    stop_waiters: Vec<oneshot::Sender<()>>,
    deferred_starts: Vec<oneshot::Sender<bool>>,
    inflight: FuturesUnordered<BoxFuture<'static, Settled>>,
    /// Connects issued and not yet settled.
    connecting: usize,
    /// A stop is waiting for `connecting` to drop to zero.
    disconnect_pending: bool,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: broadcast::Receiver<Event<ClientEvent>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                ev = events.recv() => match ev {
                    Ok(ev) => self.on_client_event(ev.kind),
                    Err(RecvError::Lagged(n)) => self.on_lagged(n),
                    Err(RecvError::Closed) => break,
                },
                Some(settled) = self.inflight.next(), if !self.inflight.is_empty() => {
                    self.on_settled(settled);
                }
                step = self.backoff.elapsed() => self.on_retry_due(step),
            }
        }

        if self.active || self.client.is_connected() {
            let _ = self.client.disconnect().await;
        }
        debug!("supervisor loop finished");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start(reply) => {
                if self.active {
                    let _ = reply.send(self.client.is_connected());
                } else if !self.stopped {
                    self.deferred_starts.push(reply);
                } else {
                    self.begin_start(vec![reply]);
                }
            }
            Command::Stop(reply) => {
                if self.active {
                    self.stop_waiters.push(reply);
                    self.begin_stop(None);
                } else if !self.stopped {
                    self.stop_waiters.push(reply);
                } else {
                    let _ = reply.send(());
                }
            }
            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
        }
    }

    fn on_client_event(&mut self, ev: ClientEvent) {
        match ev {
            ClientEvent::Ready => {
                self.backoff.reset();
                if self.active {
                    self.state = ConnectionState::Ready;
                }
                info!("panel connection ready");
                self.bus.emit(SupervisorEvent::Ready);
            }
            ClientEvent::Error(e) => self.bus.emit(SupervisorEvent::ClientError(e)),
            ClientEvent::Message(m) => self.bus.emit(SupervisorEvent::Message(m)),
            ClientEvent::Ok => self.bus.emit(SupervisorEvent::Ok),
            ClientEvent::Disconnected(err) => {
                self.bus.emit(SupervisorEvent::Disconnected(err));
                if self.active {
                    self.state = ConnectionState::Disconnected;
                    self.schedule_retry();
                }
            }
        }
    }

    /// Client events were dropped; rebuild the view from the client itself.
    fn on_lagged(&mut self, skipped: u64) {
        warn!(skipped, "supervisor lagged behind client events");
        self.bus.emit(SupervisorEvent::Lagged { skipped });
        if !self.active || self.connecting > 0 {
            return;
        }
        if self.client.is_connected() {
            self.backoff.reset();
            self.state = ConnectionState::Ready;
        } else {
            self.state = ConnectionState::Disconnected;
            self.schedule_retry();
        }
    }

    fn on_settled(&mut self, settled: Settled) {
        if matches!(settled, Settled::Connect { .. }) {
            self.connecting = self.connecting.saturating_sub(1);
        }
        match settled {
            Settled::Connect {
                origin: Origin::Start(replies),
                result,
            } => {
                // a stop that overtook this connect will tear the session down
                let connected = result.is_ok() && self.active;
                if let Err(e) = &result {
                    warn!(error = %e, label = e.as_label(), "initial connect failed");
                    if self.active {
                        self.active = false;
                        self.stopped = true;
                        self.state = ConnectionState::Idle;
                    }
                }
                self.bus.emit(SupervisorEvent::Started { connected });
                for reply in replies {
                    let _ = reply.send(connected);
                }
            }
            Settled::Connect {
                origin: Origin::Retry(step),
                result: Err(e),
            } => {
                debug!(attempt = step.attempt, error = %e, "reconnect attempt failed");
                if self.active {
                    self.state = ConnectionState::Disconnected;
                    self.schedule_retry();
                }
            }
            Settled::Connect { .. } => {}
            Settled::Disconnect(result) => {
                if let Err(e) = result {
                    warn!(error = %e, "client disconnect reported an error");
                }
                self.stopped = true;
                self.state = ConnectionState::Stopped;
                self.bus.emit(SupervisorEvent::Stopped(self.stop_cause.take()));
                for waiter in self.stop_waiters.drain(..) {
                    let _ = waiter.send(());
                }
                if !self.deferred_starts.is_empty() {
                    let replies = std::mem::take(&mut self.deferred_starts);
                    self.begin_start(replies);
                }
            }
        }
        self.release_disconnect();
    }

    fn on_retry_due(&mut self, step: BackoffStep) {
        if !self.active {
            return;
        }
        info!(attempt = step.attempt, delay = ?step.delay, "retrying panel connection");
        self.bus.emit(SupervisorEvent::Retry(step));
        self.state = ConnectionState::Starting;
        self.issue_connect(Origin::Retry(step));
    }

    fn begin_start(&mut self, replies: Vec<oneshot::Sender<bool>>) {
        self.active = true;
        self.stopped = false;
        self.state = ConnectionState::Starting;
        self.bus.emit(SupervisorEvent::Starting);
        self.issue_connect(Origin::Start(replies));
    }

    fn begin_stop(&mut self, cause: Option<SupervisorError>) {
        self.active = false;
        self.stopped = false;
        self.backoff.cancel();
        self.state = ConnectionState::Stopping;
        self.bus.emit(SupervisorEvent::Stopping(cause.clone()));
        self.stop_cause = cause;
        self.disconnect_pending = true;
        self.release_disconnect();
    }

    /// Issues the pending disconnect once no connect is in flight.
    fn release_disconnect(&mut self) {
        if !self.disconnect_pending || self.connecting > 0 {
            return;
        }
        self.disconnect_pending = false;
        let client = Arc::clone(&self.client);
        self.inflight
            .push(Box::pin(async move { Settled::Disconnect(client.disconnect().await) }));
    }

    fn schedule_retry(&mut self) {
        match self.backoff.schedule() {
            Ok(Some(step)) => {
                info!(attempt = step.attempt, delay = ?step.delay, "waiting before reconnect");
                self.bus.emit(SupervisorEvent::Wait(step));
            }
            Ok(None) => debug!("reconnect already scheduled"),
            Err(e) => {
                self.bus.emit(SupervisorEvent::Error(e.clone()));
                self.begin_stop(Some(e));
            }
        }
    }

    fn issue_connect(&mut self, origin: Origin) {
        self.connecting += 1;
        let client = Arc::clone(&self.client);
        self.inflight.push(Box::pin(async move {
            let result = client.connect().await;
            Settled::Connect { origin, result }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::{self, Instant};

    use crate::client::mock::MockClient;
    use crate::policies::{BackoffPolicy, JitterPolicy};

    fn config(initial_s: u64, max_s: u64, max_attempts: Option<u32>) -> SupervisorConfig {
        SupervisorConfig {
            backoff: BackoffPolicy {
                initial: Duration::from_secs(initial_s),
                max: Duration::from_secs(max_s),
                jitter: JitterPolicy::None,
                max_attempts,
            },
            ..SupervisorConfig::default()
        }
    }

    fn setup(client: MockClient, cfg: SupervisorConfig) -> (Arc<MockClient>, Supervisor) {
        let client = Arc::new(client);
        let sup = Supervisor::new(client.clone(), &cfg);
        (client, sup)
    }

    async fn next_event(rx: &mut broadcast::Receiver<Event<SupervisorEvent>>) -> SupervisorEvent {
        time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("event in time")
            .expect("bus open")
            .kind
    }

    async fn collect_until(
        rx: &mut broadcast::Receiver<Event<SupervisorEvent>>,
        done: impl Fn(&SupervisorEvent) -> bool,
    ) -> Vec<SupervisorEvent> {
        let mut seen = Vec::new();
        loop {
            let ev = next_event(rx).await;
            let stop = done(&ev);
            seen.push(ev);
            if stop {
                return seen;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_emits_lifecycle() {
        let (client, sup) = setup(MockClient::new(), SupervisorConfig::default());
        let mut rx = sup.subscribe();

        assert_eq!(sup.start().await, Ok(true));
        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Ready)).await;
        assert_eq!(seen[0], SupervisorEvent::Starting);
        assert!(seen.contains(&SupervisorEvent::Started { connected: true }));
        assert_eq!(client.connects(), 1);
        assert_eq!(sup.state().await, Ok(ConnectionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_connects_once() {
        let (client, sup) = setup(
            MockClient::new().with_connect_delay(Duration::from_millis(50)),
            SupervisorConfig::default(),
        );

        let (a, b) = tokio::join!(sup.start(), sup.start());
        assert_eq!(a, Ok(true));
        assert_eq!(b, Ok(false), "second start sees the in-flight connect");
        assert_eq!(sup.start().await, Ok(true));
        assert_eq!(client.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stops_share_one_disconnect() {
        let (client, sup) = setup(
            MockClient::new().with_disconnect_delay(Duration::from_millis(100)),
            SupervisorConfig::default(),
        );
        sup.start().await.unwrap();

        let began = Instant::now();
        let mut callers = Vec::new();
        for _ in 0..5 {
            let sup = sup.clone();
            let client = client.clone();
            callers.push(tokio::spawn(async move {
                sup.stop().await.unwrap();
                // teardown must be observable by every caller
                assert_eq!(client.disconnects(), 1);
                assert!(!client.is_connected());
                Instant::now()
            }));
        }
        for caller in callers {
            let resolved_at = caller.await.unwrap();
            assert!(resolved_at - began >= Duration::from_millis(100));
        }
        assert_eq!(client.disconnects(), 1);
        assert_eq!(sup.state().await, Ok(ConnectionState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_after_stop_returns_immediately() {
        let (client, sup) = setup(MockClient::new(), SupervisorConfig::default());
        sup.start().await.unwrap();
        sup.stop().await.unwrap();

        let again = time::timeout(Duration::from_millis(1), sup.stop()).await;
        assert_eq!(again, Ok(Ok(())));
        assert_eq!(client.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start_is_noop() {
        let (client, sup) = setup(MockClient::new(), SupervisorConfig::default());
        sup.stop().await.unwrap();
        assert_eq!(client.disconnects(), 0);
        assert_eq!(sup.state().await, Ok(ConnectionState::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_bypasses_backoff() {
        let (client, sup) = setup(MockClient::new(), config(1, 5, None));
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        sup.stop().await.unwrap();

        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Stopped(_))).await;
        assert!(seen.contains(&SupervisorEvent::Stopping(None)));
        assert!(!seen.iter().any(|e| matches!(e, SupervisorEvent::Wait(_))));

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fibonacci_reconnect_sequence() {
        let (client, sup) = setup(MockClient::new(), config(1, 5, None));
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        client.script((0..10).map(|_| Err(ClientError::Closed)));
        client.drop_connection();

        let mut waits = Vec::new();
        while waits.len() < 7 {
            if let SupervisorEvent::Wait(step) = next_event(&mut rx).await {
                waits.push((step.attempt, step.delay.as_secs()));
            }
        }
        assert_eq!(
            waits,
            vec![(1, 1), (2, 1), (3, 2), (4, 3), (5, 5), (6, 5), (7, 5)]
        );
        sup.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_resets_backoff() {
        let (client, sup) = setup(MockClient::new(), config(1, 30, None));
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();

        client.script([Err(ClientError::Closed), Err(ClientError::Closed), Ok(())]);
        client.drop_connection();
        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Ready)).await;
        let last_wait = seen
            .iter()
            .filter_map(|e| match e {
                SupervisorEvent::Wait(s) => Some(*s),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_wait.attempt, 3);
        assert_eq!(last_wait.delay, Duration::from_secs(2));
        assert_eq!(sup.state().await, Ok(ConnectionState::Ready));

        client.drop_connection();
        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Wait(_))).await;
        assert_eq!(
            seen.last(),
            Some(&SupervisorEvent::Wait(BackoffStep {
                attempt: 1,
                delay: Duration::from_secs(1)
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_failure_is_not_retried() {
        let (client, sup) = setup(MockClient::new(), config(1, 5, None));
        let mut rx = sup.subscribe();
        client.script([Err(ClientError::Connection {
            reason: "refused".into(),
        })]);

        assert_eq!(sup.start().await, Ok(false));
        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Started { .. })).await;
        assert_eq!(seen.last(), Some(&SupervisorEvent::Started { connected: false }));

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.connects(), 1);
        assert_eq!(sup.state().await, Ok(ConnectionState::Idle));

        assert_eq!(sup.start().await, Ok(true));
        assert_eq!(client.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_forces_teardown() {
        let (client, sup) = setup(MockClient::new(), config(1, 5, Some(2)));
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        client.script((0..5).map(|_| Err(ClientError::Closed)));
        client.drop_connection();

        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Stopped(_))).await;
        let err = SupervisorError::BackoffExhausted { attempts: 2 };
        let retries = seen
            .iter()
            .filter(|e| matches!(e, SupervisorEvent::Retry(_)))
            .count();
        assert_eq!(retries, 2);
        assert!(seen.contains(&SupervisorEvent::Error(err.clone())));
        assert!(seen.contains(&SupervisorEvent::Stopping(Some(err.clone()))));
        assert_eq!(seen.last(), Some(&SupervisorEvent::Stopped(Some(err))));
        assert_eq!(client.disconnects(), 1);

        // a stop after the forced teardown resolves at once
        assert_eq!(
            time::timeout(Duration::from_millis(1), sup.stop()).await,
            Ok(Ok(()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_retry() {
        let (client, sup) = setup(MockClient::new(), config(5, 30, None));
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        client.drop_connection();
        collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Wait(_))).await;

        sup.stop().await.unwrap();
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(client.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_during_stop_waits_for_teardown() {
        let (client, sup) = setup(
            MockClient::new().with_disconnect_delay(Duration::from_millis(100)),
            SupervisorConfig::default(),
        );
        sup.start().await.unwrap();

        let stopper = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.stop().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(sup.start().await, Ok(true));
        assert_eq!(stopper.await.unwrap(), Ok(()));
        assert_eq!(client.disconnects(), 1);
        assert_eq!(client.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_initial_connect_tears_down_late_session() {
        let (client, sup) = setup(
            MockClient::new().with_connect_delay(Duration::from_millis(100)),
            SupervisorConfig::default(),
        );
        let mut rx = sup.subscribe();
        let starter = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start().await })
        };

        time::sleep(Duration::from_millis(10)).await;
        let began = Instant::now();
        sup.stop().await.unwrap();
        assert!(Instant::now() - began >= Duration::from_millis(90), "stop waits for the connect");
        assert!(!client.is_connected());

        assert_eq!(starter.await.unwrap(), Ok(false));
        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Stopped(_))).await;
        assert!(seen.contains(&SupervisorEvent::Started { connected: false }));

        time::sleep(Duration::from_secs(1)).await;
        assert!(!client.is_connected());
        assert_eq!(client.disconnects(), 1);
        assert_eq!(sup.state().await, Ok(ConnectionState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_retry_tears_down_late_session() {
        let (client, sup) = setup(
            MockClient::new().with_connect_delay(Duration::from_millis(100)),
            config(1, 5, None),
        );
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        client.drop_connection();
        collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Retry(_))).await;

        sup.stop().await.unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert!(!client.is_connected());
        assert_eq!(client.connects(), 2);
        assert_eq!(sup.state().await, Ok(ConnectionState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_disconnect_still_schedules_retry() {
        let (client, sup) = setup(MockClient::new(), config(1, 5, None));
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Ready)).await;

        // the session dies unannounced while the client ring overflows
        client.sever();
        for _ in 0..300 {
            client.emit(ClientEvent::Message(crate::client::Message::parse("0AZC001200")));
        }

        let seen = collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Wait(_))).await;
        assert!(seen.contains(&SupervisorEvent::Lagged { skipped: 44 }));
        collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Ready)).await;
        assert!(client.is_connected());
        assert_eq!(client.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_is_relayed() {
        let (client, sup) = setup(MockClient::new(), SupervisorConfig::default());
        let mut rx = sup.subscribe();
        sup.start().await.unwrap();
        collect_until(&mut rx, |e| matches!(e, SupervisorEvent::Ready)).await;

        let msg = crate::client::Message::parse("0AZC001200");
        client.emit(ClientEvent::Message(msg.clone()));
        client.emit(ClientEvent::Ok);
        client.emit(ClientEvent::Error(ClientError::Authentication));

        assert_eq!(next_event(&mut rx).await, SupervisorEvent::Message(msg));
        assert_eq!(next_event(&mut rx).await, SupervisorEvent::Ok);
        assert_eq!(
            next_event(&mut rx).await,
            SupervisorEvent::ClientError(ClientError::Authentication)
        );
        assert_eq!(sup.state().await, Ok(ConnectionState::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_handle() {
        let (client, sup) = setup(MockClient::new(), SupervisorConfig::default());
        sup.start().await.unwrap();
        sup.shutdown();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sup.start().await, Err(SupervisorError::Closed));
        assert_eq!(client.disconnects(), 1);
    }
}

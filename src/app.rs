//! # Application context: one supervisor, one recorder, their subscribers.
//!
//! [`AppContext`] replaces process-wide singletons. It owns both component
//! handles and a listener task that merges their event buses into the
//! [`SubscriberSet`]:
//!
//! ```text
//! Client ──► Supervisor ──► Bus<SupervisorEvent> ──┬──► MessageRecorder ──► Bus<RecorderEvent>
//!                                                  │                              │
//!                                                  └────────► listener ◄──────────┘
//!                                                               │  └─ Error(fatal) ──► fatal()
//!                                                               ▼
//!                                                         SubscriberSet
//! ```
//!
//! ## Lifecycle
//! - `startup()`: `recorder.init()` then `supervisor.start()`;
//! - `fatal()`: resolves when the supervisor reports a fatal error (backoff exhausted);
//! - `shutdown()`: `supervisor.stop()` then `recorder.close()`, then the loops
//!   end and subscribers drain their queues.

use std::sync::Arc;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::Client;
use crate::config::{RecorderConfig, SupervisorConfig};
use crate::core::{MessageRecorder, Supervisor};
use crate::error::{AppError, SupervisorError};
use crate::events::{AppEvent, Event, RecorderEvent, SupervisorEvent};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Wired supervisor and recorder.
pub struct AppContext {
    supervisor: Supervisor,
    recorder: MessageRecorder,
    fatal: watch::Receiver<Option<SupervisorError>>,
    token: CancellationToken,
    listener: JoinHandle<SubscriberSet>,
}

impl AppContext {
    /// Wires existing handles. Subscriptions are taken here, so nothing
    /// emitted after this call is missed.
    pub fn new(
        supervisor: Supervisor,
        recorder: MessageRecorder,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let token = CancellationToken::new();
        let (fatal_tx, fatal) = watch::channel(None);
        let listener = tokio::spawn(listen(
            supervisor.subscribe(),
            recorder.subscribe(),
            SubscriberSet::new(subscribers),
            fatal_tx,
            token.clone(),
        ));

        Self {
            supervisor,
            recorder,
            fatal,
            token,
            listener,
        }
    }

    /// Builds the supervisor around `client` and a recorder fed by it.
    pub async fn build(
        client: Arc<dyn Client>,
        supervisor_cfg: &SupervisorConfig,
        recorder_cfg: &RecorderConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Result<Self, AppError> {
        let supervisor = Supervisor::new(client, supervisor_cfg);
        let recorder = match MessageRecorder::open(supervisor.subscribe(), recorder_cfg).await {
            Ok(r) => r,
            Err(e) => {
                supervisor.shutdown();
                return Err(e.into());
            }
        };
        Ok(Self::new(supervisor, recorder, subscribers))
    }

    /// Prepares the store, then starts the connection.
    ///
    /// Returns whether the initial connect succeeded.
    pub async fn startup(&self) -> Result<bool, AppError> {
        let created = self.recorder.init().await?;
        if created {
            info!("message table created");
        }
        Ok(self.supervisor.start().await?)
    }

    /// Resolves with the first fatal supervisor error.
    ///
    /// Pends forever if none occurs (or the listener is gone).
    pub async fn fatal(&mut self) -> SupervisorError {
        loop {
            if let Some(err) = self.fatal.borrow_and_update().clone() {
                return err;
            }
            if self.fatal.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn recorder(&self) -> &MessageRecorder {
        &self.recorder
    }

    /// Stops the connection, closes the recorder and drains subscribers.
    ///
    /// Both steps always run; the first error is returned.
    pub async fn shutdown(self) -> Result<(), AppError> {
        let stopped = self.supervisor.stop().await;
        let closed = self.recorder.close().await;
        self.supervisor.shutdown();

        self.token.cancel();
        match self.listener.await {
            Ok(set) => set.shutdown().await,
            Err(e) => warn!(error = %e, "event listener ended abnormally"),
        }

        stopped?;
        closed?;
        Ok(())
    }
}

async fn listen(
    mut sup_rx: broadcast::Receiver<Event<SupervisorEvent>>,
    mut rec_rx: broadcast::Receiver<Event<RecorderEvent>>,
    set: SubscriberSet,
    fatal: watch::Sender<Option<SupervisorError>>,
    token: CancellationToken,
) -> SubscriberSet {
    let forward_sup = |ev: Event<SupervisorEvent>| {
        if let SupervisorEvent::Error(err) = &ev.kind {
            if err.is_fatal() {
                fatal.send_if_modified(|slot| {
                    let first = slot.is_none();
                    if first {
                        *slot = Some(err.clone());
                    }
                    first
                });
            }
        }
        set.emit(&ev.map(AppEvent::Supervisor));
    };
    let forward_rec = |ev: Event<RecorderEvent>| set.emit(&ev.map(AppEvent::Recorder));

    let mut sup_open = true;
    let mut rec_open = true;
    while sup_open || rec_open {
        tokio::select! {
            _ = token.cancelled() => break,
            ev = sup_rx.recv(), if sup_open => match ev {
                Ok(ev) => forward_sup(ev),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "listener lagged behind supervisor events"),
                Err(RecvError::Closed) => sup_open = false,
            },
            ev = rec_rx.recv(), if rec_open => match ev {
                Ok(ev) => forward_rec(ev),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "listener lagged behind recorder events"),
                Err(RecvError::Closed) => rec_open = false,
            },
        }
    }

    // Events published before cancellation still reach subscribers.
    loop {
        match sup_rx.try_recv() {
            Ok(ev) => forward_sup(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    loop {
        match rec_rx.try_recv() {
            Ok(ev) => forward_rec(ev),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time;

    use crate::client::mock::MockClient;
    use crate::client::{ClientEvent, Message};
    use crate::error::ClientError;
    use crate::policies::{BackoffPolicy, JitterPolicy};
    use crate::store::memory::MemoryStore;

    #[derive(Default)]
    struct Labels(Mutex<Vec<String>>);

    #[async_trait]
    impl Subscribe for Labels {
        async fn on_event(&self, ev: &Event<AppEvent>) {
            let label = match &ev.kind {
                AppEvent::Supervisor(k) => format!("sup:{}", k.as_label()),
                AppEvent::Recorder(k) => format!("rec:{}", k.as_label()),
            };
            self.0.lock().unwrap().push(label);
        }
    }

    fn wire(
        client: MockClient,
        cfg: SupervisorConfig,
    ) -> (Arc<MockClient>, Arc<MemoryStore>, Arc<Labels>, AppContext) {
        let client = Arc::new(client);
        let store = Arc::new(MemoryStore::new());
        let labels = Arc::new(Labels::default());
        let supervisor = Supervisor::new(client.clone(), &cfg);
        let recorder = MessageRecorder::new(
            supervisor.subscribe(),
            store.clone(),
            &RecorderConfig::default(),
        );
        let app = AppContext::new(supervisor, recorder, vec![labels.clone()]);
        (client, store, labels, app)
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_traffic_and_shutdown() {
        let (client, store, labels, app) = wire(MockClient::new(), SupervisorConfig::default());

        assert!(app.startup().await.unwrap());
        let mut rx = app.recorder().subscribe();
        client.emit(ClientEvent::Message(Message::parse("0AZC001000D0")));
        client.emit(ClientEvent::Ok);
        loop {
            if rx.recv().await.unwrap().kind == RecorderEvent::Ok {
                break;
            }
        }

        app.shutdown().await.unwrap();
        assert_eq!(client.disconnects(), 1);
        assert_eq!(store.payloads(), vec![vec!["0AZC001000D0", "OK"]]);

        let seen = labels.0.lock().unwrap().clone();
        for want in ["rec:init", "rec:schema", "sup:starting", "sup:ready", "sup:stopped", "rec:flush", "rec:closed"] {
            assert!(seen.iter().any(|l| l == want), "missing {want} in {seen:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_backoff_is_fatal() {
        let cfg = SupervisorConfig {
            backoff: BackoffPolicy {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(5),
                jitter: JitterPolicy::None,
                max_attempts: Some(2),
            },
            ..SupervisorConfig::default()
        };
        let client = MockClient::new();
        let (client, _store, _labels, mut app) = wire(client, cfg);

        assert!(app.startup().await.unwrap());
        let refused = || Err(ClientError::Connection { reason: "refused".into() });
        client.script([refused(), refused(), refused()]);
        client.drop_connection();

        let err = time::timeout(Duration::from_secs(600), app.fatal())
            .await
            .expect("fatal error reported");
        assert_eq!(err, SupervisorError::BackoffExhausted { attempts: 2 });
        app.shutdown().await.unwrap();
    }
}

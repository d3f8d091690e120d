//! # Plain TCP panel client.
//!
//! Line-framed transport over [`tokio::net::TcpStream`]:
//! - optional login: username and password lines are written right after the
//!   socket opens, then lines are read until the panel confirms or rejects;
//! - `OK` lines become [`ClientEvent::Ok`], everything else [`ClientEvent::Message`];
//! - a reader task owns the read half and reports `Disconnected` on EOF/error.
//!
//! ```text
//! connect() ─► TcpStream::connect ─► [login] ─► Ready ─► reader task
//!                                                          ├─ "OK"     → Ok
//!                                                          ├─ line     → Message
//!                                                          └─ EOF/err  → Disconnected(Some(err))
//! disconnect() ─► cancel reader ─► shutdown write half ─► Disconnected(None)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{Client, ClientEvent, Message};
use crate::config::{ClientConfig, Credentials};
use crate::error::ClientError;
use crate::events::{Bus, Event};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Established session: write half plus the reader task that owns the read half.
struct Session {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    cancel: CancellationToken,
}

/// [`Client`] over a plain TCP socket.
pub struct TcpClient {
    cfg: ClientConfig,
    bus: Bus<ClientEvent>,
    connected: Arc<AtomicBool>,
    session: Mutex<Option<Session>>,
    /// Serializes connect and disconnect, so a disconnect issued mid-dial
    /// tears down the session that dial produces.
    lifecycle: Mutex<()>,
}

impl TcpClient {
    /// Creates an idle client; nothing is dialed until [`Client::connect`].
    pub fn new(cfg: ClientConfig) -> Self {
        Self {
            cfg,
            bus: Bus::new(1024),
            connected: Arc::new(AtomicBool::new(false)),
            session: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    async fn dial(&self) -> Result<TcpStream, ClientError> {
        let transport = &self.cfg.transport;
        if transport.secure {
            return Err(ClientError::TlsUnsupported);
        }
        let host = transport.host.as_deref().ok_or(ClientError::MissingHost)?;
        let port = transport.effective_port();

        debug!(host, port, "dialing panel");
        match time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(res) => res.map_err(ClientError::io),
            Err(_) => Err(ClientError::Connection {
                reason: format!("connect timed out after {CONNECT_TIMEOUT:?}"),
            }),
        }
    }

    /// Drops a session whose reader already observed EOF.
    async fn discard_stale(&self) {
        if let Some(stale) = self.session.lock().await.take() {
            stale.cancel.cancel();
            let _ = stale.reader.await;
        }
    }
}

async fn login(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    creds: &Credentials,
) -> Result<(), ClientError> {
    writer
        .write_all(format!("{}\r\n{}\r\n", creds.user, creds.password).as_bytes())
        .await
        .map_err(ClientError::io)?;

    let confirm = async {
        loop {
            let line = lines.next_line().await.map_err(ClientError::io)?;
            let Some(line) = line else {
                return Err(ClientError::Closed);
            };
            let lower = line.to_ascii_lowercase();
            if lower.contains("login successful") {
                return Ok(());
            }
            if lower.contains("incorrect") || lower.contains("failed") {
                return Err(ClientError::Authentication);
            }
        }
    };

    time::timeout(LOGIN_TIMEOUT, confirm)
        .await
        .map_err(|_| ClientError::Connection {
            reason: format!("login timed out after {LOGIN_TIMEOUT:?}"),
        })?
}

async fn read_loop(
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    bus: Bus<ClientEvent>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let cause = loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = lines.next_line() => match next {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if line == "OK" {
                        bus.emit(ClientEvent::Ok);
                    } else {
                        bus.emit(ClientEvent::Message(Message::parse(line)));
                    }
                }
                Ok(None) => break ClientError::Closed,
                Err(e) => break ClientError::io(e),
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    info!(error = %cause, "panel connection lost");
    bus.emit(ClientEvent::Disconnected(Some(cause)));
}

#[async_trait]
impl Client for TcpClient {
    async fn connect(&self) -> Result<(), ClientError> {
        let _op = self.lifecycle.lock().await;
        if self.is_connected() {
            return Ok(());
        }
        self.discard_stale().await;

        let stream = self.dial().await?;
        let (read_half, mut writer) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        if let Some(creds) = &self.cfg.credentials {
            login(&mut lines, &mut writer, creds).await?;
        }

        let cancel = CancellationToken::new();
        self.connected.store(true, Ordering::SeqCst);
        self.bus.emit(ClientEvent::Ready);

        let reader = tokio::spawn(read_loop(
            lines,
            self.bus.clone(),
            Arc::clone(&self.connected),
            cancel.clone(),
        ));
        *self.session.lock().await = Some(Session {
            writer,
            reader,
            cancel,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let _op = self.lifecycle.lock().await;
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };
        session.cancel.cancel();
        let _ = session.reader.await;
        let _ = session.writer.shutdown().await;

        if self.connected.swap(false, Ordering::SeqCst) {
            self.bus.emit(ClientEvent::Disconnected(None));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<Event<ClientEvent>> {
        self.bus.subscribe()
    }
}

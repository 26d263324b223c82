//! The WebSocket session client: login handshake, command multiplexing,
//! and per-channel event routing.

use super::protocol::{GatewayCommand, GatewayEvent, GroupSnapshot, WireStatus};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tether_core::client::{Connection, JoinedChannel, Session, SessionClient};
use tether_core::connection::{ChannelRef, ConnectionEvent, GroupRef};
use tether_core::error::ClientError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Event senders for currently joined channels, keyed by channel id.
type Subscribers = Arc<Mutex<HashMap<String, mpsc::Sender<ConnectionEvent>>>>;

/// These mutexes only guard map inserts and removes, so the data is
/// consistent even when a panicking holder poisoned the lock.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Session client that speaks the tether gateway protocol over a WebSocket.
pub struct GatewayClient {
    url: String,
}

impl GatewayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SessionClient for GatewayClient {
    async fn login(&self, token: &str) -> Result<Arc<dyn Session>, ClientError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", token)
                .parse()
                .map_err(|_| ClientError::Login("credential is not header-safe".to_string()))?,
        );

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let identify = GatewayCommand::Identify {
            token: token.to_string(),
        };
        let frame = serde_json::to_string(&identify)
            .map_err(|e| ClientError::Gateway(e.to_string()))?;
        ws_tx
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let (session_id, groups) = await_ready(&mut ws_rx).await?;
        info!(%session_id, groups = groups.len(), "Gateway session established");

        let (cmd_tx, cmd_rx) = mpsc::channel::<GatewayCommand>(32);
        let alive = Arc::new(AtomicBool::new(true));
        let subscribers: Subscribers = Arc::new(Mutex::new(HashMap::new()));

        let io_task = tokio::spawn(run_io(
            ws_tx,
            ws_rx,
            cmd_rx,
            alive.clone(),
            subscribers.clone(),
        ));

        Ok(Arc::new(GatewaySession {
            groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
            cmd_tx,
            alive,
            subscribers,
            io_task: Mutex::new(Some(io_task)),
        }))
    }
}

/// Reads frames until the gateway acknowledges the identify with `Ready`.
async fn await_ready(
    ws_rx: &mut WsSource,
) -> Result<(String, Vec<GroupSnapshot>), ClientError> {
    loop {
        match ws_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                match serde_json::from_str::<GatewayEvent>(&text) {
                    Ok(GatewayEvent::Ready { session_id, groups }) => {
                        return Ok((session_id, groups));
                    }
                    Ok(GatewayEvent::Closed { code, reason }) => {
                        return Err(ClientError::Login(format!(
                            "gateway refused identify ({}): {}",
                            code, reason
                        )));
                    }
                    Ok(other) => debug!(?other, "Ignoring pre-ready gateway event"),
                    Err(e) => return Err(ClientError::Gateway(e.to_string())),
                }
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ClientError::Transport(e.to_string())),
            None => {
                return Err(ClientError::Login(
                    "gateway closed before ready".to_string(),
                ));
            }
        }
    }
}

/// Owns the socket after login: multiplexes outbound commands and routes
/// inbound channel events to the matching subscriber.
async fn run_io(
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    mut cmd_rx: mpsc::Receiver<GatewayCommand>,
    alive: Arc<AtomicBool>,
    subscribers: Subscribers,
) {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => match serde_json::to_string(&cmd) {
                    Ok(frame) => {
                        if let Err(e) = ws_tx.send(WsMessage::Text(frame.into())).await {
                            warn!(error = %e, "Gateway send failed");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode gateway command"),
                },
                // The session was dropped; nothing left to serve.
                None => break,
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<GatewayEvent>(&text) {
                        Ok(event) => {
                            if !dispatch(event, &subscribers).await {
                                break;
                            }
                        }
                        Err(e) => debug!(error = %e, "Ignoring unparseable gateway frame"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    warn!("Gateway socket closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Gateway read failed");
                    break;
                }
            },
        }
    }

    alive.store(false, Ordering::SeqCst);
    // Dropping the senders closes every joined channel's event stream, so
    // the supervisor observes the session loss promptly.
    lock_unpoisoned(&subscribers).clear();
}

/// Routes one inbound event. Returns `false` when the session is over.
async fn dispatch(event: GatewayEvent, subscribers: &Subscribers) -> bool {
    match event {
        GatewayEvent::ChannelState {
            channel_id,
            old,
            new,
        } => {
            let tx = lock_unpoisoned(subscribers).get(&channel_id).cloned();
            if let Some(tx) = tx {
                let _ = tx
                    .send(ConnectionEvent::StatusChange {
                        old: old.into(),
                        new: new.into(),
                    })
                    .await;
                if new == WireStatus::Destroyed {
                    lock_unpoisoned(subscribers).remove(&channel_id);
                }
            }
            true
        }
        GatewayEvent::ChannelError {
            channel_id,
            message,
        } => {
            let tx = lock_unpoisoned(subscribers).get(&channel_id).cloned();
            if let Some(tx) = tx {
                let _ = tx.send(ConnectionEvent::Error(message)).await;
            }
            true
        }
        GatewayEvent::Closed { code, reason } => {
            warn!(code, %reason, "Gateway closed the session");
            false
        }
        GatewayEvent::Ready { .. } => {
            debug!("Ignoring duplicate ready event");
            true
        }
    }
}

struct GatewaySession {
    groups: HashMap<String, GroupSnapshot>,
    cmd_tx: mpsc::Sender<GatewayCommand>,
    alive: Arc<AtomicBool>,
    subscribers: Subscribers,
    io_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Session for GatewaySession {
    fn lookup_group(&self, group_id: &str) -> Option<GroupRef> {
        self.groups.get(group_id).map(|g| GroupRef {
            id: g.id.clone(),
            name: g.name.clone(),
        })
    }

    fn lookup_channel(&self, group: &GroupRef, channel_id: &str) -> Option<ChannelRef> {
        self.groups
            .get(&group.id)?
            .channels
            .iter()
            .find(|c| c.id == channel_id)
            .map(|c| ChannelRef {
                id: c.id.clone(),
                name: c.name.clone(),
            })
    }

    async fn join(&self, channel: &ChannelRef) -> Result<JoinedChannel, ClientError> {
        let (tx, rx) = mpsc::channel(64);
        lock_unpoisoned(&self.subscribers).insert(channel.id.clone(), tx);

        self.cmd_tx
            .send(GatewayCommand::Join {
                channel_id: channel.id.clone(),
            })
            .await
            .map_err(|_| ClientError::Join("gateway session is closed".to_string()))?;

        Ok(JoinedChannel {
            handle: Box::new(GatewayConnection {
                channel_id: channel.id.clone(),
                cmd_tx: self.cmd_tx.clone(),
                destroyed: AtomicBool::new(false),
            }),
            events: rx,
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn destroy(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(task) = lock_unpoisoned(&self.io_task).take() {
            task.abort();
        }
        lock_unpoisoned(&self.subscribers).clear();
    }
}

struct GatewayConnection {
    channel_id: String,
    cmd_tx: mpsc::Sender<GatewayCommand>,
    destroyed: AtomicBool,
}

impl Connection for GatewayConnection {
    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Best effort: the session may already be gone, which is fine.
        let _ = self.cmd_tx.try_send(GatewayCommand::Leave {
            channel_id: self.channel_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::ChannelSnapshot;

    fn snapshot_session(cmd_tx: mpsc::Sender<GatewayCommand>) -> GatewaySession {
        let groups = vec![GroupSnapshot {
            id: "group-1".to_string(),
            name: "Ops".to_string(),
            channels: vec![ChannelSnapshot {
                id: "channel-1".to_string(),
                name: "Radio".to_string(),
            }],
        }];
        GatewaySession {
            groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
            cmd_tx,
            alive: Arc::new(AtomicBool::new(true)),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            io_task: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn lookups_resolve_against_the_ready_snapshot() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let session = snapshot_session(cmd_tx);

        let group = session.lookup_group("group-1").expect("group should exist");
        assert_eq!(group.name, "Ops");
        assert!(session.lookup_group("group-2").is_none());

        let channel = session
            .lookup_channel(&group, "channel-1")
            .expect("channel should exist");
        assert_eq!(channel.name, "Radio");
        assert!(session.lookup_channel(&group, "channel-2").is_none());
    }

    #[tokio::test]
    async fn join_registers_a_subscriber_and_sends_the_command() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let session = snapshot_session(cmd_tx);
        let channel = ChannelRef {
            id: "channel-1".to_string(),
            name: "Radio".to_string(),
        };

        let joined = session.join(&channel).await.expect("join should succeed");
        assert!(matches!(
            cmd_rx.recv().await,
            Some(GatewayCommand::Join { channel_id }) if channel_id == "channel-1"
        ));

        // Events routed to the channel id reach the joined handle.
        let tx = session
            .subscribers
            .lock()
            .unwrap()
            .get("channel-1")
            .cloned()
            .expect("subscriber registered");
        tx.send(ConnectionEvent::Error("boom".to_string()))
            .await
            .unwrap();
        drop(tx);

        let mut events = joined.events;
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Error(message)) if message == "boom"
        ));
    }

    #[tokio::test]
    async fn connection_destroy_sends_leave_exactly_once() {
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let conn = GatewayConnection {
            channel_id: "channel-1".to_string(),
            cmd_tx,
            destroyed: AtomicBool::new(false),
        };

        conn.destroy();
        conn.destroy();

        assert!(matches!(
            cmd_rx.recv().await,
            Some(GatewayCommand::Leave { channel_id }) if channel_id == "channel-1"
        ));
        assert!(cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn destroy_survives_a_poisoned_subscriber_map() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let session = snapshot_session(cmd_tx);

        let subscribers = session.subscribers.clone();
        std::thread::spawn(move || {
            let _guard = subscribers.lock().unwrap();
            panic!("poison the lock");
        })
        .join()
        .unwrap_err();

        // Teardown must not propagate the poison.
        session.destroy().await;
        assert!(!session.is_alive());
        assert!(lock_unpoisoned(&session.subscribers).is_empty());
    }

    #[tokio::test]
    async fn destroy_swallows_a_closed_session() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(cmd_rx);
        let conn = GatewayConnection {
            channel_id: "channel-1".to_string(),
            cmd_tx,
            destroyed: AtomicBool::new(false),
        };

        // Must not panic or surface the send failure.
        conn.destroy();
    }
}

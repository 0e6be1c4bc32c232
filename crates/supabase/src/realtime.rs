//! Realtime websocket client.
//!
//! One socket per client is shared by every channel. A background session
//! task owns the socket: it joins and leaves channels on request, answers
//! pings, sends heartbeats and dispatches `postgres_changes` frames to the
//! channel callbacks. When the socket dies every open channel receives
//! `ConnectionLost`; the next join opens a fresh socket.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use uuid::Uuid;

use clientdesk_core::sync::{Domain, FeedCallback, FeedSignal, RowFilter};

use crate::config::SupabaseConfig;
use crate::error::{Result, SupabaseError};
use crate::protocol::{
    decode_postgres_change, PhoenixMessage, EVENT_CLOSE, EVENT_ERROR, EVENT_POSTGRES_CHANGES,
    EVENT_SYSTEM, PHOENIX_TOPIC,
};

pub(crate) enum Command {
    Join {
        topic: String,
        domain: Domain,
        filter: RowFilter,
        callback: FeedCallback,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        topic: String,
    },
}

struct Channel {
    domain: Domain,
    callback: FeedCallback,
}

/// Channel bookkeeping of one socket, independent of the transport.
struct Session {
    schema: String,
    access_token: String,
    channels: HashMap<String, Channel>,
    pending_joins: HashMap<String, (String, oneshot::Sender<Result<()>>)>,
    pending_heartbeat: Option<String>,
    next_ref: u64,
}

impl Session {
    fn new(schema: String, access_token: String) -> Self {
        Self {
            schema,
            access_token,
            channels: HashMap::new(),
            pending_joins: HashMap::new(),
            pending_heartbeat: None,
            next_ref: 0,
        }
    }

    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn handle_command(&mut self, command: Command) -> Option<PhoenixMessage> {
        match command {
            Command::Join {
                topic,
                domain,
                filter,
                callback,
                reply,
            } => {
                let msg_ref = self.next_ref();
                let frame = PhoenixMessage::join(
                    &topic,
                    &msg_ref,
                    &self.schema,
                    domain.table(),
                    &filter,
                    &self.access_token,
                );
                debug!("Joining {} ({} {})", topic, domain, filter);
                self.channels.insert(topic.clone(), Channel { domain, callback });
                self.pending_joins.insert(msg_ref, (topic, reply));
                Some(frame)
            }
            Command::Leave { topic } => {
                self.channels.remove(&topic)?;
                self.pending_joins.retain(|_, (t, _)| *t != topic);
                debug!("Leaving {}", topic);
                let msg_ref = self.next_ref();
                Some(PhoenixMessage::leave(&topic, &msg_ref))
            }
        }
    }

    /// Returns the next heartbeat frame, or `None` when the previous one was
    /// never acknowledged.
    fn heartbeat(&mut self) -> Option<PhoenixMessage> {
        if self.pending_heartbeat.is_some() {
            return None;
        }
        let msg_ref = self.next_ref();
        self.pending_heartbeat = Some(msg_ref.clone());
        Some(PhoenixMessage::heartbeat(&msg_ref))
    }

    fn handle_frame(&mut self, frame: PhoenixMessage) {
        if let Some(status) = frame.reply_status() {
            self.handle_reply(frame, status);
            return;
        }
        match frame.event.as_str() {
            EVENT_POSTGRES_CHANGES => {
                if let Some(channel) = self.channels.get(&frame.topic) {
                    let event = decode_postgres_change(channel.domain, &frame.payload);
                    (channel.callback)(FeedSignal::Change(event));
                }
            }
            EVENT_ERROR | EVENT_CLOSE => {
                self.close_channel(&frame.topic, &format!("channel {}", frame.event));
            }
            EVENT_SYSTEM => {
                let status = frame.payload.get("status").and_then(|s| s.as_str());
                let message = frame
                    .payload
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                if status == Some("error") {
                    self.close_channel(&frame.topic, message);
                } else {
                    debug!("System message on {}: {}", frame.topic, message);
                }
            }
            other => debug!("Ignoring {} on {}", other, frame.topic),
        }
    }

    fn handle_reply(&mut self, frame: PhoenixMessage, status: std::result::Result<(), String>) {
        let msg_ref = frame.msg_ref.unwrap_or_default();
        if frame.topic == PHOENIX_TOPIC {
            if self.pending_heartbeat.as_deref() == Some(msg_ref.as_str()) {
                self.pending_heartbeat = None;
            }
            return;
        }
        let Some((topic, reply)) = self.pending_joins.remove(&msg_ref) else {
            return;
        };
        match status {
            Ok(()) => {
                info!("Joined {}", topic);
                let _ = reply.send(Ok(()));
            }
            Err(reason) => {
                warn!("Join of {} rejected: {}", topic, reason);
                self.channels.remove(&topic);
                let _ = reply.send(Err(SupabaseError::JoinRejected(reason)));
            }
        }
    }

    fn close_channel(&mut self, topic: &str, reason: &str) {
        // Dropping the reply sender fails the pending join.
        self.pending_joins.retain(|_, (t, _)| t.as_str() != topic);
        if let Some(channel) = self.channels.remove(topic) {
            warn!("Channel {} closed: {}", topic, reason);
            (channel.callback)(FeedSignal::ConnectionLost(reason.to_string()));
        }
    }

    /// Fails pending joins and notifies every channel that the socket is gone.
    fn fail_all(&mut self, reason: &str) {
        for (_, (_, reply)) in self.pending_joins.drain() {
            let _ = reply.send(Err(SupabaseError::websocket(reason)));
        }
        for (topic, channel) in self.channels.drain() {
            debug!("Notifying {} of lost connection", topic);
            (channel.callback)(FeedSignal::ConnectionLost(reason.to_string()));
        }
    }
}

async fn send_frame<S>(sink: &mut S, frame: &PhoenixMessage) -> std::result::Result<(), String>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let text = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    sink.send(Message::Text(text)).await.map_err(|e| e.to_string())
}

/// Drives one socket until it closes, then fans out `ConnectionLost`.
async fn run_session<S, R>(
    mut sink: S,
    mut stream: R,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut session: Session,
    heartbeat: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        let step: std::result::Result<(), String> = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => match session.handle_command(command) {
                    Some(frame) => send_frame(&mut sink, &frame).await,
                    None => Ok(()),
                },
                None => {
                    let _ = sink.close().await;
                    Err("realtime client closed".to_string())
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<PhoenixMessage>(&text) {
                        Ok(frame) => session.handle_frame(frame),
                        Err(e) => warn!("Ignoring malformed realtime frame: {}", e),
                    }
                    Ok(())
                }
                Some(Ok(Message::Ping(data))) => {
                    sink.send(Message::Pong(data)).await.map_err(|e| e.to_string())
                }
                Some(Ok(Message::Close(frame))) => Err(frame
                    .map(|f| format!("socket closed by server: {}", f.reason))
                    .unwrap_or_else(|| "socket closed by server".to_string())),
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => Err(e.to_string()),
                None => Err("socket closed".to_string()),
            },
            _ = ticker.tick() => match session.heartbeat() {
                Some(frame) => send_frame(&mut sink, &frame).await,
                None => Err("heartbeat timed out".to_string()),
            },
        };
        if let Err(reason) = step {
            break reason;
        }
    };

    warn!("Realtime session ended: {}", reason);
    session.fail_all(&reason);
}

/// Shared Realtime connection.
pub struct RealtimeClient {
    config: SupabaseConfig,
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    connecting: tokio::sync::Mutex<()>,
}

impl RealtimeClient {
    pub fn new(config: SupabaseConfig) -> Self {
        Self {
            config,
            commands: Mutex::new(None),
            connecting: tokio::sync::Mutex::new(()),
        }
    }

    fn commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn live_sender(&self) -> Option<mpsc::UnboundedSender<Command>> {
        self.commands().as_ref().filter(|tx| !tx.is_closed()).cloned()
    }

    /// True while a socket session is running.
    pub fn is_connected(&self) -> bool {
        self.live_sender().is_some()
    }

    /// Starts a session task over an already-open transport.
    fn attach<S, R>(&self, sink: S, stream: R) -> mpsc::UnboundedSender<Command>
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = std::result::Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(self.config.schema.clone(), self.config.api_key.clone());
        tokio::spawn(run_session(
            sink,
            stream,
            rx,
            session,
            self.config.heartbeat_interval,
        ));
        *self.commands() = Some(tx.clone());
        tx
    }

    async fn sender(&self) -> Result<mpsc::UnboundedSender<Command>> {
        if let Some(tx) = self.live_sender() {
            return Ok(tx);
        }
        let _guard = self.connecting.lock().await;
        if let Some(tx) = self.live_sender() {
            return Ok(tx);
        }

        info!("Connecting to realtime at {}", self.config.url);
        let connect = tokio_tungstenite::connect_async(self.config.realtime_url());
        let (socket, _) = timeout(self.config.request_timeout, connect)
            .await
            .map_err(|_| SupabaseError::websocket("connect timed out"))?
            .map_err(|e| {
                error!("Failed to connect to realtime: {}", e);
                SupabaseError::from(e)
            })?;
        let (sink, stream) = socket.split();
        Ok(self.attach(sink, stream))
    }

    /// Joins a new channel for row changes of `domain` and returns its topic.
    pub async fn join(
        &self,
        domain: Domain,
        filter: &RowFilter,
        callback: FeedCallback,
    ) -> Result<String> {
        let tx = self.sender().await?;
        let topic = format!("realtime:{}-{}", domain, Uuid::new_v4().simple());
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(Command::Join {
            topic: topic.clone(),
            domain,
            filter: filter.clone(),
            callback,
            reply: reply_tx,
        })
        .map_err(|_| SupabaseError::websocket("realtime session closed"))?;

        match timeout(self.config.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result.map(|()| topic),
            Ok(Err(_)) => Err(SupabaseError::websocket("channel closed before join reply")),
            Err(_) => {
                self.leave(&topic);
                Err(SupabaseError::websocket("join timed out"))
            }
        }
    }

    /// Leaves a channel. Unknown topics and closed sessions are ignored.
    pub fn leave(&self, topic: &str) {
        if let Some(tx) = self.live_sender() {
            let _ = tx.send(Command::Leave {
                topic: topic.to_string(),
            });
        }
    }

    /// Closes the socket; open channels receive `ConnectionLost`.
    pub fn disconnect(&self) {
        if self.commands().take().is_some() {
            info!("Disconnecting realtime");
        }
    }
}

//! WebSocket client for Twitch chat.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use super::message::{self, IrcMessage};
use super::{ChatError, ChatEvent, ChatSender};
use crate::auth::UserSession;

/// Capacity of the inbound event queue.
const EVENT_QUEUE_SIZE: usize = 128;

/// Capacity of the outbound line queue.
const OUTBOUND_QUEUE_SIZE: usize = 64;

/// How long Twitch gets to accept or refuse the login.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Connected Twitch chat session.
pub struct TwitchChat {
    /// Login the session is authenticated as.
    login: String,

    /// Raw IRC lines waiting to be written.
    outbound: mpsc::Sender<String>,

    /// Wakes the writer task for shutdown.
    shutdown: Arc<Notify>,

    /// Background task reading frames from the socket.
    reader_task: JoinHandle<()>,

    /// Background task writing frames to the socket.
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl TwitchChat {
    /// Connects to chat and logs in with the session's token.
    ///
    /// Waits until Twitch ends the login burst (`376`) before returning.
    /// Returns the client and the stream of inbound events, which starts
    /// with [`ChatEvent::Ready`] and ends when the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::LoginRejected`] if Twitch refuses the token,
    /// [`ChatError::LoginTimedOut`] if it never answers, and
    /// [`ChatError::Closed`] or a WebSocket error if the socket fails first.
    pub async fn connect(
        url: &str,
        session: &UserSession,
    ) -> Result<(Self, mpsc::Receiver<ChatEvent>), ChatError> {
        info!("Connecting to Twitch chat at {}...", url);

        let (socket, _response) = connect_async(url).await?;
        let (mut sink, mut stream) = socket.split();

        let login = session.login.to_lowercase();
        for line in handshake(&session.access_token, &login) {
            sink.send(Message::text(line)).await?;
        }
        debug!("Sent login handshake as {}", login);

        let backlog = tokio::time::timeout(LOGIN_TIMEOUT, wait_for_login(&mut stream))
            .await
            .map_err(|_| ChatError::LoginTimedOut(LOGIN_TIMEOUT))??;
        info!("Logged in to chat as {}", login);

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_SIZE);
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(EVENT_QUEUE_SIZE);
        event_tx
            .send(ChatEvent::Ready)
            .await
            .map_err(|_| ChatError::Closed)?;
        let shutdown = Arc::new(Notify::new());

        let writer_shutdown = Arc::clone(&shutdown);
        let writer_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    line = outbound_rx.recv() => {
                        let Some(line) = line else { break };
                        if let Err(e) = sink.send(Message::text(line)).await {
                            error!("Failed to write to chat: {}", e);
                            break;
                        }
                    }
                    () = writer_shutdown.notified() => break,
                }
            }

            if let Err(e) = sink.close().await {
                debug!("Error while closing chat socket: {}", e);
            }
        });

        let reader_outbound = outbound_tx.clone();
        let reader_login = login.clone();
        let reader_task = tokio::spawn(async move {
            for line in backlog {
                if !handle_line(&line, &reader_login, &reader_outbound, &event_tx).await {
                    return;
                }
            }

            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        for line in text.as_str().lines() {
                            if !handle_line(line, &reader_login, &reader_outbound, &event_tx).await {
                                return;
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        info!("Chat connection closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Chat connection error: {}", e);
                        break;
                    }
                }
            }
            debug!("Chat reader finished");
        });

        Ok((
            Self {
                login,
                outbound: outbound_tx,
                shutdown,
                reader_task,
                writer_task: Mutex::new(Some(writer_task)),
            },
            event_rx,
        ))
    }

    /// Closes the connection and waits for the socket to shut down.
    pub async fn stop(&self) {
        info!("Closing chat connection...");
        self.reader_task.abort();
        self.shutdown.notify_one();

        if let Some(writer) = self.writer_task.lock().await.take() {
            let _ = writer.await;
        }
    }

    async fn send_line(&self, line: String) -> Result<(), ChatError> {
        self.outbound.send(line).await.map_err(|_| ChatError::Closed)
    }
}

#[async_trait]
impl ChatSender for TwitchChat {
    async fn join_room(&self, channel: &str) -> Result<(), ChatError> {
        info!("Joining #{}", channel);
        self.send_line(message::join(channel)).await
    }

    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ChatError> {
        if text.chars().count() > message::MAX_MESSAGE_CHARS {
            warn!(
                "Message to #{} exceeds {} characters, truncating",
                channel,
                message::MAX_MESSAGE_CHARS
            );
        }
        self.send_line(message::privmsg(channel, text, reply_to)).await
    }
}

impl std::fmt::Debug for TwitchChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchChat")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Lines sent right after the socket opens.
fn handshake(access_token: &str, login: &str) -> [String; 3] {
    let token = access_token.trim_start_matches("oauth:");
    [
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_owned(),
        format!("PASS oauth:{token}"),
        format!("NICK {login}"),
    ]
}

/// Reads the login burst until `376`.
///
/// Returns the lines that still need regular handling: `PING`s seen while
/// waiting and anything that followed `376` in the same frame.
async fn wait_for_login<S>(stream: &mut S) -> Result<Vec<String>, ChatError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut backlog = Vec::new();

    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                debug!("Chat closed during login: {:?}", frame);
                return Err(ChatError::Closed);
            }
            _ => continue,
        };

        let mut lines = text.as_str().lines();
        while let Some(line) = lines.next() {
            let Some(irc) = IrcMessage::parse(line) else {
                continue;
            };

            match irc.command.as_str() {
                "376" => {
                    backlog.extend(lines.map(str::to_owned));
                    return Ok(backlog);
                }
                "NOTICE" => {
                    let text = irc.params.last().map_or("", String::as_str);
                    if is_login_failure(text) {
                        return Err(ChatError::LoginRejected(text.to_owned()));
                    }
                    info!("Notice: {}", text);
                }
                "PING" => backlog.push(line.to_owned()),
                _ => debug!("Login: {}", line),
            }
        }
    }

    Err(ChatError::Closed)
}

fn is_login_failure(notice: &str) -> bool {
    notice.contains("Login authentication failed") || notice.contains("Improperly formatted auth")
}

/// Processes one inbound line. Returns `false` once the event receiver is gone.
async fn handle_line(
    line: &str,
    login: &str,
    outbound: &mpsc::Sender<String>,
    events: &mpsc::Sender<ChatEvent>,
) -> bool {
    let Some(irc) = IrcMessage::parse(line) else {
        return true;
    };

    match irc.command.as_str() {
        "PING" => {
            let server = irc.params.first().map_or("tmi.twitch.tv", String::as_str);
            if outbound.send(format!("PONG :{server}")).await.is_err() {
                warn!("Could not answer PING, writer is gone");
            }
            return true;
        }
        "NOTICE" => {
            let text = irc.params.last().map_or("", String::as_str);
            if is_login_failure(text) {
                error!("Chat login rejected: {}", text);
            } else {
                info!("Notice: {}", text);
            }
            return true;
        }
        "RECONNECT" => {
            warn!("Twitch requested a reconnect; the connection will close soon");
            return true;
        }
        "CAP" => {
            debug!("Capabilities: {}", irc.params.join(" "));
            return true;
        }
        _ => {}
    }

    match ChatEvent::from_irc(&irc, login) {
        Some(event) => events.send(event).await.is_ok(),
        None => true,
    }
}

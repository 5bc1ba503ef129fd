//! Host event loop.
//!
//! One task owns the [`HostSession`]. It multiplexes user commands, incoming
//! connections, frames from every connection, the next phase deadline and the
//! movement tick. Each connection gets a reader task that forwards frames to
//! the loop; outbound frames go straight to the connection's sender.

use std::collections::HashMap;

use hideseek_session::{
    ConnId, HostSession, Message, Outbound, SessionError, SessionView, Verdict, host_identity,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{ConnSender, Connection, Frame, Listener, PeerTransport};
use crate::input::IntentSource;
use crate::{PeerConfig, PeerError, now};

enum HostCommand {
    StartGame(oneshot::Sender<Result<(), SessionError>>),
    Reset(oneshot::Sender<()>),
    Shutdown,
}

enum PeerEvent {
    Frame(ConnId, Frame),
    Closed(ConnId),
}

struct Peer {
    sender: ConnSender,
    reader: AbortHandle,
}

/// Control surface of a running host.
#[derive(Debug)]
pub struct HostHandle {
    code: String,
    local_id: String,
    commands: mpsc::Sender<HostCommand>,
    view: watch::Receiver<SessionView>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for HostCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartGame(_) => f.write_str("StartGame"),
            Self::Reset(_) => f.write_str("Reset"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl HostHandle {
    /// Session code joiners enter.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Rendezvous identity the host listens under.
    pub fn identity(&self) -> String {
        host_identity(&self.code)
    }

    /// Subscribe to session views, updated after every loop iteration.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Ask the host to start the game.
    pub async fn start_game(&self) -> Result<(), PeerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HostCommand::StartGame(reply))
            .await
            .map_err(|_| PeerError::Stopped)?;
        response.await.map_err(|_| PeerError::Stopped)??;
        Ok(())
    }

    /// Back to Waiting; every connected client loses the host.
    pub async fn reset(&self) -> Result<(), PeerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(HostCommand::Reset(reply))
            .await
            .map_err(|_| PeerError::Stopped)?;
        response.await.map_err(|_| PeerError::Stopped)
    }

    /// Stop the loop and close every connection.
    pub async fn shutdown(self) {
        let _ = self.commands.send(HostCommand::Shutdown).await;
        if let Err(err) = self.task.await {
            warn!(error = %err, "host task did not stop cleanly");
        }
    }
}

/// Listen under the session's rendezvous identity and run the host loop.
pub fn spawn_host<T: PeerTransport>(
    transport: &T,
    session: HostSession,
    intents: impl IntentSource,
    config: PeerConfig,
) -> Result<HostHandle, PeerError> {
    let code = session.code().to_string();
    let local_id = session.local_id().to_string();
    let listener = transport.listen(&host_identity(&code))?;
    info!(code = %code, identity = listener.identity(), "host listening");

    let (commands_tx, commands_rx) = mpsc::channel(16);
    let (view_tx, view_rx) = watch::channel(session.view(now()));
    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);

    let host = HostLoop {
        session,
        peers: HashMap::new(),
        readers: JoinSet::new(),
        next_conn: 1,
        events_tx,
        view_tx,
    };
    let task = tokio::spawn(host.run(listener, commands_rx, events_rx, intents, config));

    Ok(HostHandle {
        code,
        local_id,
        commands: commands_tx,
        view: view_rx,
        task,
    })
}

struct HostLoop {
    session: HostSession,
    peers: HashMap<ConnId, Peer>,
    readers: JoinSet<()>,
    next_conn: ConnId,
    events_tx: mpsc::Sender<PeerEvent>,
    view_tx: watch::Sender<SessionView>,
}

impl HostLoop {
    async fn run(
        mut self,
        mut listener: Listener,
        mut commands: mpsc::Receiver<HostCommand>,
        mut events: mpsc::Receiver<PeerEvent>,
        mut intents: impl IntentSource,
        config: PeerConfig,
    ) {
        let mut ticker = time::interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.session.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(HostCommand::StartGame(reply)) => {
                        let result = self.session.start_game(now()).map(|out| self.route(out));
                        if let Err(err) = &result {
                            warn!(error = %err, "cannot start game");
                        }
                        let _ = reply.send(result);
                    }
                    Some(HostCommand::Reset(reply)) => {
                        self.reset();
                        let _ = reply.send(());
                    }
                    Some(HostCommand::Shutdown) | None => break,
                },
                accepted = listener.accept() => match accepted {
                    Some(connection) => self.open(connection),
                    None => {
                        warn!("listener closed");
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
                _ = sleep_until(deadline) => {
                    let out = self.session.poll_timers(now());
                    self.route(out);
                }
                _ = ticker.tick() => {
                    let out = self.session.step_local(intents.intent(), now());
                    self.route(out);
                }
                Some(_) = self.readers.join_next(), if !self.readers.is_empty() => {}
            }
            self.view_tx.send_replace(self.session.view(now()));
        }

        info!(code = self.session.code(), "host stopped");
        self.readers.shutdown().await;
    }

    fn open(&mut self, connection: Connection) {
        let conn = self.next_conn;
        self.next_conn += 1;

        let remote = connection.remote().to_string();
        // Dropping the connection closes it on the joiner's side.
        let Some(out) = self.session.on_channel_open(conn, now()) else {
            info!(conn, remote = %remote, "connection refused");
            return;
        };

        let (sender, mut receiver) = connection.split();
        let events = self.events_tx.clone();
        let reader = self.readers.spawn(async move {
            while let Some(frame) = receiver.recv().await {
                if events.send(PeerEvent::Frame(conn, frame)).await.is_err() {
                    return;
                }
            }
            let _ = events.send(PeerEvent::Closed(conn)).await;
        });

        info!(conn, remote = %remote, "connection opened");
        self.peers.insert(conn, Peer { sender, reader });
        self.route(out);
    }

    fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Frame(conn, frame) => match Message::decode(&frame) {
                Ok(Some(message)) => {
                    let dispatch = self.session.on_message(conn, message, now());
                    if dispatch.verdict == Verdict::RefusedAfterEnd {
                        self.close(conn);
                    }
                    self.route(dispatch.outbound);
                }
                Ok(None) => debug!(conn, "unknown message kind dropped"),
                Err(err) => warn!(conn, error = %err, "undecodable frame dropped"),
            },
            PeerEvent::Closed(conn) => {
                if self.peers.remove(&conn).is_some() {
                    info!(conn, "connection closed");
                }
                let out = self.session.on_channel_close(conn);
                self.route(out);
            }
        }
    }

    /// Deliver outbound messages. Best effort: a closed or saturated
    /// connection simply misses the frame.
    fn route(&mut self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            let frame = message.encode_to_vec();
            for (conn, peer) in &self.peers {
                if to.includes(*conn) && !peer.sender.try_send(frame.clone()) {
                    warn!(conn, kind = message.kind(), "frame dropped");
                }
            }
        }
    }

    fn reset(&mut self) {
        for conn in self.session.reset() {
            self.close(conn);
        }
    }

    /// Drop our side of a connection the session no longer tracks.
    fn close(&mut self, conn: ConnId) {
        if let Some(peer) = self.peers.remove(&conn) {
            peer.reader.abort();
            debug!(conn, "connection closed by host");
        }
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

//! Client event loop.
//!
//! Connects to the host's rendezvous identity, waits for the snapshot, sends
//! `join`, then applies host frames and reports local movement until the host
//! link drops or the user leaves. Losing the host is fatal: the replica is
//! reset and the loop ends with [`PeerError::HostLost`].

use hideseek_session::{ClientSession, Message, SessionView};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::channel::{ConnReceiver, ConnSender, PeerTransport};
use crate::input::IntentSource;
use crate::{PeerConfig, PeerError, now};

/// Control surface of a running client.
#[derive(Debug)]
pub struct ClientHandle {
    local_id: String,
    view: watch::Receiver<SessionView>,
    leave: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), PeerError>>,
}

impl ClientHandle {
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Subscribe to replica views, updated after every loop iteration.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Whether the loop has ended, for example because the host went away.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Leave the session voluntarily.
    pub async fn leave(mut self) -> Result<(), PeerError> {
        if let Some(leave) = self.leave.take() {
            let _ = leave.send(());
        }
        self.finished().await
    }

    /// Wait for the loop to end on its own.
    pub async fn finished(self) -> Result<(), PeerError> {
        self.task.await.map_err(|_| PeerError::Stopped)?
    }
}

/// Connect to the host of `session` and run the client loop.
///
/// Fails with [`PeerError::Unreachable`] if nobody hosts the code and with
/// [`PeerError::Refused`] if the host closes the channel before sending its
/// snapshot. The session is not entered in either case.
pub async fn spawn_client<T: PeerTransport>(
    transport: &T,
    mut session: ClientSession,
    intents: impl IntentSource,
    config: PeerConfig,
) -> Result<ClientHandle, PeerError> {
    let host = session.host_identity();
    let local_id = session.local_id().to_string();

    let connection = transport.connect(&local_id, &host).await?;
    let (sender, mut receiver) = connection.split();

    while !session.is_synced() {
        match receiver.recv().await {
            Some(frame) => apply_frame(&mut session, &frame),
            None => return Err(PeerError::Refused(host)),
        }
    }

    if let Some(join) = session.join_request() {
        if !sender.send(join.encode_to_vec()).await {
            return Err(PeerError::HostLost);
        }
    }
    info!(host = %host, participant = %local_id, "join requested");

    let (view_tx, view_rx) = watch::channel(session.view(now()));
    let (leave_tx, leave_rx) = oneshot::channel();
    let client = ClientLoop {
        session,
        sender,
        view_tx,
    };
    let task = tokio::spawn(client.run(receiver, leave_rx, intents, config));

    Ok(ClientHandle {
        local_id,
        view: view_rx,
        leave: Some(leave_tx),
        task,
    })
}

struct ClientLoop {
    session: ClientSession,
    sender: ConnSender,
    view_tx: watch::Sender<SessionView>,
}

impl ClientLoop {
    async fn run(
        mut self,
        mut receiver: ConnReceiver,
        mut leave: oneshot::Receiver<()>,
        mut intents: impl IntentSource,
        config: PeerConfig,
    ) -> Result<(), PeerError> {
        let mut ticker = time::interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                _ = &mut leave => {
                    info!("left session");
                    break Ok(());
                }
                frame = receiver.recv() => match frame {
                    Some(frame) => apply_frame(&mut self.session, &frame),
                    None => break Err(PeerError::HostLost),
                },
                _ = ticker.tick() => {
                    if let Some(update) = self.session.step_local(intents.intent()) {
                        if !self.sender.send(update.encode_to_vec()).await {
                            break Err(PeerError::HostLost);
                        }
                    }
                }
            }
            self.publish();
        };

        if let Err(err) = &outcome {
            warn!(error = %err, "session aborted");
            self.session.reset();
            self.publish();
        }
        outcome
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.session.view(now()));
    }
}

fn apply_frame(session: &mut ClientSession, frame: &[u8]) {
    match Message::decode(frame) {
        Ok(Some(message)) => {
            session.on_message(message, now());
        }
        Ok(None) => debug!("unknown message kind dropped"),
        Err(err) => warn!(error = %err, "undecodable frame dropped"),
    }
}

//! Hosts a mirror behind a serialized event queue.

use std::sync::Arc;

use fog_sync_core::{Action, Color, GridPoint, GridRect, PlayerId};
use fog_sync_system_mirror::{Mirror, MirrorSnapshot};
use fog_sync_system_streaming::Layout;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    transport::{read_until_closed, Transport},
    SessionError,
};

enum ClientEvent {
    Remote(Action),
    Tick,
    Viewport(Layout),
    Select {
        rect: GridRect,
        additive: bool,
        reply: oneshot::Sender<usize>,
    },
    MoveSelected(GridPoint),
    Inspect(oneshot::Sender<MirrorSnapshot>),
    Disconnected,
    Shutdown,
}

/// Handle to a running mirror.
///
/// Dropping the handle stops the mirror and hangs up its transport.
#[derive(Debug)]
pub struct MirrorHandle {
    player_id: PlayerId,
    events: mpsc::Sender<ClientEvent>,
    transport: Arc<dyn Transport>,
    actor: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl MirrorHandle {
    /// Joins the session over `transport` and starts the mirror.
    ///
    /// The join request and the initial viewport's map requests are sent
    /// before any other event is handled. When the configuration enables a
    /// tick interval, a timer drives the mirror's own units.
    pub fn spawn(
        name: &str,
        color: Color,
        transport: Arc<dyn Transport>,
        config: &SessionConfig,
    ) -> Self {
        let mut outbox = Vec::new();
        let mut mirror = Mirror::join(name, color, &mut outbox);
        mirror.update_layout(&config.viewport, &mut outbox);
        let player_id = mirror.player_id();

        let (events, inbox) = mpsc::channel(config.queue_capacity());
        let actor = {
            let transport = Arc::clone(&transport);
            tokio::task::spawn_blocking(move || {
                let mut actor = MirrorActor {
                    mirror,
                    transport,
                    connected: true,
                };
                actor.flush(outbox);
                actor.run(inbox);
            })
        };

        let reader = {
            let events = events.clone();
            let transport = Arc::clone(&transport);
            tokio::task::spawn_blocking(move || {
                read_until_closed(transport.as_ref(), |action| {
                    events.blocking_send(ClientEvent::Remote(action)).is_ok()
                });
                let _ = events.blocking_send(ClientEvent::Disconnected);
            })
        };

        let ticker = config.tick_interval().map(|period| {
            let events = events.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    let _ = interval.tick().await;
                    if events.send(ClientEvent::Tick).await.is_err() {
                        break;
                    }
                }
            })
        });

        Self {
            player_id,
            events,
            transport,
            actor: Some(actor),
            reader: Some(reader),
            ticker,
        }
    }

    /// Identifier of the local player.
    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    /// Advances the player's units by one tick.
    pub async fn tick(&self) -> Result<(), SessionError> {
        self.send(ClientEvent::Tick).await
    }

    /// Moves the viewport and requests any newly exposed terrain.
    pub async fn set_viewport(&self, layout: Layout) -> Result<(), SessionError> {
        self.send(ClientEvent::Viewport(layout)).await
    }

    /// Selects the player's units inside `rect` and returns how many are
    /// selected afterwards.
    pub async fn select(&self, rect: GridRect, additive: bool) -> Result<usize, SessionError> {
        let (reply, answer) = oneshot::channel();
        self.send(ClientEvent::Select {
            rect,
            additive,
            reply,
        })
        .await?;
        answer.await.map_err(|_| SessionError::Stopped)
    }

    /// Orders every selected unit toward `target`.
    pub async fn move_selected(&self, target: GridPoint) -> Result<(), SessionError> {
        self.send(ClientEvent::MoveSelected(target)).await
    }

    /// Captures the mirror once every earlier event is handled.
    pub async fn snapshot(&self) -> Result<MirrorSnapshot, SessionError> {
        let (reply, answer) = oneshot::channel();
        self.send(ClientEvent::Inspect(reply)).await?;
        answer.await.map_err(|_| SessionError::Stopped)
    }

    /// Stops the mirror, hangs up and waits for its tasks.
    pub async fn shutdown(mut self) -> Result<(), SessionError> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        let _ = self.events.send(ClientEvent::Shutdown).await;
        if let Some(actor) = self.actor.take() {
            actor.await?;
        }
        self.transport.close();
        if let Some(reader) = self.reader.take() {
            reader.await?;
        }
        Ok(())
    }

    async fn send(&self, event: ClientEvent) -> Result<(), SessionError> {
        self.events
            .send(event)
            .await
            .map_err(|_| SessionError::Stopped)
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        if let Some(ticker) = &self.ticker {
            ticker.abort();
        }
        let _ = self.events.try_send(ClientEvent::Shutdown);
        self.transport.close();
    }
}

struct MirrorActor {
    mirror: Mirror,
    transport: Arc<dyn Transport>,
    connected: bool,
}

impl MirrorActor {
    fn run(&mut self, mut inbox: mpsc::Receiver<ClientEvent>) {
        while let Some(event) = inbox.blocking_recv() {
            let mut outbox = Vec::new();
            match event {
                ClientEvent::Remote(action) => self.mirror.receive(action, &mut outbox),
                ClientEvent::Tick => self.mirror.tick(&mut outbox),
                ClientEvent::Viewport(layout) => self.mirror.update_layout(&layout, &mut outbox),
                ClientEvent::Select {
                    rect,
                    additive,
                    reply,
                } => {
                    let _ = reply.send(self.mirror.select_in(rect, additive));
                }
                ClientEvent::MoveSelected(target) => {
                    self.mirror.command_move(target, &mut outbox);
                }
                ClientEvent::Inspect(reply) => {
                    let _ = reply.send(self.mirror.snapshot());
                }
                ClientEvent::Disconnected => {
                    warn!(player = %self.mirror.player_id(), "lost connection to the authority");
                    self.connected = false;
                }
                ClientEvent::Shutdown => break,
            }
            self.flush(outbox);
        }

        info!(player = %self.mirror.player_id(), "mirror stopping");
        self.transport.close();
    }

    fn flush(&mut self, outbox: Vec<Action>) {
        if !self.connected {
            if !outbox.is_empty() {
                debug!(dropped = outbox.len(), "offline; discarding outgoing actions");
            }
            return;
        }
        for action in outbox {
            if let Err(error) = self.transport.send(&action) {
                warn!(kind = %action.kind(), %error, "failed to send action");
            }
        }
    }
}

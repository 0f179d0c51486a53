//! Hosts the authoritative role behind a serialized event queue.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use fog_sync_core::{Action, Player, PlayerId, Unit};
use fog_sync_system_authority::{Authority, Outbound, WorldProvider};
use fog_sync_world::query;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::SessionConfig,
    transport::{read_until_closed, Transport},
    SessionError,
};

/// Identifier the authority assigns to each accepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Summary of the reference world.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthoritySnapshot {
    /// Every unit, ordered by identifier.
    pub units: Vec<Unit>,
    /// Every admitted player, ordered by identifier.
    pub players: Vec<Player>,
    /// Number of tiles the authority has loaded.
    pub tiles: usize,
    /// Open connections.
    pub connections: usize,
    /// Spawn points still unclaimed.
    pub spawn_points_left: usize,
}

enum AuthorityEvent {
    Connected {
        connection: ConnectionId,
        transport: Arc<dyn Transport>,
    },
    Inbound {
        connection: ConnectionId,
        action: Action,
    },
    Disconnected {
        connection: ConnectionId,
    },
    Inspect(oneshot::Sender<AuthoritySnapshot>),
    Shutdown,
}

/// Handle to a running authority.
///
/// Dropping the handle without [`AuthorityHandle::shutdown`] still stops the
/// actor and hangs up every connection, but does not wait for the tasks.
#[derive(Debug)]
pub struct AuthorityHandle {
    events: mpsc::Sender<AuthorityEvent>,
    actor: Option<JoinHandle<()>>,
    readers: Vec<JoinHandle<()>>,
    transports: Vec<Arc<dyn Transport>>,
    next_connection: u64,
}

impl AuthorityHandle {
    /// Starts the authority on a blocking task. Requires a Tokio runtime.
    pub fn spawn<P>(config: &SessionConfig, provider: P) -> Self
    where
        P: WorldProvider + Send + 'static,
    {
        let authority = Authority::with_spawn_pool(provider, config.spawn_pool())
            .with_unit_size(config.unit_size)
            .with_limits(config.limits());
        let (events, inbox) = mpsc::channel(config.queue_capacity());
        let actor =
            tokio::task::spawn_blocking(move || AuthorityActor::new(authority).run(inbox));
        Self {
            events,
            actor: Some(actor),
            readers: Vec::new(),
            transports: Vec::new(),
            next_connection: 0,
        }
    }

    /// Accepts a connection and starts reading from it.
    pub async fn connect(
        &mut self,
        transport: Arc<dyn Transport>,
    ) -> Result<ConnectionId, SessionError> {
        let connection = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.events
            .send(AuthorityEvent::Connected {
                connection,
                transport: Arc::clone(&transport),
            })
            .await
            .map_err(|_| SessionError::Stopped)?;
        self.transports.push(Arc::clone(&transport));

        let events = self.events.clone();
        self.readers.push(tokio::task::spawn_blocking(move || {
            read_until_closed(transport.as_ref(), |action| {
                events
                    .blocking_send(AuthorityEvent::Inbound { connection, action })
                    .is_ok()
            });
            let _ = events.blocking_send(AuthorityEvent::Disconnected { connection });
        }));
        Ok(connection)
    }

    /// Captures the reference world once every earlier event is handled.
    pub async fn snapshot(&self) -> Result<AuthoritySnapshot, SessionError> {
        let (reply, answer) = oneshot::channel();
        self.events
            .send(AuthorityEvent::Inspect(reply))
            .await
            .map_err(|_| SessionError::Stopped)?;
        answer.await.map_err(|_| SessionError::Stopped)
    }

    /// Stops the authority, closes every connection and waits for all tasks.
    pub async fn shutdown(mut self) -> Result<(), SessionError> {
        let _ = self.events.send(AuthorityEvent::Shutdown).await;
        if let Some(actor) = self.actor.take() {
            actor.await?;
        }
        self.hang_up();
        for reader in std::mem::take(&mut self.readers) {
            reader.await?;
        }
        Ok(())
    }

    fn hang_up(&self) {
        for transport in &self.transports {
            transport.close();
        }
    }
}

impl Drop for AuthorityHandle {
    fn drop(&mut self) {
        if self.actor.is_some() {
            debug!("authority handle dropped without shutdown");
        }
        let _ = self.events.try_send(AuthorityEvent::Shutdown);
        self.hang_up();
    }
}

struct AuthorityActor<P> {
    authority: Authority<P>,
    connections: HashMap<ConnectionId, Arc<dyn Transport>>,
    players: HashMap<PlayerId, ConnectionId>,
}

impl<P: WorldProvider> AuthorityActor<P> {
    fn new(authority: Authority<P>) -> Self {
        Self {
            authority,
            connections: HashMap::new(),
            players: HashMap::new(),
        }
    }

    fn run(mut self, mut inbox: mpsc::Receiver<AuthorityEvent>) {
        while let Some(event) = inbox.blocking_recv() {
            match event {
                AuthorityEvent::Connected {
                    connection,
                    transport,
                } => {
                    info!(%connection, "connection accepted");
                    let _ = self.connections.insert(connection, transport);
                }
                AuthorityEvent::Inbound { connection, action } => {
                    self.inbound(connection, action);
                }
                AuthorityEvent::Disconnected { connection } => self.disconnect(connection),
                AuthorityEvent::Inspect(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                AuthorityEvent::Shutdown => break,
            }
        }

        info!(connections = self.connections.len(), "authority stopping");
        for transport in self.connections.values() {
            transport.close();
        }
    }

    fn inbound(&mut self, connection: ConnectionId, action: Action) {
        if !self.connections.contains_key(&connection) {
            debug!(%connection, "ignoring action from a closed connection");
            return;
        }
        if let Action::PlayerJoin(player) = &action {
            if let Some(previous) = self.players.insert(player.id, connection) {
                if previous != connection {
                    info!(
                        player = %player.id,
                        %previous,
                        %connection,
                        "player moved to a new connection"
                    );
                }
            }
        }

        let sender = self
            .players
            .iter()
            .find(|(_, bound)| **bound == connection)
            .map(|(player, _)| *player);
        let mut out = Vec::new();
        self.authority.receive(sender, action, &mut out);
        for outbound in out {
            self.deliver(&outbound);
        }
    }

    fn deliver(&self, outbound: &Outbound) {
        let targets: BTreeSet<ConnectionId> = self
            .players
            .iter()
            .filter(|(player, _)| outbound.recipients.includes(**player))
            .map(|(_, connection)| *connection)
            .collect();
        for connection in targets {
            let Some(transport) = self.connections.get(&connection) else {
                continue;
            };
            if let Err(error) = transport.send(&outbound.action) {
                warn!(%connection, kind = %outbound.action.kind(), %error, "delivery failed");
            }
        }
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        if let Some(transport) = self.connections.remove(&connection) {
            transport.close();
        }
        self.players.retain(|_, bound| *bound != connection);
        info!(%connection, "connection closed");
    }

    fn snapshot(&self) -> AuthoritySnapshot {
        let world = self.authority.world();
        AuthoritySnapshot {
            units: query::units(world).into_iter().cloned().collect(),
            players: query::players(world).into_iter().cloned().collect(),
            tiles: query::tile_count(world),
            connections: self.connections.len(),
            spawn_points_left: self.authority.spawn_pool().remaining(),
        }
    }
}

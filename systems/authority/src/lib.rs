#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative role of a fog-sync session.
//!
//! The authority owns the reference [`World`], admits players, hands out
//! spawn points, answers map requests, and decides who receives every
//! action it relays or produces. It never talks to a transport itself:
//! [`Authority::receive`] fills a buffer of [`Outbound`] messages that the
//! session layer delivers.

use std::collections::VecDeque;

use fog_sync_core::{
    Action, GridPoint, MapLoad, MapLoadSuccess, MapRequest, MapResponse, Player, PlayerId,
    PlayerJoinSuccess, Unit, UnitId,
};
use fog_sync_world::{apply, query, World};
use tracing::{debug, info, warn};

/// Errors reported by a [`WorldProvider`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not be reached or did not answer.
    #[error("world data provider unavailable")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The provider answered with a non-success status.
    #[error("world data provider answered with status {0}")]
    Status(u16),
    /// The provider's answer could not be understood.
    #[error("world data provider sent an unreadable response")]
    Malformed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Source of terrain for regions the authority has never seen.
pub trait WorldProvider {
    /// Loads every tile inside the requested inclusive rectangle.
    fn load(&self, request: &MapRequest) -> Result<MapResponse, ProviderError>;
}

impl<P: WorldProvider + ?Sized> WorldProvider for Box<P> {
    fn load(&self, request: &MapRequest) -> Result<MapResponse, ProviderError> {
        (**self).load(request)
    }
}

impl<P: WorldProvider + ?Sized> WorldProvider for &P {
    fn load(&self, request: &MapRequest) -> Result<MapResponse, ProviderError> {
        (**self).load(request)
    }
}

/// Bounds applied to requests arriving from connected players.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Longest Chebyshev distance a single `MoveStart` may cover.
    pub max_move_distance: u32,
    /// Largest number of tiles a single `MapLoad` may ask for.
    pub max_map_area: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_move_distance: 256,
            max_map_area: 65_536,
        }
    }
}

/// Reasons an inbound action is refused before it touches the world.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The move target lies further away than allowed.
    #[error("move of {distance} tiles exceeds the limit of {limit}")]
    MoveTooFar {
        /// Chebyshev distance requested.
        distance: u32,
        /// Configured limit.
        limit: u32,
    },
    /// The map request covers too many tiles.
    #[error("map request for {area} tiles exceeds the limit of {limit}")]
    MapTooLarge {
        /// Tiles requested.
        area: u128,
        /// Configured limit.
        limit: u64,
    },
    /// A reported position is not finite or lies outside the grid.
    #[error("position is off the grid")]
    OffGrid,
}

/// Spawn points offered when none are configured.
pub const DEFAULT_SPAWN_POINTS: [GridPoint; 4] = [
    GridPoint::new(1, 1),
    GridPoint::new(8, 1),
    GridPoint::new(1, 8),
    GridPoint::new(8, 8),
];

/// Starting points handed to players on their first join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnPool {
    slots: Vec<(GridPoint, Option<PlayerId>)>,
}

impl SpawnPool {
    /// Creates a pool offering the points in the given order.
    #[must_use]
    pub fn new(points: impl IntoIterator<Item = GridPoint>) -> Self {
        Self {
            slots: points.into_iter().map(|point| (point, None)).collect(),
        }
    }

    /// Claims the first unused point for the player.
    pub fn claim(&mut self, player: PlayerId) -> Option<GridPoint> {
        let slot = self.slots.iter_mut().find(|(_, owner)| owner.is_none())?;
        slot.1 = Some(player);
        Some(slot.0)
    }

    /// Number of points still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|(_, owner)| owner.is_none()).count()
    }
}

impl Default for SpawnPool {
    fn default() -> Self {
        Self::new(DEFAULT_SPAWN_POINTS)
    }
}

/// Audience of an outbound action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Every connected player.
    All,
    /// Every connected player except the given one.
    AllExcept(PlayerId),
    /// A single player.
    Only(PlayerId),
}

impl Recipients {
    /// Reports whether the player belongs to the audience.
    #[must_use]
    pub fn includes(self, player: PlayerId) -> bool {
        match self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != player,
            Self::Only(target) => target == player,
        }
    }
}

/// Action addressed to an audience.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    /// Who receives the action.
    pub recipients: Recipients,
    /// The action to deliver.
    pub action: Action,
}

/// Authoritative game logic backed by a world-data provider.
#[derive(Debug)]
pub struct Authority<P> {
    world: World,
    provider: P,
    spawn_pool: SpawnPool,
    unit_size: (i32, i32),
    limits: Limits,
}

impl<P: WorldProvider> Authority<P> {
    /// Creates an authority with the default spawn pool.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_spawn_pool(provider, SpawnPool::default())
    }

    /// Creates an authority handing out the given spawn points.
    #[must_use]
    pub fn with_spawn_pool(provider: P, spawn_pool: SpawnPool) -> Self {
        Self {
            world: World::new(),
            provider,
            spawn_pool,
            unit_size: (1, 1),
            limits: Limits::default(),
        }
    }

    /// Sets the bounds enforced on inbound actions.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the footprint given to newly spawned units.
    #[must_use]
    pub fn with_unit_size(mut self, unit_size: (i32, i32)) -> Self {
        self.unit_size = unit_size;
        self
    }

    /// Reference world state.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Remaining spawn points.
    #[must_use]
    pub fn spawn_pool(&self) -> &SpawnPool {
        &self.spawn_pool
    }

    /// Processes an inbound action and decides who receives what.
    ///
    /// `sender` is the player bound to the originating connection, if it has
    /// joined. The inbound action is relayed to everybody else unless it is a
    /// join or map request. Follow-ups are applied to the reference world
    /// where needed and routed until none remain.
    pub fn receive(
        &mut self,
        sender: Option<PlayerId>,
        action: Action,
        out: &mut Vec<Outbound>,
    ) {
        debug!(kind = %action.kind(), ?sender, "authority received action");
        if let Err(rejection) = self.admit(&action) {
            warn!(kind = %action.kind(), ?sender, %rejection, "rejecting action");
            return;
        }
        if !matches!(action, Action::PlayerJoin(_) | Action::MapLoad(_)) {
            out.push(Outbound {
                recipients: sender.map_or(Recipients::All, Recipients::AllExcept),
                action: action.clone(),
            });
        }

        let mut follow_ups = Vec::new();
        self.handle(action, &mut follow_ups);

        let mut queue: VecDeque<Action> = follow_ups.into();
        while let Some(action) = queue.pop_front() {
            let recipients = match &action {
                Action::MoveStep(_) | Action::MoveStop(_) | Action::SpawnUnit(_) => {
                    let mut more = Vec::new();
                    apply(&mut self.world, action.clone(), &mut more);
                    queue.extend(more);
                    Recipients::All
                }
                Action::PlayerJoinSuccess(success) => Recipients::Only(success.player_id),
                Action::MapLoadSuccess(success) => {
                    let recipients = Recipients::Only(success.player_id);
                    let mut more = Vec::new();
                    apply(&mut self.world, action.clone(), &mut more);
                    queue.extend(more);
                    recipients
                }
                _ => Recipients::All,
            };
            out.push(Outbound { recipients, action });
        }
    }

    /// Checks an inbound action against the configured [`Limits`].
    pub fn admit(&self, action: &Action) -> Result<(), Rejection> {
        match action {
            Action::MoveStart(start) => {
                let Some(unit) = self.world.unit(start.unit_id) else {
                    return Ok(());
                };
                let from = unit.grid_point();
                let distance = from
                    .x
                    .abs_diff(start.point.x)
                    .max(from.y.abs_diff(start.point.y));
                let limit = self.limits.max_move_distance;
                if distance > limit {
                    return Err(Rejection::MoveTooFar { distance, limit });
                }
            }
            Action::MapLoad(load) => {
                let area = load.request.rect().area();
                let limit = self.limits.max_map_area;
                if area > u128::from(limit) {
                    return Err(Rejection::MapTooLarge { area, limit });
                }
            }
            Action::MoveStep(step) if !step.position.is_on_grid() => {
                return Err(Rejection::OffGrid);
            }
            Action::SpawnUnit(unit) if !unit.position.is_on_grid() => {
                return Err(Rejection::OffGrid);
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies an action to the reference world and pushes follow-ups.
    ///
    /// Shared logic runs first; joins and map requests are then answered by
    /// the authority itself.
    pub fn handle(&mut self, action: Action, out: &mut Vec<Action>) {
        match action {
            Action::PlayerJoin(player) => self.join(player, out),
            Action::MapLoad(load) => self.load_map(load, out),
            other => apply(&mut self.world, other, out),
        }
    }

    fn join(&mut self, mut player: Player, out: &mut Vec<Action>) {
        let returning = self.world.player(player.id);
        if let Some(known) = returning {
            player.start_point = known.start_point;
        }
        let first_join = returning.is_none();

        let spawn_point = if first_join {
            let claimed = self.spawn_pool.claim(player.id);
            if let Some(point) = claimed {
                player.start_point = point;
            }
            claimed
        } else {
            None
        };

        info!(player = %player.id, name = %player.name, first_join, "player joined");
        let player_id = player.id;
        let color = player.color;
        self.world.store_player(player);
        out.push(Action::PlayerJoinSuccess(PlayerJoinSuccess {
            player_id,
            units: query::units(&self.world).into_iter().cloned().collect(),
            players: query::players(&self.world).into_iter().cloned().collect(),
        }));

        if !first_join {
            return;
        }
        match spawn_point {
            Some(point) => {
                let mut unit = Unit::new(UnitId::random(), player_id, color, point);
                unit.size = self.unit_size;
                out.push(Action::SpawnUnit(unit));
            }
            None => warn!(player = %player_id, "spawn pool exhausted; no unit spawned"),
        }
    }

    fn load_map(&mut self, load: MapLoad, out: &mut Vec<Action>) {
        let MapLoad { request, player_id } = load;
        let rect = request.rect();
        let cached = query::has_tile(&self.world, rect.min())
            && query::has_tile(&self.world, rect.max());

        let tiles = if cached {
            debug!(%rect, "answering map request from memory");
            query::tiles_in_rect(&self.world, rect)
                .into_iter()
                .cloned()
                .collect()
        } else {
            match self.provider.load(&request) {
                Ok(response) => response.tiles,
                Err(error) => {
                    warn!(%rect, player = %player_id, %error, "map request failed");
                    return;
                }
            }
        };

        out.push(Action::MapLoadSuccess(MapLoadSuccess {
            tiles,
            request,
            player_id,
        }));
    }
}

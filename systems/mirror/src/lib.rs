#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Mirror role of a fog-sync session.
//!
//! A mirror keeps a local copy of the world for one player. It applies the
//! authority's broadcasts, moves its own units optimistically, streams map
//! regions as the viewport changes, and keeps a fog-of-war mask current.
//! Actions meant for the authority are pushed into an outbox that the
//! session layer sends.

use std::collections::VecDeque;

use fog_sync_core::{
    Action, ActionKind, Color, GridPoint, GridRect, MoveStart, Player, PlayerId, Unit,
};
use fog_sync_system_streaming::{viewport, Layout, StreamingCache};
use fog_sync_system_visibility::{Visibility, VisibilityMask};
use fog_sync_world::{apply, query, tick, World};
use tracing::{debug, info};

/// Point-in-time summary of a mirror, cheap to hand across threads.
#[derive(Clone, Debug, PartialEq)]
pub struct MirrorSnapshot {
    /// Local player.
    pub player_id: PlayerId,
    /// Every known unit, ordered by identifier.
    pub units: Vec<Unit>,
    /// Players announced by the authority, ordered by identifier.
    pub players: Vec<Player>,
    /// Number of tracked tiles.
    pub tiles: usize,
    /// Currently lit tiles.
    pub visible_tiles: Vec<GridPoint>,
    /// Last requested viewport.
    pub viewport: Option<GridRect>,
}

/// Local game logic for a single observing player.
#[derive(Debug)]
pub struct Mirror {
    world: World,
    player: Player,
    joined: bool,
    streaming: StreamingCache,
    visibility: Visibility,
    mask: VisibilityMask,
}

impl Mirror {
    /// Creates a mirror for the named player and queues its join request.
    pub fn join(name: &str, color: Color, outbox: &mut Vec<Action>) -> Self {
        let player = Player::named(name, color);
        info!(player = %player.id, name, "joining session");
        outbox.push(Action::PlayerJoin(player.clone()));
        Self::with_world(player, World::new())
    }

    /// Creates a mirror around an existing store without queuing a join.
    #[must_use]
    pub fn with_world(player: Player, world: World) -> Self {
        Self {
            world,
            player,
            joined: false,
            streaming: StreamingCache::new(),
            visibility: Visibility::new(),
            mask: VisibilityMask::default(),
        }
    }

    /// Identifier of the local player.
    #[must_use]
    pub fn player_id(&self) -> PlayerId {
        self.player.id
    }

    /// Reports whether the authority confirmed the join.
    #[must_use]
    pub const fn has_joined(&self) -> bool {
        self.joined
    }

    /// Local copy of the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Latest fog-of-war mask.
    #[must_use]
    pub fn visibility(&self) -> &VisibilityMask {
        &self.mask
    }

    /// Summarises the mirror for inspection.
    #[must_use]
    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            player_id: self.player.id,
            units: query::units(&self.world).into_iter().cloned().collect(),
            players: query::players(&self.world).into_iter().cloned().collect(),
            tiles: query::tile_count(&self.world),
            visible_tiles: self.mask.tiles().collect(),
            viewport: self.streaming.current(),
        }
    }

    /// Applies an action broadcast by the authority.
    ///
    /// A stop produced locally for one of the player's own units is sent
    /// back to the authority; stops for foreign units stay local.
    pub fn receive(&mut self, action: Action, outbox: &mut Vec<Action>) {
        debug!(kind = %action.kind(), "mirror received action");
        let kind = action.kind();
        if let Action::PlayerJoinSuccess(success) = &action {
            if success.player_id == self.player.id {
                self.joined = true;
            }
        }

        let mut follow_ups = Vec::new();
        apply(&mut self.world, action, &mut follow_ups);
        self.settle(follow_ups, outbox);
        self.refresh_visibility(kind);
    }

    /// Sends an action to the authority, applying movement locally first.
    pub fn dispatch(&mut self, action: Action, outbox: &mut Vec<Action>) {
        if !action.is_movement() {
            outbox.push(action);
            return;
        }

        let kind = action.kind();
        let mut follow_ups = Vec::new();
        apply(&mut self.world, action.clone(), &mut follow_ups);
        outbox.push(action);
        self.settle(follow_ups, outbox);
        self.refresh_visibility(kind);
    }

    /// Advances the player's own units by one tick and sends every step.
    pub fn tick(&mut self, outbox: &mut Vec<Action>) {
        let mut steps = Vec::new();
        tick(&mut self.world, Some(self.player.id), &mut steps);
        for step in steps {
            self.dispatch(step, outbox);
        }
    }

    /// Requests the map regions newly exposed by the layout.
    pub fn update_layout(&mut self, layout: &Layout, outbox: &mut Vec<Action>) {
        self.streaming
            .recompute(viewport(layout), self.player.id, outbox);
    }

    /// Selects the player's units standing inside the rectangle.
    ///
    /// Without `additive`, owned units outside the rectangle are deselected.
    /// Returns the number of selected units afterwards.
    pub fn select_in(&mut self, rect: GridRect, additive: bool) -> usize {
        let owned: Vec<_> = query::units_by_owner(&self.world, self.player.id)
            .into_iter()
            .map(|unit| unit.id)
            .collect();
        let mut selected = 0;
        for id in owned {
            if let Some(unit) = self.world.unit_mut(id) {
                if rect.contains(unit.grid_point()) {
                    unit.selected = true;
                } else if !additive {
                    unit.selected = false;
                }
                selected += usize::from(unit.selected);
            }
        }
        selected
    }

    /// Orders every selected unit of the player toward `target`.
    pub fn command_move(&mut self, target: GridPoint, outbox: &mut Vec<Action>) {
        let selected: Vec<_> = query::units_by_owner(&self.world, self.player.id)
            .into_iter()
            .filter(|unit| unit.selected)
            .map(|unit| unit.id)
            .collect();
        for unit_id in selected {
            self.dispatch(
                Action::MoveStart(MoveStart {
                    unit_id,
                    point: target,
                }),
                outbox,
            );
        }
    }

    fn settle(&mut self, follow_ups: Vec<Action>, outbox: &mut Vec<Action>) {
        let mut queue: VecDeque<Action> = follow_ups.into();
        while let Some(action) = queue.pop_front() {
            let owned = match &action {
                Action::MoveStop(unit_id) => self
                    .world
                    .unit(*unit_id)
                    .is_some_and(|unit| unit.owner_id == self.player.id),
                _ => false,
            };
            let mut more = Vec::new();
            apply(&mut self.world, action.clone(), &mut more);
            if owned {
                outbox.push(action);
            }
            queue.extend(more);
        }
    }

    fn refresh_visibility(&mut self, kind: ActionKind) {
        if matches!(
            kind,
            ActionKind::PlayerJoinSuccess
                | ActionKind::SpawnUnit
                | ActionKind::MoveStep
                | ActionKind::MapLoadSuccess
        ) {
            self.mask = self.visibility.recompute(&mut self.world, self.player.id);
        }
    }
}

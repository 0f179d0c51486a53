#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Spatial store shared by the authoritative and mirror roles.
//!
//! The [`World`] keeps units, tiles and players in memory for the lifetime of
//! a session. State changes flow through [`apply`], which implements the
//! application logic common to both roles, and [`tick`], which drives the
//! movement system. Read-only views live in the [`query`] module.

use std::collections::HashMap;

use fog_sync_core::{
    Action, GridPoint, MoveStart, MoveStep, PlacementError, Player, PlayerId, Tile, Unit, UnitId,
};
use fog_sync_system_movement::{self as movement, Movement};
use tracing::{debug, warn};

/// In-memory spatial store of units, tiles and players.
#[derive(Debug, Default)]
pub struct World {
    units: HashMap<UnitId, Unit>,
    tiles: HashMap<GridPoint, Tile>,
    players: HashMap<PlayerId, Player>,
    movement: Movement,
}

impl World {
    /// Creates an empty store stepping units with the default speed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that steps units with the provided parameters.
    #[must_use]
    pub fn with_movement(movement: Movement) -> Self {
        Self {
            movement,
            ..Self::default()
        }
    }

    /// Inserts or replaces a unit record. Occupancy is left untouched.
    pub fn store_unit(&mut self, unit: Unit) {
        let _ = self.units.insert(unit.id, unit);
    }

    /// Looks up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(&id)
    }

    /// Looks up a unit for mutation.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    /// Inserts a tile delivered by the world-data provider.
    ///
    /// Terrain data is replaced; the local occupant and visibility flags of
    /// an already tracked tile survive.
    pub fn store_tile(&mut self, tile: Tile) {
        match self.tiles.get_mut(&tile.point) {
            Some(existing) => existing.land = tile.land,
            None => {
                let _ = self.tiles.insert(
                    tile.point,
                    Tile {
                        occupant: None,
                        visible: false,
                        ..tile
                    },
                );
            }
        }
    }

    /// Looks up a tracked tile.
    #[must_use]
    pub fn tile(&self, point: GridPoint) -> Option<&Tile> {
        self.tiles.get(&point)
    }

    /// Iterates every tracked tile mutably, in no particular order.
    pub fn tiles_mut(&mut self) -> impl Iterator<Item = &mut Tile> {
        self.tiles.values_mut()
    }

    /// Looks up a tracked tile for mutation.
    pub fn tile_mut(&mut self, point: GridPoint) -> Option<&mut Tile> {
        self.tiles.get_mut(&point)
    }

    /// Returns the tile at `point`, tracking an empty one first if needed.
    pub fn create_tile(&mut self, point: GridPoint) -> &mut Tile {
        self.tiles
            .entry(point)
            .or_insert_with(|| Tile::empty(point))
    }

    /// Inserts or replaces a player record.
    pub fn store_player(&mut self, player: Player) {
        let _ = self.players.insert(player.id, player);
    }

    /// Looks up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Releases every tile claimed by the unit.
    pub fn clear_occupancy(&mut self, unit_id: UnitId) {
        for tile in self.tiles.values_mut() {
            if tile.occupant == Some(unit_id) {
                tile.occupant = None;
            }
        }
    }

    /// Binds the unit to every requested tile, or to none of them.
    ///
    /// An empty `points` slice targets the tile under the unit's rounded
    /// position. Missing tiles are created. The call fails without mutating
    /// anything when any requested tile is claimed by another unit.
    pub fn place_unit(
        &mut self,
        unit_id: UnitId,
        points: &[GridPoint],
    ) -> Result<(), PlacementError> {
        let unit = self
            .units
            .get(&unit_id)
            .ok_or(PlacementError::UnknownUnit(unit_id))?;
        let current = [unit.grid_point()];
        let points = if points.is_empty() { &current[..] } else { points };

        for point in points {
            if let Some(occupant) = self.tiles.get(point).and_then(|tile| tile.occupant) {
                if occupant != unit_id {
                    return Err(PlacementError::PositionOccupied {
                        point: *point,
                        occupant,
                    });
                }
            }
        }

        for point in points {
            self.create_tile(*point).occupant = Some(unit_id);
        }
        Ok(())
    }
}

/// Read-only views of a [`World`].
pub mod query {
    use fog_sync_core::{GridPoint, GridRect, Player, PlayerId, Tile, Unit, UnitId};

    use super::World;

    /// Every unit, ordered by identifier.
    #[must_use]
    pub fn units(world: &World) -> Vec<&Unit> {
        let mut units: Vec<&Unit> = world.units.values().collect();
        units.sort_by_key(|unit| unit.id);
        units
    }

    /// Identifiers of every unit, ordered.
    #[must_use]
    pub fn unit_ids(world: &World) -> Vec<UnitId> {
        let mut ids: Vec<UnitId> = world.units.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Units owned by the player, ordered by identifier.
    #[must_use]
    pub fn units_by_owner(world: &World, owner: PlayerId) -> Vec<&Unit> {
        units(world)
            .into_iter()
            .filter(|unit| unit.owner_id == owner)
            .collect()
    }

    /// Points of every tile the unit currently claims, ordered.
    #[must_use]
    pub fn tiles_by_unit(world: &World, unit_id: UnitId) -> Vec<GridPoint> {
        let mut points: Vec<GridPoint> = world
            .tiles
            .values()
            .filter(|tile| tile.occupant == Some(unit_id))
            .map(|tile| tile.point)
            .collect();
        points.sort();
        points
    }

    /// Tracked tiles inside the inclusive rectangle, in row-major order.
    #[must_use]
    pub fn tiles_in_rect(world: &World, rect: GridRect) -> Vec<&Tile> {
        rect.points().filter_map(|point| world.tiles.get(&point)).collect()
    }

    /// Reports whether a tile is tracked at the point.
    #[must_use]
    pub fn has_tile(world: &World, point: GridPoint) -> bool {
        world.tiles.contains_key(&point)
    }

    /// Number of tracked tiles.
    #[must_use]
    pub fn tile_count(world: &World) -> usize {
        world.tiles.len()
    }

    /// Every player, ordered by identifier.
    #[must_use]
    pub fn players(world: &World) -> Vec<&Player> {
        let mut players: Vec<&Player> = world.players.values().collect();
        players.sort_by_key(|player| player.id);
        players
    }
}

/// Applies an action using the logic shared by every role.
///
/// Follow-up actions, such as a `MoveStop` after a failed reservation, are
/// pushed into `out`. Join requests and map requests are role specific and
/// are ignored here.
pub fn apply(world: &mut World, action: Action, out: &mut Vec<Action>) {
    match action {
        Action::PlayerJoinSuccess(success) => {
            for player in success.players {
                world.store_player(player);
            }
            for unit in success.units {
                spawn(world, unit);
            }
        }
        Action::SpawnUnit(unit) => spawn(world, unit),
        Action::MoveStart(MoveStart { unit_id, point }) => match world.unit_mut(unit_id) {
            Some(unit) => {
                if !movement::start(unit, point) {
                    debug!(%unit_id, %point, "unit already heading to target");
                }
            }
            None => warn!(%unit_id, "move start for unknown unit dropped"),
        },
        Action::MoveStep(step) => apply_step(world, step, out),
        Action::MoveStop(unit_id) => match world.unit_mut(unit_id) {
            Some(unit) => movement::stop(unit),
            None => warn!(%unit_id, "move stop for unknown unit dropped"),
        },
        Action::MapLoadSuccess(success) => {
            for tile in success.tiles {
                world.store_tile(tile);
            }
        }
        other @ (Action::PlayerJoin(_) | Action::MapLoad(_)) => {
            debug!(kind = %other.kind(), "action has no shared effect");
        }
    }
}

/// Advances units by one tick, in identifier order.
///
/// When `owner` is set only that player's units move. Every snap onto a path
/// point is reported as a `MoveStep` in `out`; callers apply those to update
/// occupancy.
pub fn tick(world: &mut World, owner: Option<PlayerId>, out: &mut Vec<Action>) {
    let movement = world.movement;
    for id in query::unit_ids(world) {
        let Some(unit) = world.units.get_mut(&id) else {
            continue;
        };
        if owner.map_or(true, |owner| unit.owner_id == owner) {
            movement.advance(unit, out);
        }
    }
}

fn spawn(world: &mut World, unit: Unit) {
    let unit_id = unit.id;
    world.clear_occupancy(unit_id);
    world.store_unit(unit);
    if let Err(error) = world.place_unit(unit_id, &[]) {
        warn!(%unit_id, %error, "unable to place spawned unit");
    }
}

fn apply_step(world: &mut World, step: MoveStep, out: &mut Vec<Action>) {
    let MoveStep {
        unit_id,
        position,
        path,
        step,
    } = step;
    if world.unit(unit_id).is_none() {
        warn!(%unit_id, "move step for unknown unit dropped");
        return;
    }

    world.clear_occupancy(unit_id);
    let next = path.get(step).copied();
    if let Some(unit) = world.unit_mut(unit_id) {
        unit.position = position;
        unit.path = path;
        unit.step = step;
    }

    if let Err(error) = world.place_unit(unit_id, &[]) {
        warn!(%unit_id, %error, "unable to place stepping unit");
    }

    if let Some(next) = next {
        if let Err(error) = world.place_unit(unit_id, &[next]) {
            debug!(%unit_id, %error, "next step blocked; stopping unit");
            out.push(Action::MoveStop(unit_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fog_sync_core::{
        Color, GridRect, LandClassifiers, MapLoadSuccess, MapRequest, PlayerJoinSuccess,
        Position,
    };

    fn player(name: &str) -> Player {
        Player::named(name, Color::from_rgb(10, 20, 30))
    }

    fn spawn_at(world: &mut World, owner: &Player, point: GridPoint) -> UnitId {
        let unit = Unit::new(UnitId::random(), owner.id, owner.color, point);
        let id = unit.id;
        let mut out = Vec::new();
        apply(world, Action::SpawnUnit(unit), &mut out);
        assert!(out.is_empty());
        id
    }

    fn terrain(point: GridPoint, value: &str) -> Tile {
        Tile {
            point,
            land: LandClassifiers {
                value: value.to_owned(),
                ..LandClassifiers::default()
            },
            ..Tile::default()
        }
    }

    #[test]
    fn spawn_claims_the_tile_under_the_unit() {
        let mut world = World::new();
        let red = player("red");
        let id = spawn_at(&mut world, &red, GridPoint::new(2, 3));

        assert_eq!(query::tiles_by_unit(&world, id), vec![GridPoint::new(2, 3)]);
        assert_eq!(
            world.tile(GridPoint::new(2, 3)).and_then(|tile| tile.occupant),
            Some(id)
        );
    }

    #[test]
    fn create_tile_is_idempotent() {
        let mut world = World::new();
        let point = GridPoint::new(-1, 4);
        world.create_tile(point).visible = true;
        assert!(world.create_tile(point).visible);
        assert_eq!(query::tile_count(&world), 1);
    }

    #[test]
    fn storing_terrain_keeps_local_tile_state() {
        let mut world = World::new();
        let red = player("red");
        let id = spawn_at(&mut world, &red, GridPoint::new(0, 0));
        world.create_tile(GridPoint::new(0, 0)).visible = true;

        world.store_tile(terrain(GridPoint::new(0, 0), "forest"));

        let tile = world.tile(GridPoint::new(0, 0)).expect("tile tracked");
        assert_eq!(tile.land.value, "forest");
        assert_eq!(tile.occupant, Some(id));
        assert!(tile.visible);
    }

    #[test]
    fn failed_multi_tile_placement_mutates_nothing() {
        let mut world = World::new();
        let red = player("red");
        let blocker = spawn_at(&mut world, &red, GridPoint::new(2, 0));
        let mover = spawn_at(&mut world, &red, GridPoint::new(0, 0));

        let result = world.place_unit(
            mover,
            &[GridPoint::new(1, 0), GridPoint::new(2, 0), GridPoint::new(3, 0)],
        );

        assert_eq!(
            result,
            Err(PlacementError::PositionOccupied {
                point: GridPoint::new(2, 0),
                occupant: blocker,
            })
        );
        assert!(!query::has_tile(&world, GridPoint::new(1, 0)));
        assert!(!query::has_tile(&world, GridPoint::new(3, 0)));
        assert_eq!(query::tiles_by_unit(&world, mover), vec![GridPoint::new(0, 0)]);
    }

    #[test]
    fn placing_an_unknown_unit_fails() {
        let mut world = World::new();
        let ghost = UnitId::random();
        assert_eq!(
            world.place_unit(ghost, &[]),
            Err(PlacementError::UnknownUnit(ghost))
        );
    }

    #[test]
    fn move_start_plans_from_the_rounded_position() {
        let mut world = World::new();
        let red = player("red");
        let id = spawn_at(&mut world, &red, GridPoint::new(0, 0));
        let mut out = Vec::new();

        apply(
            &mut world,
            Action::MoveStart(MoveStart {
                unit_id: id,
                point: GridPoint::new(3, 0),
            }),
            &mut out,
        );

        let unit = world.unit(id).expect("unit tracked");
        assert_eq!(
            unit.path,
            vec![
                GridPoint::new(0, 0),
                GridPoint::new(1, 0),
                GridPoint::new(2, 0),
                GridPoint::new(3, 0),
            ]
        );
        assert_eq!(unit.step, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn blocked_step_emits_stop_and_leaves_the_blocker_alone() {
        let mut world = World::new();
        let red = player("red");
        let a = spawn_at(&mut world, &red, GridPoint::new(0, 0));
        let b = spawn_at(&mut world, &red, GridPoint::new(1, 1));
        let mut out = Vec::new();
        apply(
            &mut world,
            Action::MoveStart(MoveStart {
                unit_id: a,
                point: GridPoint::new(2, 2),
            }),
            &mut out,
        );

        tick(&mut world, None, &mut out);
        let steps = std::mem::take(&mut out);
        assert_eq!(steps.len(), 1);
        for step in steps {
            apply(&mut world, step, &mut out);
        }

        assert_eq!(out, vec![Action::MoveStop(a)]);
        assert_eq!(query::tiles_by_unit(&world, b), vec![GridPoint::new(1, 1)]);
        assert_eq!(query::tiles_by_unit(&world, a), vec![GridPoint::new(0, 0)]);

        let stop = out.remove(0);
        apply(&mut world, stop, &mut out);
        assert!(world.unit(a).expect("unit tracked").is_idle());
    }

    #[test]
    fn successful_step_reserves_the_next_tile() {
        let mut world = World::new();
        let red = player("red");
        let id = spawn_at(&mut world, &red, GridPoint::new(0, 0));
        let mut out = Vec::new();

        apply(
            &mut world,
            Action::MoveStep(MoveStep {
                unit_id: id,
                position: Position::new(0.0, 0.0),
                path: vec![GridPoint::new(0, 0), GridPoint::new(1, 0)],
                step: 1,
            }),
            &mut out,
        );

        assert!(out.is_empty());
        assert_eq!(
            query::tiles_by_unit(&world, id),
            vec![GridPoint::new(0, 0), GridPoint::new(1, 0)]
        );
    }

    #[test]
    fn actions_for_unknown_units_are_dropped() {
        let mut world = World::new();
        let ghost = UnitId::random();
        let mut out = Vec::new();

        apply(&mut world, Action::MoveStop(ghost), &mut out);
        apply(
            &mut world,
            Action::MoveStep(MoveStep {
                unit_id: ghost,
                position: Position::new(1.0, 1.0),
                path: vec![GridPoint::new(1, 1), GridPoint::new(2, 2)],
                step: 1,
            }),
            &mut out,
        );

        assert!(out.is_empty());
        assert!(query::units(&world).is_empty());
        assert_eq!(query::tile_count(&world), 0);
    }

    #[test]
    fn join_success_populates_players_and_units() {
        let mut world = World::new();
        let red = player("red");
        let blue = player("blue");
        let unit = Unit::new(UnitId::random(), blue.id, blue.color, GridPoint::new(8, 1));
        let mut out = Vec::new();

        apply(
            &mut world,
            Action::PlayerJoinSuccess(PlayerJoinSuccess {
                player_id: red.id,
                units: vec![unit.clone()],
                players: vec![red.clone(), blue.clone()],
            }),
            &mut out,
        );

        assert_eq!(query::players(&world).len(), 2);
        assert_eq!(query::units_by_owner(&world, blue.id), vec![&unit]);
        assert!(query::units_by_owner(&world, red.id).is_empty());
        assert_eq!(query::tiles_by_unit(&world, unit.id), vec![GridPoint::new(8, 1)]);
    }

    #[test]
    fn map_load_success_stores_tiles_in_rect_order() {
        let mut world = World::new();
        let mut out = Vec::new();
        apply(
            &mut world,
            Action::MapLoadSuccess(MapLoadSuccess {
                tiles: vec![
                    terrain(GridPoint::new(1, 1), "b"),
                    terrain(GridPoint::new(0, 0), "a"),
                ],
                request: MapRequest::from(GridRect::new(0, 0, 1, 1)),
                player_id: PlayerId::from_name("red"),
            }),
            &mut out,
        );

        let values: Vec<&str> = query::tiles_in_rect(&world, GridRect::new(0, 0, 1, 1))
            .into_iter()
            .map(|tile| tile.land.value.as_str())
            .collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn tick_can_be_limited_to_one_owner() {
        let mut world = World::new();
        let red = player("red");
        let blue = player("blue");
        let mine = spawn_at(&mut world, &red, GridPoint::new(0, 0));
        let theirs = spawn_at(&mut world, &blue, GridPoint::new(5, 5));
        let mut out = Vec::new();
        for (unit_id, point) in [(mine, GridPoint::new(2, 0)), (theirs, GridPoint::new(7, 5))] {
            apply(
                &mut world,
                Action::MoveStart(MoveStart { unit_id, point }),
                &mut out,
            );
        }

        tick(&mut world, Some(red.id), &mut out);

        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Action::MoveStep(step) if step.unit_id == mine));
        assert_eq!(world.unit(theirs).expect("unit tracked").step, 0);
    }
}

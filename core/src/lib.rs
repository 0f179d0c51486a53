#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the fog-sync engine.
//!
//! This crate defines the message surface that connects the authoritative
//! role, the mirrors, and the pure systems. Every state change enters or
//! leaves a store as an [`Action`]; the world crate applies actions through
//! its `apply` entry point and pushes follow-up actions into an explicit
//! output buffer. The [`wire`] module converts actions to and from the
//! self-describing envelope carried by transports.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod wire;

pub use wire::{decode, encode, WireError};

/// Radius, in grid units, within which a unit observes surrounding tiles.
pub const SIGHT_RADIUS: i32 = 5;

/// Namespace used to derive stable player identifiers from player names.
const PLAYER_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_3a52_9d0e_4b7a_8e21_f4c5_0b93_d2a7);

/// Unique identifier assigned to a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Wraps an existing UUID as a unit identifier.
    #[must_use]
    pub const fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Allocates a fresh random unit identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Retrieves the underlying UUID.
    #[must_use]
    pub const fn get(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier assigned to a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Wraps an existing UUID as a player identifier.
    #[must_use]
    pub const fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Derives the identifier a player with the provided name always receives.
    ///
    /// Names are trimmed and lowercased first, so `"Red"` and `" red "` map
    /// to the same player and a reconnecting observer rejoins as itself.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let normalized = name.trim().to_lowercase();
        Self(Uuid::new_v5(&PLAYER_NAMESPACE, normalized.as_bytes()))
    }

    /// Retrieves the underlying UUID.
    #[must_use]
    pub const fn get(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Location of a single grid tile.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridPoint {
    /// Column of the tile; grows to the right.
    #[serde(alias = "X")]
    pub x: i32,
    /// Row of the tile; grows downward.
    #[serde(alias = "Y")]
    pub y: i32,
}

impl GridPoint {
    /// Creates a new grid point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Component-wise sum of two points.
    #[must_use]
    pub const fn offset(self, other: GridPoint) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(self, other: GridPoint) -> f64 {
        let dx = f64::from(other.x - self.x);
        let dy = f64::from(other.y - self.y);
        dx.hypot(dy)
    }

    /// Continuous position located exactly on this point.
    #[must_use]
    pub fn to_position(self) -> Position {
        Position::new(f64::from(self.x), f64::from(self.y))
    }
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Continuous position measured in grid units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    #[serde(alias = "X")]
    pub x: f64,
    /// Vertical coordinate.
    #[serde(alias = "Y")]
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rounds both components half away from zero.
    #[must_use]
    pub fn round(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }

    /// Reports whether both components are finite and round to a
    /// representable grid point.
    #[must_use]
    pub fn is_on_grid(self) -> bool {
        let range = f64::from(i32::MIN)..=f64::from(i32::MAX);
        let rounded = self.round();
        rounded.x.is_finite()
            && rounded.y.is_finite()
            && range.contains(&rounded.x)
            && range.contains(&rounded.y)
    }

    /// Grid point the position rounds to.
    ///
    /// Positions off the grid (see [`Position::is_on_grid`]) saturate to the
    /// nearest edge of the `i32` plane and NaN maps to zero; callers holding
    /// untrusted positions check them first.
    #[must_use]
    pub fn grid_point(self) -> GridPoint {
        let rounded = self.round();
        GridPoint::new(rounded.x as i32, rounded.y as i32)
    }
}

/// Axis-aligned rectangle of grid points with inclusive bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridRect {
    min: GridPoint,
    max: GridPoint,
}

impl GridRect {
    /// Creates a rectangle from its corner coordinates, normalising the order.
    #[must_use]
    pub fn new(min_x: i32, min_y: i32, max_x: i32, max_y: i32) -> Self {
        Self {
            min: GridPoint::new(min_x.min(max_x), min_y.min(max_y)),
            max: GridPoint::new(min_x.max(max_x), min_y.max(max_y)),
        }
    }

    /// Creates a rectangle spanning the two provided corners.
    #[must_use]
    pub fn from_corners(a: GridPoint, b: GridPoint) -> Self {
        Self::new(a.x, a.y, b.x, b.y)
    }

    /// Upper-left corner.
    #[must_use]
    pub const fn min(&self) -> GridPoint {
        self.min
    }

    /// Lower-right corner.
    #[must_use]
    pub const fn max(&self) -> GridPoint {
        self.max
    }

    /// Number of columns covered, counting both edges.
    #[must_use]
    pub const fn width(&self) -> u64 {
        self.max.x.abs_diff(self.min.x) as u64 + 1
    }

    /// Number of rows covered, counting both edges.
    #[must_use]
    pub const fn height(&self) -> u64 {
        self.max.y.abs_diff(self.min.y) as u64 + 1
    }

    /// Number of points covered. Never overflows, even for the full `i32` plane.
    #[must_use]
    pub const fn area(&self) -> u128 {
        self.width() as u128 * self.height() as u128
    }

    /// Reports whether the point lies within the rectangle.
    #[must_use]
    pub const fn contains(&self, point: GridPoint) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Reports whether two rectangles share at least one point.
    #[must_use]
    pub const fn intersects(&self, other: &GridRect) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Iterates every point of the rectangle in row-major order.
    pub fn points(&self) -> impl Iterator<Item = GridPoint> {
        let (min, max) = (self.min, self.max);
        (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| GridPoint::new(x, y)))
    }
}

impl fmt::Display for GridRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {}]", self.min, self.max)
    }
}

/// RGBA color assigned to a player and its units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Color {
    /// Creates an opaque color from byte RGB components.
    #[must_use]
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }
}

/// Relative grid offsets a unit observes around its own tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SightOffsets(Vec<GridPoint>);

impl SightOffsets {
    /// Collects every offset whose Euclidean length does not exceed `radius`.
    ///
    /// Offsets are ordered row by row so two units with equal radii carry
    /// identical sets.
    #[must_use]
    pub fn within(radius: i32) -> Self {
        let radius = radius.max(0);
        let limit = f64::from(radius);
        let origin = GridPoint::default();
        let offsets = (-radius..=radius)
            .flat_map(|y| (-radius..=radius).map(move |x| GridPoint::new(x, y)))
            .filter(|offset| origin.distance(*offset) <= limit)
            .collect();
        Self(offsets)
    }

    /// Offsets in deterministic order.
    #[must_use]
    pub fn as_slice(&self) -> &[GridPoint] {
        &self.0
    }
}

impl Default for SightOffsets {
    fn default() -> Self {
        Self::within(SIGHT_RADIUS)
    }
}

/// Unit controlled by a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Identifier of the unit.
    pub id: UnitId,
    /// Player controlling the unit.
    pub owner_id: PlayerId,
    /// Appearance of the unit.
    pub color: Color,
    /// Continuous position in grid units.
    pub position: Position,
    /// Footprint measured in whole tiles.
    pub size: (i32, i32),
    /// Planned route; the first element is the point the route starts from.
    #[serde(default)]
    pub path: Vec<GridPoint>,
    /// Index of the next path element to reach.
    #[serde(default)]
    pub step: usize,
    /// Whether the owning observer currently has the unit selected.
    #[serde(default)]
    pub selected: bool,
    /// Offsets observed around the unit; rebuilt locally, never transmitted.
    #[serde(skip)]
    pub sight_offsets: SightOffsets,
}

impl Unit {
    /// Creates a stationary unit standing on the provided point.
    #[must_use]
    pub fn new(id: UnitId, owner_id: PlayerId, color: Color, at: GridPoint) -> Self {
        Self {
            id,
            owner_id,
            color,
            position: at.to_position(),
            size: (1, 1),
            path: Vec::new(),
            step: 0,
            selected: false,
            sight_offsets: SightOffsets::default(),
        }
    }

    /// Grid point the unit currently rounds to.
    #[must_use]
    pub fn grid_point(&self) -> GridPoint {
        self.position.grid_point()
    }

    /// Reports whether the unit has no remaining path elements.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.step >= self.path.len()
    }

    /// Final point of the current path, if any.
    #[must_use]
    pub fn destination(&self) -> Option<GridPoint> {
        self.path.last().copied()
    }
}

/// Terrain data delivered by the world-data provider for a single tile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LandClassifiers {
    /// Raw terrain value.
    pub value: String,
    /// Broad land category such as plains or water.
    pub land_type: String,
    /// Foreground style class used by renderers.
    pub front_style_class: String,
    /// Background style class used by renderers.
    pub back_style_class: String,
    /// Elevation of the ground.
    pub ground_level: i32,
    /// Elevation of standing water, if any.
    pub water_level: Option<i32>,
    /// Whether the terrain was shaped by retreating glaciers.
    pub post_glacial: bool,
}

/// Map tile tracked by a store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Grid coordinate of the tile.
    pub point: GridPoint,
    /// Render-relevant terrain classification.
    #[serde(flatten)]
    pub land: LandClassifiers,
    /// Unit currently claiming the tile; local state only.
    #[serde(skip)]
    pub occupant: Option<UnitId>,
    /// Whether the observing player currently sees the tile; mirror only.
    #[serde(skip)]
    pub visible: bool,
}

impl Tile {
    /// Creates an unclassified, unclaimed tile.
    #[must_use]
    pub fn empty(point: GridPoint) -> Self {
        Self {
            point,
            ..Self::default()
        }
    }
}

/// Participant in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Identifier of the player.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Color applied to the player's units.
    pub color: Color,
    /// Spawn point assigned by the authority; zero until assigned.
    #[serde(default)]
    pub start_point: GridPoint,
}

impl Player {
    /// Creates a player whose identifier is derived from its name.
    #[must_use]
    pub fn named(name: &str, color: Color) -> Self {
        Self {
            id: PlayerId::from_name(name),
            name: name.trim().to_owned(),
            color,
            start_point: GridPoint::default(),
        }
    }
}

/// Rectangle of tiles requested from a world-data provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRequest {
    /// Leftmost column.
    pub min_x: i32,
    /// Topmost row.
    pub min_y: i32,
    /// Rightmost column.
    pub max_x: i32,
    /// Bottom row.
    pub max_y: i32,
}

impl MapRequest {
    /// Rectangle covered by the request.
    #[must_use]
    pub fn rect(&self) -> GridRect {
        GridRect::new(self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl From<GridRect> for MapRequest {
    fn from(rect: GridRect) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }
}

/// Tiles returned by a world-data provider for a requested rectangle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapResponse {
    /// Tiles covering the rectangle.
    #[serde(rename = "map", default)]
    pub tiles: Vec<Tile>,
    /// Leftmost column.
    pub min_x: i32,
    /// Topmost row.
    pub min_y: i32,
    /// Rightmost column.
    pub max_x: i32,
    /// Bottom row.
    pub max_y: i32,
}

/// Payload confirming that a player joined the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinSuccess {
    /// Player the confirmation is addressed to.
    pub player_id: PlayerId,
    /// Every unit known to the authority at join time.
    pub units: Vec<Unit>,
    /// Every player known to the authority at join time.
    pub players: Vec<Player>,
}

/// Payload asking a unit to plan a route toward a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveStart {
    /// Unit to move.
    pub unit_id: UnitId,
    /// Destination point.
    pub point: GridPoint,
}

/// Payload reporting that a unit reached the next element of its path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveStep {
    /// Unit that advanced.
    pub unit_id: UnitId,
    /// Position the unit snapped to.
    pub position: Position,
    /// Complete path the unit follows.
    pub path: Vec<GridPoint>,
    /// Index of the next path element after the snap.
    pub step: usize,
}

/// Payload requesting the tiles of a rectangle on behalf of a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLoad {
    /// Requested rectangle.
    #[serde(flatten)]
    pub request: MapRequest,
    /// Player the answer is addressed to.
    pub player_id: PlayerId,
}

impl MapLoad {
    /// Creates a request for the provided rectangle.
    #[must_use]
    pub fn new(rect: GridRect, player_id: PlayerId) -> Self {
        Self {
            request: MapRequest::from(rect),
            player_id,
        }
    }
}

/// Payload answering a [`MapLoad`] request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLoadSuccess {
    /// Tiles covering the requested rectangle.
    pub tiles: Vec<Tile>,
    /// Answered rectangle.
    #[serde(flatten)]
    pub request: MapRequest,
    /// Player the answer is addressed to.
    pub player_id: PlayerId,
}

/// Tagged messages that express every state change in a session.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// A player asks to join the session.
    PlayerJoin(Player),
    /// The authority confirms a join and shares its current state.
    PlayerJoinSuccess(PlayerJoinSuccess),
    /// A unit enters the world.
    SpawnUnit(Unit),
    /// A unit is commanded toward a point.
    MoveStart(MoveStart),
    /// A unit reached the next element of its path.
    MoveStep(MoveStep),
    /// A unit abandons its path.
    MoveStop(UnitId),
    /// An observer requests a region of the map.
    MapLoad(MapLoad),
    /// The authority answers a region request.
    MapLoadSuccess(MapLoadSuccess),
}

impl Action {
    /// Stable discriminant of the action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::PlayerJoin(_) => ActionKind::PlayerJoin,
            Self::PlayerJoinSuccess(_) => ActionKind::PlayerJoinSuccess,
            Self::SpawnUnit(_) => ActionKind::SpawnUnit,
            Self::MoveStart(_) => ActionKind::MoveStart,
            Self::MoveStep(_) => ActionKind::MoveStep,
            Self::MoveStop(_) => ActionKind::MoveStop,
            Self::MapLoad(_) => ActionKind::MapLoad,
            Self::MapLoadSuccess(_) => ActionKind::MapLoadSuccess,
        }
    }

    /// Reports whether the action belongs to the movement vocabulary.
    #[must_use]
    pub const fn is_movement(&self) -> bool {
        matches!(
            self,
            Self::MoveStart(_) | Self::MoveStep(_) | Self::MoveStop(_)
        )
    }
}

/// Discriminants of the closed [`Action`] set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// See [`Action::PlayerJoin`].
    PlayerJoin,
    /// See [`Action::PlayerJoinSuccess`].
    PlayerJoinSuccess,
    /// See [`Action::SpawnUnit`].
    SpawnUnit,
    /// See [`Action::MoveStart`].
    MoveStart,
    /// See [`Action::MoveStep`].
    MoveStep,
    /// See [`Action::MoveStop`].
    MoveStop,
    /// See [`Action::MapLoad`].
    MapLoad,
    /// See [`Action::MapLoadSuccess`].
    MapLoadSuccess,
}

impl ActionKind {
    /// Every kind in declaration order.
    pub const ALL: [ActionKind; 8] = [
        Self::PlayerJoin,
        Self::PlayerJoinSuccess,
        Self::SpawnUnit,
        Self::MoveStart,
        Self::MoveStep,
        Self::MoveStop,
        Self::MapLoad,
        Self::MapLoadSuccess,
    ];

    /// Tag written into the wire envelope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlayerJoin => "PlayerJoin",
            Self::PlayerJoinSuccess => "PlayerJoinSuccess",
            Self::SpawnUnit => "SpawnUnit",
            Self::MoveStart => "MoveStart",
            Self::MoveStep => "MoveStep",
            Self::MoveStop => "MoveStop",
            Self::MapLoad => "MapLoad",
            Self::MapLoadSuccess => "MapLoadSuccess",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = WireError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| WireError::UnrecognizedActionKind(value.to_owned()))
    }
}

/// Reasons a unit cannot be bound to the requested tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    /// Another unit already claims one of the requested tiles.
    #[error("position {point} is occupied by unit {occupant}")]
    PositionOccupied {
        /// Contested tile.
        point: GridPoint,
        /// Unit holding the tile.
        occupant: UnitId,
    },
    /// The store holds no unit with the provided identifier.
    #[error("unit {0} is not tracked by the store")]
    UnknownUnit(UnitId),
}

#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fog-of-war system that derives what an observer can currently see.
//!
//! Visibility is recomputed from scratch: every tracked tile is dimmed, then
//! each tile within sight of one of the observer's units is lit again.
//! Nothing is deleted, so dimmed terrain and foreign units remain in the
//! store for renderers to draw greyed out.

use std::collections::BTreeSet;

use fog_sync_core::{GridPoint, PlayerId, UnitId};
use fog_sync_world::{query, World};

/// Snapshot of the tiles and units an observer sees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilityMask {
    tiles: BTreeSet<GridPoint>,
    units: BTreeSet<UnitId>,
}

impl VisibilityMask {
    /// Reports whether the tile at `point` is lit.
    #[must_use]
    pub fn is_tile_visible(&self, point: GridPoint) -> bool {
        self.tiles.contains(&point)
    }

    /// Reports whether the unit is drawn at full brightness.
    #[must_use]
    pub fn is_unit_visible(&self, unit: UnitId) -> bool {
        self.units.contains(&unit)
    }

    /// Lit tiles in ascending order.
    pub fn tiles(&self) -> impl Iterator<Item = GridPoint> + '_ {
        self.tiles.iter().copied()
    }

    /// Visible units in ascending order.
    pub fn units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().copied()
    }
}

/// Visibility system reusing a scratch buffer of observer positions.
#[derive(Debug, Default)]
pub struct Visibility {
    lit: Vec<GridPoint>,
}

impl Visibility {
    /// Creates a visibility system with empty scratch space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recomputes the `visible` flag of every tracked tile for `observer`.
    ///
    /// A unit is visible when the observer owns it or when it stands on a
    /// lit tile. Offsets that fall on untracked tiles are skipped.
    pub fn recompute(&mut self, world: &mut World, observer: PlayerId) -> VisibilityMask {
        self.lit.clear();
        for unit in query::units_by_owner(world, observer) {
            let origin = unit.grid_point();
            self.lit.extend(
                unit.sight_offsets
                    .as_slice()
                    .iter()
                    .map(|offset| origin.offset(*offset)),
            );
        }

        for tile in world.tiles_mut() {
            tile.visible = false;
        }

        let mut mask = VisibilityMask::default();
        for point in &self.lit {
            if let Some(tile) = world.tile_mut(*point) {
                tile.visible = true;
                let _ = mask.tiles.insert(*point);
            }
        }

        for unit in query::units(world) {
            if unit.owner_id == observer || mask.is_tile_visible(unit.grid_point()) {
                let _ = mask.units.insert(unit.id);
            }
        }
        mask
    }
}

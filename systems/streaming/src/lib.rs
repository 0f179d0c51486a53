#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Viewport-driven map streaming.
//!
//! Observers translate their screen layout into a grid rectangle and request
//! only the parts of it they have not asked for before. The cache tracks the
//! last requested rectangle; when the viewport scrolls it emits one
//! `MapLoad` per newly exposed strip, and when it jumps to a disjoint region
//! it requests the whole rectangle again.

use fog_sync_core::{Action, GridRect, MapLoad, PlayerId};
use serde::{Deserialize, Serialize};

/// Side length of a tile on screen, in pixels, unless configured otherwise.
pub const DEFAULT_TILE_SIZE_PX: f64 = 16.0;

/// Screen geometry an observer is currently rendering.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    /// Viewport width in pixels.
    pub width_px: f64,
    /// Viewport height in pixels.
    pub height_px: f64,
    /// Horizontal scroll offset in pixels.
    pub scroll_x: f64,
    /// Vertical scroll offset in pixels.
    pub scroll_y: f64,
    /// Side length of a tile in pixels.
    pub tile_size_px: f64,
}

impl Layout {
    /// Creates a layout scrolled to the origin.
    #[must_use]
    pub const fn new(width_px: f64, height_px: f64, tile_size_px: f64) -> Self {
        Self {
            width_px,
            height_px,
            scroll_x: 0.0,
            scroll_y: 0.0,
            tile_size_px,
        }
    }

    /// Returns the layout scrolled to the provided offsets.
    #[must_use]
    pub const fn scrolled_to(self, scroll_x: f64, scroll_y: f64) -> Self {
        Self {
            scroll_x,
            scroll_y,
            ..self
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(800.0, 600.0, DEFAULT_TILE_SIZE_PX)
    }
}

/// Grid rectangle covered by the layout.
///
/// Partially visible tiles on the trailing edges are included. A
/// non-positive tile size falls back to [`DEFAULT_TILE_SIZE_PX`].
#[must_use]
pub fn viewport(layout: &Layout) -> GridRect {
    let tile = if layout.tile_size_px > 0.0 {
        layout.tile_size_px
    } else {
        DEFAULT_TILE_SIZE_PX
    };
    GridRect::new(
        (layout.scroll_x / tile).floor() as i32,
        (layout.scroll_y / tile).floor() as i32,
        ((layout.scroll_x + layout.width_px) / tile).ceil() as i32,
        ((layout.scroll_y + layout.height_px) / tile).ceil() as i32,
    )
}

/// Portions of `next` that lie outside `previous`.
///
/// Strips are returned in left, top, right, bottom order and may overlap at
/// the corners. Callers handle the disjoint case themselves.
#[must_use]
pub fn exposed_strips(previous: GridRect, next: GridRect) -> Vec<GridRect> {
    let (old_min, old_max) = (previous.min(), previous.max());
    let (new_min, new_max) = (next.min(), next.max());
    let mut strips = Vec::with_capacity(4);

    if new_min.x < old_min.x {
        strips.push(GridRect::new(new_min.x, new_min.y, old_min.x, new_max.y));
    }
    if new_min.y < old_min.y {
        strips.push(GridRect::new(new_min.x, new_min.y, new_max.x, old_min.y));
    }
    if new_max.x > old_max.x {
        strips.push(GridRect::new(old_max.x, new_min.y, new_max.x, new_max.y));
    }
    if new_max.y > old_max.y {
        strips.push(GridRect::new(new_min.x, old_max.y, new_max.x, new_max.y));
    }
    strips
}

/// Remembers the last requested viewport of a single observer.
#[derive(Debug, Default)]
pub struct StreamingCache {
    current: Option<GridRect>,
}

impl StreamingCache {
    /// Creates a cache that has not requested anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last requested viewport, if any.
    #[must_use]
    pub const fn current(&self) -> Option<GridRect> {
        self.current
    }

    /// Forgets the stored viewport so the next recompute loads everything.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Requests the parts of `rect` not covered by the previous viewport.
    ///
    /// The stored viewport is replaced immediately, before any response
    /// arrives. An unchanged viewport emits nothing.
    pub fn recompute(&mut self, rect: GridRect, player_id: PlayerId, out: &mut Vec<Action>) {
        let previous = self.current.replace(rect);
        match previous {
            Some(previous) if previous == rect => {}
            Some(previous) if previous.intersects(&rect) => {
                out.extend(
                    exposed_strips(previous, rect)
                        .into_iter()
                        .map(|strip| Action::MapLoad(MapLoad::new(strip, player_id))),
                );
            }
            _ => out.push(Action::MapLoad(MapLoad::new(rect, player_id))),
        }
    }
}

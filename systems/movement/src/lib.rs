#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Discrete movement system that plans grid paths and steps units along them.
//!
//! Units are either idle (path empty or fully consumed) or committed to a
//! path. Each tick a committed unit glides toward `path[step]`; once it is
//! close enough it snaps onto the point, advances `step`, and reports the
//! snap as a [`MoveStep`] action. Glides between snaps are never reported.

use fog_sync_core::{Action, GridPoint, MoveStep, Unit};
use glam::DVec2;

/// Distance, in grid units, a unit glides per tick.
pub const UNIT_SPEED: f64 = 0.1;

/// Remaining distance below which a unit snaps onto its next path point.
pub const SNAP_DISTANCE: f64 = 0.1;

/// Advances one grid unit along each axis toward `target`.
///
/// Axes already aligned with the target stay put, so the result equals
/// `target` once both axes line up.
#[must_use]
pub fn step_toward(from: GridPoint, target: GridPoint) -> GridPoint {
    GridPoint::new(
        from.x + axis_step(from.x, target.x),
        from.y + axis_step(from.y, target.y),
    )
}

fn axis_step(from: i32, target: i32) -> i32 {
    i32::from(target > from) - i32::from(target < from)
}

/// Plans a Chebyshev path from `from` to `target`.
///
/// The path starts with `from` and appends one point per iteration, taking
/// exactly `max(|dx|, |dy|)` iterations.
#[must_use]
pub fn plan_path(from: GridPoint, target: GridPoint) -> Vec<GridPoint> {
    let iterations = from.x.abs_diff(target.x).max(from.y.abs_diff(target.y));
    let mut path = Vec::with_capacity(iterations as usize + 1);
    let mut current = from;
    path.push(current);
    for _ in 0..iterations {
        current = step_toward(current, target);
        path.push(current);
    }
    debug_assert_eq!(current, target);
    path
}

/// Commits the unit to a path toward `target`.
///
/// Returns `false` without touching the unit when its current path already
/// ends at `target`.
pub fn start(unit: &mut Unit, target: GridPoint) -> bool {
    if unit.destination() == Some(target) {
        return false;
    }

    unit.path = plan_path(unit.grid_point(), target);
    unit.step = 0;
    true
}

/// Returns the unit to idle by discarding its path.
pub fn stop(unit: &mut Unit) {
    unit.path.clear();
    unit.step = 0;
}

/// Per-tick stepping parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Movement {
    speed: f64,
    snap_distance: f64,
}

impl Movement {
    /// Creates a stepping configuration.
    ///
    /// A glide never carries a unit past its next point, so speeds larger
    /// than the snap distance still settle on every path point.
    #[must_use]
    pub const fn new(speed: f64, snap_distance: f64) -> Self {
        Self {
            speed,
            snap_distance,
        }
    }

    /// Distance glided per tick.
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Moves the unit for a single tick.
    ///
    /// A snap onto the next path point pushes a [`MoveStep`] describing the
    /// unit's new position, path, and step into `out`.
    pub fn advance(&self, unit: &mut Unit, out: &mut Vec<Action>) {
        let Some(next) = unit.path.get(unit.step).copied() else {
            return;
        };

        let current = DVec2::new(unit.position.x, unit.position.y);
        let goal = DVec2::new(f64::from(next.x), f64::from(next.y));
        let delta = goal - current;

        if delta.length() < self.snap_distance {
            unit.position = next.to_position();
            unit.step += 1;
            out.push(Action::MoveStep(MoveStep {
                unit_id: unit.id,
                position: unit.position,
                path: unit.path.clone(),
                step: unit.step,
            }));
            return;
        }

        let moved = current + delta.normalize() * self.speed.min(delta.length());
        unit.position.x = moved.x;
        unit.position.y = moved.y;
    }
}

impl Default for Movement {
    fn default() -> Self {
        Self::new(UNIT_SPEED, SNAP_DISTANCE)
    }
}

//! Session configuration loaded from TOML.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use fog_sync_core::GridPoint;
use fog_sync_system_authority::{Limits, SpawnPool, WorldProvider, DEFAULT_SPAWN_POINTS};
use fog_sync_system_streaming::{Layout, DEFAULT_TILE_SIZE_PX};
use serde::{Deserialize, Serialize};

use crate::provider::{GeneratedWorldProvider, HttpWorldProvider};

/// Where the authority fetches terrain it has never seen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WorldSource {
    /// Remote world-data service.
    Http {
        /// Base URL, for example `http://localhost:8080`.
        base_url: String,
        /// Request timeout in milliseconds.
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    /// Deterministic terrain generated from a seed.
    Generated {
        /// Seed shared by every tile.
        seed: u64,
    },
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl WorldSource {
    /// Builds the provider this source describes.
    #[must_use]
    pub fn provider(&self) -> Box<dyn WorldProvider + Send> {
        match self {
            Self::Http {
                base_url,
                timeout_ms,
            } => Box::new(HttpWorldProvider::new(
                base_url.clone(),
                Duration::from_millis(*timeout_ms),
            )),
            Self::Generated { seed } => Box::new(GeneratedWorldProvider::new(*seed)),
        }
    }
}

impl Default for WorldSource {
    fn default() -> Self {
        Self::Generated { seed: 0x5eed_f0c5 }
    }
}

/// Tunables shared by the authority and its mirrors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of every actor queue.
    pub queue_capacity: usize,
    /// Milliseconds between mirror ticks; zero disables the timer.
    pub tick_interval_ms: u64,
    /// Spawn points handed to players on their first join, in order.
    pub spawn_points: Vec<GridPoint>,
    /// Footprint of newly spawned units.
    pub unit_size: (i32, i32),
    /// Terrain source used by the authority.
    pub world: WorldSource,
    /// Initial viewport of every mirror.
    pub viewport: Layout,
    /// Longest move a player may order in one `MoveStart`.
    pub max_move_distance: u32,
    /// Most tiles a player may request in one `MapLoad`.
    pub max_map_area: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            tick_interval_ms: 16,
            spawn_points: DEFAULT_SPAWN_POINTS.to_vec(),
            unit_size: (1, 1),
            world: WorldSource::default(),
            viewport: Layout::new(320.0, 240.0, DEFAULT_TILE_SIZE_PX),
            max_move_distance: Limits::default().max_move_distance,
            max_map_area: Limits::default().max_map_area,
        }
    }
}

impl SessionConfig {
    /// Parses a configuration from TOML; missing fields take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse session config toml contents")
    }

    /// Reads and parses a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read session config at {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid session config at {}", path.display()))
    }

    /// Tick period, if automatic ticking is enabled.
    #[must_use]
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }

    /// Spawn pool built from the configured points.
    #[must_use]
    pub fn spawn_pool(&self) -> SpawnPool {
        SpawnPool::new(self.spawn_points.iter().copied())
    }

    /// Bounds the authority enforces on inbound actions.
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_move_distance: self.max_move_distance,
            max_map_area: self.max_map_area,
        }
    }

    /// Queue capacity, never below one.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

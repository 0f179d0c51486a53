//! World-data providers available to the authority.

use std::{sync::OnceLock, time::Duration};

use fog_sync_core::{GridPoint, LandClassifiers, MapRequest, MapResponse, Tile};
use fog_sync_system_authority::{ProviderError, WorldProvider};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use reqwest::blocking::Client;
use tracing::debug;

const RECT_ENDPOINT: &str = "/api/map/rect";

/// Fetches terrain from a remote world-data service over HTTP.
///
/// The blocking client is built on first use so the provider can be created
/// from async code and only exercised from the authority's blocking task.
#[derive(Debug)]
pub struct HttpWorldProvider {
    base_url: String,
    timeout: Duration,
    client: OnceLock<Client>,
}

impl HttpWorldProvider {
    /// Creates a provider for the service rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: OnceLock::new(),
        }
    }

    /// Full URL of the rectangle endpoint, without query parameters.
    #[must_use]
    pub fn rect_url(&self) -> String {
        format!("{}{RECT_ENDPOINT}", self.base_url.trim_end_matches('/'))
    }

    fn client(&self) -> Result<&Client, ProviderError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|error| ProviderError::Unavailable(Box::new(error)))?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl WorldProvider for HttpWorldProvider {
    fn load(&self, request: &MapRequest) -> Result<MapResponse, ProviderError> {
        let url = self.rect_url();
        debug!(%url, rect = %request.rect(), "requesting terrain");
        let response = self
            .client()?
            .get(&url)
            .query(&[
                ("minX", request.min_x),
                ("minY", request.min_y),
                ("maxX", request.max_x),
                ("maxY", request.max_y),
            ])
            .send()
            .map_err(|error| ProviderError::Unavailable(Box::new(error)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        response
            .json::<MapResponse>()
            .map_err(|error| ProviderError::Malformed(Box::new(error)))
    }
}

/// Produces deterministic terrain from a seed without any network access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratedWorldProvider {
    seed: u64,
}

impl GeneratedWorldProvider {
    /// Creates a generator for the given seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Terrain at a single point. The same seed and point always agree.
    #[must_use]
    pub fn tile_at(&self, point: GridPoint) -> Tile {
        let mixed = ((u64::from(point.x as u32) << 32) | u64::from(point.y as u32))
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ mixed);
        let ground_level: i32 = rng.gen_range(0..200);
        let (land_type, water_level) = match ground_level {
            0..=39 => ("water", Some(40)),
            40..=99 => ("plains", None),
            100..=149 => ("forest", None),
            150..=179 => ("hills", None),
            _ => ("mountains", None),
        };

        Tile {
            point,
            land: LandClassifiers {
                value: format!("{land_type}-{}", rng.gen_range(0..4)),
                land_type: land_type.to_owned(),
                front_style_class: format!("{land_type}-front"),
                back_style_class: format!("{land_type}-back"),
                ground_level,
                water_level,
                post_glacial: rng.gen_bool(0.1),
            },
            ..Tile::default()
        }
    }
}

impl WorldProvider for GeneratedWorldProvider {
    fn load(&self, request: &MapRequest) -> Result<MapResponse, ProviderError> {
        let rect = request.rect();
        Ok(MapResponse {
            tiles: rect.points().map(|point| self.tile_at(point)).collect(),
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }
}

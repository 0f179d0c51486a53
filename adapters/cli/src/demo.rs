//! Headless session used by `fog-sync demo`.

use std::{collections::BTreeSet, fmt::Write as _, sync::Arc, time::Duration};

use anyhow::{ensure, Context, Result};
use fog_sync_core::{GridPoint, GridRect, PlayerId};
use fog_sync_session::{
    color_for_name, AuthorityHandle, AuthoritySnapshot, ChannelTransport, MirrorHandle,
    SessionConfig,
};
use fog_sync_system_mirror::MirrorSnapshot;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const SETTLE_DELAY: Duration = Duration::from_millis(100);
const COLOR_SEED: u64 = 0xc0_10ae;

/// Runs a session with one mirror per player and renders what each sees.
pub(crate) async fn run(
    config: &SessionConfig,
    players: &[String],
    ticks: u32,
) -> Result<String> {
    ensure!(!players.is_empty(), "at least one player is required");
    let unique: BTreeSet<PlayerId> = players
        .iter()
        .map(|name| PlayerId::from_name(name))
        .collect();
    ensure!(unique.len() == players.len(), "player names must be distinct");

    let mut rng = ChaCha8Rng::seed_from_u64(COLOR_SEED);
    let mut authority = AuthorityHandle::spawn(config, config.world.provider());
    let mut mirrors = Vec::with_capacity(players.len());
    for name in players {
        let (server_end, client_end) = ChannelTransport::pair();
        let _ = authority.connect(Arc::new(server_end)).await?;
        let color = color_for_name(name, &mut rng);
        mirrors.push(MirrorHandle::spawn(name, color, Arc::new(client_end), config));
    }

    for (index, mirror) in mirrors.iter().enumerate() {
        let start = own_unit_point(mirror).await?;
        let target = GridPoint::new(4 + index as i32, 4);
        let _ = mirror
            .select(GridRect::new(start.x, start.y, start.x, start.y), false)
            .await?;
        mirror.move_selected(target).await?;
        info!(player = %mirror.player_id(), %start, %target, "unit ordered");
    }

    match config.tick_interval() {
        Some(period) => tokio::time::sleep(period * ticks).await,
        None => {
            for _ in 0..ticks {
                for mirror in &mirrors {
                    mirror.tick().await?;
                }
            }
        }
    }
    tokio::time::sleep(SETTLE_DELAY).await;

    let mut views = Vec::with_capacity(mirrors.len());
    for (name, mirror) in players.iter().zip(&mirrors) {
        views.push((name.as_str(), mirror.snapshot().await?));
    }
    let reference = authority.snapshot().await?;
    let report = render(&reference, &views);

    for mirror in mirrors {
        mirror.shutdown().await?;
    }
    authority.shutdown().await?;
    Ok(report)
}

async fn own_unit_point(mirror: &MirrorHandle) -> Result<GridPoint> {
    tokio::time::timeout(JOIN_TIMEOUT, poll_own_unit(mirror))
        .await
        .with_context(|| format!("player {} never received a unit", mirror.player_id()))?
}

async fn poll_own_unit(mirror: &MirrorHandle) -> Result<GridPoint> {
    loop {
        let snapshot = mirror.snapshot().await?;
        if let Some(unit) = snapshot
            .units
            .iter()
            .find(|unit| unit.owner_id == snapshot.player_id)
        {
            return Ok(unit.grid_point());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn render(reference: &AuthoritySnapshot, views: &[(&str, MirrorSnapshot)]) -> String {
    let mut report = String::new();
    let _ = writeln!(
        report,
        "authority: {} players, {} units, {} tiles",
        reference.players.len(),
        reference.units.len(),
        reference.tiles
    );
    for (name, view) in views {
        let visible: BTreeSet<GridPoint> = view.visible_tiles.iter().copied().collect();
        let _ = writeln!(
            report,
            "{name}: {} tiles loaded, {} visible",
            view.tiles,
            visible.len()
        );
        for unit in &view.units {
            let point = unit.grid_point();
            let owned = unit.owner_id == view.player_id;
            if owned || visible.contains(&point) {
                let marker = if owned { "own" } else { "seen" };
                let _ = writeln!(report, "  {marker} unit at {point}");
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_config() -> SessionConfig {
        SessionConfig {
            tick_interval_ms: 0,
            ..SessionConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn demo_reports_every_player() {
        let players = vec!["red".to_owned(), "blue".to_owned()];
        let report = run(&manual_config(), &players, 150).await.unwrap();

        assert!(report.starts_with("authority: 2 players, 2 units"));
        assert!(report.contains("red: "));
        assert!(report.contains("blue: "));
        assert!(report.contains("  own unit at (4, 4)"));
        assert!(report.contains("  own unit at (5, 4)"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_names_are_rejected() {
        let players = vec!["red".to_owned(), " RED ".to_owned()];
        let error = run(&manual_config(), &players, 1).await.unwrap_err();
        assert!(error.to_string().contains("distinct"));
    }
}

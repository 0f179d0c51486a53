use std::{future::Future, sync::Arc, time::Duration};

use fog_sync_core::{encode, Action, Color, GridPoint, GridRect, Player, PlayerId};
use fog_sync_session::{
    AuthorityHandle, ChannelTransport, GeneratedWorldProvider, MirrorHandle, SessionConfig,
    Transport, TransportError,
};

fn manual_config() -> SessionConfig {
    SessionConfig {
        tick_interval_ms: 0,
        ..SessionConfig::default()
    }
}

/// Polls `check` until it yields a value or the deadline passes.
async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..200 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Reads from `transport` on a blocking thread until the peer hangs up and
/// returns how many actions arrived first.
async fn count_until_hangup(transport: Arc<ChannelTransport>) -> usize {
    let reader = tokio::task::spawn_blocking(move || {
        let mut received = 0;
        loop {
            match transport.receive_next() {
                Ok(_) => received += 1,
                Err(TransportError::Closed) => break received,
                Err(_) => {}
            }
        }
    });
    tokio::time::timeout(Duration::from_secs(5), reader)
        .await
        .expect("peer never hung up")
        .unwrap()
}

async fn own_unit_point(mirror: &MirrorHandle) -> GridPoint {
    let owner = mirror.player_id();
    eventually(|| async move {
        let snapshot = mirror.snapshot().await.unwrap();
        snapshot
            .units
            .iter()
            .find(|unit| unit.owner_id == owner)
            .map(|unit| unit.grid_point())
    })
    .await
}

async fn connect_mirror(
    authority: &mut AuthorityHandle,
    name: &str,
    color: Color,
    config: &SessionConfig,
) -> MirrorHandle {
    let (server_end, client_end) = ChannelTransport::pair();
    let _ = authority.connect(Arc::new(server_end)).await.unwrap();
    MirrorHandle::spawn(name, color, Arc::new(client_end), config)
}

#[tokio::test(flavor = "multi_thread")]
async fn mirrors_join_spawn_and_stream_the_viewport() {
    let config = manual_config();
    let mut authority = AuthorityHandle::spawn(&config, GeneratedWorldProvider::new(11));
    let red = connect_mirror(&mut authority, "red", Color::from_rgb(255, 0, 0), &config).await;

    let mirror = &red;
    let snapshot = eventually(|| async move {
        let snapshot = mirror.snapshot().await.unwrap();
        (snapshot.units.len() == 1 && snapshot.tiles == 21 * 16).then_some(snapshot)
    })
    .await;
    assert_eq!(snapshot.player_id, PlayerId::from_name("red"));
    assert_eq!(snapshot.units[0].grid_point(), GridPoint::new(1, 1));
    assert_eq!(snapshot.viewport, Some(GridRect::new(0, 0, 20, 15)));
    assert!(snapshot.visible_tiles.contains(&GridPoint::new(1, 1)));
    assert!(!snapshot.visible_tiles.contains(&GridPoint::new(15, 15)));

    let reference = authority.snapshot().await.unwrap();
    assert_eq!(reference.players.len(), 1);
    assert_eq!(reference.units.len(), 1);
    assert_eq!(reference.units[0].id, snapshot.units[0].id);
    assert_eq!(reference.spawn_points_left, 3);
    assert_eq!(reference.connections, 1);

    red.shutdown().await.unwrap();
    authority.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn movement_reaches_the_other_mirror() {
    let config = manual_config();
    let mut authority = AuthorityHandle::spawn(&config, GeneratedWorldProvider::new(5));
    let red = connect_mirror(&mut authority, "red", Color::from_rgb(255, 0, 0), &config).await;
    let blue = connect_mirror(&mut authority, "blue", Color::from_rgb(0, 0, 255), &config).await;

    for mirror in [&red, &blue] {
        eventually(|| async move {
            let snapshot = mirror.snapshot().await.unwrap();
            (snapshot.units.len() == 2).then_some(())
        })
        .await;
    }

    // Joins on separate connections are unordered, so red may hold any spawn point.
    let red_id = red.player_id();
    let start = own_unit_point(&red).await;
    let single = GridRect::new(start.x, start.y, start.x, start.y);
    assert_eq!(red.select(single, false).await.unwrap(), 1);

    let target = GridPoint::new(5, 4);
    red.move_selected(target).await.unwrap();
    let mut arrived = false;
    for _ in 0..40 {
        for _ in 0..10 {
            red.tick().await.unwrap();
        }
        let snapshot = red.snapshot().await.unwrap();
        let unit = snapshot
            .units
            .iter()
            .find(|unit| unit.owner_id == red_id)
            .expect("red unit");
        if unit.grid_point() == target && unit.is_idle() {
            arrived = true;
            break;
        }
    }
    assert!(arrived, "red unit never reached its target");

    let observer = &blue;
    let seen_by_blue = eventually(|| async move {
        let snapshot = observer.snapshot().await.unwrap();
        snapshot
            .units
            .into_iter()
            .find(|unit| unit.owner_id == red_id && unit.grid_point() == target)
    })
    .await;
    assert_eq!(seen_by_blue.grid_point(), target);
    assert!(
        observer
            .snapshot()
            .await
            .unwrap()
            .visible_tiles
            .contains(&target),
        "blue sees the tile red stands on"
    );

    let reference_handle = &authority;
    let reference = eventually(|| async move {
        let snapshot = reference_handle.snapshot().await.unwrap();
        snapshot
            .units
            .iter()
            .any(|unit| unit.owner_id == red_id && unit.grid_point() == target)
            .then_some(snapshot)
    })
    .await;
    assert_eq!(reference.players.len(), 2);

    red.shutdown().await.unwrap();
    blue.shutdown().await.unwrap();
    authority.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_message_types_change_nothing() {
    let config = manual_config();
    let mut authority = AuthorityHandle::spawn(&config, GeneratedWorldProvider::new(1));
    let (server_end, client_end) = ChannelTransport::pair();
    let client_end = Arc::new(client_end);
    let _ = authority.connect(Arc::new(server_end)).await.unwrap();

    let before = authority.snapshot().await.unwrap();
    client_end
        .send_bytes(br#"{"type":"Teleport","payload":{"x":1}}"#.to_vec())
        .unwrap();
    let join = Action::PlayerJoin(Player::named("green", Color::from_rgb(0, 255, 0)));
    client_end.send_bytes(encode(&join).unwrap()).unwrap();

    let reader = Arc::clone(&client_end);
    let reply = tokio::task::spawn_blocking(move || reader.receive_next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(reply, Action::PlayerJoinSuccess(success) if success.units.is_empty()));

    let after = authority.snapshot().await.unwrap();
    assert!(before.players.is_empty());
    assert_eq!(after.players.len(), 1, "only the valid join took effect");
    assert_eq!(after.connections, 1);

    client_end.close();
    authority.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn hanging_up_releases_the_connection() {
    let config = manual_config();
    let mut authority = AuthorityHandle::spawn(&config, GeneratedWorldProvider::new(2));
    let red = connect_mirror(&mut authority, "red", Color::from_rgb(255, 0, 0), &config).await;
    let handle = &authority;
    eventually(|| async move {
        let snapshot = handle.snapshot().await.unwrap();
        (snapshot.units.len() == 1).then_some(())
    })
    .await;

    red.shutdown().await.unwrap();
    let snapshot = eventually(|| async move {
        let snapshot = handle.snapshot().await.unwrap();
        (snapshot.connections == 0).then_some(snapshot)
    })
    .await;
    assert_eq!(snapshot.units.len(), 1, "units outlive their connection");

    authority.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn mirror_keeps_answering_after_the_authority_hangs_up() {
    let config = manual_config();
    let (server_end, client_end) = ChannelTransport::pair();
    drop(server_end);
    let orphan = MirrorHandle::spawn(
        "blue",
        Color::from_rgb(0, 0, 255),
        Arc::new(client_end),
        &config,
    );

    orphan.tick().await.unwrap();
    let snapshot = orphan.snapshot().await.unwrap();
    assert!(snapshot.units.is_empty());
    assert_eq!(snapshot.viewport, Some(GridRect::new(0, 0, 20, 15)));
    assert_eq!(snapshot.tiles, 0);

    orphan.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_authority_hangs_up_its_connections() {
    let config = manual_config();
    let mut authority = AuthorityHandle::spawn(&config, GeneratedWorldProvider::new(3));
    let (server_end, client_end) = ChannelTransport::pair();
    let client_end = Arc::new(client_end);
    let _ = authority.connect(Arc::new(server_end)).await.unwrap();
    let join = Action::PlayerJoin(Player::named("green", Color::from_rgb(0, 255, 0)));
    client_end.send(&join).unwrap();

    drop(authority);
    let _ = count_until_hangup(Arc::clone(&client_end)).await;
    assert!(!client_end.is_alive());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_a_mirror_hangs_up_its_transport() {
    let config = manual_config();
    let (server_end, client_end) = ChannelTransport::pair();
    let server_end = Arc::new(server_end);
    let mirror = MirrorHandle::spawn(
        "red",
        Color::from_rgb(255, 0, 0),
        Arc::new(client_end),
        &config,
    );
    let _ = mirror.snapshot().await.unwrap();

    drop(mirror);
    let received = count_until_hangup(Arc::clone(&server_end)).await;
    assert!(received >= 1, "the join request went out before the hang-up");
    assert!(!server_end.is_alive());
}

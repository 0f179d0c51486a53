//! Self-describing envelope used to move actions across transports.
//!
//! Every action is written as `{"type": "<Kind>", "payload": …}`. Decoding
//! happens in two passes: the discriminant is read from a generic envelope
//! first, then the payload is decoded against the shape that discriminant
//! prescribes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{Action, ActionKind};

/// Errors raised while converting actions to or from the wire envelope.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The envelope carried a discriminant outside the closed action set.
    #[error("unrecognized action kind `{0}`")]
    UnrecognizedActionKind(String),
    /// The bytes were not a well-formed envelope.
    #[error("malformed action envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The payload did not match the shape required by its discriminant.
    #[error("invalid {kind} payload: {source}")]
    Payload {
        /// Discriminant whose payload failed to decode.
        kind: ActionKind,
        /// Underlying decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize)]
struct OutgoingEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a T,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Serialises the action into its wire envelope.
///
/// Field order is fixed by the payload types, so equal actions always
/// produce identical bytes.
pub fn encode(action: &Action) -> Result<Vec<u8>, WireError> {
    match action {
        Action::PlayerJoin(player) => envelope(action.kind(), player),
        Action::PlayerJoinSuccess(payload) => envelope(action.kind(), payload),
        Action::SpawnUnit(unit) => envelope(action.kind(), unit),
        Action::MoveStart(payload) => envelope(action.kind(), payload),
        Action::MoveStep(payload) => envelope(action.kind(), payload),
        Action::MoveStop(unit_id) => envelope(action.kind(), unit_id),
        Action::MapLoad(payload) => envelope(action.kind(), payload),
        Action::MapLoadSuccess(payload) => envelope(action.kind(), payload),
    }
}

/// Reconstructs an action from its wire envelope.
pub fn decode(bytes: &[u8]) -> Result<Action, WireError> {
    let IncomingEnvelope { kind, payload } =
        serde_json::from_slice(bytes).map_err(WireError::Malformed)?;
    let kind: ActionKind = kind.parse()?;

    let action = match kind {
        ActionKind::PlayerJoin => Action::PlayerJoin(payload_as(kind, payload)?),
        ActionKind::PlayerJoinSuccess => Action::PlayerJoinSuccess(payload_as(kind, payload)?),
        ActionKind::SpawnUnit => Action::SpawnUnit(payload_as(kind, payload)?),
        ActionKind::MoveStart => Action::MoveStart(payload_as(kind, payload)?),
        ActionKind::MoveStep => Action::MoveStep(payload_as(kind, payload)?),
        ActionKind::MoveStop => Action::MoveStop(payload_as(kind, payload)?),
        ActionKind::MapLoad => Action::MapLoad(payload_as(kind, payload)?),
        ActionKind::MapLoadSuccess => Action::MapLoadSuccess(payload_as(kind, payload)?),
    };
    Ok(action)
}

fn envelope<T: Serialize>(kind: ActionKind, payload: &T) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(&OutgoingEnvelope {
        kind: kind.as_str(),
        payload,
    })
    .map_err(|source| WireError::Payload { kind, source })
}

fn payload_as<T: DeserializeOwned>(kind: ActionKind, payload: Value) -> Result<T, WireError> {
    serde_json::from_value(payload).map_err(|source| WireError::Payload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Color, GridPoint, GridRect, LandClassifiers, MapLoad, MapLoadSuccess, MapRequest,
        MoveStart, MoveStep, Player, PlayerId, PlayerJoinSuccess, Position, Tile, Unit, UnitId,
    };

    use proptest::prelude::*;

    fn red_player() -> Player {
        Player::named("red", Color::from_rgb(255, 0, 0))
    }

    fn unit_at(point: GridPoint) -> Unit {
        let player = red_player();
        Unit::new(UnitId::random(), player.id, player.color, point)
    }

    fn sample_actions() -> Vec<Action> {
        let player = red_player();
        let mut moving = unit_at(GridPoint::new(0, 0));
        moving.path = vec![GridPoint::new(0, 0), GridPoint::new(1, 1)];
        moving.step = 1;
        let tile = Tile {
            point: GridPoint::new(3, -2),
            land: LandClassifiers {
                value: "grass".to_owned(),
                land_type: "plains".to_owned(),
                back_style_class: "grass".to_owned(),
                ground_level: 100,
                water_level: Some(4),
                ..LandClassifiers::default()
            },
            ..Tile::default()
        };

        vec![
            Action::PlayerJoin(player.clone()),
            Action::PlayerJoinSuccess(PlayerJoinSuccess {
                player_id: player.id,
                units: vec![moving.clone()],
                players: vec![player.clone()],
            }),
            Action::SpawnUnit(unit_at(GridPoint::new(8, 8))),
            Action::MoveStart(MoveStart {
                unit_id: moving.id,
                point: GridPoint::new(5, -5),
            }),
            Action::MoveStep(MoveStep {
                unit_id: moving.id,
                position: Position::new(1.0, 1.0),
                path: moving.path.clone(),
                step: 2,
            }),
            Action::MoveStop(moving.id),
            Action::MapLoad(MapLoad::new(GridRect::new(0, 0, 10, 10), player.id)),
            Action::MapLoadSuccess(MapLoadSuccess {
                tiles: vec![tile],
                request: MapRequest::from(GridRect::new(3, -2, 3, -2)),
                player_id: player.id,
            }),
        ]
    }

    #[test]
    fn every_action_survives_the_envelope() {
        for action in sample_actions() {
            let bytes = encode(&action).expect("encode");
            let restored = decode(&bytes).expect("decode");
            assert_eq!(restored, action);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        for action in sample_actions() {
            assert_eq!(encode(&action).unwrap(), encode(&action.clone()).unwrap());
        }
    }

    #[test]
    fn envelope_uses_kind_tag_and_camel_case_payload() {
        let unit_id = UnitId::random();
        let bytes = encode(&Action::MoveStart(MoveStart {
            unit_id,
            point: GridPoint::new(3, 0),
        }))
        .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "MoveStart");
        assert_eq!(value["payload"]["unitId"], unit_id.to_string());
        assert_eq!(value["payload"]["point"]["x"], 3);

        let bytes = encode(&Action::MapLoad(MapLoad::new(
            GridRect::new(10, 0, 15, 10),
            PlayerId::from_name("red"),
        )))
        .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["payload"]["minX"], 10);
        assert_eq!(value["payload"]["maxX"], 15);
    }

    #[test]
    fn local_tile_state_is_not_transmitted() {
        let mut tile = Tile::empty(GridPoint::new(1, 1));
        tile.occupant = Some(UnitId::random());
        tile.visible = true;
        let action = Action::MapLoadSuccess(MapLoadSuccess {
            tiles: vec![tile],
            request: MapRequest::default(),
            player_id: PlayerId::from_name("red"),
        });

        let Action::MapLoadSuccess(restored) = decode(&encode(&action).unwrap()).unwrap() else {
            panic!("unexpected action kind");
        };
        assert_eq!(restored.tiles[0].occupant, None);
        assert!(!restored.tiles[0].visible);
    }

    #[test]
    fn unknown_discriminant_is_rejected() {
        let bytes = br#"{"type":"Teleport","payload":{"unitId":"x"}}"#;
        match decode(bytes) {
            Err(WireError::UnrecognizedActionKind(kind)) => assert_eq!(kind, "Teleport"),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn mismatched_payload_names_the_kind() {
        let bytes = br#"{"type":"MoveStop","payload":{"unitId":42}}"#;
        assert!(matches!(
            decode(bytes),
            Err(WireError::Payload {
                kind: ActionKind::MoveStop,
                ..
            })
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(decode(b"not json"), Err(WireError::Malformed(_))));
    }

    #[test]
    fn accumulated_glide_positions_survive_exactly() {
        let mut unit = unit_at(GridPoint::new(0, 0));
        for _ in 0..200 {
            unit.position.x += 0.1;
            let action = Action::SpawnUnit(unit.clone());
            assert_eq!(decode(&encode(&action).unwrap()).unwrap(), action);
        }
    }

    proptest! {
        #[test]
        fn mid_glide_units_keep_their_exact_position(
            x in -1.0e6f64..1.0e6,
            y in any::<f64>().prop_filter("finite", |value| value.is_finite()),
        ) {
            let mut unit = unit_at(GridPoint::new(0, 0));
            unit.position = Position::new(x, y);
            let player = red_player();
            let join = Action::PlayerJoinSuccess(PlayerJoinSuccess {
                player_id: player.id,
                units: vec![unit.clone()],
                players: vec![player],
            });

            for action in [Action::SpawnUnit(unit), join] {
                let restored = decode(&encode(&action).unwrap()).unwrap();
                prop_assert_eq!(restored, action);
            }
        }
    }
}

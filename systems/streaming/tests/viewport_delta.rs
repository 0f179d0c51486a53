use std::collections::BTreeSet;

use fog_sync_core::{Action, GridPoint, GridRect, PlayerId};
use fog_sync_system_streaming::StreamingCache;
use proptest::prelude::*;

fn rect() -> impl Strategy<Value = GridRect> {
    (-20i32..20, -20i32..20, 0i32..15, 0i32..15)
        .prop_map(|(x, y, w, h)| GridRect::new(x, y, x + w, y + h))
}

fn requested_points(out: &[Action]) -> BTreeSet<GridPoint> {
    out.iter()
        .filter_map(|action| match action {
            Action::MapLoad(load) => Some(load.request.rect()),
            _ => None,
        })
        .flat_map(|rect| rect.points().collect::<Vec<_>>())
        .collect()
}

proptest! {
    #[test]
    fn requests_cover_the_new_viewport_and_repeat_is_silent(first in rect(), second in rect()) {
        let player = PlayerId::from_name("streaming");
        let mut cache = StreamingCache::new();
        let mut out = Vec::new();

        cache.recompute(first, player, &mut out);
        let mut known = requested_points(&out);
        out.clear();

        cache.recompute(second, player, &mut out);
        known.extend(requested_points(&out));
        for point in second.points() {
            prop_assert!(known.contains(&point), "point {} never requested", point);
        }
        for action in &out {
            let Action::MapLoad(load) = action else {
                return Err(TestCaseError::fail(format!("unexpected action {action:?}")));
            };
            prop_assert!(load.request.rect().intersects(&second));
            prop_assert_eq!(load.player_id, player);
        }

        out.clear();
        cache.recompute(second, player, &mut out);
        prop_assert!(out.is_empty());
        prop_assert_eq!(cache.current(), Some(second));
    }
}

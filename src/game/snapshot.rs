//! Outbound world snapshot and the reporter boundary

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::game::bubble::{Bubble, BubbleId};

/// Every bubble (alive and eaten) plus every known player ID.
///
/// Serializes as `{"Bubbles": {ID: Bubble}, "Players": [ID]}` with bubbles
/// in store order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Snapshot {
    #[serde(serialize_with = "serialize_bubbles")]
    pub bubbles: Vec<Bubble>,
    pub players: Vec<BubbleId>,
}

fn serialize_bubbles<S: Serializer>(bubbles: &[Bubble], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(bubbles.len()))?;
    for bubble in bubbles {
        if let Some(id) = bubble.id() {
            map.serialize_entry(id, bubble)?;
        }
    }
    map.end()
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&Bubble> {
        self.bubbles
            .iter()
            .find(|b| b.id().map(|own| own.as_str() == id).unwrap_or(false))
    }

    pub fn alive_count(&self) -> usize {
        self.bubbles.iter().filter(|b| b.is_alive()).count()
    }
}

/// Receives snapshots at the end of qualifying ticks.
///
/// Called from inside the tick, so implementations must hand the snapshot
/// off and return immediately; they never wait on the network.
pub trait SnapshotReporter: Send {
    fn report(&self, snapshot: Snapshot);
}

impl<F> SnapshotReporter for F
where
    F: Fn(Snapshot) + Send,
{
    fn report(&self, snapshot: Snapshot) {
        self(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_wire_shape() {
        let mut eaten = Bubble::new(BubbleId::from("npc"), 2.0, Vec2::new(3.0, 4.0));
        eaten.body.eaten_by = Some(BubbleId::from("p1"));
        let snapshot = Snapshot {
            bubbles: vec![Bubble::new(BubbleId::from("p1"), 10.0, Vec2::ZERO), eaten],
            players: vec![BubbleId::from("p1")],
        };

        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["Players"], serde_json::json!(["p1"]));
        assert_eq!(json["Bubbles"]["p1"]["ID"], "p1");
        assert_eq!(json["Bubbles"]["p1"]["Body"]["Radius"], 10.0);
        assert_eq!(json["Bubbles"]["npc"]["Body"]["EatenBy"], "p1");
        assert_eq!(json["Bubbles"]["npc"]["Kinematic"]["Coordinate"], serde_json::json!([3.0, 4.0]));
    }

    #[test]
    fn test_bubbles_keep_store_order() {
        let snapshot = Snapshot {
            bubbles: ["c", "a", "b"]
                .iter()
                .map(|id| Bubble::new(BubbleId::from(*id), 1.0, Vec2::ZERO))
                .collect(),
            players: Vec::new(),
        };
        let text = serde_json::to_string(&snapshot).unwrap();
        let c = text.find("\"c\":").unwrap();
        let a = text.find("\"a\":").unwrap();
        let b = text.find("\"b\":").unwrap();
        assert!(c < a && a < b);
    }

    #[test]
    fn test_lookup_and_counts() {
        let mut dead = Bubble::new(BubbleId::from("d"), 1.0, Vec2::ZERO);
        dead.body.eaten_by = Some(BubbleId::from("x"));
        let snapshot = Snapshot {
            bubbles: vec![Bubble::new(BubbleId::from("a"), 1.0, Vec2::ZERO), dead],
            players: Vec::new(),
        };
        assert!(snapshot.get("d").is_some());
        assert!(snapshot.get("zzz").is_none());
        assert_eq!(snapshot.alive_count(), 1);
    }

    #[test]
    fn test_closure_reporter() {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(0usize));
        let counter = seen.clone();
        let reporter = move |snapshot: Snapshot| *counter.lock() += snapshot.bubbles.len();
        reporter.report(Snapshot {
            bubbles: vec![Bubble::new(BubbleId::from("a"), 1.0, Vec2::ZERO)],
            players: Vec::new(),
        });
        assert_eq!(*seen.lock(), 1);
    }
}

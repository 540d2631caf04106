//! # Timestamped events
//! Every event in a history is keyed by the moment it was recorded. The key is the only identity an event has:
//! two events with the same timestamp are the same logical event, whatever their payloads say.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// A UTC instant with millisecond precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        Ok(Self::from(
            DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc),
        ))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self(datetime.trunc_subsecs(3))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl serde::Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        use serde::Deserialize as _;

        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| D::Error::custom(format!("invalid timestamp `{s}`: {e}")))
    }
}

/// An event payload together with the moment it was recorded.
/// Serialized as a single flat object: `{ "timestamp": ..., ...payload }`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Timestamped<E> {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub event: E,
}

impl<E> Timestamped<E> {
    pub fn new(timestamp: Timestamp, event: E) -> Self {
        Self { timestamp, event }
    }

    pub fn now(event: E) -> Self {
        Self::new(Timestamp::now(), event)
    }
}

/// Merge two histories into one, keyed by timestamp.
///
/// Events from `a` are inserted first and events from `b` second, so on a timestamp collision the event from `b` wins.
/// Payloads are never compared. The result is sorted ascending by timestamp and holds one event per distinct timestamp.
pub fn merge_by_timestamp<E: Clone>(
    a: &[Timestamped<E>],
    b: &[Timestamped<E>],
) -> Vec<Timestamped<E>> {
    let mut by_timestamp: BTreeMap<Timestamp, &Timestamped<E>> = BTreeMap::new();
    for event in a.iter().chain(b) {
        by_timestamp.insert(event.timestamp, event);
    }
    by_timestamp.into_values().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn ev(s: &str, payload: &'static str) -> Timestamped<&'static str> {
        Timestamped::new(ts(s), payload)
    }

    #[test]
    fn test_timestamp_serializes_with_millis() {
        let t = ts("2025-03-01T12:00:00.5+02:00");
        assert_eq!(
            serde_json::to_string(&t).unwrap(),
            "\"2025-03-01T10:00:00.500Z\""
        );
    }

    #[test]
    fn test_timestamp_truncates_below_millis() {
        let t = ts("2025-03-01T10:00:00.123456789Z");
        assert_eq!(t.to_string(), "2025-03-01T10:00:00.123Z");
        assert_eq!(t, ts("2025-03-01T10:00:00.123Z"));
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        assert!(serde_json::from_str::<Timestamp>("\"yesterday\"").is_err());
    }

    #[test]
    fn test_merge_keeps_distinct_events_sorted() {
        let a = vec![ev("2025-01-03T00:00:00Z", "a3"), ev("2025-01-01T00:00:00Z", "a1")];
        let b = vec![ev("2025-01-02T00:00:00Z", "b2")];

        let merged = merge_by_timestamp(&a, &b);
        let payloads: Vec<_> = merged.iter().map(|e| e.event).collect();
        assert_eq!(payloads, vec!["a1", "b2", "a3"]);
    }

    #[test]
    fn test_merge_second_list_wins_on_collision() {
        let a = vec![ev("2025-01-01T00:00:00Z", "local")];
        let b = vec![ev("2025-01-01T00:00:00Z", "remote")];

        let merged = merge_by_timestamp(&a, &b);
        assert_eq!(merged, vec![ev("2025-01-01T00:00:00Z", "remote")]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = vec![
            ev("2025-01-01T00:00:00Z", "a1"),
            ev("2025-01-02T00:00:00Z", "a2"),
            ev("2025-01-04T00:00:00Z", "a4"),
        ];
        let b = vec![
            ev("2025-01-02T00:00:00Z", "b2"),
            ev("2025-01-03T00:00:00Z", "b3"),
        ];

        let once = merge_by_timestamp(&a, &b);
        let twice = merge_by_timestamp(&once, &b);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 4);
    }

    #[test]
    fn test_merge_collapses_duplicates_within_one_list() {
        let a = vec![
            ev("2025-01-01T00:00:00Z", "first"),
            ev("2025-01-01T00:00:00Z", "second"),
        ];

        let merged = merge_by_timestamp(&a, &[]);
        assert_eq!(merged, vec![ev("2025-01-01T00:00:00Z", "second")]);
    }

    #[test]
    fn test_merge_of_empty_lists_is_empty() {
        let merged = merge_by_timestamp::<&str>(&[], &[]);
        assert!(merged.is_empty());
    }

    fn at_second(second: u32, payload: u32) -> Timestamped<u32> {
        let datetime = DateTime::from_timestamp(1_735_689_600 + i64::from(second), 0).unwrap();
        Timestamped::new(Timestamp::from(datetime), payload)
    }

    #[test]
    fn test_merge_properties_over_collision_patterns() {
        // (seconds in a, seconds in b)
        let patterns: Vec<(Vec<u32>, Vec<u32>)> = vec![
            ((0..5).collect(), (5..10).collect()),
            ((0..6).collect(), (3..9).collect()),
            ((0..4).collect(), (0..4).collect()),
            (vec![1, 1, 2, 2, 3], vec![3, 4, 4]),
            (vec![9, 2, 7, 2], vec![]),
            (vec![], vec![5, 0, 5]),
            ((0..20).step_by(3).collect(), (0..20).step_by(2).collect()),
        ];

        for (a_seconds, b_seconds) in patterns {
            let a: Vec<_> = a_seconds.iter().enumerate().map(|(i, &s)| at_second(s, i as u32)).collect();
            let b: Vec<_> = b_seconds.iter().enumerate().map(|(i, &s)| at_second(s, 100 + i as u32)).collect();

            let merged = merge_by_timestamp(&a, &b);

            let mut expected: BTreeMap<Timestamp, u32> = BTreeMap::new();
            for event in a.iter().chain(&b) {
                expected.insert(event.timestamp, event.event);
            }
            assert_eq!(merged.len(), expected.len(), "{a_seconds:?} {b_seconds:?}");
            assert!(merged.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            for event in &merged {
                assert_eq!(expected.get(&event.timestamp), Some(&event.event));
            }

            assert_eq!(merge_by_timestamp(&merged, &b), merged);
            assert_eq!(merge_by_timestamp(&merged, &merged), merged);
        }
    }
}

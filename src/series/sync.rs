use std::collections::{HashMap, VecDeque};

use log::debug;

use super::record::Record;
use super::retention::RetentionPolicy;
use crate::error::{Error, Result};

/// One point in a bounded series. `value` is `None` when the source record
/// had no reading for this key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: f64,
    pub value: Option<f64>,
}

/// Ordered `(timestamp, value)` pairs for one series key.
///
/// Invariant: strictly increasing timestamps, no duplicates retained.
#[derive(Debug, Default)]
pub struct Series {
    points: VecDeque<SeriesPoint>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&SeriesPoint> {
        self.points.back()
    }

    pub fn oldest(&self) -> Option<&SeriesPoint> {
        self.points.front()
    }
}

enum State {
    Uninitialized,
    Tracking { series: HashMap<String, Series>, cursor: f64 },
}

/// Live series synchronizer for one record stream (one predictor overlay).
///
/// Two states only: uninitialized (no data fetched yet) and tracking.
/// [`SeriesSync::initialize`] is the sole transition between them; there is
/// no terminal state. The owning view holds this context explicitly, so a
/// torn-down view discards all of its series together.
pub struct SeriesSync {
    keys: Vec<String>,
    policy: RetentionPolicy,
    state: State,
}

impl SeriesSync {
    pub fn new(keys: impl IntoIterator<Item = String>, policy: RetentionPolicy) -> Self {
        SeriesSync {
            keys: keys.into_iter().collect(),
            policy,
            state: State::Uninitialized,
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, State::Tracking { .. })
    }

    /// The timestamp of the last record merged, unset until initialized.
    pub fn cursor(&self) -> Option<f64> {
        match self.state {
            State::Uninitialized => None,
            State::Tracking { cursor, .. } => Some(cursor),
        }
    }

    pub fn series(&self, key: &str) -> Option<&Series> {
        match &self.state {
            State::Uninitialized => None,
            State::Tracking { series, .. } => series.get(key),
        }
    }

    /// Seed one series per tracked key from a bulk fetch, apply retention,
    /// and set the cursor to the last record's timestamp.
    ///
    /// An empty bulk fetch is `Error::NoData` and leaves the synchronizer
    /// uninitialized.
    pub fn initialize(&mut self, bulk: &[Record], now: f64) -> Result<()> {
        if bulk.is_empty() {
            return Err(Error::NoData);
        }

        let mut series: HashMap<String, Series> = self
            .keys
            .iter()
            .map(|k| (k.clone(), Series::default()))
            .collect();

        let (cursor, _) = Self::append_records(&mut series, &self.keys, bulk, f64::NEG_INFINITY);
        for s in series.values_mut() {
            self.policy.evict(&mut s.points, now);
        }

        self.state = State::Tracking { series, cursor };
        Ok(())
    }

    /// Merge records that arrived since the cursor, then evict.
    ///
    /// Records at or before the cursor are skipped (strict `>` guards
    /// against re-processing the boundary record the source hands back).
    /// An empty batch is an idempotent no-op. Returns the number of records
    /// merged.
    pub fn merge(&mut self, incoming: &[Record], now: f64) -> Result<usize> {
        let (series, cursor) = match &mut self.state {
            State::Uninitialized => return Err(Error::Uninitialized),
            State::Tracking { series, cursor } => (series, cursor),
        };

        if incoming.is_empty() {
            return Ok(0);
        }

        let (advanced, merged) = Self::append_records(series, &self.keys, incoming, *cursor);
        *cursor = advanced;

        if merged > 0 {
            for s in series.values_mut() {
                self.policy.evict(&mut s.points, now);
            }
        }
        debug!("merged {} of {} incoming records", merged, incoming.len());

        Ok(merged)
    }

    /// Append records newer than `cursor` to every tracked series, in
    /// timestamp order. Returns the advanced cursor and how many records
    /// were appended. A record with a missing field appends `None` for that
    /// key so overlays stay aligned.
    fn append_records(
        series: &mut HashMap<String, Series>,
        keys: &[String],
        records: &[Record],
        mut cursor: f64,
    ) -> (f64, usize) {
        let mut appended = 0;
        for record in records {
            if record.timestamp <= cursor {
                continue;
            }
            for key in keys {
                if let Some(s) = series.get_mut(key) {
                    s.points.push_back(SeriesPoint {
                        timestamp: record.timestamp,
                        value: record.value(key),
                    });
                }
            }
            cursor = record.timestamp;
            appended += 1;
        }
        (cursor, appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(ts: f64, value: f64) -> Record {
        Record::new(ts).with_field("flow0", Some(value))
    }

    fn timestamps(sync: &SeriesSync, key: &str) -> Vec<f64> {
        sync.series(key).unwrap().iter().map(|p| p.timestamp).collect()
    }

    #[test]
    fn test_initialize_applies_retention_and_cursor() {
        // 3 records at t=1,2,3 with values 5,6,7 and K=2.
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(2));
        let bulk = vec![record(1.0, 5.0), record(2.0, 6.0), record(3.0, 7.0)];
        sync.initialize(&bulk, 3.0).unwrap();

        let s = sync.series("flow0").unwrap();
        let pts: Vec<(f64, Option<f64>)> = s.iter().map(|p| (p.timestamp, p.value)).collect();
        assert_eq!(pts, vec![(2.0, Some(6.0)), (3.0, Some(7.0))]);
        assert_eq!(sync.cursor(), Some(3.0));

        // Then merge a single new record.
        sync.merge(&[record(4.0, 8.0)], 4.0).unwrap();
        let s = sync.series("flow0").unwrap();
        let pts: Vec<(f64, Option<f64>)> = s.iter().map(|p| (p.timestamp, p.value)).collect();
        assert_eq!(pts, vec![(3.0, Some(7.0)), (4.0, Some(8.0))]);
        assert_eq!(sync.cursor(), Some(4.0));
    }

    #[test]
    fn test_initialize_empty_is_no_data() {
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(2));
        assert!(matches!(sync.initialize(&[], 0.0), Err(Error::NoData)));
        assert!(!sync.is_tracking());
        assert_eq!(sync.cursor(), None);
    }

    #[test]
    fn test_merge_before_initialize_fails() {
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(2));
        assert!(matches!(sync.merge(&[record(1.0, 1.0)], 1.0), Err(Error::Uninitialized)));
    }

    #[test]
    fn test_empty_merge_is_idempotent() {
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(10));
        sync.initialize(&[record(1.0, 5.0)], 1.0).unwrap();

        let before = timestamps(&sync, "flow0");
        assert_eq!(sync.merge(&[], 2.0).unwrap(), 0);
        assert_eq!(timestamps(&sync, "flow0"), before);
        assert_eq!(sync.cursor(), Some(1.0));
    }

    #[test]
    fn test_boundary_record_excluded() {
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(10));
        sync.initialize(&[record(1.0, 5.0), record(2.0, 6.0)], 2.0).unwrap();

        // First incoming record sits exactly on the cursor.
        let merged = sync.merge(&[record(2.0, 99.0), record(3.0, 7.0)], 3.0).unwrap();
        assert_eq!(merged, 1);
        assert_eq!(timestamps(&sync, "flow0"), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_no_data_loss_under_count_bound() {
        // Bulk [t1..t10], incoming [t11..t15], K=10 -> series ends [t6..t15].
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(10));
        let bulk: Vec<Record> = (1..=10).map(|t| record(t as f64, t as f64)).collect();
        sync.initialize(&bulk, 10.0).unwrap();

        let incoming: Vec<Record> = (11..=15).map(|t| record(t as f64, t as f64)).collect();
        assert_eq!(sync.merge(&incoming, 15.0).unwrap(), 5);

        let expect: Vec<f64> = (6..=15).map(|t| t as f64).collect();
        assert_eq!(timestamps(&sync, "flow0"), expect);
        assert_eq!(sync.cursor(), Some(15.0));
    }

    #[test]
    fn test_monotonic_after_out_of_order_batches() {
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Count(100));
        sync.initialize(&[record(5.0, 1.0)], 5.0).unwrap();
        // Stale and duplicated timestamps never make it into the series.
        sync.merge(&[record(3.0, 0.0), record(6.0, 2.0), record(6.0, 3.0)], 6.0).unwrap();
        sync.merge(&[record(4.0, 0.0)], 7.0).unwrap();

        let ts = timestamps(&sync, "flow0");
        assert_eq!(ts, vec![5.0, 6.0]);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_missing_field_appends_gap() {
        let mut sync = SeriesSync::new(
            vec!["flow0".into(), "pressure0".into()],
            RetentionPolicy::Count(10),
        );
        sync.initialize(&[record(1.0, 5.0)], 1.0).unwrap();
        sync.merge(&[record(2.0, 6.0)], 2.0).unwrap();

        // flow-only records still advance pressure0 with gaps, keeping the
        // two series index-aligned.
        let p = sync.series("pressure0").unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|pt| pt.value.is_none()));
        assert_eq!(sync.series("flow0").unwrap().len(), 2);
    }

    #[test]
    fn test_window_policy_bound_invariant() {
        let window = Duration::from_secs(30);
        let mut sync = SeriesSync::new(vec!["flow0".into()], RetentionPolicy::Window(window));
        let bulk: Vec<Record> = (0..40).map(|t| record(t as f64, 0.0)).collect();
        sync.initialize(&bulk, 39.0).unwrap();

        for p in sync.series("flow0").unwrap().iter() {
            assert!(p.timestamp >= 39.0 - 30.0);
        }

        sync.merge(&[record(60.0, 1.0)], 60.0).unwrap();
        for p in sync.series("flow0").unwrap().iter() {
            assert!(p.timestamp >= 60.0 - 30.0);
        }
    }
}

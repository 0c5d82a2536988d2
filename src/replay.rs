//! Replaying a recorded database through the live sampler.
//!
//! While a session is active the sampler ignores the hardware and serves
//! historical rows instead, one per tick, with the recorded valve states
//! applied. Rows are re-timestamped on the way out so dashboards treat them
//! as fresh samples.

use log::info;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::{CsvDatabase, RowCursor};

pub struct ReplaySession {
    cursor: RowCursor,
    start_ts: f64,
    end_ts: f64,
    current_ts: f64,
}

impl ReplaySession {
    /// Open a session over everything recorded from `since` onwards.
    pub fn start(db: &CsvDatabase, since: f64) -> Result<Self> {
        let end_ts = db.last_timestamp().ok_or(Error::NoData)?;
        let cursor = db.cursor_since(since)?;
        info!("replaying {} from {} to {}", db.filename(), since, end_ts);
        Ok(ReplaySession {
            cursor,
            start_ts: since,
            end_ts,
            current_ts: since,
        })
    }

    /// The next recorded row, or `None` when the recording is exhausted. The
    /// session stops at the span recorded when it started; rows appended to
    /// the database afterwards (including its own replayed output) are never
    /// served.
    pub fn next_row(&mut self) -> Result<Option<Value>> {
        let row = match self.cursor.read()? {
            Some(row) => row,
            None => return Ok(None),
        };

        if let Some(ts) = row.get("timestamp").and_then(Value::as_f64) {
            if ts > self.end_ts {
                self.current_ts = self.end_ts;
                return Ok(None);
            }
            self.current_ts = ts;
        }
        Ok(Some(row))
    }

    /// Fraction of the recording played back, in [0, 1].
    pub fn progress(&self) -> f64 {
        let span = self.end_ts - self.start_ts;
        if span <= 0.0 {
            return 1.0;
        }
        ((self.current_ts - self.start_ts) / span).clamp(0.0, 1.0)
    }

    /// Recorded timestamp of the row served last.
    pub fn timestamp(&self) -> f64 {
        self.current_ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    static SEQ: AtomicU32 = AtomicU32::new(0);

    fn temp_db() -> CsvDatabase {
        let path = std::env::temp_dir().join(format!(
            "waternet-replay-{}-{}.csv",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::remove_file(&path).ok();
        CsvDatabase::open(&path).unwrap()
    }

    fn row(v: f64) -> Value {
        json!({"sensors": {"flow0": {"value": v}}})
    }

    #[test]
    fn test_replay_walks_rows_and_tracks_progress() {
        let mut db = temp_db();
        for i in 0..4 {
            db.insert_at(&row(i as f64), 100.0 + i as f64).unwrap();
        }

        let mut session = ReplaySession::start(&db, 101.0).unwrap();
        assert_eq!(session.progress(), 0.0);

        // the cursor lands on the boundary row, then walks forward
        let first = session.next_row().unwrap().unwrap();
        assert_eq!(first["timestamp"].as_f64(), Some(101.0));
        assert_eq!(session.timestamp(), 101.0);

        let second = session.next_row().unwrap().unwrap();
        assert_eq!(second["timestamp"].as_f64(), Some(102.0));
        assert!(session.progress() > 0.0 && session.progress() < 1.0);

        assert!(session.next_row().unwrap().is_some());
        assert_eq!(session.progress(), 1.0);
        assert!(session.next_row().unwrap().is_none());

        std::fs::remove_file(db.filename()).ok();
    }

    #[test]
    fn test_replay_of_empty_db_is_nodata() {
        let db = temp_db();
        assert!(matches!(ReplaySession::start(&db, 0.0), Err(Error::NoData)));
        std::fs::remove_file(db.filename()).ok();
    }
}

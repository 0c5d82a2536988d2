//! Bounded live-series bookkeeping for polled sensor data.
//!
//! A dashboard view owns one [`SeriesSync`] per predictor overlay. Each poll
//! merges the records that arrived since the cursor and evicts points that
//! fall outside the retention bound.

pub mod record;
pub mod retention;
pub mod sync;

pub use record::Record;
pub use retention::RetentionPolicy;
pub use sync::{Series, SeriesPoint, SeriesSync};

use std::collections::VecDeque;
use std::time::Duration;

use super::sync::SeriesPoint;

/// Bound on how much history a series keeps. One policy per deployment,
/// fixed at series creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetentionPolicy {
    /// Keep the last K points.
    Count(usize),
    /// Keep points with `timestamp >= now - window`.
    Window(Duration),
}

impl RetentionPolicy {
    /// Drop points from the front until the bound holds. Runs after every
    /// merge; the only resource management this module needs.
    pub(crate) fn evict(&self, points: &mut VecDeque<SeriesPoint>, now: f64) {
        match *self {
            RetentionPolicy::Count(k) => {
                while points.len() > k {
                    points.pop_front();
                }
            }
            RetentionPolicy::Window(window) => {
                let horizon = now - window.as_secs_f64();
                while points.front().map_or(false, |p| p.timestamp < horizon) {
                    points.pop_front();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(ts: &[f64]) -> VecDeque<SeriesPoint> {
        ts.iter().map(|&t| SeriesPoint { timestamp: t, value: Some(t) }).collect()
    }

    #[test]
    fn test_count_bound() {
        let mut p = points(&[1.0, 2.0, 3.0, 4.0]);
        RetentionPolicy::Count(2).evict(&mut p, 100.0);
        assert_eq!(p.len(), 2);
        assert_eq!(p.front().unwrap().timestamp, 3.0);
    }

    #[test]
    fn test_window_bound() {
        let mut p = points(&[10.0, 40.0, 55.0, 58.0]);
        RetentionPolicy::Window(Duration::from_secs(20)).evict(&mut p, 60.0);
        assert_eq!(p.len(), 3);
        assert_eq!(p.front().unwrap().timestamp, 40.0);
    }

    #[test]
    fn test_window_keeps_boundary_point() {
        let mut p = points(&[40.0, 50.0]);
        RetentionPolicy::Window(Duration::from_secs(20)).evict(&mut p, 60.0);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_count_noop_under_bound() {
        let mut p = points(&[1.0]);
        RetentionPolicy::Count(5).evict(&mut p, 0.0);
        assert_eq!(p.len(), 1);
    }
}

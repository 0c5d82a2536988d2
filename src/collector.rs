//! Calibration run recorder.
//!
//! A run walks the full cartesian product of valve states, holding each
//! combination for one interval while the sampler records rows into a
//! dedicated, timestamped database. All clock reads are passed in as unix
//! seconds so scheduling stays testable.

use std::collections::VecDeque;

use log::info;

use crate::error::Result;
use crate::sensor::valve::ValveState;
use crate::store::CsvDatabase;

pub struct Collector {
    interval: f64,
    path_template: String,
    todo: VecDeque<Vec<(String, ValveState)>>,
    next_run: f64,
    done: usize,
    pause_since: Option<f64>,
    pub db: Option<CsvDatabase>,
}

impl Collector {
    /// `path_template` gets its `%` replaced by a start timestamp per run.
    pub fn new(interval: f64, path_template: &str) -> Self {
        Collector {
            interval,
            path_template: path_template.to_string(),
            todo: VecDeque::new(),
            next_run: 0.0,
            done: 0,
            pause_since: None,
            db: None,
        }
    }

    pub fn active(&self) -> bool {
        !self.todo.is_empty() || self.next_run > 0.0
    }

    /// Fraction of the run completed, in [0, 1]. Frozen while paused.
    pub fn progress(&self, now: f64) -> f64 {
        let curtime = self.pause_since.unwrap_or(now);

        let (remain_current, elapsed_current) = if self.next_run > 0.0 {
            let remain = (self.next_run - curtime).max(0.0);
            (remain, self.interval - remain)
        } else {
            (0.0, 0.0)
        };

        let doing = remain_current + self.todo.len() as f64 * self.interval;
        let timedone =
            self.done as f64 * self.interval + elapsed_current.clamp(0.0, self.interval);

        let total = doing + timedone;
        if total <= 0.0 {
            return 0.0;
        }
        timedone / total
    }

    /// Seconds until the run finishes, 0 when no run is active. Frozen while
    /// paused.
    pub fn timeleft(&self, now: f64) -> f64 {
        if !self.active() {
            return 0.0;
        }
        let curtime = self.pause_since.unwrap_or(now);
        ((self.next_run - curtime) + self.todo.len() as f64 * self.interval).max(0.0)
    }

    pub fn pause(&mut self, flag: bool, now: f64) {
        if flag && self.pause_since.is_none() {
            self.pause_since = Some(now);
            info!("collector paused");
        } else if !flag {
            if let Some(since) = self.pause_since.take() {
                // shift the schedule by however long we stood still
                let paused_for = now - since;
                self.next_run += paused_for;
                info!("collector resumed after {:.2}s pause", paused_for);
            }
        }
    }

    /// Begin a run over every combination of the given valves.
    pub fn start(&mut self, valve_names: &[String], now: f64) -> Result<()> {
        let n = valve_names.len();
        let mut todo = VecDeque::with_capacity(1 << n);
        for bits in 0u32..(1u32 << n) {
            let combo = valve_names
                .iter()
                .enumerate()
                .map(|(j, name)| {
                    let state = if bits >> (n - 1 - j) & 1 == 1 {
                        ValveState::Open
                    } else {
                        ValveState::Closed
                    };
                    (name.clone(), state)
                })
                .collect();
            todo.push_back(combo);
        }

        let timestr = chrono::Local::now().format("%Y-%m-%d_%H:%M:%S").to_string();
        let path = self.path_template.replace('%', &timestr);
        self.db = Some(CsvDatabase::open(&path)?);
        self.todo = todo;
        self.next_run = now;
        self.done = 0;
        self.pause_since = None;
        info!("collector started, {} combinations -> {}", self.todo.len(), path);
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.db = None;
        self.todo.clear();
        self.next_run = 0.0;
        self.pause_since = None;
        info!("collector cancelled");
    }

    /// The next valve combination once its interval is due; empty otherwise.
    /// Finishing the last combination deactivates the run.
    pub fn pop(&mut self, now: f64) -> Vec<(String, ValveState)> {
        if self.pause_since.is_some() {
            return Vec::new();
        }

        if self.next_run > 0.0 && now > self.next_run {
            let combo = match self.todo.pop_front() {
                Some(combo) => combo,
                None => {
                    self.next_run = 0.0;
                    self.db = None;
                    return Vec::new();
                }
            };
            self.done += 1;
            self.next_run = now + self.interval;
            info!("collector applying {:?}, {} to go", combo, self.todo.len());
            return combo;
        }

        Vec::new()
    }
}

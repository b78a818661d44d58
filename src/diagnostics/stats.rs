use serde::Serialize;
use std::time::{Duration, Instant};

/// Counters for the grabs a manager has performed.
#[derive(Debug)]
pub struct GrabStats {
    grab_count: u64,
    failure_count: u64,
    grid_count: u64,
    total_bytes: u64,
    start_time: Instant,
    last_grab_us: u64,
    max_grab_us: u64,
}

/// Snapshot of grab stats for JSON output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrabSnapshot {
    pub grab_count: u64,
    pub failure_count: u64,
    pub failure_rate: f64,
    pub grid_count: u64,
    pub grabs_per_sec: f64,
    pub last_grab_ms: f64,
    pub max_grab_ms: f64,
    pub bandwidth_bps: u64,
}

impl GrabStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            grab_count: 0,
            failure_count: 0,
            grid_count: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            last_grab_us: 0,
            max_grab_us: 0,
        }
    }

    /// Record a successful single-frame grab of `bytes` RGBA8 bytes.
    pub fn record_grab(&mut self, bytes: usize, elapsed: Duration) {
        self.grab_count += 1;
        self.total_bytes += bytes as u64;
        let us = elapsed.as_micros() as u64;
        self.last_grab_us = us;
        self.max_grab_us = self.max_grab_us.max(us);
    }

    /// Record a failed grab.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    /// Record a completed grid composite.
    pub fn record_grid(&mut self) {
        self.grid_count += 1;
    }

    pub fn grab_count(&self) -> u64 {
        self.grab_count
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Grabs per second since the stats were created.
    pub fn grabs_per_sec(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.grab_count as f64 / elapsed
    }

    /// Failure rate as a percentage (0.0 - 100.0).
    pub fn failure_rate(&self) -> f64 {
        let total = self.grab_count + self.failure_count;
        if total == 0 {
            return 0.0;
        }
        (self.failure_count as f64 / total as f64) * 100.0
    }

    /// Duration of the latest successful grab in milliseconds.
    pub fn last_grab_ms(&self) -> f64 {
        self.last_grab_us as f64 / 1000.0
    }

    /// Bytes delivered per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> GrabSnapshot {
        GrabSnapshot {
            grab_count: self.grab_count,
            failure_count: self.failure_count,
            failure_rate: self.failure_rate(),
            grid_count: self.grid_count,
            grabs_per_sec: self.grabs_per_sec(),
            last_grab_ms: self.last_grab_ms(),
            max_grab_ms: self.max_grab_us as f64 / 1000.0,
            bandwidth_bps: self.bandwidth_bps(),
        }
    }
}

impl Default for GrabStats {
    fn default() -> Self {
        Self::new()
    }
}

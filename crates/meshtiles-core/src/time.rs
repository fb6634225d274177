//! Time Measurement
//!
//! Accumulates wall-clock time per named build step:
//! - Start/stop pairs may repeat, durations add up
//! - Each start counts as one call
//! - Report listing every step in first-use order

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Accumulated time of one named step
#[derive(Debug, Clone, Copy, Default)]
struct Measure {
    elapsed: Duration,
    started: Option<Instant>,
    calls: u32,
}

impl Measure {
    fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed += started.elapsed();
        }
    }
}

/// Named stopwatches for build step timing
#[derive(Debug, Default)]
pub struct TimeMeasure {
    measures: IndexMap<String, Measure>,
}

impl TimeMeasure {
    /// Create an empty set of measures
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the stopwatch of `name`
    pub fn start(&mut self, name: &str) {
        let measure = self.measures.entry(name.to_string()).or_default();
        measure.stop();
        measure.started = Some(Instant::now());
        measure.calls += 1;
    }

    /// Stop the stopwatch of `name` and return its accumulated time
    ///
    /// Returns `None` for a name that was never started.
    pub fn stop(&mut self, name: &str) -> Option<Duration> {
        let measure = self.measures.get_mut(name)?;
        measure.stop();
        Some(measure.elapsed)
    }

    /// Time `f` under `name`
    pub fn measure<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        self.start(name);
        let result = f();
        self.stop(name);
        result
    }

    /// Accumulated time of `name`, running time included
    pub fn elapsed(&self, name: &str) -> Option<Duration> {
        self.measures.get(name).map(|m| {
            m.elapsed + m.started.map_or(Duration::ZERO, |s| s.elapsed())
        })
    }

    /// Number of times `name` was started
    pub fn calls(&self, name: &str) -> u32 {
        self.measures.get(name).map_or(0, |m| m.calls)
    }

    /// Human readable report, one line per step
    pub fn report(&self) -> String {
        let mut report = String::from("Time measures:\n");
        for name in self.measures.keys() {
            let elapsed = self.elapsed(name).unwrap_or_default();
            let _ = writeln!(
                report,
                "- {}: {} ms (x{})",
                name,
                elapsed.as_millis(),
                self.calls(name)
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_accumulates_calls() {
        let mut time = TimeMeasure::new();
        time.start("split");
        time.stop("split");
        time.start("split");
        assert!(time.stop("split").is_some());
        assert_eq!(time.calls("split"), 2);
        assert_eq!(time.stop("unknown"), None);
    }

    #[test]
    fn test_measure_closure() {
        let mut time = TimeMeasure::new();
        let value = time.measure("work", || 21 * 2);
        assert_eq!(value, 42);
        assert_eq!(time.calls("work"), 1);
    }

    #[test]
    fn test_report_lists_steps_in_order() {
        let mut time = TimeMeasure::new();
        time.measure("simplify", || ());
        time.measure("atlas", || ());
        let report = time.report();
        let simplify = report.find("simplify").unwrap();
        let atlas = report.find("atlas").unwrap();
        assert!(simplify < atlas);
    }
}

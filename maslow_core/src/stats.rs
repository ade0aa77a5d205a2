//! Cycle-time statistics for the supervisor loop.
//!
//! Measures the time between consecutive `track()` calls, accumulates
//! min/max/mean over a reporting interval, and warns when the worst cycle
//! exceeds the configured budget by more than 25%. The all-time high-water
//! mark survives interval resets for one-shot diagnostics.

use crate::path::LogPath;

pub struct CycleStats {
    last_us: Option<u64>,
    min_us: u64,
    max_us: u64,
    total_us: u64,
    cycle_count: u32,
    high_water_us: u64,
    report_interval_us: u64,
}

impl CycleStats {
    pub fn new(report_interval_ms: u32) -> Self {
        Self {
            last_us: None,
            min_us: u64::MAX,
            max_us: 0,
            total_us: 0,
            cycle_count: 0,
            high_water_us: 0,
            report_interval_us: u64::from(report_interval_ms) * 1_000,
        }
    }

    /// Record one cycle boundary. `now_us` is monotonic microseconds,
    /// `expected_cycle_us` the configured cycle budget.
    pub fn track(&mut self, now_us: u64, expected_cycle_us: u64, path: &LogPath) {
        let Some(last) = self.last_us else {
            self.last_us = Some(now_us);
            return;
        };
        let cycle_us = now_us.saturating_sub(last);
        self.last_us = Some(now_us);

        self.min_us = self.min_us.min(cycle_us);
        self.max_us = self.max_us.max(cycle_us);
        self.high_water_us = self.high_water_us.max(cycle_us);
        self.total_us = self.total_us.saturating_add(cycle_us);
        self.cycle_count += 1;

        if self.total_us >= self.report_interval_us {
            let mean_us = self.total_us / u64::from(self.cycle_count);
            tracing::debug!(
                path = %path,
                min_us = self.min_us,
                max_us = self.max_us,
                mean_us,
                "cycle stats"
            );
            // 25% over budget is tolerated; beyond that the elapsed-time
            // math in the state machines is drifting.
            let budget_us = expected_cycle_us + expected_cycle_us / 4;
            if self.max_us > budget_us {
                tracing::warn!(
                    path = %path,
                    max_us = self.max_us,
                    budget_us = expected_cycle_us,
                    "cycle time exceeded"
                );
            }
            self.min_us = u64::MAX;
            self.max_us = 0;
            self.total_us = 0;
            self.cycle_count = 0;
        }
    }

    /// Worst cycle time observed since construction, in microseconds.
    pub fn high_water_us(&self) -> u64 {
        self.high_water_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_only_arms_the_baseline() {
        let path = LogPath::root("Maslow");
        let mut stats = CycleStats::new(1_000);
        stats.track(100, 5_000, &path);
        assert_eq!(stats.high_water_us(), 0);
    }

    #[test]
    fn high_water_survives_interval_reset() {
        let path = LogPath::root("Maslow");
        let mut stats = CycleStats::new(1); // report every 1000us
        stats.track(0, 5_000, &path);
        stats.track(7_000, 5_000, &path); // triggers a report + reset
        stats.track(12_000, 5_000, &path);
        assert_eq!(stats.high_water_us(), 7_000);
    }
}

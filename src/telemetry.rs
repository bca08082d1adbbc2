use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress events emitted by the ingester as chunks are written
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A chunk was committed to the destination table
    ChunkLoaded {
        rows: u64,
        bytes: u64,
        duration_ms: u64,
    },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub chunks_loaded: usize,
    pub rows_loaded: u64,
    pub bytes_processed: u64,
    pub chunk_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::ChunkLoaded {
                rows,
                bytes,
                duration_ms,
            } => {
                self.chunks_loaded += 1;
                self.rows_loaded += rows;
                self.bytes_processed += bytes;
                self.chunk_durations_ms.push(*duration_ms);
            }
        }
    }

    /// Calculate percentile from chunk durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.chunk_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.chunk_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

/// Console progress for an ingestion run
///
/// Shows a row-count bar when the total is known and routes status lines
/// through it so they don't tear the bar. Quiet mode prints nothing.
pub struct ProgressReporter {
    bar: Option<ProgressBar>,
    quiet: bool,
    stats: ProgressStats,
}

impl ProgressReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: None,
            quiet,
            stats: ProgressStats::new(),
        }
    }

    /// Start the row bar once the number of rows to load is known
    pub fn start(&mut self, total_rows: u64) {
        if self.quiet || total_rows == 0 {
            return;
        }

        let bar = ProgressBar::new(total_rows);
        let style = ProgressStyle::default_bar()
            .template(
                "[{elapsed_precise}] {bar:40.cyan/blue} {human_pos}/{human_len} rows ({per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    /// Print a status line above the bar
    pub fn message(&self, message: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        match &self.bar {
            Some(bar) => bar.println(message.as_ref()),
            None => println!("{}", message.as_ref()),
        }
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        if let (Some(bar), TelemetryEvent::ChunkLoaded { rows, .. }) = (&self.bar, &event) {
            bar.inc(*rows);
        }
        self.stats.update(&event);
    }

    pub fn stats(&self) -> &ProgressStats {
        &self.stats
    }

    /// Clear the bar and return the collected statistics
    pub fn finish(self) -> ProgressStats {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        if !self.quiet && self.stats.chunks_loaded > 0 {
            let (p50, p90, p99) = self.stats.get_percentiles();
            tracing::info!(
                chunks = self.stats.chunks_loaded,
                rows = %HumanCount(self.stats.rows_loaded),
                bytes = self.stats.bytes_processed,
                p50_ms = p50.unwrap_or(0),
                p90_ms = p90.unwrap_or(0),
                p99_ms = p99.unwrap_or(0),
                "chunk latency"
            );
        }
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(rows: u64, duration_ms: u64) -> TelemetryEvent {
        TelemetryEvent::ChunkLoaded {
            rows,
            bytes: rows * 10,
            duration_ms,
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = ProgressStats::new();
        stats.update(&loaded(100, 5));
        stats.update(&loaded(50, 7));

        assert_eq!(stats.chunks_loaded, 2);
        assert_eq!(stats.rows_loaded, 150);
        assert_eq!(stats.bytes_processed, 1500);
        assert_eq!(stats.chunk_durations_ms, vec![5, 7]);
    }

    #[test]
    fn test_percentiles() {
        let mut stats = ProgressStats::new();
        assert_eq!(stats.percentile(50.0), None);

        for ms in [40, 10, 30, 20, 100, 60, 50, 90, 70, 80] {
            stats.update(&loaded(1, ms));
        }

        assert_eq!(stats.get_percentiles(), (Some(50), Some(90), Some(100)));
        assert_eq!(stats.percentile(0.0), Some(10));
    }

    #[test]
    fn test_quiet_reporter_still_collects_stats() {
        let mut reporter = ProgressReporter::new(true);
        reporter.start(10);
        assert!(reporter.bar.is_none());

        reporter.message("not printed");
        reporter.record(loaded(10, 3));
        assert_eq!(reporter.stats().rows_loaded, 10);

        let stats = reporter.finish();
        assert_eq!(stats.chunks_loaded, 1);
    }

    #[test]
    fn test_reporter_bar_tracks_rows() {
        let mut reporter = ProgressReporter::new(false);
        reporter.start(25);
        reporter.record(loaded(10, 1));
        reporter.record(loaded(15, 1));

        assert_eq!(reporter.bar.as_ref().map(|b| b.position()), Some(25));
        reporter.finish();
    }
}

use std::collections::VecDeque;
use std::time::Duration;

use fc_observability::{crate_meter, register_counter_metric_instrument, register_gauge_metric_instrument};
use opentelemetry::metrics::{Counter, Gauge};
use tokio::time::Instant;

const BUCKETS_PER_WINDOW: u32 = 60;

/// Rolling average of events per second over a fixed window.
///
/// Events are counted in [BUCKETS_PER_WINDOW] buckets aligned on the creation instant; buckets older than the
/// window are dropped as new events come in.
pub struct ThroughputCounter {
    origin: Instant,
    bucket_size: Duration,
    window_size: Duration,
    /// `(bucket index, count)`, oldest first.
    buckets: VecDeque<(u64, u64)>,
}

impl ThroughputCounter {
    pub fn new(window_size: Duration) -> Self {
        Self::new_at(window_size, Instant::now())
    }

    fn new_at(window_size: Duration, origin: Instant) -> Self {
        let bucket_size = (window_size / BUCKETS_PER_WINDOW).max(Duration::from_nanos(1));
        Self { origin, bucket_size, window_size, buckets: VecDeque::new() }
    }

    fn bucket_index(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin).as_nanos();
        u64::try_from(elapsed / self.bucket_size.as_nanos()).unwrap_or(u64::MAX)
    }

    fn is_expired(bucket: u64, current: u64) -> bool {
        current.saturating_sub(bucket) >= u64::from(BUCKETS_PER_WINDOW)
    }

    pub fn increment(&mut self) {
        self.increment_at(Instant::now())
    }

    fn increment_at(&mut self, now: Instant) {
        let current = self.bucket_index(now);
        while self.buckets.front().is_some_and(|(bucket, _)| Self::is_expired(*bucket, current)) {
            self.buckets.pop_front();
        }
        match self.buckets.back_mut() {
            Some((bucket, count)) if *bucket == current => *count += 1,
            _ => self.buckets.push_back((current, 1)),
        }
    }

    /// Returns events/s.
    pub fn get_throughput(&self) -> f64 {
        self.get_throughput_at(Instant::now())
    }

    fn get_throughput_at(&self, now: Instant) -> f64 {
        let current = self.bucket_index(now);
        let events: u64 =
            self.buckets.iter().filter(|(bucket, _)| !Self::is_expired(*bucket, current)).map(|(_, count)| count).sum();

        let span = now.saturating_duration_since(self.origin).min(self.window_size).as_secs_f64();
        if span > 0.0 {
            events as f64 / span
        } else {
            0.0
        }
    }
}

pub struct SyncMetrics {
    pub continuation_height: Gauge<u64>,
    pub items_applied: Counter<u64>,
    /// Items applied per second, for the status line.
    pub counter: ThroughputCounter,
}

impl SyncMetrics {
    pub fn register(starting_height: u64) -> Self {
        let meter = crate_meter("block_sync");

        let continuation_height = register_gauge_metric_instrument(
            &meter,
            "block_sync_continuation_height".to_string(),
            "Next block height the sync will apply".to_string(),
            "block".to_string(),
        );
        continuation_height.record(starting_height, &[]);

        let items_applied = register_counter_metric_instrument(
            &meter,
            "block_sync_items_applied".to_string(),
            "Number of blocks applied by the consuming engine".to_string(),
            "block".to_string(),
        );

        Self { continuation_height, items_applied, counter: ThroughputCounter::new(Duration::from_secs(5 * 60)) }
    }

    pub fn record_applied(&mut self, height: u64) {
        self.continuation_height.record(height + 1, &[]);
        self.items_applied.add(1, &[]);
        self.counter.increment();
    }
}

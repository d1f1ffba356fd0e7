use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot reported after every transferred chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Throughput of the chunk that just finished, bytes/second.
    pub bytes_per_second: f64,
    /// Sliding-window average across recent chunks, bytes/second.
    pub average_bytes_per_second: f64,
    /// Time left at the sliding-window rate. `None` until the rate is known.
    pub eta: Option<Duration>,
}

impl TransferProgress {
    /// Progress as a percentage (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Accumulates chunk completions for one upload session.
///
/// Shared by concurrently running chunk transfers, so every method takes
/// `&self`.
pub struct ProgressMeter {
    total_bytes: u64,
    transferred: AtomicU64,
    speed: SpeedCalculator,
}

impl ProgressMeter {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            transferred: AtomicU64::new(0),
            speed: SpeedCalculator::new(),
        }
    }

    /// Records a finished chunk of `bytes` that took `elapsed`.
    pub fn record(&self, bytes: u64, elapsed: Duration) -> TransferProgress {
        let transferred = self.transferred.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.speed.add_sample(bytes);

        let secs = elapsed.as_secs_f64();
        let bytes_per_second = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };

        TransferProgress {
            bytes_transferred: transferred,
            total_bytes: self.total_bytes,
            bytes_per_second,
            average_bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(self.total_bytes.saturating_sub(transferred)),
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

const SPEED_WINDOW: Duration = Duration::from_secs(5);
const MAX_SPEED_SAMPLES: usize = 100;

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Transfer speed over the last [`SPEED_WINDOW`] of samples.
struct SpeedCalculator {
    samples: Mutex<Vec<SpeedSample>>,
}

impl SpeedCalculator {
    fn new() -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    fn add_sample(&self, bytes: u64) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        if let Some(cutoff) = now.checked_sub(SPEED_WINDOW) {
            samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if samples.len() > MAX_SPEED_SAMPLES {
            let excess = samples.len() - MAX_SPEED_SAMPLES;
            samples.drain(..excess);
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    fn bytes_per_second(&self) -> f64 {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return 0.0;
        };
        if samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Where record timestamps come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Wall-clock seconds since the Unix epoch, read when the block is processed.
    #[default]
    Wall,
    /// Wall-clock origin at start plus the block's position in the stream.
    Stream,
}

/// Horloge des blocs : produit un timestamp par bloc, jamais décroissant.
///
/// Owned by the analysis thread, so no atomics.
///
/// # Example
/// ```
/// use sg_core::clock::{BlockClock, TimestampSource};
/// let mut clock = BlockClock::new(TimestampSource::Stream, 44100, 1024);
/// let t0 = clock.stamp(0);
/// let t1 = clock.stamp(1);
/// assert!((t1 - t0 - 1024.0 / 44100.0).abs() < 1e-9);
/// ```
pub struct BlockClock {
    source: TimestampSource,
    /// Wall-clock seconds at construction.
    origin: f64,
    /// Duration of one block in seconds.
    block_secs: f64,
    last: f64,
}

impl BlockClock {
    #[must_use]
    pub fn new(source: TimestampSource, sample_rate: u32, block_size: usize) -> Self {
        let block_secs = if sample_rate == 0 {
            0.0
        } else {
            block_size as f64 / f64::from(sample_rate)
        };
        Self {
            source,
            origin: wall_secs(),
            block_secs,
            last: f64::NEG_INFINITY,
        }
    }

    /// Timestamp for the block at `block_index`, clamped to be non-decreasing.
    pub fn stamp(&mut self, block_index: u64) -> f64 {
        let t = match self.source {
            TimestampSource::Wall => wall_secs(),
            TimestampSource::Stream => self.origin + block_index as f64 * self.block_secs,
        };
        self.last = self.last.max(t);
        self.last
    }
}

fn wall_secs() -> f64 {
    // A clock set before 1970 yields 0.0; monotonic clamping still holds.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_stamps_never_decrease() {
        let mut clock = BlockClock::new(TimestampSource::Wall, 44100, 1024);
        let mut prev = 0.0;
        for i in 0..100 {
            let t = clock.stamp(i);
            assert!(t >= prev);
            prev = t;
        }
    }

    #[test]
    fn stream_stamps_clamp_out_of_order_indices() {
        let mut clock = BlockClock::new(TimestampSource::Stream, 48000, 480);
        let t5 = clock.stamp(5);
        let t3 = clock.stamp(3);
        assert!((t3 - t5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_sample_rate_does_not_divide() {
        let mut clock = BlockClock::new(TimestampSource::Stream, 0, 1024);
        assert!(clock.stamp(10).is_finite());
    }
}

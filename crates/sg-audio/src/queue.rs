// Block queue - capture → analysis hand-off
//
// Two channels:
// - blocks:  bounded flume channel, capture pushes filled blocks, analysis pops
// - recycle: rtrb SPSC ring, analysis returns emptied sample buffers,
//            capture reuses them so the steady-state capture path never allocates
//
// When the block channel is full the capture side evicts the oldest queued
// block (it holds a second receiver for that) and counts the drop. Latency
// stays bounded; capture never waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use rtrb::RingBuffer;
use sg_core::block::AudioBlock;

pub use flume::RecvTimeoutError;

/// Counters shared by both ends of the queue.
#[derive(Debug, Default)]
pub struct QueueStats {
    completed: AtomicU64,
    dropped: AtomicU64,
    peak_depth: AtomicUsize,
}

impl QueueStats {
    /// Blocks assembled by the capture side, dropped ones included.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Blocks discarded because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Deepest backlog seen by the consumer.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }
}

/// Create a queue of fixed-size blocks holding at most `max_depth` blocks.
///
/// `max_depth + 2` sample buffers are allocated up front: one being filled,
/// `max_depth` queued, one under analysis.
///
/// # Panics
/// Panics if `block_size` or `max_depth` is 0.
///
/// # Example
/// ```
/// use sg_audio::queue::block_queue;
/// let (mut producer, mut consumer) = block_queue(4, 8);
/// producer.push_mono(&[0.1, 0.2, 0.3, 0.4, 0.5]);
/// let block = consumer.try_recv().unwrap();
/// assert_eq!(block.samples, vec![0.1, 0.2, 0.3, 0.4]);
/// assert!(consumer.try_recv().is_none()); // 0.5 is still being assembled
/// ```
#[must_use]
pub fn block_queue(block_size: usize, max_depth: usize) -> (BlockProducer, BlockConsumer) {
    assert!(block_size > 0, "block size must be > 0");
    assert!(max_depth > 0, "queue depth must be > 0");

    let (block_tx, block_rx) = flume::bounded(max_depth);
    let (mut recycle_tx, recycle_rx) = RingBuffer::new(max_depth + 2);
    for _ in 0..=max_depth {
        let _ = recycle_tx.push(Vec::with_capacity(block_size));
    }
    let stats = Arc::new(QueueStats::default());

    let producer = BlockProducer {
        block_tx,
        evict_rx: block_rx.clone(),
        free: recycle_rx,
        spare: None,
        current: Vec::with_capacity(block_size),
        block_size,
        next_index: 0,
        stats: Arc::clone(&stats),
    };
    let consumer = BlockConsumer {
        block_rx,
        recycle: recycle_tx,
        stats,
        reported_drops: 0,
    };
    (producer, consumer)
}

/// Capture end. Lives inside the driver callback.
///
/// Re-blocks whatever buffer size the driver delivers into blocks of exactly
/// `block_size` samples. Dropping it discards the partial block.
pub struct BlockProducer {
    block_tx: flume::Sender<AudioBlock>,
    evict_rx: flume::Receiver<AudioBlock>,
    free: rtrb::Consumer<Vec<f32>>,
    /// Buffer reclaimed from an evicted block.
    spare: Option<Vec<f32>>,
    current: Vec<f32>,
    block_size: usize,
    next_index: u64,
    stats: Arc<QueueStats>,
}

impl BlockProducer {
    /// Append mono samples.
    pub fn push_mono(&mut self, samples: &[f32]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (self.block_size - self.current.len()).min(rest.len());
            self.current.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.current.len() == self.block_size {
                self.complete();
            }
        }
    }

    /// Append interleaved frames, averaging channels down to mono.
    pub fn push_interleaved<T: Copy>(
        &mut self,
        data: &[T],
        channels: usize,
        to_f32: impl Fn(T) -> f32,
    ) {
        let channels = channels.max(1);
        for frame in data.chunks(channels) {
            let mono = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32;
            self.current.push(mono);
            if self.current.len() == self.block_size {
                self.complete();
            }
        }
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }

    /// True when the next completed block would evict the oldest one.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.block_tx.is_full()
    }

    fn complete(&mut self) {
        let block = AudioBlock::new(self.next_index, std::mem::take(&mut self.current));
        self.next_index += 1;
        self.stats.completed.fetch_add(1, Ordering::Relaxed);

        match self.block_tx.try_send(block) {
            Ok(()) | Err(flume::TrySendError::Disconnected(_)) => {}
            Err(flume::TrySendError::Full(block)) => {
                // drop-oldest
                if let Ok(oldest) = self.evict_rx.try_recv() {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    self.spare = Some(oldest.into_samples());
                }
                if let Err(e) = self.block_tx.try_send(block) {
                    self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                    self.spare = Some(e.into_inner().into_samples());
                }
            }
        }

        let mut next = match self.spare.take() {
            Some(buf) => buf,
            // Pool exhausted only if the consumer holds on to blocks.
            None => self
                .free
                .pop()
                .unwrap_or_else(|_| Vec::with_capacity(self.block_size)),
        };
        next.clear();
        self.current = next;
    }
}

/// Analysis end.
pub struct BlockConsumer {
    block_rx: flume::Receiver<AudioBlock>,
    recycle: rtrb::Producer<Vec<f32>>,
    stats: Arc<QueueStats>,
    reported_drops: u64,
}

impl BlockConsumer {
    /// Wait up to `timeout` for the next block.
    ///
    /// # Errors
    /// `Timeout` if nothing arrived, `Disconnected` once the producer is gone
    /// and the queue is empty.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<AudioBlock, RecvTimeoutError> {
        let block = self.block_rx.recv_timeout(timeout)?;
        self.note_depth();
        Ok(block)
    }

    /// Next block if one is queued.
    pub fn try_recv(&mut self) -> Option<AudioBlock> {
        let block = self.block_rx.try_recv().ok()?;
        self.note_depth();
        Some(block)
    }

    /// Hand a processed block's buffer back to the capture side.
    pub fn recycle(&mut self, block: AudioBlock) {
        // full only if extra buffers were allocated under pressure; let those go
        let _ = self.recycle.push(block.into_samples());
    }

    /// Blocks currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.block_rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_rx.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<QueueStats> {
        &self.stats
    }

    /// Drops that happened since the previous call.
    pub fn take_new_drops(&mut self) -> u64 {
        let total = self.stats.dropped();
        let new = total - self.reported_drops;
        self.reported_drops = total;
        new
    }

    fn note_depth(&self) {
        let depth = self.block_rx.len() + 1;
        self.stats.peak_depth.fetch_max(depth, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reblocks_odd_driver_buffers() {
        let (mut p, mut c) = block_queue(4, 8);
        let samples: Vec<f32> = (0..11).map(|i| i as f32).collect();
        p.push_mono(&samples[..3]);
        p.push_mono(&samples[3..10]);
        p.push_mono(&samples[10..]);
        let a = c.try_recv().unwrap();
        let b = c.try_recv().unwrap();
        assert_eq!((a.index, a.samples), (0, vec![0.0, 1.0, 2.0, 3.0]));
        assert_eq!((b.index, b.samples), (1, vec![4.0, 5.0, 6.0, 7.0]));
        assert!(c.try_recv().is_none());
    }

    #[test]
    fn downmixes_interleaved_frames() {
        let (mut p, mut c) = block_queue(2, 4);
        let stereo: [i16; 4] = [1000, 3000, -2000, 0];
        p.push_interleaved(&stereo, 2, |s| f32::from(s) / 1000.0);
        let block = c.try_recv().unwrap();
        assert_eq!(block.samples, vec![2.0, -1.0]);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let (mut p, mut c) = block_queue(2, 2);
        for i in 0..5 {
            p.push_mono(&[i as f32, i as f32]);
        }
        let indices: Vec<u64> = std::iter::from_fn(|| c.try_recv()).map(|b| b.index).collect();
        assert_eq!(indices, vec![3, 4]);
        assert_eq!(c.stats().dropped(), 3);
        assert_eq!(c.stats().completed(), 5);
        assert_eq!(c.take_new_drops(), 3);
        assert_eq!(c.take_new_drops(), 0);
    }

    #[test]
    fn recycled_buffers_are_reused() {
        let (mut p, mut c) = block_queue(256, 1);
        for round in 0..10 {
            p.push_mono(&[0.5; 256]);
            let block = c.try_recv().unwrap();
            assert_eq!(block.index, round);
            assert!(block.samples.capacity() >= 256);
            c.recycle(block);
        }
        assert_eq!(c.stats().dropped(), 0);
    }

    #[test]
    fn dropping_producer_discards_partial_block() {
        let (mut p, mut c) = block_queue(4, 4);
        p.push_mono(&[1.0; 6]);
        drop(p);
        assert!(c.recv_timeout(Duration::from_millis(10)).is_ok());
        assert!(matches!(
            c.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn peak_depth_tracks_backlog() {
        let (mut p, mut c) = block_queue(1, 8);
        p.push_mono(&[0.0; 5]);
        assert_eq!(c.len(), 5);
        let _ = c.try_recv();
        assert_eq!(c.stats().peak_depth(), 5);
    }
}

//! Block-based access to the capture stream.

use ringbuf::traits::{Consumer, Observer};
use std::time::{Duration, Instant};

/// One capture interval's worth of raw 32-bit microphone frame words.
pub type AudioBlock = Vec<u32>;

/// The capture collaborator as seen by the detection loop: a bounded wait
/// for the next block. `None` means no data arrived within the timeout;
/// the caller skips the iteration and tries again. Implementations must
/// never block unboundedly.
pub trait BlockSource {
    fn next_block(&mut self, timeout: Duration) -> Option<AudioBlock>;
}

/// Consumer half of the capture ring buffer, assembled into fixed-size
/// blocks. The producer half lives in the audio backend callback.
pub struct RingSource<C>
where
    C: Consumer<Item = u32>,
{
    consumer: C,
    block_samples: usize,
}

impl<C> RingSource<C>
where
    C: Consumer<Item = u32>,
{
    pub fn new(consumer: C, block_samples: usize) -> Self {
        Self { consumer, block_samples }
    }
}

impl<C> BlockSource for RingSource<C>
where
    C: Consumer<Item = u32>,
{
    fn next_block(&mut self, timeout: Duration) -> Option<AudioBlock> {
        let deadline = Instant::now() + timeout;
        // Poll until a full block is buffered or the deadline passes.
        while self.consumer.occupied_len() < self.block_samples {
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        let mut block = vec![0u32; self.block_samples];
        let got = self.consumer.pop_slice(&mut block);
        block.truncate(got);
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    #[test]
    fn assembles_fixed_blocks() {
        let rb = HeapRb::<u32>::new(64);
        let (mut producer, consumer) = rb.split();
        producer.push_slice(&[7u32; 40]);

        let mut source = RingSource::new(consumer, 16);
        let block = source.next_block(Duration::from_millis(10)).unwrap();
        assert_eq!(block.len(), 16);
        assert!(block.iter().all(|&w| w == 7));
    }

    #[test]
    fn times_out_on_partial_block() {
        let rb = HeapRb::<u32>::new(64);
        let (mut producer, consumer) = rb.split();
        producer.push_slice(&[7u32; 5]);

        let mut source = RingSource::new(consumer, 16);
        assert!(source.next_block(Duration::from_millis(5)).is_none());
        // The partial data is still buffered for the next attempt.
        assert!(source.next_block(Duration::from_millis(5)).is_none());
    }
}

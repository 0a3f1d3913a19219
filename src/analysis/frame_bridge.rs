use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Type aliases for ringbuf producer/consumer
pub type RbProducer<T> = ringbuf::HeapProd<T>;
pub type RbConsumer<T> = ringbuf::HeapCons<T>;

/// Bridges variable-size host blocks to fixed-size analysis frames.
///
/// Hosts deliver whatever block size they like (64, 256, 512 samples).
/// The transform needs exactly `frame_size` consecutive samples.
/// This struct accumulates mono samples until a whole frame is available.
pub struct FrameBridge {
    producer: RbProducer<f32>,
    consumer: RbConsumer<f32>,
    frame_size: usize,
}

impl FrameBridge {
    pub fn new(frame_size: usize) -> Self {
        let (producer, consumer) = HeapRb::<f32>::new(frame_size).split();
        Self {
            producer,
            consumer,
            frame_size,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Number of samples written towards the next frame
    #[inline]
    pub fn write_index(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Append as many samples as fit before the frame is full.
    /// Returns how many were taken.
    #[inline]
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Check if a whole frame has been accumulated
    #[inline]
    pub fn has_frame(&self) -> bool {
        self.consumer.occupied_len() >= self.frame_size
    }

    /// Move the completed frame into `frame`, oldest sample first
    pub fn pop_frame(&mut self, frame: &mut [f32]) {
        debug_assert_eq!(frame.len(), self.frame_size);
        let popped = self.consumer.pop_slice(frame);
        frame[popped..].fill(0.0);
    }

    /// Drop the completed frame (used when the transform is busy)
    pub fn discard_frame(&mut self) {
        for _ in 0..self.frame_size {
            if self.consumer.try_pop().is_none() {
                break;
            }
        }
    }

    /// Clear all buffered samples (call on prepare/reset)
    pub fn clear(&mut self) {
        while self.consumer.try_pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_until_full() {
        let mut bridge = FrameBridge::new(8);
        assert_eq!(bridge.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(bridge.write_index(), 3);
        assert!(!bridge.has_frame());

        // Only five more fit
        assert_eq!(bridge.push(&[4.0; 10]), 5);
        assert!(bridge.has_frame());

        let mut frame = [0.0; 8];
        bridge.pop_frame(&mut frame);
        assert_eq!(frame, [1.0, 2.0, 3.0, 4.0, 4.0, 4.0, 4.0, 4.0]);
        assert_eq!(bridge.write_index(), 0);
    }

    #[test]
    fn test_discard_and_clear() {
        let mut bridge = FrameBridge::new(4);
        bridge.push(&[1.0; 4]);
        bridge.discard_frame();
        assert_eq!(bridge.write_index(), 0);

        bridge.push(&[1.0; 3]);
        bridge.clear();
        assert_eq!(bridge.write_index(), 0);
    }
}

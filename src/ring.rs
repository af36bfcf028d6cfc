//! Single-producer/single-consumer ring of interleaved `f32` frames.
//!
//! Carries captured input from the capture callback to the playback callback
//! when a host delivers them on separate streams.
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free frame queue with a fixed capacity.
///
/// Exactly one thread may call [`FrameRing::push`] and exactly one thread may
/// call [`FrameRing::pop`]; everything else is safe from any thread.
pub struct FrameRing {
    data: UnsafeCell<Vec<f32>>,
    write_index: AtomicU64,
    read_index: AtomicU64,
    capacity_frames: usize,
    channels: usize,
}

unsafe impl Send for FrameRing {}
unsafe impl Sync for FrameRing {}

impl FrameRing {
    /// Allocate a ring holding `capacity_frames` frames of `channels` samples.
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        let capacity_frames = capacity_frames.max(1);
        let channels = channels.max(1);
        Self {
            data: UnsafeCell::new(vec![0.0; capacity_frames * channels]),
            write_index: AtomicU64::new(0),
            read_index: AtomicU64::new(0),
            capacity_frames,
            channels,
        }
    }

    /// Total capacity in frames.
    pub fn capacity_frames(&self) -> usize {
        self.capacity_frames
    }

    /// Samples per frame.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Push whole frames, returning frames written. Excess frames are dropped.
    pub fn push(&self, frames: &[f32]) -> usize {
        let frames_count = frames.len() / self.channels;
        if frames_count == 0 {
            return 0;
        }

        let capacity = self.capacity_frames as u64;
        let write_index = self.write_index.load(Ordering::Relaxed);
        let read_index = self.read_index.load(Ordering::Acquire);
        let used = write_index.saturating_sub(read_index).min(capacity);
        let free = (capacity - used) as usize;
        if free == 0 {
            return 0;
        }
        let frames_to_write = frames_count.min(free);
        // Only the producer writes the free region between write and read.
        let data = unsafe { &mut *self.data.get() };

        let start_frame = (write_index % capacity) as usize;
        let first_frames = (self.capacity_frames - start_frame).min(frames_to_write);
        let first_samples = first_frames * self.channels;
        let first_dest = start_frame * self.channels;
        data[first_dest..first_dest + first_samples].copy_from_slice(&frames[..first_samples]);

        if frames_to_write > first_frames {
            let remaining_samples = (frames_to_write - first_frames) * self.channels;
            data[..remaining_samples]
                .copy_from_slice(&frames[first_samples..first_samples + remaining_samples]);
        }

        self.write_index
            .store(write_index + frames_to_write as u64, Ordering::Release);
        frames_to_write
    }

    /// Pop whole frames into `out`, returning frames read.
    pub fn pop(&self, out: &mut [f32]) -> usize {
        let requested_frames = out.len() / self.channels;
        if requested_frames == 0 {
            return 0;
        }
        let capacity = self.capacity_frames as u64;
        let write_index = self.write_index.load(Ordering::Acquire);
        let read_index = self.read_index.load(Ordering::Relaxed);
        let available = write_index.saturating_sub(read_index).min(capacity) as usize;
        if available == 0 {
            return 0;
        }
        let frames_to_read = requested_frames.min(available);
        let data = unsafe { &*self.data.get() };

        let start_frame = (read_index % capacity) as usize;
        let first_frames = (self.capacity_frames - start_frame).min(frames_to_read);
        let first_samples = first_frames * self.channels;
        let first_src = start_frame * self.channels;
        out[..first_samples].copy_from_slice(&data[first_src..first_src + first_samples]);

        if frames_to_read > first_frames {
            let remaining_samples = (frames_to_read - first_frames) * self.channels;
            out[first_samples..first_samples + remaining_samples]
                .copy_from_slice(&data[..remaining_samples]);
        }

        self.read_index
            .store(read_index + frames_to_read as u64, Ordering::Release);
        frames_to_read
    }

    /// Drop up to `frames` of the oldest queued frames without copying.
    ///
    /// Consumer side only. Returns frames dropped.
    pub fn discard(&self, frames: usize) -> usize {
        let write_index = self.write_index.load(Ordering::Acquire);
        let read_index = self.read_index.load(Ordering::Relaxed);
        let available = write_index
            .saturating_sub(read_index)
            .min(self.capacity_frames as u64) as usize;
        let frames = frames.min(available);
        if frames > 0 {
            self.read_index
                .store(read_index + frames as u64, Ordering::Release);
        }
        frames
    }

    /// Frames ready for reading.
    pub fn available_read(&self) -> usize {
        let write_index = self.write_index.load(Ordering::Acquire);
        let read_index = self.read_index.load(Ordering::Acquire);
        write_index
            .saturating_sub(read_index)
            .min(self.capacity_frames as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_stops_when_full() {
        let ring = FrameRing::new(4, 2);
        let frames = [1.0f32; 12];
        assert_eq!(ring.push(&frames), 4);
        assert_eq!(ring.push(&frames), 0);
        assert_eq!(ring.available_read(), 4);
    }

    #[test]
    fn frames_survive_wraparound() {
        let ring = FrameRing::new(4, 1);
        let mut out = [0.0f32; 3];
        assert_eq!(ring.push(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.pop(&mut out), 3);
        assert_eq!(ring.push(&[4.0, 5.0, 6.0]), 3);
        assert_eq!(ring.pop(&mut out), 3);
        assert_eq!(out, [4.0, 5.0, 6.0]);
        assert_eq!(ring.available_read(), 0);
    }

    #[test]
    fn partial_frames_are_ignored() {
        let ring = FrameRing::new(8, 2);
        assert_eq!(ring.push(&[1.0, 2.0, 3.0]), 1);
        let mut out = [0.0f32; 3];
        assert_eq!(ring.pop(&mut out), 1);
        assert_eq!(&out[..2], &[1.0, 2.0]);
    }

    #[test]
    fn discard_drops_oldest_frames() {
        let ring = FrameRing::new(4, 1);
        ring.push(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ring.discard(3), 3);
        assert_eq!(ring.discard(5), 1);
        assert_eq!(ring.available_read(), 0);

        // Space freed by discarding is writable again and order is kept.
        assert_eq!(ring.push(&[5.0, 6.0]), 2);
        let mut out = [0.0f32; 2];
        assert_eq!(ring.pop(&mut out), 2);
        assert_eq!(out, [5.0, 6.0]);
    }

    #[test]
    fn short_pop_reports_available() {
        let ring = FrameRing::new(8, 1);
        ring.push(&[7.0, 8.0]);
        let mut out = [0.0f32; 4];
        assert_eq!(ring.pop(&mut out), 2);
        assert_eq!(&out[..2], &[7.0, 8.0]);
    }
}

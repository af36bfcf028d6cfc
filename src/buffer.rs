//! Borrowed per-channel sample views handed to the engine on every buffer.
//!
//! A channel is either present (a slice of `f32` samples) or absent (`None`,
//! the equivalent of a null channel pointer from a native host). Views are
//! never retained past the call they were passed to.

use std::slice;

/// Read-only access to a set of input channels.
pub trait InputChannels {
    /// Number of channel slots, including absent ones.
    fn num_channels(&self) -> usize;
    /// Samples for `index`, or `None` when the channel is absent or out of range.
    fn channel(&self, index: usize) -> Option<&[f32]>;
}

/// Writable access to a set of output channels.
pub trait OutputChannels {
    /// Number of channel slots, including absent ones.
    fn num_channels(&self) -> usize;
    /// Samples for `index`, or `None` when the channel is absent or out of range.
    fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]>;
}

impl<'a> InputChannels for [Option<&'a [f32]>] {
    fn num_channels(&self) -> usize {
        self.len()
    }

    fn channel(&self, index: usize) -> Option<&[f32]> {
        self.get(index).copied().flatten()
    }
}

impl<'a, const N: usize> InputChannels for [Option<&'a [f32]>; N] {
    fn num_channels(&self) -> usize {
        N
    }

    fn channel(&self, index: usize) -> Option<&[f32]> {
        InputChannels::channel(&self[..], index)
    }
}

impl<'a> OutputChannels for [Option<&'a mut [f32]>] {
    fn num_channels(&self) -> usize {
        self.len()
    }

    fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.get_mut(index).and_then(|channel| channel.as_deref_mut())
    }
}

impl<'a, const N: usize> OutputChannels for [Option<&'a mut [f32]>; N] {
    fn num_channels(&self) -> usize {
        N
    }

    fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        OutputChannels::channel_mut(&mut self[..], index)
    }
}

/// Input view over a native `const float* const*` channel array.
pub struct RawInputChannels<'a> {
    channels: &'a [*const f32],
    num_samples: usize,
}

impl<'a> RawInputChannels<'a> {
    /// Wrap a host-owned channel pointer array.
    ///
    /// A null `data` pointer is treated as zero channels; null entries are
    /// absent channels.
    ///
    /// # Safety
    ///
    /// When non-null, `data` must point to `num_channels` readable pointers,
    /// and every non-null entry must point to `num_samples` initialised,
    /// aligned `f32` values that are not written for the lifetime `'a`.
    pub unsafe fn new(data: *const *const f32, num_channels: usize, num_samples: usize) -> Self {
        let channels: &'a [*const f32] = if data.is_null() || num_channels == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(data, num_channels) }
        };
        Self {
            channels,
            num_samples,
        }
    }
}

impl InputChannels for RawInputChannels<'_> {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn channel(&self, index: usize) -> Option<&[f32]> {
        let ptr = *self.channels.get(index)?;
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { slice::from_raw_parts(ptr, self.num_samples) })
    }
}

/// Output view over a native `float* const*` channel array.
pub struct RawOutputChannels<'a> {
    channels: &'a [*mut f32],
    num_samples: usize,
}

impl<'a> RawOutputChannels<'a> {
    /// Wrap a host-owned channel pointer array.
    ///
    /// # Safety
    ///
    /// When non-null, `data` must point to `num_channels` readable pointers,
    /// and every non-null entry must point to `num_samples` aligned `f32`
    /// values writable for the lifetime `'a` and not aliased by any input
    /// channel used in the same call.
    pub unsafe fn new(data: *const *mut f32, num_channels: usize, num_samples: usize) -> Self {
        let channels: &'a [*mut f32] = if data.is_null() || num_channels == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(data, num_channels) }
        };
        Self {
            channels,
            num_samples,
        }
    }
}

impl OutputChannels for RawOutputChannels<'_> {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let ptr = *self.channels.get(index)?;
        if ptr.is_null() {
            return None;
        }
        Some(unsafe { slice::from_raw_parts_mut(ptr, self.num_samples) })
    }
}

/// Preallocated non-interleaved scratch buffer.
///
/// Used by hosts that receive interleaved device data: sized once up front,
/// then reused for every block without touching the allocator.
#[derive(Debug, Clone)]
pub struct PlanarBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
    frames: usize,
}

impl PlanarBuffer {
    /// Allocate `channels * capacity_frames` zeroed samples.
    pub fn new(channels: usize, capacity_frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * capacity_frames],
            channels,
            capacity: capacity_frames,
            frames: capacity_frames,
        }
    }

    /// Channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames in the current block.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Set the current block length, clamped to capacity. Returns the length applied.
    pub fn set_frames(&mut self, frames: usize) -> usize {
        self.frames = frames.min(self.capacity);
        self.frames
    }

    /// De-interleave `src` into this buffer and make it the current block.
    ///
    /// Channels beyond `src_channels` are zeroed. Returns frames loaded.
    pub fn load_interleaved(&mut self, src: &[f32], src_channels: usize) -> usize {
        if src_channels == 0 {
            self.set_frames(0);
            return 0;
        }
        let frames = self.set_frames(src.len() / src_channels);
        for ch in 0..self.channels {
            let start = ch * self.capacity;
            let dst = &mut self.data[start..start + frames];
            if ch < src_channels {
                for (sample, frame) in dst.iter_mut().zip(src.chunks_exact(src_channels)) {
                    *sample = frame[ch];
                }
            } else {
                dst.fill(0.0);
            }
        }
        frames
    }

    /// Interleave the current block into `dst`, converting each sample.
    ///
    /// Destination channels this buffer lacks receive `convert(0.0)`.
    /// Returns frames written.
    pub fn store_interleaved<T>(
        &self,
        dst: &mut [T],
        dst_channels: usize,
        convert: impl Fn(f32) -> T,
    ) -> usize {
        if dst_channels == 0 {
            return 0;
        }
        let frames = self.frames.min(dst.len() / dst_channels);
        for (index, frame) in dst.chunks_exact_mut(dst_channels).take(frames).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = if ch < self.channels {
                    convert(self.data[ch * self.capacity + index])
                } else {
                    convert(0.0)
                };
            }
        }
        frames
    }
}

impl InputChannels for PlanarBuffer {
    fn num_channels(&self) -> usize {
        self.channels
    }

    fn channel(&self, index: usize) -> Option<&[f32]> {
        if index >= self.channels {
            return None;
        }
        let start = index * self.capacity;
        Some(&self.data[start..start + self.frames])
    }
}

impl OutputChannels for PlanarBuffer {
    fn num_channels(&self) -> usize {
        self.channels
    }

    fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        if index >= self.channels {
            return None;
        }
        let start = index * self.capacity;
        Some(&mut self.data[start..start + self.frames])
    }
}

//! Real-time loopback engine.
//!
//! On every device buffer the engine either copies live input to the outputs
//! or silences them, depending on a flag the control thread flips through
//! [`LoopbackEngine::begin_test`]. The per-buffer path takes the state lock
//! once, then only copies or zero-fills; it never allocates, logs or blocks
//! on anything but that lock.

use tracing::{debug, info};

use crate::buffer::{InputChannels, OutputChannels};
use crate::results::ResultsLog;
use crate::state::{AudioCallbackState, RunState};

/// Format of the device that is about to start delivering buffers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceInfo {
    /// Human readable device name.
    pub name: String,
    /// Sample rate in Hertz.
    pub sample_rate: u32,
    /// Nominal frames per callback, `0` when the host does not say.
    pub buffer_frames: usize,
    /// Active input channels.
    pub input_channels: usize,
    /// Active output channels.
    pub output_channels: usize,
}

impl DeviceInfo {
    /// Buffer latency in milliseconds, `0.0` when unknown.
    pub fn latency_ms(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.buffer_frames as f32 / self.sample_rate as f32) * 1_000.0
    }
}

/// Callback interface a host drives.
///
/// `device_will_start` and `device_stopped` arrive on a control thread;
/// `process_block` arrives on the real-time thread.
pub trait DeviceCallback: Send + Sync {
    /// A device is about to (re)start, possibly with a new format.
    fn device_will_start(&self, device: &DeviceInfo);
    /// The device stopped or went away.
    fn device_stopped(&self);
    /// Render one buffer of `num_samples` frames in place.
    fn process_block(
        &self,
        input: &dyn InputChannels,
        output: &mut dyn OutputChannels,
        num_samples: usize,
    );
}

/// Input-to-output passthrough toggled from the control thread.
#[derive(Debug, Default)]
pub struct LoopbackEngine {
    state: AudioCallbackState,
    results: ResultsLog,
}

impl LoopbackEngine {
    /// Create an idle engine.
    pub fn new() -> Self {
        Self::with_results(ResultsLog::new())
    }

    /// Create an idle engine that reports into an existing results log.
    pub fn with_results(results: ResultsLog) -> Self {
        Self {
            state: AudioCallbackState::new(),
            results,
        }
    }

    /// Results log written by [`LoopbackEngine::begin_test`].
    pub fn results(&self) -> &ResultsLog {
        &self.results
    }

    /// Current state, read under the lock.
    pub fn run_state(&self) -> RunState {
        self.state.run_state()
    }

    /// `true` while input is routed to output.
    pub fn is_active(&self) -> bool {
        self.state.snapshot()
    }

    /// Toggle the loopback and return whether it is now active.
    ///
    /// Control thread only.
    pub fn begin_test(&self) -> bool {
        self.results.push("");
        self.results.push("Starting test...");
        let active = self.state.toggle();
        info!(active, "loopback toggled");
        active
    }

    /// Force the engine idle ahead of the first buffer of a (re)opened device.
    pub fn on_device_will_start(&self, device: &DeviceInfo) {
        self.state.reset(false);
        debug!(
            device = %device.name,
            sample_rate = device.sample_rate,
            inputs = device.input_channels,
            outputs = device.output_channels,
            "device starting, loopback reset to idle"
        );
    }

    /// The device stopped; nothing to release.
    pub fn on_device_stopped(&self) {
        debug!("device stopped");
    }

    /// Render one buffer.
    ///
    /// Idle: every present output channel has its first `num_samples`
    /// samples zeroed. Active: every present input channel is copied into
    /// every present output channel, visiting inputs in ascending order, so
    /// each output ends up holding the highest-numbered present input that
    /// covers a given sample. With a stereo microphone that means the right
    /// (last) capture channel is heard on every output and the left one is
    /// overwritten. Absent channels are skipped and no channel is touched
    /// past `num_samples` or its own length.
    pub fn process<I, O>(&self, input: &I, output: &mut O, num_samples: usize)
    where
        I: InputChannels + ?Sized,
        O: OutputChannels + ?Sized,
    {
        let active = self.state.snapshot();

        if active {
            for och in 0..output.num_channels() {
                let Some(out) = output.channel_mut(och) else {
                    continue;
                };
                let out_len = num_samples.min(out.len());
                for ich in 0..input.num_channels() {
                    let Some(inp) = input.channel(ich) else {
                        continue;
                    };
                    let len = out_len.min(inp.len());
                    out[..len].copy_from_slice(&inp[..len]);
                }
            }
        } else {
            for och in 0..output.num_channels() {
                if let Some(out) = output.channel_mut(och) {
                    let len = num_samples.min(out.len());
                    out[..len].fill(0.0);
                }
            }
        }
    }
}

impl DeviceCallback for LoopbackEngine {
    fn device_will_start(&self, device: &DeviceInfo) {
        self.on_device_will_start(device);
    }

    fn device_stopped(&self) {
        self.on_device_stopped();
    }

    fn process_block(
        &self,
        input: &dyn InputChannels,
        output: &mut dyn OutputChannels,
        num_samples: usize,
    ) {
        self.process(input, output, num_samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_is_derived_from_buffer_and_rate() {
        let device = DeviceInfo {
            sample_rate: 48_000,
            buffer_frames: 480,
            ..DeviceInfo::default()
        };
        assert!((device.latency_ms() - 10.0).abs() < 1e-4);
        assert_eq!(DeviceInfo::default().latency_ms(), 0.0);
    }

    #[test]
    fn begin_test_writes_results() {
        let engine = LoopbackEngine::new();
        assert!(engine.begin_test());
        assert_eq!(engine.run_state(), RunState::Active);
        assert!(
            engine
                .results()
                .snapshot()
                .iter()
                .any(|line| line == "Starting test...")
        );
    }

    #[test]
    fn shorter_slices_bound_the_copy() {
        let engine = LoopbackEngine::new();
        engine.begin_test();

        let long = [1.0f32, 1.0, 1.0, 1.0];
        let short = [2.0f32, 2.0];
        let mut out = [9.0f32; 4];
        {
            let inputs: [Option<&[f32]>; 2] = [Some(&long), Some(&short)];
            let mut outputs: [Option<&mut [f32]>; 1] = [Some(&mut out)];
            engine.process(&inputs, &mut outputs, 4);
        }
        // The higher input only covers the first two samples.
        assert_eq!(out, [2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn num_samples_bounds_the_silence() {
        let engine = LoopbackEngine::new();
        let mut out = [9.0f32; 4];
        {
            let inputs: [Option<&[f32]>; 0] = [];
            let mut outputs: [Option<&mut [f32]>; 1] = [Some(&mut out)];
            engine.process(&inputs, &mut outputs, 2);
        }
        assert_eq!(out, [0.0, 0.0, 9.0, 9.0]);
    }
}

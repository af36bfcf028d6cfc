//! cpal-backed duplex host driving a [`DeviceCallback`].
//!
//! cpal delivers capture and playback on separate interleaved streams. The
//! capture callback converts to `f32` and queues frames in a [`FrameRing`];
//! the playback callback drains one block, de-interleaves it, hands both
//! sides to the callback as channel views, and interleaves the result back
//! into the device format. Both callbacks only touch buffers sized up front.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tracing::{error, info, warn};

use crate::buffer::PlanarBuffer;
use crate::engine::{DeviceCallback, DeviceInfo};
use crate::ring::FrameRing;

const DEFAULT_BLOCK_FRAMES: usize = 1_024;
const MIN_RING_FRAMES: usize = 4_096;
const MAX_BACKLOG_BLOCKS: usize = 2;

/// Stream direction, used for device selection and errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Capture.
    Input,
    /// Playback.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// Errors raised while opening or starting devices.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    /// Nothing matched the selection and the host has no default.
    #[error("no {0} device matched and no default is available")]
    NoDevice(Direction),
    /// The device's native format has no conversion path.
    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(SampleFormat),
    /// Device enumeration failed.
    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    /// The device reported no usable default configuration.
    #[error("no default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    /// The backend refused the stream configuration.
    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    /// The backend could not start the stream.
    #[error("failed to start stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Device selection and format overrides.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Case-insensitive substring of the capture device name.
    pub input_name: Option<String>,
    /// Case-insensitive substring of the playback device name.
    pub output_name: Option<String>,
    /// Index among capture-capable devices, tried before the name.
    pub input_index: Option<usize>,
    /// Index among playback-capable devices, tried before the name.
    pub output_index: Option<usize>,
    /// Sample rate override in Hertz.
    pub sample_rate: Option<u32>,
    /// Frames per callback override, if the backend honours it.
    pub block_size: Option<u32>,
    /// Open a capture stream at all. Without one the callback sees zero inputs.
    pub input_enabled: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            input_name: None,
            output_name: None,
            input_index: None,
            output_index: None,
            sample_rate: None,
            block_size: None,
            input_enabled: true,
        }
    }
}

/// Glitch counters updated from the audio threads.
#[derive(Debug, Default)]
pub struct BridgeStats {
    overruns: AtomicU64,
    underruns: AtomicU64,
    dropped: AtomicU64,
}

impl BridgeStats {
    /// Capture blocks that did not fit in the ring.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Playback blocks that found less captured input than needed.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Stale captured frames discarded to keep input latency bounded.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Device entry for listings.
#[derive(Debug, Clone)]
pub struct DeviceListing {
    /// Position in the host's device list.
    pub index: usize,
    /// Device name.
    pub name: String,
    /// Whether this is the host's default capture device.
    pub is_default_input: bool,
    /// Whether this is the host's default playback device.
    pub is_default_output: bool,
}

/// Enumerate the default host's devices.
pub fn list_devices() -> Result<Vec<DeviceListing>, HostError> {
    let host = cpal::default_host();

    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let default_out = host.default_output_device().and_then(|d| d.name().ok());

    let mut out = Vec::new();
    for (index, dev) in host.devices()?.enumerate() {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        out.push(DeviceListing {
            index,
            is_default_input: default_in.as_deref() == Some(name.as_str()),
            is_default_output: default_out.as_deref() == Some(name.as_str()),
            name,
        });
    }
    Ok(out)
}

/// Owns the capture/playback streams and delivers lifecycle hooks.
pub struct AudioHost {
    config: HostConfig,
    callback: Arc<dyn DeviceCallback>,
    input_stream: Option<cpal::Stream>,
    output_stream: Option<cpal::Stream>,
    device: Option<DeviceInfo>,
    stats: Arc<BridgeStats>,
}

impl AudioHost {
    /// Create a stopped host.
    pub fn new(config: HostConfig, callback: Arc<dyn DeviceCallback>) -> Self {
        Self {
            config,
            callback,
            input_stream: None,
            output_stream: None,
            device: None,
            stats: Arc::new(BridgeStats::default()),
        }
    }

    /// Format of the running device.
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Whether streams are open.
    pub fn is_running(&self) -> bool {
        self.output_stream.is_some()
    }

    /// Shared glitch counters.
    pub fn stats(&self) -> Arc<BridgeStats> {
        Arc::clone(&self.stats)
    }

    /// Open the configured devices and start streaming.
    ///
    /// A running host is stopped first. The callback's `device_will_start`
    /// runs before any stream is built.
    pub fn start(&mut self) -> Result<DeviceInfo, HostError> {
        if self.is_running() {
            self.stop();
        }
        let host = cpal::default_host();

        let out_dev = pick_device(
            &host,
            Direction::Output,
            self.config.output_name.as_deref(),
            self.config.output_index,
        )?
        .ok_or(HostError::NoDevice(Direction::Output))?;
        let out_supported = out_dev.default_output_config()?;
        let mut out_cfg = out_supported.config();
        if let Some(sr) = self.config.sample_rate {
            out_cfg.sample_rate = cpal::SampleRate(sr);
        }
        if let Some(bs) = self.config.block_size {
            out_cfg.buffer_size = cpal::BufferSize::Fixed(bs);
        }

        let input = if self.config.input_enabled {
            let in_dev = pick_device(
                &host,
                Direction::Input,
                self.config.input_name.as_deref(),
                self.config.input_index,
            )?
            .ok_or(HostError::NoDevice(Direction::Input))?;
            let in_supported = in_dev.default_input_config()?;
            let mut in_cfg = in_supported.config();
            in_cfg.sample_rate = out_cfg.sample_rate;
            in_cfg.buffer_size = out_cfg.buffer_size.clone();
            Some((in_dev, in_supported.sample_format(), in_cfg))
        } else {
            None
        };

        let fixed_frames = match out_cfg.buffer_size {
            cpal::BufferSize::Fixed(n) => n as usize,
            cpal::BufferSize::Default => 0,
        };
        let block_frames = if fixed_frames > 0 {
            fixed_frames
        } else {
            DEFAULT_BLOCK_FRAMES
        };
        let in_channels = input
            .as_ref()
            .map(|(_, _, cfg)| cfg.channels as usize)
            .unwrap_or(0);
        let out_channels = out_cfg.channels as usize;

        let out_name = out_dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        let name = match &input {
            Some((in_dev, _, _)) => {
                let in_name = in_dev.name().unwrap_or_else(|_| "<unknown>".to_string());
                if in_name == out_name {
                    out_name
                } else {
                    format!("{in_name} -> {out_name}")
                }
            }
            None => out_name,
        };
        let device = DeviceInfo {
            name,
            sample_rate: out_cfg.sample_rate.0,
            buffer_frames: fixed_frames,
            input_channels: in_channels,
            output_channels: out_channels,
        };

        self.callback.device_will_start(&device);

        let ring = Arc::new(FrameRing::new(
            (block_frames * 8).max(MIN_RING_FRAMES),
            in_channels.max(1),
        ));

        let streams = (|| -> Result<_, HostError> {
            let input_stream = match &input {
                Some((in_dev, format, in_cfg)) => {
                    Some(self.build_input(in_dev, *format, in_cfg, &ring)?)
                }
                None => None,
            };
            let bridge = OutputBridge::new(
                Arc::clone(&self.callback),
                Arc::clone(&ring),
                Arc::clone(&self.stats),
                in_channels,
                out_channels,
                block_frames,
            );
            let output_stream =
                self.build_output(&out_dev, out_supported.sample_format(), &out_cfg, bridge)?;

            if let Some(stream) = &input_stream {
                stream.play()?;
            }
            output_stream.play()?;
            Ok((input_stream, output_stream))
        })();
        let (input_stream, output_stream) = stop_on_failure(self.callback.as_ref(), streams)?;

        info!(
            device = %device.name,
            sample_rate = device.sample_rate,
            inputs = in_channels,
            outputs = out_channels,
            "audio host started"
        );
        self.input_stream = input_stream;
        self.output_stream = Some(output_stream);
        self.device = Some(device.clone());
        Ok(device)
    }

    /// Close the streams and notify the callback.
    pub fn stop(&mut self) {
        let was_running = self.is_running();
        self.input_stream = None;
        self.output_stream = None;
        self.device = None;
        if was_running {
            self.callback.device_stopped();
            info!("audio host stopped");
        }
    }

    fn build_input(
        &self,
        device: &cpal::Device,
        format: SampleFormat,
        config: &cpal::StreamConfig,
        ring: &Arc<FrameRing>,
    ) -> Result<cpal::Stream, HostError> {
        let ring = Arc::clone(ring);
        let stats = Arc::clone(&self.stats);
        let callback = Arc::clone(&self.callback);
        match format {
            SampleFormat::F32 => build_input::<f32>(device, config, ring, stats, callback),
            SampleFormat::F64 => build_input::<f64>(device, config, ring, stats, callback),
            SampleFormat::I16 => build_input::<i16>(device, config, ring, stats, callback),
            SampleFormat::I32 => build_input::<i32>(device, config, ring, stats, callback),
            SampleFormat::U16 => build_input::<u16>(device, config, ring, stats, callback),
            other => Err(HostError::UnsupportedFormat(other)),
        }
    }

    fn build_output(
        &self,
        device: &cpal::Device,
        format: SampleFormat,
        config: &cpal::StreamConfig,
        bridge: OutputBridge,
    ) -> Result<cpal::Stream, HostError> {
        let callback = Arc::clone(&self.callback);
        match format {
            SampleFormat::F32 => build_output::<f32>(device, config, bridge, callback),
            SampleFormat::F64 => build_output::<f64>(device, config, bridge, callback),
            SampleFormat::I16 => build_output::<i16>(device, config, bridge, callback),
            SampleFormat::I32 => build_output::<i32>(device, config, bridge, callback),
            SampleFormat::U16 => build_output::<u16>(device, config, bridge, callback),
            other => Err(HostError::UnsupportedFormat(other)),
        }
    }
}

impl Drop for AudioHost {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pair a failed start with `device_stopped` so the callback never sees a
/// start without a matching stop.
fn stop_on_failure<T>(
    callback: &dyn DeviceCallback,
    result: Result<T, HostError>,
) -> Result<T, HostError> {
    if let Err(err) = &result {
        warn!(error = %err, "audio host failed to start");
        callback.device_stopped();
    }
    result
}

fn stream_error_handler(
    callback: Arc<dyn DeviceCallback>,
    direction: Direction,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => {
            warn!(%direction, "device no longer available");
            callback.device_stopped();
        }
        other => error!(%direction, error = %other, "stream error"),
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<FrameRing>,
    stats: Arc<BridgeStats>,
    callback: Arc<dyn DeviceCallback>,
) -> Result<cpal::Stream, HostError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let mut scratch = vec![0.0f32; ring.capacity_frames() * channels];
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for chunk in data.chunks(scratch.len()) {
                let converted = &mut scratch[..chunk.len()];
                for (dst, src) in converted.iter_mut().zip(chunk) {
                    *dst = f32::from_sample(*src);
                }
                if ring.push(converted) < chunk.len() / channels {
                    stats.overruns.fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        stream_error_handler(callback, Direction::Input),
        None,
    )?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut bridge: OutputBridge,
    callback: Arc<dyn DeviceCallback>,
) -> Result<cpal::Stream, HostError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            bridge.render(data, |s: f32| T::from_sample(s));
        },
        stream_error_handler(callback, Direction::Output),
        None,
    )?;
    Ok(stream)
}

/// Playback-side state: everything the playback callback needs, preallocated.
struct OutputBridge {
    callback: Arc<dyn DeviceCallback>,
    ring: Arc<FrameRing>,
    stats: Arc<BridgeStats>,
    captured: Vec<f32>,
    input: PlanarBuffer,
    output: PlanarBuffer,
    in_channels: usize,
    out_channels: usize,
    block_frames: usize,
}

impl OutputBridge {
    fn new(
        callback: Arc<dyn DeviceCallback>,
        ring: Arc<FrameRing>,
        stats: Arc<BridgeStats>,
        in_channels: usize,
        out_channels: usize,
        block_frames: usize,
    ) -> Self {
        let block_frames = block_frames.max(1);
        let out_channels = out_channels.max(1);
        Self {
            callback,
            ring,
            stats,
            captured: vec![0.0; block_frames * in_channels],
            input: PlanarBuffer::new(in_channels, block_frames),
            output: PlanarBuffer::new(out_channels, block_frames),
            in_channels,
            out_channels,
            block_frames,
        }
    }

    fn render<T: Copy>(&mut self, data: &mut [T], convert: impl Fn(f32) -> T) {
        for chunk in data.chunks_mut(self.block_frames * self.out_channels) {
            let frames = chunk.len() / self.out_channels;
            self.fill_input(frames);
            self.output.set_frames(frames);
            self.callback
                .process_block(&self.input, &mut self.output, frames);
            self.output
                .store_interleaved(chunk, self.out_channels, &convert);
        }
    }

    fn fill_input(&mut self, frames: usize) {
        if self.in_channels == 0 {
            self.input.set_frames(frames);
            return;
        }
        // Past the backlog limit, jump to the newest capture.
        let backlog = self.ring.available_read();
        if backlog > self.block_frames * MAX_BACKLOG_BLOCKS {
            let dropped = self.ring.discard(backlog - frames);
            self.stats
                .dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        let wanted = frames * self.in_channels;
        let captured = &mut self.captured[..wanted];
        let got = self.ring.pop(captured);
        if got < frames {
            captured[got * self.in_channels..].fill(0.0);
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
        self.input.load_interleaved(captured, self.in_channels);
    }
}

fn pick_device(
    host: &cpal::Host,
    direction: Direction,
    name_substr: Option<&str>,
    index: Option<usize>,
) -> Result<Option<cpal::Device>, HostError> {
    let capable = |dev: &cpal::Device| match direction {
        Direction::Input => dev
            .supported_input_configs()
            .map(|mut configs| configs.next().is_some())
            .unwrap_or(false),
        Direction::Output => dev
            .supported_output_configs()
            .map(|mut configs| configs.next().is_some())
            .unwrap_or(false),
    };

    if let Some(idx) = index {
        if let Some(dev) = host.devices()?.filter(|dev| capable(dev)).nth(idx) {
            return Ok(Some(dev));
        }
        warn!(%direction, index = idx, "device index not found, falling back");
    }

    if let Some(query) = name_substr {
        let query = query.to_lowercase();
        let found = host.devices()?.find(|dev| {
            dev.name()
                .map(|name| name.to_lowercase().contains(&query))
                .unwrap_or(false)
                && capable(dev)
        });
        if found.is_some() {
            return Ok(found);
        }
        warn!(%direction, query = %query, "no device name matched, falling back");
    }

    Ok(match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{InputChannels, OutputChannels};
    use crate::engine::LoopbackEngine;

    fn bridge(engine: &Arc<LoopbackEngine>, ring: &Arc<FrameRing>, block: usize) -> OutputBridge {
        let callback: Arc<dyn DeviceCallback> = engine.clone();
        OutputBridge::new(
            callback,
            Arc::clone(ring),
            Arc::new(BridgeStats::default()),
            ring.channels(),
            2,
            block,
        )
    }

    #[test]
    fn idle_bridge_renders_silence() {
        let engine = Arc::new(LoopbackEngine::new());
        let ring = Arc::new(FrameRing::new(64, 1));
        ring.push(&[0.5; 4]);
        let mut bridge = bridge(&engine, &ring, 4);

        let mut out = [1.0f32; 8];
        bridge.render(&mut out, |s| s);
        assert_eq!(out, [0.0; 8]);
    }

    #[test]
    fn active_bridge_passes_captured_frames_in_chunks() {
        let engine = Arc::new(LoopbackEngine::new());
        engine.begin_test();
        let ring = Arc::new(FrameRing::new(64, 1));
        ring.push(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        // Block of 4 frames, host asks for 6: two chunks.
        let mut bridge = bridge(&engine, &ring, 4);

        let mut out = [0.0f32; 12];
        bridge.render(&mut out, |s| s);
        assert_eq!(
            out,
            [0.1, 0.1, 0.2, 0.2, 0.3, 0.3, 0.4, 0.4, 0.5, 0.5, 0.6, 0.6]
        );
        assert_eq!(bridge.stats.underruns(), 0);
    }

    #[test]
    fn backlog_is_trimmed_to_newest_capture() {
        let engine = Arc::new(LoopbackEngine::new());
        engine.begin_test();
        let ring = Arc::new(FrameRing::new(256, 1));
        for _ in 0..20 {
            ring.push(&[0.5; 4]);
        }
        ring.push(&[999.0; 4]);
        let mut bridge = bridge(&engine, &ring, 4);

        let mut out = [0.0f32; 8];
        bridge.render(&mut out, |s| s);
        assert_eq!(out, [999.0; 8]);
        assert_eq!(bridge.stats.dropped_frames(), 80);
        assert_eq!(ring.available_read(), 0);
    }

    #[test]
    fn short_backlog_is_kept() {
        let engine = Arc::new(LoopbackEngine::new());
        engine.begin_test();
        let ring = Arc::new(FrameRing::new(64, 1));
        ring.push(&[0.1, 0.1, 0.1, 0.1, 0.2, 0.2, 0.2, 0.2]);
        let mut bridge = bridge(&engine, &ring, 4);

        let mut out = [0.0f32; 8];
        bridge.render(&mut out, |s| s);
        assert_eq!(out, [0.1; 8]);
        assert_eq!(bridge.stats.dropped_frames(), 0);
    }

    #[derive(Default)]
    struct LifecycleCounts {
        started: AtomicU64,
        stopped: AtomicU64,
    }

    impl DeviceCallback for LifecycleCounts {
        fn device_will_start(&self, _device: &DeviceInfo) {
            self.started.fetch_add(1, Ordering::Relaxed);
        }

        fn device_stopped(&self) {
            self.stopped.fetch_add(1, Ordering::Relaxed);
        }

        fn process_block(
            &self,
            _input: &dyn InputChannels,
            _output: &mut dyn OutputChannels,
            _num_samples: usize,
        ) {
        }
    }

    #[test]
    fn failed_start_delivers_device_stopped() {
        let counts = LifecycleCounts::default();
        let failed: Result<(), HostError> =
            Err(HostError::UnsupportedFormat(SampleFormat::U8));
        assert!(stop_on_failure(&counts, failed).is_err());
        assert_eq!(counts.stopped.load(Ordering::Relaxed), 1);

        assert_eq!(stop_on_failure(&counts, Ok(7)).ok(), Some(7));
        assert_eq!(counts.stopped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn starved_bridge_pads_with_silence_and_counts() {
        let engine = Arc::new(LoopbackEngine::new());
        engine.begin_test();
        let ring = Arc::new(FrameRing::new(64, 1));
        ring.push(&[0.25]);
        let mut bridge = bridge(&engine, &ring, 4);

        let mut out = [0i16; 4];
        bridge.render(&mut out, |s| i16::from_sample(s));
        assert_eq!(out[0], i16::from_sample(0.25f32));
        assert_eq!(&out[2..], &[0, 0]);
        assert_eq!(bridge.stats.underruns(), 1);
    }
}

//! C ABI for native audio hosts.
//!
//! The per-buffer entry point takes the classic non-interleaved pointer
//! tables: `const float* const*` for inputs and `float* const*` for outputs,
//! either of which may contain null channels.

use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{RawInputChannels, RawOutputChannels};
use crate::engine::{DeviceInfo, LoopbackEngine};

/// Engine handle owned by the native side.
pub struct UnmuteEngineFfi {
    engine: LoopbackEngine,
    log_cache: Mutex<Option<CString>>,
}

fn channel_count(value: i32) -> Option<usize> {
    usize::try_from(value).ok()
}

/// Create an idle engine. Release it with [`unmute_engine_destroy`].
#[unsafe(no_mangle)]
pub extern "C" fn unmute_engine_create() -> *mut UnmuteEngineFfi {
    crate::init_tracing(tracing::Level::INFO);
    let handle = UnmuteEngineFfi {
        engine: LoopbackEngine::new(),
        log_cache: Mutex::new(None),
    };
    debug!("engine handle created");
    Box::into_raw(Box::new(handle))
}

/// Destroy an engine handle.
///
/// # Safety
///
/// `handle` must be null or come from [`unmute_engine_create`], and must not
/// be used again afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_destroy(handle: *mut UnmuteEngineFfi) {
    if !handle.is_null() {
        unsafe {
            drop(Box::from_raw(handle));
        }
        debug!("engine handle destroyed");
    }
}

/// Notify the engine that its device is about to start.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_device_will_start(
    handle: *mut UnmuteEngineFfi,
    sample_rate: f64,
    buffer_frames: u32,
    num_input_channels: i32,
    num_output_channels: i32,
) {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return;
    };
    let device = DeviceInfo {
        name: "native host".to_string(),
        sample_rate: sample_rate.round().max(0.0) as u32,
        buffer_frames: buffer_frames as usize,
        input_channels: channel_count(num_input_channels).unwrap_or(0),
        output_channels: channel_count(num_output_channels).unwrap_or(0),
    };
    handle.engine.on_device_will_start(&device);
}

/// Notify the engine that its device stopped.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_device_stopped(handle: *mut UnmuteEngineFfi) {
    if let Some(handle) = unsafe { handle.as_ref() } {
        handle.engine.on_device_stopped();
    }
}

/// Render one buffer in place. Returns `false` when nothing was processed.
///
/// # Safety
///
/// `handle` must be null or a live handle. `input` and `output` must each be
/// null or point to the given number of channel pointers; every non-null
/// channel pointer must reference `num_samples` aligned floats, output
/// channels writable, and no output channel may alias an input channel.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_process(
    handle: *mut UnmuteEngineFfi,
    input: *const *const f32,
    num_input_channels: i32,
    output: *const *mut f32,
    num_output_channels: i32,
    num_samples: i32,
) -> bool {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return false;
    };
    let (Some(inputs), Some(outputs), Some(samples)) = (
        channel_count(num_input_channels),
        channel_count(num_output_channels),
        channel_count(num_samples),
    ) else {
        return false;
    };
    let input = unsafe { RawInputChannels::new(input, inputs, samples) };
    let mut output = unsafe { RawOutputChannels::new(output, outputs, samples) };
    handle.engine.process(&input, &mut output, samples);
    true
}

/// Toggle the loopback. Returns `true` when it is now active.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_begin_test(handle: *mut UnmuteEngineFfi) -> bool {
    match unsafe { handle.as_ref() } {
        Some(handle) => handle.engine.begin_test(),
        None => false,
    }
}

/// Whether the loopback is active.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_is_active(handle: *mut UnmuteEngineFfi) -> bool {
    match unsafe { handle.as_ref() } {
        Some(handle) => handle.engine.is_active(),
        None => false,
    }
}

/// Pop the oldest results line. Returns `NULL` when no lines remain.
///
/// The string stays valid until the next call on the same handle.
///
/// # Safety
///
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn unmute_engine_pop_log(handle: *mut UnmuteEngineFfi) -> *const c_char {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return ptr::null();
    };
    match handle.engine.results().pop() {
        Some(line) => {
            let mut cache = handle.log_cache.lock();
            *cache = Some(CString::new(line).unwrap_or_default());
            cache.as_ref().map(|c| c.as_ptr()).unwrap_or(ptr::null())
        }
        None => ptr::null(),
    }
}

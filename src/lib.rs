#![deny(missing_docs)]

//! Real-time audio loopback core.
//!
//! The [`LoopbackEngine`] sits on a device's audio callback and either copies
//! live input samples to the outputs, so a user can hear themselves through
//! the device, or silences the outputs. A control thread flips between the two
//! with [`LoopbackEngine::begin_test`]; every device (re)start forces the
//! engine back to silence. The per-buffer path is allocation free and only
//! takes a short mutex around the run flag.
//!
//! Hosts either call the engine directly with borrowed channel views
//! ([`buffer`]), go through the C ABI in [`ffi`], or use the cpal-backed
//! duplex host behind the `host` feature.

use std::sync::Once;

pub mod buffer;
/// Start/stop control and the developer console.
pub mod control;
pub mod engine;
pub mod ffi;
#[cfg(feature = "host")]
pub mod host;
pub mod results;
pub mod ring;
pub mod state;

#[cfg(test)]
mod tests;

pub use buffer::{InputChannels, OutputChannels, PlanarBuffer};
pub use engine::{DeviceCallback, DeviceInfo, LoopbackEngine};
pub use results::ResultsLog;
pub use state::{AudioCallbackState, RunState};

static TRACING_INIT: Once = Once::new();

/// Install a stderr `tracing` subscriber capped at `max_level`.
///
/// Only the first call has any effect, and an already installed global
/// subscriber is left alone.
pub fn init_tracing(max_level: tracing::Level) {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(max_level)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

//! Control-thread side of the loopback: the start/stop trigger and a console.

/// Start/stop trigger used by user-facing surfaces.
pub mod api;
/// Ratatui-based developer console.
pub mod ui;

//! Run flag shared between the real-time callback and the control thread.

use parking_lot::Mutex;

/// Whether the loopback is currently routing input to output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    /// Outputs are silenced on every buffer.
    #[default]
    Idle,
    /// Input samples are copied straight to the outputs.
    Active,
}

impl RunState {
    /// Map a raw flag onto a state.
    pub fn from_active(active: bool) -> Self {
        if active { Self::Active } else { Self::Idle }
    }

    /// `true` for [`RunState::Active`].
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// The state a toggle moves to.
    pub fn toggled(self) -> Self {
        match self {
            Self::Idle => Self::Active,
            Self::Active => Self::Idle,
        }
    }
}

/// Mutex-guarded [`RunState`].
///
/// Every accessor holds the lock for a single load or store, so the audio
/// thread never waits longer than one of those on the control thread.
#[derive(Debug, Default)]
pub struct AudioCallbackState {
    state: Mutex<RunState>,
}

impl AudioCallbackState {
    /// Create a state that starts idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag and return the new value.
    pub fn toggle(&self) -> bool {
        let mut guard = self.state.lock();
        *guard = guard.toggled();
        guard.is_active()
    }

    /// Force the flag to a known value.
    pub fn reset(&self, active: bool) {
        *self.state.lock() = RunState::from_active(active);
    }

    /// Read the flag.
    pub fn snapshot(&self) -> bool {
        self.state.lock().is_active()
    }

    /// Read the flag as a [`RunState`].
    pub fn run_state(&self) -> RunState {
        *self.state.lock()
    }
}

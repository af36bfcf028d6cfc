use std::fmt;
use std::sync::Arc;

use crate::engine::LoopbackEngine;
use crate::results::ResultsLog;

/// Text shown to the user before the first toggle.
pub const INTRO_TEXT: &str = "This app is used to make your voice louder. \
Click on the start button and speak into the microphone.";

/// Caption for the start/stop control.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ButtonLabel {
    /// Loopback is idle; pressing starts it.
    #[default]
    Start,
    /// Loopback is active; pressing stops it.
    Stop,
}

impl ButtonLabel {
    /// Label matching an engine state.
    pub fn for_active(active: bool) -> Self {
        if active { Self::Stop } else { Self::Start }
    }

    /// Caption text.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

impl fmt::Display for ButtonLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives a [`LoopbackEngine`] from a user action and tracks the caption.
pub struct Controller {
    engine: Arc<LoopbackEngine>,
    label: ButtonLabel,
}

impl Controller {
    /// Wrap an engine and seed its results log with the intro text.
    pub fn new(engine: Arc<LoopbackEngine>) -> Self {
        engine.results().push(INTRO_TEXT);
        Self {
            engine,
            label: ButtonLabel::Start,
        }
    }

    /// Toggle the loopback and return the new caption.
    pub fn start_test(&mut self) -> ButtonLabel {
        self.label = ButtonLabel::for_active(self.engine.begin_test());
        self.label
    }

    /// Caption as of the last toggle.
    pub fn label(&self) -> ButtonLabel {
        self.label
    }

    /// Re-read the engine state, e.g. after a device restart forced it idle.
    pub fn refresh(&mut self) -> ButtonLabel {
        self.label = ButtonLabel::for_active(self.engine.is_active());
        self.label
    }

    /// The controlled engine.
    pub fn engine(&self) -> &Arc<LoopbackEngine> {
        &self.engine
    }

    /// Results log shared with the engine.
    pub fn results(&self) -> &ResultsLog {
        self.engine.results()
    }
}

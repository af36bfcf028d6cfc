//! Bounded text log shown to the user next to the start/stop control.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

const MAX_LINES: usize = 256;

/// Cloneable handle to a shared, bounded list of result lines.
///
/// Only ever written from control contexts; the audio callback never touches it.
#[derive(Clone, Debug, Default)]
pub struct ResultsLog {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl ResultsLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(64))),
        }
    }

    /// Append a line, dropping the oldest once the log is full.
    pub fn push(&self, line: impl Into<String>) {
        let mut guard = self.lines.lock();
        guard.push_back(line.into());
        while guard.len() > MAX_LINES {
            guard.pop_front();
        }
    }

    /// Remove and return the oldest line.
    pub fn pop(&self) -> Option<String> {
        self.lines.lock().pop_front()
    }

    /// Copy of every retained line, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Retained line count.
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// `true` when nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_lines() {
        let log = ResultsLog::new();
        let other = log.clone();
        other.push("hello");
        assert_eq!(log.snapshot(), vec!["hello".to_string()]);
        assert_eq!(log.pop().as_deref(), Some("hello"));
        assert!(other.is_empty());
    }

    #[test]
    fn oldest_lines_are_dropped() {
        let log = ResultsLog::new();
        for n in 0..MAX_LINES + 10 {
            log.push(format!("line {n}"));
        }
        assert_eq!(log.len(), MAX_LINES);
        assert_eq!(log.pop().as_deref(), Some("line 10"));
    }
}

//! Log buffer service
//!
//! Collects the build log in memory. Every step's command line and raw
//! output land here so the failing stage's diagnostics can be shown to the
//! operator and written into the build report.

use grrbuild_core::domain::log::{LogEntry, LogLevel};
use grrbuild_core::domain::stage::StageKind;
use std::sync::{Arc, Mutex};

/// Service for managing log buffers
pub trait LogBufferService: Send + Sync {
    /// Adds a log entry to the buffer
    ///
    /// # Arguments
    /// * `entry` - The log entry to add
    fn add_entry(&self, entry: LogEntry);

    /// Drains all log entries from the buffer
    ///
    /// # Returns
    /// A vector of all log entries that were in the buffer
    fn drain(&self) -> Vec<LogEntry>;
}

/// In-memory implementation of LogBufferService
///
/// Uses Arc<Mutex<Vec<LogEntry>>> so clones share one buffer.
#[derive(Clone)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl InMemoryLogBuffer {
    /// Creates a new in-memory log buffer
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        // A panic while holding the lock leaves the Vec valid
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryLogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBufferService for InMemoryLogBuffer {
    fn add_entry(&self, entry: LogEntry) {
        self.lock().push(entry);
    }

    fn drain(&self) -> Vec<LogEntry> {
        self.lock().drain(..).collect()
    }
}

/// Raw diagnostics `stage` left in `entries`, as one block of text
///
/// Command lines and progress messages are left out.
pub fn diagnostics(entries: &[LogEntry], stage: StageKind) -> String {
    entries
        .iter()
        .filter(|e| e.stage == Some(stage) && e.level != LogLevel::Info)
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = InMemoryLogBuffer::new();
        buffer.add_entry(LogEntry::new(LogLevel::Info, None, "starting"));
        buffer.add_entry(LogEntry::new(
            LogLevel::Warning,
            Some(StageKind::Install),
            "no wheelhouse",
        ));

        assert_eq!(buffer.drain().len(), 2);
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_clones_share_buffer() {
        let buffer = InMemoryLogBuffer::new();
        let clone = buffer.clone();
        clone.add_entry(LogEntry::new(LogLevel::Info, None, "hello"));
        assert_eq!(buffer.drain().len(), 1);
    }

    #[test]
    fn test_diagnostics_of_one_stage() {
        let buffer = InMemoryLogBuffer::new();
        buffer.add_entry(LogEntry::new(LogLevel::Warning, Some(StageKind::Provision), "a"));
        buffer.add_entry(LogEntry::new(LogLevel::Error, Some(StageKind::Package), "b"));
        buffer.add_entry(LogEntry::new(LogLevel::Info, Some(StageKind::Package), "$ setup.py"));
        buffer.add_entry(LogEntry::new(LogLevel::Debug, Some(StageKind::Package), "c"));
        buffer.add_entry(LogEntry::new(LogLevel::Error, None, "d"));

        let entries = buffer.drain();
        assert_eq!(diagnostics(&entries, StageKind::Package), "b\nc");
        assert_eq!(diagnostics(&entries, StageKind::Provision), "a");
        assert!(diagnostics(&entries, StageKind::Install).is_empty());
    }
}

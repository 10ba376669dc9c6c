//! Structured monitor entries for pulse guide activity
//!
//! Entries are handed to a [`TelemetrySink`]. Sinks cannot report failure back
//! to the caller, so a broken sink never changes the outcome of a pulse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Default number of entries a [`MemorySink`] keeps
pub const DEFAULT_MONITOR_CAPACITY: usize = 1024;

/// Monitor entry severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorSeverity {
    Debug,
    Information,
    Warning,
    Error,
}

/// Categories of monitor entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorCategory {
    /// Pulse guide lifecycle
    Guiding,
    /// Executor and hardware motion
    Mount,
    /// Controller lifecycle
    System,
}

/// One telemetry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEntry {
    pub timestamp: DateTime<Utc>,
    pub category: MonitorCategory,
    pub severity: MonitorSeverity,
    /// Name of the operation that produced the entry
    pub method: String,
    /// Thread that produced the entry
    pub thread: String,
    pub message: String,
}

impl MonitorEntry {
    pub fn new(
        category: MonitorCategory,
        severity: MonitorSeverity,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let thread = std::thread::current();
        let thread = match thread.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", thread.id()),
        };
        Self {
            timestamp: Utc::now(),
            category,
            severity,
            method: method.into(),
            thread,
            message: message.into(),
        }
    }
}

/// Receives monitor entries
pub trait TelemetrySink: Send + Sync {
    fn log(&self, entry: MonitorEntry);
}

pub type SharedTelemetrySink = Arc<dyn TelemetrySink>;

/// Forwards entries to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn log(&self, entry: MonitorEntry) {
        match entry.severity {
            MonitorSeverity::Debug => tracing::debug!(
                category = ?entry.category,
                method = %entry.method,
                thread = %entry.thread,
                "{}",
                entry.message
            ),
            MonitorSeverity::Information => tracing::info!(
                category = ?entry.category,
                method = %entry.method,
                thread = %entry.thread,
                "{}",
                entry.message
            ),
            MonitorSeverity::Warning => tracing::warn!(
                category = ?entry.category,
                method = %entry.method,
                thread = %entry.thread,
                "{}",
                entry.message
            ),
            MonitorSeverity::Error => tracing::error!(
                category = ?entry.category,
                method = %entry.method,
                thread = %entry.thread,
                "{}",
                entry.message
            ),
        }
    }
}

/// Keeps the most recent entries in memory and mirrors them to `tracing`
#[derive(Debug)]
pub struct MemorySink {
    entries: Mutex<VecDeque<MonitorEntry>>,
    capacity: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_MONITOR_CAPACITY)
    }
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_MONITOR_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn entries(&self) -> Vec<MonitorEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn entries_with(&self, severity: MonitorSeverity) -> Vec<MonitorEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.severity == severity)
            .collect()
    }

    pub fn entries_in(&self, category: MonitorCategory) -> Vec<MonitorEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.category == category)
            .collect()
    }

    /// Entries whose message contains `needle`
    pub fn find(&self, needle: &str) -> Vec<MonitorEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message.contains(needle))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl TelemetrySink for MemorySink {
    fn log(&self, entry: MonitorEntry) {
        TracingSink.log(entry.clone());
        // A poisoned buffer only loses diagnostics
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }
}

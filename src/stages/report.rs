// src/stages/report.rs

//! Non-fatal error reporting.

use std::fmt;
use std::sync::Mutex;

use tracing::error;

use crate::errors::StageError;
use crate::paths::AssetCategory;

/// Sink for errors that must not abort a build.
pub trait ErrorReporter: Send + Sync + fmt::Debug {
    fn report(&self, stage: AssetCategory, error: &StageError);
}

/// Console notifier: `Error: <message>` on stderr plus an `error!` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ErrorReporter for ConsoleReporter {
    fn report(&self, stage: AssetCategory, error: &StageError) {
        eprintln!("Error: {error}");
        error!(stage = %stage, error = %error, "stage error reported");
    }
}

/// Keeps every reported message in memory.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<(AssetCategory, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(AssetCategory, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, stage: AssetCategory, error: &StageError) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((stage, error.to_string()));
        }
    }
}

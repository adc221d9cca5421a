// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Tracing configuration

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Prefix prepended to every text line unless overridden
pub const DEFAULT_LINE_PREFIX: &str = "::[ntgate] - ";

/// In-memory trace sink, shared with whoever wants to read it back
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Trace output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// Human-readable text format
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Trace output destination
#[derive(Debug, Clone)]
pub enum TraceOutput {
    /// Output to stdout
    Stdout,
    /// Output to stderr
    Stderr,
    /// Output to a file
    File(PathBuf),
    /// Output to an in-memory buffer
    Buffer(SharedBuffer),
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Whether tracing is enabled
    pub enabled: bool,
    /// Output format
    pub format: TraceFormat,
    /// Output destination
    pub output: TraceOutput,
    /// Include timestamps in traces
    pub include_timestamps: bool,
    /// Include thread IDs in traces
    pub include_thread_ids: bool,
    /// Prefix for text lines
    pub prefix: Option<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: TraceFormat::Text,
            output: TraceOutput::Stderr,
            include_timestamps: true,
            include_thread_ids: true,
            prefix: Some(DEFAULT_LINE_PREFIX.to_string()),
        }
    }
}

impl TraceConfig {
    /// Create a new trace configuration with tracing enabled
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(mut self, format: TraceFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output destination
    #[must_use]
    pub fn with_output(mut self, output: TraceOutput) -> Self {
        self.output = output;
        self
    }

    /// Enable or disable timestamps
    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.include_timestamps = enable;
        self
    }

    /// Enable or disable thread IDs
    #[must_use]
    pub fn with_thread_ids(mut self, enable: bool) -> Self {
        self.include_thread_ids = enable;
        self
    }

    /// Set or clear the text line prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_string);
        self
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Main tracer component
//!
//! The tracer is a fire-and-forget sink: formatting or I/O failures are
//! dropped and never reach the operation being traced.

use super::{
    config::{SharedBuffer, TraceConfig, TraceFormat, TraceOutput},
    event::TraceEvent,
    filter::TraceFilter,
    formatter::{JsonFormatter, TextFormatter, TraceFormatter},
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

/// `Write` adapter over a [`SharedBuffer`]
struct SharedBufferWriter(SharedBuffer);

impl Write for SharedBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::other("trace buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn open_writer(output: &TraceOutput) -> io::Result<Box<dyn Write + Send>> {
    Ok(match output {
        TraceOutput::Stdout => Box::new(io::stdout()),
        TraceOutput::Stderr => Box::new(io::stderr()),
        TraceOutput::File(path) => Box::new(BufWriter::new(File::create(path)?)),
        TraceOutput::Buffer(buffer) => Box::new(SharedBufferWriter(Arc::clone(buffer))),
    })
}

/// Main tracer
pub struct Tracer {
    config: TraceConfig,
    filter: TraceFilter,
    writer: Mutex<Box<dyn Write + Send>>,
    formatter: Box<dyn TraceFormatter + Send + Sync>,
}

impl Tracer {
    /// Create a new tracer with the given configuration
    pub fn new(config: TraceConfig, filter: TraceFilter) -> io::Result<Self> {
        let writer = open_writer(&config.output)?;

        let formatter: Box<dyn TraceFormatter + Send + Sync> = match config.format {
            TraceFormat::Text => Box::new(TextFormatter::new()),
            TraceFormat::Json => Box::new(JsonFormatter::new()),
        };

        Ok(Self {
            config,
            filter,
            writer: Mutex::new(writer),
            formatter,
        })
    }

    /// A tracer that discards everything
    pub fn disabled() -> Self {
        Self {
            config: TraceConfig::default(),
            filter: TraceFilter::default(),
            writer: Mutex::new(Box::new(io::sink())),
            formatter: Box::new(TextFormatter::new()),
        }
    }

    /// Trace an event
    pub fn trace(&self, event: TraceEvent) {
        if !self.config.enabled || !self.filter.should_trace(&event) {
            return;
        }

        if let Ok(mut writer) = self.writer.lock() {
            let _ = self.formatter.format(&event, &self.config, &mut **writer);
            let _ = writer.flush();
        }
    }

    /// Check if tracing is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing::event::ApiCategory;
    use crate::tracing::filter::FilterRule;

    fn buffered(filter: TraceFilter) -> (Tracer, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let config = TraceConfig::enabled()
            .with_output(TraceOutput::Buffer(Arc::clone(&buffer)))
            .with_timestamps(false)
            .with_thread_ids(false);
        (Tracer::new(config, filter).unwrap(), buffer)
    }

    #[test]
    fn test_tracer_disabled() {
        let tracer = Tracer::new(TraceConfig::default(), TraceFilter::default()).unwrap();
        assert!(!tracer.is_enabled());
        assert!(!Tracer::disabled().is_enabled());
    }

    #[test]
    fn test_tracer_enabled() {
        let tracer = Tracer::new(TraceConfig::enabled(), TraceFilter::default()).unwrap();
        assert!(tracer.is_enabled());
    }

    #[test]
    fn test_tracer_writes_to_buffer() {
        let (tracer, buffer) = buffered(TraceFilter::default());
        tracer.trace(TraceEvent::status(
            "ValidateWideString",
            ApiCategory::Validation,
            "Empty buffer",
        ));

        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert_eq!(text, "::[ntgate] - STATUS ValidateWideString: Empty buffer\n");
    }

    #[test]
    fn test_tracer_applies_filter() {
        let filter =
            TraceFilter::new().add_rule(FilterRule::Category(vec![ApiCategory::Synchronization]));
        let (tracer, buffer) = buffered(filter);

        tracer.trace(TraceEvent::call("ValidateWideString", ApiCategory::Validation));
        assert!(buffer.lock().unwrap().is_empty());

        tracer.trace(TraceEvent::call("WaitForEvent", ApiCategory::Synchronization));
        assert!(!buffer.lock().unwrap().is_empty());
    }

    #[test]
    fn test_poisoned_buffer_is_ignored() {
        let (tracer, buffer) = buffered(TraceFilter::default());
        let poisoner = Arc::clone(&buffer);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the trace buffer");
        })
        .join();

        // Must not panic or report an error
        tracer.trace(TraceEvent::call("WaitForEvent", ApiCategory::Synchronization));
    }
}

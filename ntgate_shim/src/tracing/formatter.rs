// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Trace event formatters

use super::config::TraceConfig;
use super::event::{EventType, TraceEvent};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::SystemTime;

/// Trait for formatting trace events
pub trait TraceFormatter {
    /// Format a trace event to the output
    fn format(
        &self,
        event: &TraceEvent,
        config: &TraceConfig,
        writer: &mut dyn Write,
    ) -> io::Result<()>;
}

/// Text formatter - human-readable output
///
/// ```text
/// ::[ntgate] - [1700000000.123] [TID:4242] RETURN ValidateWideString(byte_length=10) -> Ok(length=4)
/// ::[ntgate] - [1700000000.124] [TID:4242] STATUS ValidateWideString: Invalid alignment
/// ```
#[derive(Default)]
pub struct TextFormatter;

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self
    }

    fn format_timestamp(timestamp: SystemTime) -> String {
        match timestamp.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(duration) => format!("{}.{:03}", duration.as_secs(), duration.subsec_millis()),
            Err(_) => "0.000".to_string(),
        }
    }
}

impl TraceFormatter for TextFormatter {
    fn format(
        &self,
        event: &TraceEvent,
        config: &TraceConfig,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let mut output = String::new();

        if let Some(prefix) = &config.prefix {
            output.push_str(prefix);
        }

        if config.include_timestamps {
            let _ = write!(output, "[{}] ", Self::format_timestamp(event.timestamp));
        }

        if config.include_thread_ids {
            match event.thread_id {
                Some(tid) => {
                    let _ = write!(output, "[TID:{tid:04}] ");
                }
                None => output.push_str("[TID:main] "),
            }
        }

        let _ = write!(output, "{:<6} {}", event.event_type, event.function);

        if event.event_type == EventType::Status {
            if let Some(message) = &event.message {
                let _ = write!(output, ": {message}");
            }
        } else {
            match &event.args {
                Some(args) => {
                    let _ = write!(output, "({args})");
                }
                None => output.push_str("()"),
            }
            if let Some(ret) = &event.return_value {
                let _ = write!(output, " -> {ret}");
            }
        }

        writeln!(writer, "{output}")
    }
}

/// JSON formatter - one object per line
#[derive(Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self
    }

    fn escape_json_string(s: &str) -> String {
        let mut escaped = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                '"' => escaped.push_str("\\\""),
                '\n' => escaped.push_str("\\n"),
                '\r' => escaped.push_str("\\r"),
                '\t' => escaped.push_str("\\t"),
                c if u32::from(c) < 0x20 => {
                    let _ = write!(escaped, "\\u{:04x}", u32::from(c));
                }
                c => escaped.push(c),
            }
        }
        escaped
    }
}

impl TraceFormatter for JsonFormatter {
    fn format(
        &self,
        event: &TraceEvent,
        config: &TraceConfig,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        write!(writer, "{{")?;

        if config.include_timestamps {
            match event.timestamp.duration_since(SystemTime::UNIX_EPOCH) {
                Ok(duration) => write!(
                    writer,
                    "\"timestamp\":{}.{:09},",
                    duration.as_secs(),
                    duration.subsec_nanos()
                )?,
                Err(_) => write!(writer, "\"timestamp\":0.0,")?,
            }
        }

        if config.include_thread_ids {
            match event.thread_id {
                Some(tid) => write!(writer, "\"thread_id\":{tid},")?,
                None => write!(writer, "\"thread_id\":null,")?,
            }
        }

        let event_type_str = match event.event_type {
            EventType::Call => "call",
            EventType::Return => "return",
            EventType::Status => "status",
        };
        write!(writer, "\"event\":\"{event_type_str}\"")?;
        write!(writer, ",\"category\":\"{}\"", event.category)?;
        write!(
            writer,
            ",\"function\":\"{}\"",
            Self::escape_json_string(&event.function)
        )?;

        if let Some(args) = &event.args {
            write!(writer, ",\"args\":\"{}\"", Self::escape_json_string(args))?;
        }
        if let Some(ret) = &event.return_value {
            write!(writer, ",\"return\":\"{}\"", Self::escape_json_string(ret))?;
        }
        if let Some(message) = &event.message {
            write!(writer, ",\"message\":\"{}\"", Self::escape_json_string(message))?;
        }

        writeln!(writer, "}}")
    }
}

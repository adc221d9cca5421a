// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Trace event definitions

use std::fmt;
use std::time::SystemTime;

/// Category of traced operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCategory {
    /// Caller-supplied buffer validation
    Validation,
    /// Named event gate operations
    Synchronization,
    /// Object manager calls (create, reference, dereference, close)
    ObjectManager,
    /// Wide-string utilities
    String,
    /// Unknown/uncategorized
    Unknown,
}

impl ApiCategory {
    /// Parse a category from its display name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "validation" => Some(ApiCategory::Validation),
            "synchronization" => Some(ApiCategory::Synchronization),
            "object_manager" => Some(ApiCategory::ObjectManager),
            "string" => Some(ApiCategory::String),
            "unknown" => Some(ApiCategory::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ApiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiCategory::Validation => write!(f, "validation"),
            ApiCategory::Synchronization => write!(f, "synchronization"),
            ApiCategory::ObjectManager => write!(f, "object_manager"),
            ApiCategory::String => write!(f, "string"),
            ApiCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// Trace event type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Function call started
    Call,
    /// Function call returned
    Return,
    /// Free-form status line
    Status,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Call => f.pad("CALL"),
            EventType::Return => f.pad("RETURN"),
            EventType::Status => f.pad("STATUS"),
        }
    }
}

/// A traced event
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Timestamp of the event
    pub timestamp: SystemTime,
    /// Thread ID (if available)
    pub thread_id: Option<u64>,
    /// Event type
    pub event_type: EventType,
    /// Category
    pub category: ApiCategory,
    /// Function name
    pub function: String,
    /// Function arguments (formatted as string)
    pub args: Option<String>,
    /// Return value (formatted as string)
    pub return_value: Option<String>,
    /// Status message
    pub message: Option<String>,
}

impl TraceEvent {
    fn new(function: &str, category: ApiCategory, event_type: EventType) -> Self {
        Self {
            timestamp: SystemTime::now(),
            thread_id: None,
            event_type,
            category,
            function: function.to_string(),
            args: None,
            return_value: None,
            message: None,
        }
    }

    /// Create a new call event
    pub fn call(function: &str, category: ApiCategory) -> Self {
        Self::new(function, category, EventType::Call)
    }

    /// Create a new return event
    pub fn return_event(function: &str, category: ApiCategory) -> Self {
        Self::new(function, category, EventType::Return)
    }

    /// Create a status line attributed to `function`
    pub fn status(function: &str, category: ApiCategory, message: impl Into<String>) -> Self {
        let mut event = Self::new(function, category, EventType::Status);
        event.message = Some(message.into());
        event
    }

    /// Set the arguments for this event
    #[must_use]
    pub fn with_args(mut self, args: String) -> Self {
        self.args = Some(args);
        self
    }

    /// Set the return value for this event
    #[must_use]
    pub fn with_return_value(mut self, return_value: String) -> Self {
        self.return_value = Some(return_value);
        self
    }

    /// Set the thread ID for this event
    #[must_use]
    pub fn with_thread_id(mut self, thread_id: u64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_round_trip() {
        for category in [
            ApiCategory::Validation,
            ApiCategory::Synchronization,
            ApiCategory::ObjectManager,
            ApiCategory::String,
        ] {
            assert_eq!(ApiCategory::from_name(&category.to_string()), Some(category));
        }
        assert_eq!(ApiCategory::from_name("file_io"), None);
    }

    #[test]
    fn test_event_type_honors_width() {
        assert_eq!(format!("{:<6}|", EventType::Call), "CALL  |");
        assert_eq!(format!("{:<6}|", EventType::Return), "RETURN|");
        assert_eq!(EventType::Status.to_string(), "STATUS");
    }

    #[test]
    fn test_status_event() {
        let event = TraceEvent::status("WaitForEvent", ApiCategory::Synchronization, "waiting")
            .with_thread_id(42);
        assert_eq!(event.event_type, EventType::Status);
        assert_eq!(event.message.as_deref(), Some("waiting"));
        assert_eq!(event.thread_id, Some(42));
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Diagnostic tracing
//!
//! Validation outcomes, gate failures, and object manager calls are reported
//! here as human-readable lines. Tracing is best effort: nothing traced can
//! fail the operation that produced it.

pub mod config;
pub mod event;
pub mod filter;
pub mod formatter;
pub mod tracer;
pub mod wrapper;

pub use config::{SharedBuffer, TraceConfig, TraceFormat, TraceOutput};
pub use event::{ApiCategory, EventType, TraceEvent};
pub use filter::{FilterRule, TraceFilter};
pub use formatter::{JsonFormatter, TextFormatter, TraceFormatter};
pub use tracer::Tracer;
pub use wrapper::TracedObjectManager;

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Tracing wrapper for object managers
//!
//! This module provides a wrapper that reports every call made into an
//! [`ObjectManager`] for debugging reference-count problems.

use crate::gate::{AccessMask, EventHandle, EventType, ObjectAttributes, ObjectManager, ObjectName};
use crate::status::NtStatus;
use crate::tracing::{ApiCategory, TraceEvent, Tracer};
use std::fmt::Display;
use std::sync::Arc;

/// Wrapper for an [`ObjectManager`] that adds tracing
pub struct TracedObjectManager<M: ObjectManager> {
    inner: M,
    tracer: Arc<Tracer>,
}

impl<M: ObjectManager> TracedObjectManager<M> {
    /// Create a new traced wrapper
    pub fn new(inner: M, tracer: Arc<Tracer>) -> Self {
        Self { inner, tracer }
    }

    /// Get a reference to the inner implementation
    pub fn inner(&self) -> &M {
        &self.inner
    }

    fn trace_call(&self, function: &str, args: String) {
        if self.tracer.is_enabled() {
            self.tracer
                .trace(TraceEvent::call(function, ApiCategory::ObjectManager).with_args(args));
        }
    }

    fn trace_return<T: Display>(&self, function: &str, result: &Result<T, NtStatus>) {
        if self.tracer.is_enabled() {
            let ret_str = match result {
                Ok(value) => format!("Ok({value})"),
                Err(status) => format!("Err(0x{status:08X})"),
            };
            self.tracer.trace(
                TraceEvent::return_event(function, ApiCategory::ObjectManager)
                    .with_return_value(ret_str),
            );
        }
    }
}

impl<M: ObjectManager> ObjectManager for TracedObjectManager<M> {
    type Event = M::Event;

    fn create_event(
        &self,
        name: &ObjectName,
        attributes: ObjectAttributes,
        desired_access: AccessMask,
        event_type: EventType,
        initial_state: bool,
    ) -> Result<EventHandle, NtStatus> {
        self.trace_call(
            "ZwCreateEvent",
            format!(
                "name=\"{name}\", attributes=0x{:X}, access=0x{:08X}, type={event_type:?}, initial={initial_state}",
                attributes.bits(),
                desired_access.bits()
            ),
        );

        let result =
            self.inner
                .create_event(name, attributes, desired_access, event_type, initial_state);

        self.trace_return("ZwCreateEvent", &result);
        result
    }

    fn reference_event_by_handle(
        &self,
        handle: EventHandle,
        desired_access: AccessMask,
    ) -> Result<Self::Event, NtStatus> {
        self.trace_call(
            "ObReferenceObjectByHandle",
            format!("handle={handle}, access=0x{:08X}", desired_access.bits()),
        );

        let result = self.inner.reference_event_by_handle(handle, desired_access);

        let summary = result.as_ref().map(|_| "referenced").map_err(|&status| status);
        self.trace_return("ObReferenceObjectByHandle", &summary);
        result
    }

    fn dereference_event(&self, event: &Self::Event) {
        self.trace_call("ObDereferenceObject", String::new());
        self.inner.dereference_event(event);
    }

    fn close_handle(&self, handle: EventHandle) -> Result<(), NtStatus> {
        self.trace_call("ZwClose", format!("handle={handle}"));

        let result = self.inner.close_handle(handle);

        let summary = result.map(|()| "closed");
        self.trace_return("ZwClose", &summary);
        result
    }
}

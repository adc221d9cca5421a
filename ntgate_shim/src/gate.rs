// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Named synchronization gate
//!
//! Creates, waits on, and signals named notification events that are shared
//! with less-trusted parties. The object namespace, handle table, and event
//! primitives belong to the environment, reached through [`ObjectManager`].
//!
//! Every operation resolves the caller's handle into an [`EventReference`]
//! for the duration of that one call. The reference is released by its
//! `Drop`, so each successful resolution is matched by exactly one release on
//! every exit path, and a failed resolution never releases anything.

use crate::status::{NtStatus, status_name};
use crate::tracing::{ApiCategory, TraceEvent, Tracer};
use crate::validator::ValidatedWideStr;
use crate::wstr;
use bitflags::bitflags;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

bitflags! {
    /// Access rights requested when opening or referencing an event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMask: u32 {
        const EVENT_QUERY_STATE = 0x0000_0001;
        const EVENT_MODIFY_STATE = 0x0000_0002;
        const DELETE = 0x0001_0000;
        const READ_CONTROL = 0x0002_0000;
        const WRITE_DAC = 0x0004_0000;
        const WRITE_OWNER = 0x0008_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const STANDARD_RIGHTS_REQUIRED = 0x000F_0000;
        const EVENT_ALL_ACCESS = Self::STANDARD_RIGHTS_REQUIRED.bits()
            | Self::SYNCHRONIZE.bits()
            | Self::EVENT_QUERY_STATE.bits()
            | Self::EVENT_MODIFY_STATE.bits();
    }
}

bitflags! {
    /// `OBJ_*` attributes applied when creating a named object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectAttributes: u32 {
        const INHERIT = 0x0000_0002;
        const PERMANENT = 0x0000_0010;
        const EXCLUSIVE = 0x0000_0020;
        const CASE_INSENSITIVE = 0x0000_0040;
        const OPENIF = 0x0000_0080;
        const KERNEL_HANDLE = 0x0000_0200;
    }
}

/// Right needed to block on an event
pub const WAIT_ACCESS: AccessMask = AccessMask::SYNCHRONIZE;

/// Right needed to set or reset an event
pub const MODIFY_ACCESS: AccessMask = AccessMask::EVENT_MODIFY_STATE;

/// Attributes of events created by the gate: opened if they already exist,
/// case-insensitive, outliving every handle, and usable from any context.
pub const GATE_EVENT_ATTRIBUTES: ObjectAttributes = ObjectAttributes::OPENIF
    .union(ObjectAttributes::CASE_INSENSITIVE)
    .union(ObjectAttributes::PERMANENT)
    .union(ObjectAttributes::KERNEL_HANDLE);

/// Event handle, opaque to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(pub u64);

impl fmt::Display for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Event reset behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Manual reset: stays signaled and releases every waiter until reset
    Notification,
    /// Auto reset: releases a single waiter and clears itself
    Synchronization,
}

/// Name of a kernel object, stored as UTF-16 without a terminator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName(Vec<u16>);

impl ObjectName {
    /// Build a name from UTF-8 text
    pub fn new(name: &str) -> Self {
        Self(name.encode_utf16().collect())
    }

    /// Build a name from wide characters, stopping at the first terminator
    pub fn from_wide(chars: &[u16]) -> Self {
        Self(wstr::terminated(chars).to_vec())
    }

    /// The name's characters
    pub fn as_wide(&self) -> &[u16] {
        &self.0
    }

    /// True for the empty name
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive equality
    pub fn eq_ignore_case(&self, other: &ObjectName) -> bool {
        wstr::compare_ignore_case(&self.0, &other.0) == 0
    }
}

impl From<ValidatedWideStr<'_>> for ObjectName {
    fn from(validated: ValidatedWideStr<'_>) -> Self {
        Self(validated.as_slice().to_vec())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf16_lossy(&self.0))
    }
}

/// A referenced event object
pub trait KernelEvent {
    /// Block until the event is signaled
    fn wait(&self) -> Result<(), NtStatus>;

    /// Signal the event, returning the previous state
    fn set(&self) -> Result<bool, NtStatus>;

    /// Clear the event, returning the previous state
    fn reset(&self) -> Result<bool, NtStatus>;

    /// Current state
    fn is_signaled(&self) -> bool;
}

/// The environment that owns named objects and handles
///
/// Implementations decide how names, handles, and events are represented.
/// Every value returned by [`ObjectManager::reference_event_by_handle`] holds a
/// reference that must be given back through
/// [`ObjectManager::dereference_event`] exactly once; use
/// [`EventReference`] rather than calling these directly.
pub trait ObjectManager {
    /// Referenced event object
    type Event: KernelEvent;

    /// ZwCreateEvent - Create or open a named event
    fn create_event(
        &self,
        name: &ObjectName,
        attributes: ObjectAttributes,
        desired_access: AccessMask,
        event_type: EventType,
        initial_state: bool,
    ) -> Result<EventHandle, NtStatus>;

    /// ObReferenceObjectByHandle - Resolve a handle to a referenced event
    ///
    /// Fails if the handle is unknown, names something other than an event,
    /// or was not granted `desired_access`.
    fn reference_event_by_handle(
        &self,
        handle: EventHandle,
        desired_access: AccessMask,
    ) -> Result<Self::Event, NtStatus>;

    /// ObDereferenceObject - Give back a reference taken by
    /// [`ObjectManager::reference_event_by_handle`]
    fn dereference_event(&self, event: &Self::Event);

    /// ZwClose - Close a handle
    fn close_handle(&self, handle: EventHandle) -> Result<(), NtStatus>;
}

/// A resolved event reference, released when dropped
///
/// Constructing one is the only way the gate resolves a handle, and dropping
/// it is the only way the reference is released.
pub struct EventReference<'m, M: ObjectManager + ?Sized> {
    manager: &'m M,
    event: M::Event,
}

impl<'m, M: ObjectManager + ?Sized> EventReference<'m, M> {
    /// Resolve `handle` with `desired_access`
    pub fn resolve(
        manager: &'m M,
        handle: EventHandle,
        desired_access: AccessMask,
    ) -> Result<Self, NtStatus> {
        let event = manager.reference_event_by_handle(handle, desired_access)?;
        Ok(Self { manager, event })
    }
}

impl<M: ObjectManager + ?Sized> Deref for EventReference<'_, M> {
    type Target = M::Event;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

impl<M: ObjectManager + ?Sized> Drop for EventReference<'_, M> {
    fn drop(&mut self) {
        self.manager.dereference_event(&self.event);
    }
}

/// Failures of gate operations, each carrying the environment's status
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("Failed to create named event: 0x{0:08X}")]
    CreationFailed(NtStatus),

    #[error("Failed to obtain event object: 0x{0:08X}")]
    ResolutionFailed(NtStatus),

    #[error("Failed to wait for event: 0x{0:08X}")]
    WaitFailed(NtStatus),

    #[error("Failed to set or reset named event: 0x{0:08X}")]
    OperationFailed(NtStatus),
}

impl GateError {
    /// Underlying environment status
    pub fn status(&self) -> NtStatus {
        match *self {
            GateError::CreationFailed(status)
            | GateError::ResolutionFailed(status)
            | GateError::WaitFailed(status)
            | GateError::OperationFailed(status) => status,
        }
    }
}

/// Create, wait on, and signal named events through an [`ObjectManager`]
///
/// The gate holds no per-call state: handles are resolved afresh on every
/// call and nothing is cached, so it is safe to share between threads
/// whenever the manager is.
pub struct NamedEventGate<M: ObjectManager> {
    manager: M,
    tracer: Arc<Tracer>,
}

impl<M: ObjectManager> NamedEventGate<M> {
    /// Create a gate over `manager`, reporting failures to `tracer`
    pub fn new(manager: M, tracer: Arc<Tracer>) -> Self {
        Self { manager, tracer }
    }

    /// The underlying object manager
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Create, or open if it already exists, a named notification event in
    /// the unsignaled state. The returned handle carries full event access.
    pub fn create_named(&self, name: &ObjectName) -> Result<EventHandle, GateError> {
        self.manager
            .create_event(
                name,
                GATE_EVENT_ATTRIBUTES,
                AccessMask::EVENT_ALL_ACCESS,
                EventType::Notification,
                false,
            )
            .map_err(GateError::CreationFailed)
            .inspect_err(|e| self.report_failure("CreateNamedEvent", e))
    }

    /// Block until the event behind `handle` is signaled.
    ///
    /// There is no timeout; only a signal from another party releases the
    /// wait.
    pub fn wait(&self, handle: EventHandle) -> Result<(), GateError> {
        let event = EventReference::resolve(&self.manager, handle, WAIT_ACCESS)
            .map_err(GateError::ResolutionFailed)
            .inspect_err(|e| self.report_failure("WaitForEvent", e))?;

        event
            .wait()
            .map_err(GateError::WaitFailed)
            .inspect_err(|e| self.report_failure("WaitForEvent", e))
    }

    /// Signal (`should_set`) or clear the event behind `handle`.
    ///
    /// A signaled notification event stays signaled, releasing current and
    /// future waiters, until it is cleared.
    pub fn set_or_reset(&self, handle: EventHandle, should_set: bool) -> Result<(), GateError> {
        let function = if should_set {
            "SetNamedEvent"
        } else {
            "ResetNamedEvent"
        };

        let event = EventReference::resolve(&self.manager, handle, MODIFY_ACCESS)
            .map_err(GateError::ResolutionFailed)
            .inspect_err(|e| self.report_failure(function, e))?;

        let outcome = if should_set {
            event.set()
        } else {
            event.reset()
        };
        outcome
            .map(|_previous| ())
            .map_err(GateError::OperationFailed)
            .inspect_err(|e| self.report_failure(function, e))
    }

    /// Close a handle previously returned by [`NamedEventGate::create_named`]
    pub fn close(&self, handle: EventHandle) -> Result<(), NtStatus> {
        self.manager.close_handle(handle)
    }

    fn report_failure(&self, function: &str, error: &GateError) {
        if self.tracer.is_enabled() {
            let message = format!("{error} ({})", status_name(error.status()));
            self.tracer.trace(TraceEvent::status(
                function,
                ApiCategory::Synchronization,
                message,
            ));
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! In-process NT-style object manager
//!
//! Objects live in a case-insensitive namespace and are reached through
//! handles. Each handle records the access granted when it was created, and
//! resolving a handle checks both the object type and that access.
//!
//! Every object carries a pointer count of outstanding references taken via
//! [`LinuxObjectManager::reference_event`]. The manager also keeps running
//! totals of references acquired and released, plus any release that found no
//! outstanding reference, so leaks and double releases are observable.
//!
//! Events are `Mutex<bool>` + `Condvar`. The table lock is never held while
//! blocking on an event.

use crate::{PlatformError, Result};
use ntgate_shim::status::{NtStatus, STATUS_ABANDONED, STATUS_OBJECT_TYPE_MISMATCH, STATUS_UNSUCCESSFUL};
use ntgate_shim::wstr;
use ntgate_shim::{
    AccessMask, EventHandle, EventType, KernelEvent, ObjectAttributes, ObjectManager, ObjectName,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Default number of handles the table will hand out
pub const DEFAULT_HANDLE_QUOTA: usize = 1 << 16;

/// First handle value; handles are multiples of 4 like NT handles
const FIRST_HANDLE: u64 = 0x1000;
const HANDLE_STRIDE: u64 = 4;

/// Event state
struct EventObject {
    event_type: EventType,
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl EventObject {
    fn new(event_type: EventType, initial_state: bool) -> Self {
        Self {
            event_type,
            signaled: Mutex::new(initial_state),
            cond: Condvar::new(),
        }
    }

    fn wait(&self) -> core::result::Result<(), NtStatus> {
        let mut signaled = self.signaled.lock().map_err(|_| STATUS_ABANDONED)?;
        while !*signaled {
            signaled = self.cond.wait(signaled).map_err(|_| STATUS_ABANDONED)?;
        }
        if self.event_type == EventType::Synchronization {
            *signaled = false;
        }
        Ok(())
    }

    fn set(&self) -> core::result::Result<bool, NtStatus> {
        let mut signaled = self.signaled.lock().map_err(|_| STATUS_UNSUCCESSFUL)?;
        let previous = core::mem::replace(&mut *signaled, true);
        match self.event_type {
            EventType::Notification => self.cond.notify_all(),
            EventType::Synchronization => self.cond.notify_one(),
        }
        Ok(previous)
    }

    fn reset(&self) -> core::result::Result<bool, NtStatus> {
        let mut signaled = self.signaled.lock().map_err(|_| STATUS_UNSUCCESSFUL)?;
        Ok(core::mem::replace(&mut *signaled, false))
    }

    fn is_signaled(&self) -> bool {
        self.signaled.lock().map(|s| *s).unwrap_or(false)
    }
}

enum ObjectBody {
    Event(EventObject),
    Directory,
}

/// A named kernel object
struct KernelObject {
    name: ObjectName,
    body: ObjectBody,
    permanent: AtomicBool,
    pointer_count: AtomicUsize,
}

impl KernelObject {
    fn new(name: ObjectName, body: ObjectBody, attributes: ObjectAttributes) -> Self {
        Self {
            name,
            body,
            permanent: AtomicBool::new(attributes.contains(ObjectAttributes::PERMANENT)),
            pointer_count: AtomicUsize::new(0),
        }
    }

    fn as_event(&self) -> Option<&EventObject> {
        match &self.body {
            ObjectBody::Event(event) => Some(event),
            ObjectBody::Directory => None,
        }
    }
}

/// An event resolved from a handle
///
/// Holds one pointer-count reference on the object until handed back through
/// [`LinuxObjectManager::dereference_event`].
pub struct ReferencedEvent(Arc<KernelObject>);

impl ReferencedEvent {
    fn event(&self) -> core::result::Result<&EventObject, NtStatus> {
        self.0.as_event().ok_or(STATUS_OBJECT_TYPE_MISMATCH)
    }

    /// Name the event was created under
    pub fn name(&self) -> &ObjectName {
        &self.0.name
    }
}

impl KernelEvent for ReferencedEvent {
    fn wait(&self) -> core::result::Result<(), NtStatus> {
        self.event()?.wait()
    }

    fn set(&self) -> core::result::Result<bool, NtStatus> {
        self.event()?.set()
    }

    fn reset(&self) -> core::result::Result<bool, NtStatus> {
        self.event()?.reset()
    }

    fn is_signaled(&self) -> bool {
        self.event().is_ok_and(EventObject::is_signaled)
    }
}

struct HandleEntry {
    object: Arc<KernelObject>,
    granted: AccessMask,
}

/// Namespace and handle table, guarded together
struct ObjectTables {
    namespace: HashMap<Vec<u16>, Arc<KernelObject>>,
    handles: HashMap<u64, HandleEntry>,
    next_handle: u64,
}

impl ObjectTables {
    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += HANDLE_STRIDE;
        handle
    }

    fn is_open(&self, object: &Arc<KernelObject>) -> bool {
        self.handles
            .values()
            .any(|entry| Arc::ptr_eq(&entry.object, object))
    }

    /// Drop a non-permanent object from the namespace once no handle refers to it
    fn retire_if_unused(&mut self, object: &Arc<KernelObject>) {
        if object.permanent.load(Ordering::SeqCst) || self.is_open(object) {
            return;
        }
        let key = namespace_key(&object.name);
        if self
            .namespace
            .get(&key)
            .is_some_and(|named| Arc::ptr_eq(named, object))
        {
            self.namespace.remove(&key);
        }
    }
}

/// Lookups ignore case, so names are keyed by their folded form
fn namespace_key(name: &ObjectName) -> Vec<u16> {
    name.as_wide().iter().map(|&c| wstr::fold(c)).collect()
}

/// Linux implementation of [`ObjectManager`]
pub struct LinuxObjectManager {
    tables: Mutex<ObjectTables>,
    handle_quota: usize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    over_released: AtomicUsize,
}

impl LinuxObjectManager {
    /// Create an empty object manager
    pub fn new() -> Self {
        Self::with_handle_quota(DEFAULT_HANDLE_QUOTA)
    }

    /// Create an object manager that refuses to open more than `quota` handles
    pub fn with_handle_quota(quota: usize) -> Self {
        Self {
            tables: Mutex::new(ObjectTables {
                namespace: HashMap::new(),
                handles: HashMap::new(),
                next_handle: FIRST_HANDLE,
            }),
            handle_quota: quota,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            over_released: AtomicUsize::new(0),
        }
    }

    fn tables(&self) -> Result<MutexGuard<'_, ObjectTables>> {
        self.tables.lock().map_err(|_| PlatformError::LockPoisoned)
    }

    fn insert_named(
        &self,
        name: &ObjectName,
        attributes: ObjectAttributes,
        desired_access: AccessMask,
        make_body: impl FnOnce() -> ObjectBody,
        is_compatible: impl Fn(&KernelObject) -> bool,
    ) -> Result<u64> {
        if name.is_empty() {
            return Err(PlatformError::NameInvalid);
        }

        let mut tables = self.tables()?;
        if tables.handles.len() >= self.handle_quota {
            return Err(PlatformError::QuotaExceeded(self.handle_quota));
        }

        let key = namespace_key(name);
        let object = match tables.namespace.get(&key) {
            Some(existing) => {
                if !attributes.contains(ObjectAttributes::OPENIF)
                    || attributes.contains(ObjectAttributes::EXCLUSIVE)
                {
                    return Err(PlatformError::NameCollision(name.to_string()));
                }
                if !is_compatible(&**existing) {
                    return Err(PlatformError::TypeMismatch(0));
                }
                if attributes.contains(ObjectAttributes::PERMANENT) {
                    existing.permanent.store(true, Ordering::SeqCst);
                }
                Arc::clone(existing)
            }
            None => {
                let object = Arc::new(KernelObject::new(name.clone(), make_body(), attributes));
                tables.namespace.insert(key, Arc::clone(&object));
                object
            }
        };

        let handle = tables.allocate_handle();
        tables.handles.insert(
            handle,
            HandleEntry {
                object,
                granted: desired_access,
            },
        );
        Ok(handle)
    }

    /// ZwCreateEvent - Create or open a named event
    pub fn create_named_event(
        &self,
        name: &ObjectName,
        attributes: ObjectAttributes,
        desired_access: AccessMask,
        event_type: EventType,
        initial_state: bool,
    ) -> Result<EventHandle> {
        self.insert_named(
            name,
            attributes,
            desired_access,
            || ObjectBody::Event(EventObject::new(event_type, initial_state)),
            |existing| existing.as_event().is_some(),
        )
        .map(EventHandle)
    }

    /// ZwCreateDirectoryObject - Create or open a named directory
    ///
    /// Directories hold no state here; they exist so that names can be
    /// occupied by something other than an event.
    pub fn create_directory(
        &self,
        name: &ObjectName,
        attributes: ObjectAttributes,
        desired_access: AccessMask,
    ) -> Result<u64> {
        self.insert_named(
            name,
            attributes,
            desired_access,
            || ObjectBody::Directory,
            |existing| matches!(existing.body, ObjectBody::Directory),
        )
    }

    /// ObReferenceObjectByHandle - Resolve an event handle and take a reference
    pub fn reference_event(
        &self,
        handle: EventHandle,
        desired_access: AccessMask,
    ) -> Result<ReferencedEvent> {
        let tables = self.tables()?;
        let entry = tables
            .handles
            .get(&handle.0)
            .ok_or(PlatformError::InvalidHandle(handle.0))?;

        if entry.object.as_event().is_none() {
            return Err(PlatformError::TypeMismatch(handle.0));
        }
        if !entry.granted.contains(desired_access) {
            return Err(PlatformError::access_denied(
                handle.0,
                desired_access,
                entry.granted,
            ));
        }

        entry.object.pointer_count.fetch_add(1, Ordering::SeqCst);
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(ReferencedEvent(Arc::clone(&entry.object)))
    }

    /// ObDereferenceObject - Give back a reference
    ///
    /// A release with no outstanding reference is counted, not applied.
    pub fn dereference(&self, event: &ReferencedEvent) {
        let released = event
            .0
            .pointer_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
        match released {
            Ok(_) => self.released.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.over_released.fetch_add(1, Ordering::SeqCst),
        };
    }

    /// ZwClose - Close a handle
    pub fn close(&self, handle: u64) -> Result<()> {
        let mut tables = self.tables()?;
        let entry = tables
            .handles
            .remove(&handle)
            .ok_or(PlatformError::InvalidHandle(handle))?;
        tables.retire_if_unused(&entry.object);
        Ok(())
    }

    /// ZwMakeTemporaryObject - Clear permanence so the name goes away with
    /// the last handle
    pub fn make_temporary(&self, handle: u64) -> Result<()> {
        let tables = self.tables()?;
        let entry = tables
            .handles
            .get(&handle)
            .ok_or(PlatformError::InvalidHandle(handle))?;
        if !entry.granted.contains(AccessMask::DELETE) {
            return Err(PlatformError::access_denied(
                handle,
                AccessMask::DELETE,
                entry.granted,
            ));
        }
        entry.object.permanent.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// True if `name` is currently in the namespace
    pub fn contains_name(&self, name: &ObjectName) -> bool {
        self.tables()
            .is_ok_and(|tables| tables.namespace.contains_key(&namespace_key(name)))
    }

    /// Number of open handles
    pub fn handle_count(&self) -> usize {
        self.tables().map_or(0, |tables| tables.handles.len())
    }

    /// Outstanding references on the object behind `handle`
    pub fn outstanding_references(&self, handle: u64) -> Option<usize> {
        let tables = self.tables().ok()?;
        tables
            .handles
            .get(&handle)
            .map(|entry| entry.object.pointer_count.load(Ordering::SeqCst))
    }

    /// Total references handed out
    pub fn references_acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Total references given back
    pub fn references_released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Releases that found no outstanding reference
    pub fn over_releases(&self) -> usize {
        self.over_released.load(Ordering::SeqCst)
    }
}

impl Default for LinuxObjectManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectManager for LinuxObjectManager {
    type Event = ReferencedEvent;

    fn create_event(
        &self,
        name: &ObjectName,
        attributes: ObjectAttributes,
        desired_access: AccessMask,
        event_type: EventType,
        initial_state: bool,
    ) -> core::result::Result<EventHandle, NtStatus> {
        self.create_named_event(name, attributes, desired_access, event_type, initial_state)
            .map_err(|e| e.status())
    }

    fn reference_event_by_handle(
        &self,
        handle: EventHandle,
        desired_access: AccessMask,
    ) -> core::result::Result<ReferencedEvent, NtStatus> {
        self.reference_event(handle, desired_access)
            .map_err(|e| e.status())
    }

    fn dereference_event(&self, event: &ReferencedEvent) {
        self.dereference(event);
    }

    fn close_handle(&self, handle: EventHandle) -> core::result::Result<(), NtStatus> {
        self.close(handle.0).map_err(|e| e.status())
    }
}

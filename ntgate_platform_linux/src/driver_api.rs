// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Privileged entry points
//!
//! `extern "C"` functions that a dispatch layer calls with whatever the
//! less-trusted side handed it. Every pointer-plus-length pair goes through
//! the buffer validator before it is read as a string, and every handle goes
//! through the named event gate, so nothing here trusts its arguments.
//!
//! The entry points share one process-wide [`DriverContext`]. Call
//! [`install`] before the first entry point to route diagnostics somewhere;
//! otherwise a context with tracing disabled is created on first use.

use crate::current_thread_id;
use crate::object_manager::LinuxObjectManager;
use ntgate_shim::status::{NtStatus, STATUS_INVALID_PARAMETER, STATUS_SUCCESS};
use ntgate_shim::tracing::{ApiCategory, TraceEvent, TracedObjectManager, Tracer};
use ntgate_shim::validator;
use ntgate_shim::wstr;
use ntgate_shim::{BufferValidator, EventHandle, NamedEventGate, ObjectName, RawWideBuffer};
use std::ffi::{CStr, c_char};
use std::sync::{Arc, OnceLock};

/// Everything the entry points share
pub struct DriverContext {
    tracer: Arc<Tracer>,
    validator: BufferValidator,
    gate: NamedEventGate<TracedObjectManager<LinuxObjectManager>>,
}

impl DriverContext {
    /// Build a context over a fresh object manager
    pub fn new(tracer: Tracer) -> Self {
        Self::with_object_manager(LinuxObjectManager::new(), tracer)
    }

    /// Build a context over `manager`
    pub fn with_object_manager(manager: LinuxObjectManager, tracer: Tracer) -> Self {
        let tracer = Arc::new(tracer);
        let traced = TracedObjectManager::new(manager, Arc::clone(&tracer));
        Self {
            validator: BufferValidator::new(Arc::clone(&tracer)),
            gate: NamedEventGate::new(traced, Arc::clone(&tracer)),
            tracer,
        }
    }

    /// The object manager behind the gate, for inspecting reference counts
    pub fn object_manager(&self) -> &LinuxObjectManager {
        self.gate.manager().inner()
    }

    /// The buffer validator
    pub fn validator(&self) -> &BufferValidator {
        &self.validator
    }

    /// The named event gate
    pub fn gate(&self) -> &NamedEventGate<TracedObjectManager<LinuxObjectManager>> {
        &self.gate
    }

    /// Report a call into an entry point and its resulting status
    fn traced(
        &self,
        function: &str,
        args: impl FnOnce() -> String,
        call: impl FnOnce() -> NtStatus,
    ) -> NtStatus {
        let tid = current_thread_id();
        if self.tracer.is_enabled() {
            self.tracer.trace(
                TraceEvent::call(function, ApiCategory::Synchronization)
                    .with_args(args())
                    .with_thread_id(tid),
            );
        }

        let status = call();

        if self.tracer.is_enabled() {
            self.tracer.trace(
                TraceEvent::return_event(function, ApiCategory::Synchronization)
                    .with_return_value(format!("0x{status:08X}"))
                    .with_thread_id(tid),
            );
        }
        status
    }

    /// Report the result of a string utility
    fn report_string_call(&self, function: &str, result: impl FnOnce() -> String) {
        if self.tracer.is_enabled() {
            self.tracer.trace(
                TraceEvent::return_event(function, ApiCategory::String)
                    .with_return_value(result())
                    .with_thread_id(current_thread_id()),
            );
        }
    }
}

static CONTEXT: OnceLock<DriverContext> = OnceLock::new();

/// Install the process-wide context.
///
/// Returns `false` if a context was already installed or created by an
/// earlier call into an entry point; the existing one is kept.
pub fn install(tracer: Tracer) -> bool {
    CONTEXT.set(DriverContext::new(tracer)).is_ok()
}

/// The process-wide context
pub fn context() -> &'static DriverContext {
    CONTEXT.get_or_init(|| DriverContext::new(Tracer::disabled()))
}

/// Read a NUL-terminated wide string from a trusted caller
///
/// # Safety
/// `ptr` must be non-null, aligned and point to a NUL-terminated wide string
/// that outlives `'a`.
unsafe fn wide_cstr<'a>(ptr: *const u16) -> &'a [u16] {
    let mut len = 0;
    // SAFETY: the string is terminated, so every index up to the terminator is readable
    while unsafe { *ptr.add(len) } != wstr::WIDE_NUL {
        len += 1;
    }
    // SAFETY: the first `len` characters were just read
    unsafe { core::slice::from_raw_parts(ptr, len) }
}

/// Validate a caller-supplied wide string
///
/// On success writes the character count before the terminator to
/// `out_length` (when non-null) and returns `STATUS_SUCCESS`. Otherwise
/// returns `STATUS_INVALID_BUFFER_SIZE` for an odd or misaligned buffer,
/// `STATUS_INVALID_PARAMETER` for a null buffer, or `STATUS_UNSUCCESSFUL` when
/// no terminator occurs within `byte_length`.
///
/// # Safety
/// If `buffer` is non-null and aligned, it must be readable for `byte_length`
/// bytes. `out_length` must be null or valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ntgate_ValidateWideString(
    buffer: *const u16,
    byte_length: usize,
    out_length: *mut usize,
) -> NtStatus {
    // SAFETY: forwarded from the caller
    let raw = unsafe { RawWideBuffer::from_raw(buffer, byte_length) };
    match context().validator.validate(raw) {
        Ok(validated) => {
            if !out_length.is_null() {
                // SAFETY: caller guarantees out_length is writable when non-null
                unsafe { out_length.write(validated.len()) };
            }
            STATUS_SUCCESS
        }
        Err(e) => e.status(),
    }
}

/// Quick check for a null or empty wide string
///
/// Returns 1 when `buffer` is null or its first character is the terminator.
/// A misaligned pointer is never read and counts as null.
///
/// # Safety
/// `buffer` must be null or readable for one wide character.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ntgate_IsStringNull(buffer: *const u16) -> u8 {
    if !buffer.is_aligned() {
        return 1;
    }
    // SAFETY: aligned, and readable for one character when non-null
    let first = unsafe { buffer.as_ref() }.map(core::slice::from_ref);
    u8::from(validator::is_empty_or_null(first))
}

/// Create, or open if it exists, a named notification event
///
/// The name is validated like [`ntgate_ValidateWideString`] before use. The
/// new handle is written to `out_handle` and carries full event access.
///
/// # Safety
/// `out_handle` must be valid for a write. If `name` is non-null and aligned,
/// it must be readable for `name_byte_length` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ntgate_CreateNamedEvent(
    out_handle: *mut u64,
    name: *const u16,
    name_byte_length: usize,
) -> NtStatus {
    let ctx = context();
    ctx.traced(
        "CreateNamedEvent",
        || format!("name_byte_length={name_byte_length}"),
        || {
            if out_handle.is_null() {
                return STATUS_INVALID_PARAMETER;
            }
            // SAFETY: forwarded from the caller
            let raw = unsafe { RawWideBuffer::from_raw(name, name_byte_length) };
            let validated = match ctx.validator.validate(raw) {
                Ok(validated) => validated,
                Err(e) => return e.status(),
            };
            match ctx.gate.create_named(&ObjectName::from(validated)) {
                Ok(handle) => {
                    // SAFETY: caller guarantees out_handle is writable
                    unsafe { out_handle.write(handle.0) };
                    STATUS_SUCCESS
                }
                Err(e) => e.status(),
            }
        },
    )
}

/// Block until the event behind `handle` is signaled
#[unsafe(no_mangle)]
pub extern "C" fn ntgate_WaitForEvent(handle: u64) -> NtStatus {
    let ctx = context();
    ctx.traced(
        "WaitForEvent",
        || format!("handle={}", EventHandle(handle)),
        || match ctx.gate.wait(EventHandle(handle)) {
            Ok(()) => STATUS_SUCCESS,
            Err(e) => e.status(),
        },
    )
}

/// Signal (`set` non-zero) or clear the event behind `handle`
#[unsafe(no_mangle)]
pub extern "C" fn ntgate_SetNamedEvent(handle: u64, set: u8) -> NtStatus {
    let ctx = context();
    let should_set = set != 0;
    ctx.traced(
        if should_set {
            "SetNamedEvent"
        } else {
            "ResetNamedEvent"
        },
        || format!("handle={}", EventHandle(handle)),
        || match ctx.gate.set_or_reset(EventHandle(handle), should_set) {
            Ok(()) => STATUS_SUCCESS,
            Err(e) => e.status(),
        },
    )
}

/// Close a handle returned by [`ntgate_CreateNamedEvent`]
#[unsafe(no_mangle)]
pub extern "C" fn ntgate_CloseHandle(handle: u64) -> NtStatus {
    let ctx = context();
    ctx.traced(
        "CloseHandle",
        || format!("handle={}", EventHandle(handle)),
        || match ctx.gate.close(EventHandle(handle)) {
            Ok(()) => STATUS_SUCCESS,
            Err(status) => status,
        },
    )
}

/// StrCmpIW - case-insensitive wide string comparison
///
/// Returns negative, zero, or positive like wcscmp. A null string sorts
/// before any non-null one and two nulls are equal.
///
/// # Safety
/// `s1` and `s2` must be null or valid NUL-terminated wide strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ntgate_StrCmpIW(s1: *const u16, s2: *const u16) -> i32 {
    let ordering = match (s1.is_null(), s2.is_null()) {
        (true, true) => 0,
        (true, false) => -1,
        (false, true) => 1,
        // SAFETY: both are non-null terminated strings per the caller
        (false, false) => unsafe { wstr::compare_ignore_case(wide_cstr(s1), wide_cstr(s2)) },
    };
    context().report_string_call("StrCmpIW", || ordering.to_string());
    ordering
}

/// StrStrIW - find the first case-insensitive occurrence of `pattern`
///
/// Returns a pointer into `haystack`, or null when there is no match or
/// either argument is null. An empty pattern matches at the start.
///
/// # Safety
/// `haystack` and `pattern` must be null or valid NUL-terminated wide strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ntgate_StrStrIW(haystack: *const u16, pattern: *const u16) -> *const u16 {
    if haystack.is_null() || pattern.is_null() {
        return core::ptr::null();
    }
    // SAFETY: both are non-null terminated strings per the caller
    let (h, p) = unsafe { (wide_cstr(haystack), wide_cstr(pattern)) };
    let found = wstr::find_ignore_case(h, p);
    context().report_string_call("StrStrIW", || match found {
        Some(index) => format!("index {index}"),
        None => "NULL".to_string(),
    });
    match found {
        // SAFETY: index is within the haystack
        Some(index) => unsafe { haystack.add(index) },
        None => core::ptr::null(),
    }
}

/// Return a pointer to the file name after the last backslash of `path`
///
/// Returns null when `path` is null or contains no backslash.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ntgate_GetBaseNameFromFullPath(path: *const c_char) -> *const c_char {
    if path.is_null() {
        return core::ptr::null();
    }
    // SAFETY: non-null terminated string per the caller
    let bytes = unsafe { CStr::from_ptr(path) }.to_bytes();
    let base = wstr::base_name(bytes);
    context().report_string_call("GetBaseNameFromFullPath", || {
        base.map_or_else(|| "NULL".to_string(), |b| String::from_utf8_lossy(b).into_owned())
    });
    match base {
        Some(base) => {
            let offset = bytes.len() - base.len();
            // SAFETY: offset is within the string
            unsafe { path.add(offset) }
        }
        None => core::ptr::null(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntgate_shim::status::{
        STATUS_INVALID_BUFFER_SIZE, STATUS_INVALID_HANDLE, STATUS_OBJECT_NAME_INVALID,
        STATUS_UNSUCCESSFUL,
    };
    use std::ffi::CString;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn to_wide(s: &str) -> Vec<u16> {
        wstr::encode_wide(s)
    }

    fn byte_len(wide: &[u16]) -> usize {
        wide.len() * 2
    }

    #[test]
    fn test_validate_wide_string() {
        let s = to_wide("Hello");
        let mut len = 0usize;
        unsafe {
            assert_eq!(
                ntgate_ValidateWideString(s.as_ptr(), byte_len(&s), &raw mut len),
                STATUS_SUCCESS
            );
            assert_eq!(len, 5);

            assert_eq!(
                ntgate_ValidateWideString(s.as_ptr(), 7, &raw mut len),
                STATUS_INVALID_BUFFER_SIZE
            );
            assert_eq!(
                ntgate_ValidateWideString(core::ptr::null(), 8, &raw mut len),
                STATUS_INVALID_PARAMETER
            );
            // The claim stops short of the terminator
            assert_eq!(
                ntgate_ValidateWideString(s.as_ptr(), 10, core::ptr::null_mut()),
                STATUS_UNSUCCESSFUL
            );
        }
    }

    #[test]
    fn test_is_string_null() {
        let empty = to_wide("");
        let full = to_wide("x");
        unsafe {
            assert_eq!(ntgate_IsStringNull(core::ptr::null()), 1);
            assert_eq!(ntgate_IsStringNull(empty.as_ptr()), 1);
            assert_eq!(ntgate_IsStringNull(full.as_ptr()), 0);
        }
    }

    #[test]
    fn test_named_event_lifecycle() {
        let name = to_wide("\\BaseNamedObjects\\DriverApiLifecycle");
        let mut handle = 0u64;
        unsafe {
            assert_eq!(
                ntgate_CreateNamedEvent(&raw mut handle, name.as_ptr(), byte_len(&name)),
                STATUS_SUCCESS
            );
        }
        assert_ne!(handle, 0);

        assert_eq!(ntgate_SetNamedEvent(handle, 1), STATUS_SUCCESS);
        assert_eq!(ntgate_WaitForEvent(handle), STATUS_SUCCESS);
        assert_eq!(ntgate_SetNamedEvent(handle, 0), STATUS_SUCCESS);

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || tx.send(ntgate_WaitForEvent(handle)).unwrap());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(ntgate_SetNamedEvent(handle, 1), STATUS_SUCCESS);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), STATUS_SUCCESS);
        waiter.join().unwrap();

        assert_eq!(ntgate_CloseHandle(handle), STATUS_SUCCESS);
        assert_eq!(ntgate_CloseHandle(handle), STATUS_INVALID_HANDLE);
    }

    #[test]
    fn test_create_rejects_bad_names() {
        let mut handle = 0u64;
        let unterminated: Vec<u16> = "NoEnd".encode_utf16().collect();
        let empty = to_wide("");
        let name = to_wide("DriverApiBadNames");
        unsafe {
            assert_eq!(
                ntgate_CreateNamedEvent(
                    &raw mut handle,
                    unterminated.as_ptr(),
                    byte_len(&unterminated)
                ),
                STATUS_UNSUCCESSFUL
            );
            assert_eq!(
                ntgate_CreateNamedEvent(&raw mut handle, name.as_ptr(), 3),
                STATUS_INVALID_BUFFER_SIZE
            );
            assert_eq!(
                ntgate_CreateNamedEvent(&raw mut handle, empty.as_ptr(), byte_len(&empty)),
                STATUS_OBJECT_NAME_INVALID
            );
            assert_eq!(
                ntgate_CreateNamedEvent(core::ptr::null_mut(), name.as_ptr(), byte_len(&name)),
                STATUS_INVALID_PARAMETER
            );
        }
        assert_eq!(handle, 0);
        assert!(!context()
            .object_manager()
            .contains_name(&ObjectName::new("DriverApiBadNames")));
    }

    #[test]
    fn test_unknown_handle() {
        assert_eq!(ntgate_WaitForEvent(0xDEAD_BEE0), STATUS_INVALID_HANDLE);
        assert_eq!(ntgate_SetNamedEvent(0xDEAD_BEE0, 1), STATUS_INVALID_HANDLE);
    }

    #[test]
    fn test_str_cmp_i_w() {
        let a = to_wide("Gate");
        let b = to_wide("GATE");
        let c = to_wide("gatf");
        unsafe {
            assert_eq!(ntgate_StrCmpIW(a.as_ptr(), b.as_ptr()), 0);
            assert!(ntgate_StrCmpIW(a.as_ptr(), c.as_ptr()) < 0);
            assert!(ntgate_StrCmpIW(c.as_ptr(), a.as_ptr()) > 0);
            assert_eq!(ntgate_StrCmpIW(core::ptr::null(), core::ptr::null()), 0);
            assert_eq!(ntgate_StrCmpIW(core::ptr::null(), a.as_ptr()), -1);
            assert_eq!(ntgate_StrCmpIW(a.as_ptr(), core::ptr::null()), 1);
        }
    }

    #[test]
    fn test_str_str_i_w() {
        let haystack = to_wide("\\Device\\HarddiskVolume1");
        let pattern = to_wide("HARDDISK");
        let missing = to_wide("floppy");
        let empty = to_wide("");
        unsafe {
            let found = ntgate_StrStrIW(haystack.as_ptr(), pattern.as_ptr());
            assert_eq!(found, haystack.as_ptr().add(8));
            assert!(ntgate_StrStrIW(haystack.as_ptr(), missing.as_ptr()).is_null());
            assert_eq!(ntgate_StrStrIW(haystack.as_ptr(), empty.as_ptr()), haystack.as_ptr());
            assert!(ntgate_StrStrIW(core::ptr::null(), pattern.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_get_base_name() {
        let path = CString::new("C:\\Windows\\System32\\ntdll.dll").unwrap();
        let bare = CString::new("ntdll.dll").unwrap();
        unsafe {
            let base = ntgate_GetBaseNameFromFullPath(path.as_ptr());
            assert_eq!(CStr::from_ptr(base).to_str().unwrap(), "ntdll.dll");
            assert!(ntgate_GetBaseNameFromFullPath(bare.as_ptr()).is_null());
            let leading = CString::new("\\x").unwrap();
            let base = ntgate_GetBaseNameFromFullPath(leading.as_ptr());
            assert_eq!(base, leading.as_ptr().add(1));
            assert!(ntgate_GetBaseNameFromFullPath(core::ptr::null()).is_null());
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! NTSTATUS codes
//!
//! Only the codes produced or interpreted by this crate are defined here.

/// Raw NTSTATUS value as seen across the FFI boundary
pub type NtStatus = u32;

/// Operation completed successfully.
pub const STATUS_SUCCESS: NtStatus = 0x0000_0000;
/// The wait was satisfied by an abandoned object.
pub const STATUS_ABANDONED: NtStatus = 0x0000_0080;
/// The object was opened rather than created (informational).
pub const STATUS_OBJECT_NAME_EXISTS: NtStatus = 0x4000_0000;
/// The requested operation was unsuccessful.
pub const STATUS_UNSUCCESSFUL: NtStatus = 0xC000_0001;
/// An invalid HANDLE was specified.
pub const STATUS_INVALID_HANDLE: NtStatus = 0xC000_0008;
/// An invalid parameter was passed to a service or function.
pub const STATUS_INVALID_PARAMETER: NtStatus = 0xC000_000D;
/// A process has requested access to an object but has not been granted those access rights.
pub const STATUS_ACCESS_DENIED: NtStatus = 0xC000_0022;
/// There is a mismatch between the type of object required and the type of object specified.
pub const STATUS_OBJECT_TYPE_MISMATCH: NtStatus = 0xC000_0024;
/// The object name is invalid.
pub const STATUS_OBJECT_NAME_INVALID: NtStatus = 0xC000_0033;
/// The object name is not found.
pub const STATUS_OBJECT_NAME_NOT_FOUND: NtStatus = 0xC000_0034;
/// The object name already exists.
pub const STATUS_OBJECT_NAME_COLLISION: NtStatus = 0xC000_0035;
/// Insufficient system resources exist to complete the API.
pub const STATUS_INSUFFICIENT_RESOURCES: NtStatus = 0xC000_009A;
/// The size of the buffer is invalid for the specified operation.
pub const STATUS_INVALID_BUFFER_SIZE: NtStatus = 0xC000_0206;

/// `NT_SUCCESS`: true for success and informational statuses
#[inline]
#[allow(clippy::cast_possible_wrap)]
pub const fn nt_success(status: NtStatus) -> bool {
    (status as i32) >= 0
}

/// Symbolic name of a known status, for diagnostics
pub fn status_name(status: NtStatus) -> &'static str {
    match status {
        STATUS_SUCCESS => "STATUS_SUCCESS",
        STATUS_ABANDONED => "STATUS_ABANDONED",
        STATUS_OBJECT_NAME_EXISTS => "STATUS_OBJECT_NAME_EXISTS",
        STATUS_UNSUCCESSFUL => "STATUS_UNSUCCESSFUL",
        STATUS_INVALID_HANDLE => "STATUS_INVALID_HANDLE",
        STATUS_INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
        STATUS_ACCESS_DENIED => "STATUS_ACCESS_DENIED",
        STATUS_OBJECT_TYPE_MISMATCH => "STATUS_OBJECT_TYPE_MISMATCH",
        STATUS_OBJECT_NAME_INVALID => "STATUS_OBJECT_NAME_INVALID",
        STATUS_OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
        STATUS_OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
        STATUS_INSUFFICIENT_RESOURCES => "STATUS_INSUFFICIENT_RESOURCES",
        STATUS_INVALID_BUFFER_SIZE => "STATUS_INVALID_BUFFER_SIZE",
        _ => "STATUS_UNKNOWN",
    }
}

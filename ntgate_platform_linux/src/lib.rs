// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Linux platform implementation of the ntgate object manager
//!
//! This crate is the environment the boundary-safety core runs against on
//! Linux: an NT-style object namespace with notification and synchronization
//! events, a handle table that enforces granted access, and the
//! `extern "C"` entry points a dispatch layer calls with raw pointers.

pub mod driver_api;
pub mod object_manager;

use ntgate_shim::AccessMask;
use ntgate_shim::status::{
    NtStatus, STATUS_ACCESS_DENIED, STATUS_INSUFFICIENT_RESOURCES, STATUS_INVALID_HANDLE,
    STATUS_OBJECT_NAME_COLLISION, STATUS_OBJECT_NAME_INVALID, STATUS_OBJECT_TYPE_MISMATCH,
    STATUS_UNSUCCESSFUL,
};
use thiserror::Error;

pub use object_manager::{LinuxObjectManager, ReferencedEvent};

/// Platform errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Invalid handle: 0x{0:X}")]
    InvalidHandle(u64),

    #[error("Handle 0x{0:X} refers to an object of another type")]
    TypeMismatch(u64),

    #[error("Handle 0x{handle:X} lacks access 0x{requested:08X} (granted 0x{granted:08X})")]
    AccessDenied {
        handle: u64,
        requested: u32,
        granted: u32,
    },

    #[error("Object name collision: {0}")]
    NameCollision(String),

    #[error("Invalid object name")]
    NameInvalid,

    #[error("Handle quota of {0} exhausted")]
    QuotaExceeded(usize),

    #[error("Object table lock poisoned")]
    LockPoisoned,
}

impl PlatformError {
    /// NTSTATUS equivalent of this error
    pub fn status(&self) -> NtStatus {
        match self {
            PlatformError::InvalidHandle(_) => STATUS_INVALID_HANDLE,
            PlatformError::TypeMismatch(_) => STATUS_OBJECT_TYPE_MISMATCH,
            PlatformError::AccessDenied { .. } => STATUS_ACCESS_DENIED,
            PlatformError::NameCollision(_) => STATUS_OBJECT_NAME_COLLISION,
            PlatformError::NameInvalid => STATUS_OBJECT_NAME_INVALID,
            PlatformError::QuotaExceeded(_) => STATUS_INSUFFICIENT_RESOURCES,
            PlatformError::LockPoisoned => STATUS_UNSUCCESSFUL,
        }
    }

    pub(crate) fn access_denied(handle: u64, requested: AccessMask, granted: AccessMask) -> Self {
        PlatformError::AccessDenied {
            handle,
            requested: requested.bits(),
            granted: granted.bits(),
        }
    }
}

pub type Result<T> = core::result::Result<T, PlatformError>;

/// Kernel thread ID of the caller, used to tag trace events
pub fn current_thread_id() -> u64 {
    // SAFETY: gettid takes no arguments and cannot fail
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    u64::try_from(tid).unwrap_or(0)
}

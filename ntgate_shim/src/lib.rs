// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Boundary-safety core for privileged components that accept input from
//! less-trusted callers.
//!
//! This crate provides two independent pieces:
//! - A buffer validator that decides whether a caller-supplied UTF-16 buffer
//!   is safe to read, bounded strictly by the caller's claimed byte length
//! - A named synchronization gate that creates, waits on, and signals named
//!   notification events through an [`ObjectManager`](gate::ObjectManager),
//!   releasing every object reference it acquires on every exit path
//!
//! Diagnostics flow through the [`tracing`] framework, which never fails the
//! operation being traced.

pub mod gate;
pub mod status;
pub mod tracing;
pub mod validator;
pub mod wstr;

use thiserror::Error;

// Re-export commonly used types
pub use gate::{
    AccessMask, EventHandle, EventReference, EventType, GateError, KernelEvent, NamedEventGate,
    ObjectAttributes, ObjectManager, ObjectName,
};
pub use status::NtStatus;
pub use validator::{BufferValidator, RawWideBuffer, ValidatedWideStr, ValidationError};

/// Errors surfaced by the boundary-safety core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShimError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

impl ShimError {
    /// NTSTATUS equivalent of this error
    pub fn status(&self) -> NtStatus {
        match self {
            ShimError::Validation(e) => e.status(),
            ShimError::Gate(e) => e.status(),
        }
    }
}

pub type Result<T> = core::result::Result<T, ShimError>;

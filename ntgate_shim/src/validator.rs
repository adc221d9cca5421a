// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Validation of caller-supplied wide-character buffers
//!
//! A buffer arrives as a pointer plus a claimed length in bytes. Before any
//! code path reads it as a string, [`BufferValidator::validate`] checks, in
//! this order and stopping at the first failure:
//!
//! 1. the claimed length is a whole number of wide characters
//! 2. the pointer is non-null
//! 3. a terminator occurs within the claimed length
//!
//! The terminator scan never looks past `claimed_length / 2` characters, so a
//! buffer without a terminator (or with an inflated claimed length in front of
//! a short allocation the caller vouched for) cannot cause an out-of-bounds
//! read. The successful result only exposes the characters before the
//! terminator.

use crate::status::{
    NtStatus, STATUS_INVALID_BUFFER_SIZE, STATUS_INVALID_PARAMETER, STATUS_UNSUCCESSFUL,
};
use crate::tracing::{ApiCategory, TraceEvent, Tracer};
use crate::wstr::{self, WCHAR_SIZE, WIDE_NUL};
use std::sync::Arc;
use thiserror::Error;

const VALIDATE_FN: &str = "ValidateWideString";

/// Reasons a caller-supplied buffer is rejected
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid alignment: {byte_length} bytes is not a whole number of wide characters")]
    MisalignedLength { byte_length: usize },

    #[error("Empty buffer")]
    NullBuffer,

    #[error("Not null terminated within {capacity} characters")]
    Unterminated { capacity: usize },
}

impl ValidationError {
    /// NTSTATUS reported to the caller for this rejection
    pub fn status(&self) -> NtStatus {
        match self {
            ValidationError::MisalignedLength { .. } => STATUS_INVALID_BUFFER_SIZE,
            ValidationError::NullBuffer => STATUS_INVALID_PARAMETER,
            ValidationError::Unterminated { .. } => STATUS_UNSUCCESSFUL,
        }
    }
}

/// A caller-supplied wide buffer that has not been validated yet.
///
/// Holds what the caller claims: an optional pointer and a length in bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawWideBuffer<'a> {
    data: Option<&'a [u16]>,
    byte_length: usize,
    pointer_aligned: bool,
}

impl<'a> RawWideBuffer<'a> {
    /// Wrap a buffer and the caller's claimed byte length.
    ///
    /// The scan is bounded by the claimed length, and additionally by
    /// `data.len()` since a slice cannot vouch for memory past its end.
    pub fn new(data: Option<&'a [u16]>, byte_length: usize) -> Self {
        Self {
            data,
            byte_length,
            pointer_aligned: true,
        }
    }

    /// Wrap a slice, claiming exactly its size
    pub fn from_slice(data: &'a [u16]) -> Self {
        Self::new(Some(data), data.len() * WCHAR_SIZE)
    }

    /// A null pointer with the given claimed length
    pub fn null(byte_length: usize) -> Self {
        Self::new(None, byte_length)
    }

    /// Wrap a raw pointer received across the trust boundary.
    ///
    /// A pointer that is not aligned for `u16` is never turned into a slice;
    /// validation rejects it as a misaligned length.
    ///
    /// # Safety
    /// If `ptr` is non-null and aligned, it must be valid for reads of
    /// `byte_length` bytes (rounded down to whole characters) for `'a`, and
    /// the memory must not be mutated during `'a`.
    pub unsafe fn from_raw(ptr: *const u16, byte_length: usize) -> Self {
        if ptr.is_null() {
            return Self::null(byte_length);
        }
        if !ptr.is_aligned() {
            return Self {
                data: None,
                byte_length,
                pointer_aligned: false,
            };
        }
        // SAFETY: caller guarantees ptr is readable for byte_length bytes.
        let data = unsafe { core::slice::from_raw_parts(ptr, byte_length / WCHAR_SIZE) };
        Self::new(Some(data), byte_length)
    }

    /// Claimed length in bytes
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// True if no pointer was supplied
    pub fn is_null(&self) -> bool {
        self.data.is_none() && self.pointer_aligned
    }

    /// Cheap check: null pointer, or the first character is the terminator.
    ///
    /// A zero-length claim counts as empty since not even the first character
    /// may be read.
    pub fn is_empty_or_null(&self) -> bool {
        self.scan_window()
            .is_none_or(|window| window.first().is_none_or(|&c| c == WIDE_NUL))
    }

    /// Characters the scan is allowed to look at
    fn scan_window(&self) -> Option<&'a [u16]> {
        self.data.map(|data| {
            let bound = (self.byte_length / WCHAR_SIZE).min(data.len());
            &data[..bound]
        })
    }
}

/// True if `buffer` is absent or starts with the terminator
pub fn is_empty_or_null(buffer: Option<&[u16]>) -> bool {
    buffer.is_none_or(|data| data.first().is_none_or(|&c| c == WIDE_NUL))
}

/// A wide string that passed validation.
///
/// Only the characters before the terminator are reachable through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedWideStr<'a> {
    chars: &'a [u16],
}

impl<'a> ValidatedWideStr<'a> {
    /// Validated length in characters, terminator excluded
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// True for a string whose first character is the terminator
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The validated characters
    pub fn as_slice(&self) -> &'a [u16] {
        self.chars
    }

    /// Lossy UTF-8 rendering for diagnostics
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.chars)
    }

    /// Case-insensitive comparison against another wide string
    pub fn compare_ignore_case(&self, other: &[u16]) -> i32 {
        wstr::compare_ignore_case(self.chars, other)
    }

    /// Case-insensitive search for `pattern`
    pub fn find_ignore_case(&self, pattern: &[u16]) -> Option<usize> {
        wstr::find_ignore_case(self.chars, pattern)
    }
}

/// Validates caller-supplied buffers and reports every outcome to a tracer
#[derive(Clone, Default)]
pub struct BufferValidator {
    tracer: Arc<Tracer>,
}

impl BufferValidator {
    /// Create a validator reporting to `tracer`
    pub fn new(tracer: Arc<Tracer>) -> Self {
        Self { tracer }
    }

    /// Validate `buffer`, see the module docs for the check order
    pub fn validate<'a>(
        &self,
        buffer: RawWideBuffer<'a>,
    ) -> Result<ValidatedWideStr<'a>, ValidationError> {
        let result = Self::check(buffer);
        self.report(&buffer, &result);
        result
    }

    fn check(buffer: RawWideBuffer<'_>) -> Result<ValidatedWideStr<'_>, ValidationError> {
        if buffer.byte_length % WCHAR_SIZE != 0 || !buffer.pointer_aligned {
            return Err(ValidationError::MisalignedLength {
                byte_length: buffer.byte_length,
            });
        }

        let window = buffer.scan_window().ok_or(ValidationError::NullBuffer)?;

        window
            .iter()
            .position(|&c| c == WIDE_NUL)
            .map(|end| ValidatedWideStr {
                chars: &window[..end],
            })
            .ok_or(ValidationError::Unterminated {
                capacity: window.len(),
            })
    }

    fn report(
        &self,
        buffer: &RawWideBuffer<'_>,
        result: &Result<ValidatedWideStr<'_>, ValidationError>,
    ) {
        if !self.tracer.is_enabled() {
            return;
        }

        let message = match result {
            Ok(validated) => format!("String received: {}", validated.to_string_lossy()),
            Err(e) => e.to_string(),
        };
        self.tracer
            .trace(TraceEvent::status(VALIDATE_FN, ApiCategory::Validation, message));

        let ret_str = match result {
            Ok(validated) => format!("Ok(length={})", validated.len()),
            Err(e) => format!("Err(0x{:08X})", e.status()),
        };
        let event = TraceEvent::return_event(VALIDATE_FN, ApiCategory::Validation)
            .with_args(format!(
                "buffer={}, byte_length={}",
                if buffer.is_null() { "NULL" } else { "ptr" },
                buffer.byte_length
            ))
            .with_return_value(ret_str);
        self.tracer.trace(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing::{SharedBuffer, TraceConfig, TraceFilter, TraceOutput};
    use crate::wstr::encode_wide;

    fn validator() -> BufferValidator {
        BufferValidator::default()
    }

    #[test]
    fn test_misaligned_length_wins_over_everything() {
        let text = encode_wide("abc");
        for byte_length in [1, 3, 5, 7] {
            assert_eq!(
                validator().validate(RawWideBuffer::new(Some(&text), byte_length)),
                Err(ValidationError::MisalignedLength { byte_length })
            );
            // Even a null pointer reports the length problem first
            assert_eq!(
                validator().validate(RawWideBuffer::null(byte_length)),
                Err(ValidationError::MisalignedLength { byte_length })
            );
        }
    }

    #[test]
    fn test_null_buffer() {
        for byte_length in [0, 2, 64, 4096] {
            assert_eq!(
                validator().validate(RawWideBuffer::null(byte_length)),
                Err(ValidationError::NullBuffer)
            );
        }
    }

    #[test]
    fn test_terminated_buffer() {
        let text = encode_wide("lsass.exe");
        let validated = validator()
            .validate(RawWideBuffer::from_slice(&text))
            .unwrap();
        assert_eq!(validated.len(), 9);
        assert_eq!(validated.to_string_lossy(), "lsass.exe");
    }

    #[test]
    fn test_terminator_at_position_k() {
        // terminator at index 2, garbage after it
        let data = [u16::from(b'h'), u16::from(b'i'), 0, 0x4141, 0x4141, 0x4141];
        for byte_length in [6, 8, 12] {
            let validated = validator()
                .validate(RawWideBuffer::new(Some(&data), byte_length))
                .unwrap();
            assert_eq!(validated.len(), 2);
            assert_eq!(validated.as_slice(), &data[..2]);
        }
    }

    #[test]
    fn test_empty_string_is_valid() {
        let data = [0u16];
        let validated = validator().validate(RawWideBuffer::from_slice(&data)).unwrap();
        assert!(validated.is_empty());
    }

    #[test]
    fn test_unterminated_buffer() {
        let data: Vec<u16> = "no terminator".encode_utf16().collect();
        assert_eq!(
            validator().validate(RawWideBuffer::from_slice(&data)),
            Err(ValidationError::Unterminated {
                capacity: data.len()
            })
        );
        // zero-length claim has nothing to scan
        assert_eq!(
            validator().validate(RawWideBuffer::new(Some(&data), 0)),
            Err(ValidationError::Unterminated { capacity: 0 })
        );
    }

    #[test]
    fn test_scan_bounded_by_claimed_length() {
        // A terminator exists, but only past the claimed length
        let data = [0x41u16, 0x42, 0x43, 0x44, 0];
        assert_eq!(
            validator().validate(RawWideBuffer::new(Some(&data), 8)),
            Err(ValidationError::Unterminated { capacity: 4 })
        );
        assert!(validator().validate(RawWideBuffer::new(Some(&data), 10)).is_ok());
    }

    #[test]
    fn test_claim_larger_than_slice_is_bounded_by_slice() {
        let data = [0x41u16, 0x42];
        assert_eq!(
            validator().validate(RawWideBuffer::new(Some(&data), 1 << 20)),
            Err(ValidationError::Unterminated { capacity: 2 })
        );
    }

    #[test]
    fn test_from_raw_bounds_and_alignment() {
        let data = encode_wide("gate");
        let validated = validator()
            .validate(unsafe { RawWideBuffer::from_raw(data.as_ptr(), data.len() * 2) })
            .unwrap();
        assert_eq!(validated.len(), 4);

        let raw_null = unsafe { RawWideBuffer::from_raw(core::ptr::null(), 10) };
        assert!(raw_null.is_null());
        assert_eq!(validator().validate(raw_null), Err(ValidationError::NullBuffer));

        let words = [0u16; 8];
        let odd = unsafe { words.as_ptr().cast::<u8>().add(1) }.cast::<u16>();
        let raw_odd = unsafe { RawWideBuffer::from_raw(odd, 8) };
        assert!(!raw_odd.is_null());
        assert_eq!(
            validator().validate(raw_odd),
            Err(ValidationError::MisalignedLength { byte_length: 8 })
        );
    }

    #[test]
    fn test_is_empty_or_null() {
        assert!(is_empty_or_null(None));
        assert!(is_empty_or_null(Some(&[])));
        assert!(is_empty_or_null(Some(&[0, 0x41])));
        assert!(!is_empty_or_null(Some(&[0x41, 0])));

        assert!(RawWideBuffer::null(8).is_empty_or_null());
        assert!(RawWideBuffer::new(Some(&[0x41, 0]), 0).is_empty_or_null());
        assert!(!RawWideBuffer::new(Some(&[0x41, 0]), 4).is_empty_or_null());
    }

    #[test]
    fn test_is_empty_or_null_reads_only_claimed_characters() {
        // One byte covers no whole character, so nothing may be read
        assert!(RawWideBuffer::new(Some(&[0x41, 0x42, 0]), 1).is_empty_or_null());
        assert!(!RawWideBuffer::new(Some(&[0x41, 0x42, 0]), 2).is_empty_or_null());
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            ValidationError::MisalignedLength { byte_length: 3 }.status(),
            STATUS_INVALID_BUFFER_SIZE
        );
        assert_eq!(ValidationError::NullBuffer.status(), STATUS_INVALID_PARAMETER);
        assert_eq!(
            ValidationError::Unterminated { capacity: 1 }.status(),
            STATUS_UNSUCCESSFUL
        );
    }

    #[test]
    fn test_every_outcome_is_reported() {
        let buffer = SharedBuffer::default();
        let config = TraceConfig::enabled()
            .with_output(TraceOutput::Buffer(Arc::clone(&buffer)))
            .with_timestamps(false)
            .with_thread_ids(false);
        let tracer = Arc::new(Tracer::new(config, TraceFilter::default()).unwrap());
        let validator = BufferValidator::new(tracer);

        let good = encode_wide("Gate1");
        let unterminated = [0x41u16; 4];
        let _ = validator.validate(RawWideBuffer::from_slice(&good));
        let _ = validator.validate(RawWideBuffer::null(3));
        let _ = validator.validate(RawWideBuffer::null(4));
        let _ = validator.validate(RawWideBuffer::from_slice(&unterminated));

        let text = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(text.contains("String received: Gate1"));
        assert!(text.contains("Ok(length=5)"));
        assert!(text.contains("Invalid alignment"));
        assert!(text.contains("Empty buffer"));
        assert!(text.contains("Not null terminated"));
        assert_eq!(text.lines().count(), 8);
    }

    #[test]
    fn test_validated_string_helpers() {
        let text = encode_wide("\\Device\\HarddiskVolume1");
        let validated = validator().validate(RawWideBuffer::from_slice(&text)).unwrap();
        assert_eq!(validated.compare_ignore_case(&encode_wide("\\device\\harddiskvolume1")), 0);
        assert_eq!(validated.find_ignore_case(&encode_wide("HARDDISK")), Some(8));
    }
}

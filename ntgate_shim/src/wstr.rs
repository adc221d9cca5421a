// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Wide-string primitives
//!
//! Everything here works on slices of UTF-16 code units. A slice stands in for
//! a NUL-terminated string: the string ends at the first NUL, or at the end of
//! the slice if it has none, so nothing past the slice is ever read.
//!
//! These primitives expect input that has already been validated (see
//! [`crate::validator`]) or that comes from known-safe constants.

/// Width of one wide character in bytes
pub const WCHAR_SIZE: usize = core::mem::size_of::<u16>();

/// NUL terminator
pub const WIDE_NUL: u16 = 0;

const BACKSLASH: u16 = b'\\' as u16;

/// Upper-case fold a single UTF-16 code unit.
///
/// A unit is folded only when its upper-case mapping is a single BMP unit;
/// surrogates and characters that expand (e.g. `ß`) are returned unchanged.
pub fn fold(unit: u16) -> u16 {
    if let Ok(byte) = u8::try_from(unit)
        && byte.is_ascii()
    {
        return u16::from(byte.to_ascii_uppercase());
    }
    let Some(c) = char::from_u32(u32::from(unit)) else {
        return unit;
    };
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u16::try_from(u32::from(u)).unwrap_or(unit),
        _ => unit,
    }
}

/// The part of `s` before its terminator
pub fn terminated(s: &[u16]) -> &[u16] {
    let end = s.iter().position(|&c| c == WIDE_NUL).unwrap_or(s.len());
    &s[..end]
}

#[inline]
fn unit_at(s: &[u16], index: usize) -> u16 {
    s.get(index).copied().unwrap_or(WIDE_NUL)
}

/// Case-insensitive comparison of two wide strings.
///
/// Walks both strings in step, stopping at the first folded mismatch or at a
/// shared terminator. Returns the difference of the first differing folded
/// pair, so 0 means equal and the sign gives the ordering.
pub fn compare_ignore_case(a: &[u16], b: &[u16]) -> i32 {
    let mut i = 0usize;
    loop {
        let c1 = fold(unit_at(a, i));
        let c2 = fold(unit_at(b, i));
        if c1 == WIDE_NUL || c1 != c2 {
            return i32::from(c1) - i32::from(c2);
        }
        i += 1;
    }
}

/// Find the first case-insensitive occurrence of `pattern` in `haystack`.
///
/// Single pass: advance to the next position whose folded unit matches the
/// pattern's first unit, try to match the rest, and restart one past that
/// position on a mismatch.
///
/// An empty pattern matches at index 0, even against an empty haystack.
pub fn find_ignore_case(haystack: &[u16], pattern: &[u16]) -> Option<usize> {
    let haystack = terminated(haystack);
    let pattern = terminated(pattern);

    let (&head, tail) = match pattern.split_first() {
        Some(parts) => parts,
        None => return Some(0),
    };
    let head = fold(head);

    let mut start = 0usize;
    while start < haystack.len() {
        if fold(haystack[start]) != head {
            start += 1;
            continue;
        }

        let rest = &haystack[start + 1..];
        if rest.len() >= tail.len()
            && rest
                .iter()
                .zip(tail)
                .all(|(&h, &p)| fold(h) == fold(p))
        {
            return Some(start);
        }
        start += 1;
    }
    None
}

/// Base name of a backslash-separated narrow path.
///
/// Returns the bytes after the last `\` (up to the terminator), or `None` if
/// the path has no separator.
pub fn base_name(path: &[u8]) -> Option<&[u8]> {
    let end = path.iter().position(|&c| c == 0).unwrap_or(path.len());
    let path = &path[..end];
    path.iter()
        .rposition(|&c| c == b'\\')
        .map(|sep| &path[sep + 1..])
}

/// Wide-string counterpart of [`base_name`].
pub fn base_name_wide(path: &[u16]) -> Option<&[u16]> {
    let path = terminated(path);
    path.iter()
        .rposition(|&c| c == BACKSLASH)
        .map(|sep| &path[sep + 1..])
}

/// Encode a string as NUL-terminated UTF-16
pub fn encode_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(core::iter::once(WIDE_NUL)).collect()
}

/// Decode a wide string for display, replacing invalid sequences
pub fn decode_lossy(s: &[u16]) -> String {
    String::from_utf16_lossy(terminated(s))
}

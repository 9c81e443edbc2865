//! Command line record rendering.
//!
//! A record is the raw content of `<proc>/<pid>/cmdline`: arguments separated
//! by NUL bytes, normally with a trailing NUL.

use fa_common::ARG_SEPARATOR;

/// Render a raw record as one space-joined string.
///
/// A separator followed by another non-separator byte becomes a space. The
/// first separator that is last in the record, or followed by another
/// separator, terminates the string. Invalid UTF-8 is replaced lossily.
pub fn to_display_string(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    for (i, &byte) in raw.iter().enumerate() {
        if byte != ARG_SEPARATOR {
            out.push(byte);
            continue;
        }
        match raw.get(i + 1) {
            Some(&next) if next != ARG_SEPARATOR => out.push(b' '),
            _ => break,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Whether `record` starts with the first `length` bytes of `pattern`.
/// Pattern bytes past its end compare as separators.
pub fn record_matches(record: &[u8], pattern: &[u8], length: usize) -> bool {
    if length == 0 || record.len() < length {
        return false;
    }
    let expected = pattern
        .iter()
        .copied()
        .chain(std::iter::repeat(ARG_SEPARATOR))
        .take(length);
    record[..length].iter().copied().eq(expected)
}

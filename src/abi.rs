//! Standard `Error(string)` revert payloads.

use crate::common::Word;

/// `keccak256("Error(string)")[..4]`
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Extracts the message from an `Error(string)` payload.
///
/// Anything else (no selector, truncated or inconsistent offsets, invalid UTF-8)
/// yields `None`. The payload itself is never modified.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_SELECTOR)?;
    let offset = read_usize(body, 0)?;
    let len = read_usize(body, offset)?;
    let start = offset.checked_add(32)?;
    let end = start.checked_add(len)?;
    let bytes = body.get(start..end)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// ABI-encodes `Error(reason)`: selector, offset 0x20, length, right-padded bytes.
pub fn encode_revert_reason(reason: &str) -> Vec<u8> {
    let bytes = reason.as_bytes();
    let padded = bytes.len().div_ceil(32) * 32;

    let mut out = Vec::with_capacity(4 + 64 + padded);
    out.extend_from_slice(&ERROR_SELECTOR);
    out.extend_from_slice(&Word::from(32u8).into_bytes());
    out.extend_from_slice(&Word::from(bytes.len()).into_bytes());
    out.extend_from_slice(bytes);
    out.resize(4 + 64 + padded, 0);
    out
}

fn read_usize(data: &[u8], at: usize) -> Option<usize> {
    let word = data.get(at..at.checked_add(32)?)?;
    Word::from_bytes(word).to_usize()
}

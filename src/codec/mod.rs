//! Offset-map codec family: encode/decode a set of incomplete offsets in
//! the smallest applicable wire format.
//!
//! Four codecs share one capability shape — `applies`, `encode`, `id` —
//! and decoding dispatches on the magic byte written by whichever codec
//! won selection.

mod bitset;
mod run_length;

use std::collections::BTreeSet;
use std::str::FromStr;

pub use bitset::BitsetCodec;
pub use run_length::RunLengthCodec;

/// One of the four wire formats. The discriminant is the magic byte
/// written as byte 0 of the codec payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CodecId {
    Bitset16 = 0x01,
    Bitset32 = 0x02,
    RunLength16 = 0x03,
    RunLength32 = 0x04,
}

impl CodecId {
    pub fn magic(self) -> u8 {
        self as u8
    }

    pub fn from_magic(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CodecId::Bitset16),
            0x02 => Some(CodecId::Bitset32),
            0x03 => Some(CodecId::RunLength16),
            0x04 => Some(CodecId::RunLength32),
            _ => None,
        }
    }
}

impl FromStr for CodecId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitset16" | "bs16" => Ok(CodecId::Bitset16),
            "bitset32" | "bs32" => Ok(CodecId::Bitset32),
            "runlength16" | "rl16" => Ok(CodecId::RunLength16),
            "runlength32" | "rl32" => Ok(CodecId::RunLength32),
            other => Err(format!("unknown codec id: {other}")),
        }
    }
}

/// Capability set every codec implements: whether it applies to a given
/// window, and how to encode it. Decoding is dispatched by
/// magic byte in `decode` below rather than through the trait, since the
/// reader doesn't know which codec produced the bytes until it reads
/// byte 0.
pub trait OffsetCodec {
    fn id(&self) -> CodecId;

    /// Whether this codec can represent `incomplete` within a window of
    /// width `range` at all (bitset: range must fit the width; run-length:
    /// every run must fit the width).
    fn applies(&self, range: i64, incomplete: &BTreeSet<i64>) -> bool;

    /// Encodes assuming `applies` already returned true. Output excludes
    /// the magic byte; callers prepend it.
    fn encode_body(&self, range: i64, incomplete: &BTreeSet<i64>) -> Vec<u8>;
}

fn all_codecs() -> [Box<dyn OffsetCodec>; 4] {
    [
        Box::new(BitsetCodec::new(bitset::Width::W16)),
        Box::new(BitsetCodec::new(bitset::Width::W32)),
        Box::new(RunLengthCodec::new(run_length::Width::W16)),
        Box::new(RunLengthCodec::new(run_length::Width::W32)),
    ]
}

/// Encodes `(base_offset, next_expected_offset, incomplete)` with the
/// smallest applicable codec, or with `forced` if one is supplied
/// (operator override / testing).
///
/// Returns the full wire payload including the magic byte, i.e. what
/// `OffsetMapManager` base64-encodes. Returns `None` if no codec applies.
pub fn encode(
    next_expected_offset: i64,
    base_offset: i64,
    incomplete: &BTreeSet<i64>,
    forced: Option<CodecId>,
) -> Option<Vec<u8>> {
    let range = next_expected_offset - base_offset;
    debug_assert!(range >= 0, "next_expected_offset must be >= base_offset");

    // Every codec's `applies`/`encode_body` works in window-relative
    // coordinates (0 is the base offset); `decode` adds `base_offset` back
    // when reconstructing. Translate once here rather than threading
    // `base_offset` through each codec.
    let relative: BTreeSet<i64> = incomplete.iter().map(|&o| o - base_offset).collect();

    if let Some(forced_id) = forced {
        let codec = all_codecs()
            .into_iter()
            .find(|c| c.id() == forced_id)?;
        if !codec.applies(range, &relative) {
            return None;
        }
        let mut body = codec.encode_body(range, &relative);
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(codec.id().magic());
        out.append(&mut body);
        return Some(out);
    }

    all_codecs()
        .into_iter()
        .filter(|c| c.applies(range, &relative))
        .map(|c| {
            let mut body = c.encode_body(range, &relative);
            let mut out = Vec::with_capacity(body.len() + 1);
            out.push(c.id().magic());
            out.append(&mut body);
            out
        })
        .min_by_key(|bytes| bytes.len())
}

/// Decodes a wire payload (magic byte + body) relative to `base_offset`.
/// Returns `(next_expected_offset, incomplete_offsets)`.
pub fn decode(base_offset: i64, bytes: &[u8]) -> anyhow::Result<(i64, BTreeSet<i64>)> {
    let (&magic, body) = bytes
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty codec payload"))?;
    let id = CodecId::from_magic(magic).ok_or_else(|| anyhow::anyhow!("unknown codec magic: {magic:#x}"))?;

    match id {
        CodecId::Bitset16 => bitset::decode(bitset::Width::W16, base_offset, body),
        CodecId::Bitset32 => bitset::decode(bitset::Width::W32, base_offset, body),
        CodecId::RunLength16 => run_length::decode(run_length::Width::W16, base_offset, body),
        CodecId::RunLength32 => run_length::decode(run_length::Width::W32, base_offset, body),
    }
}

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::codec::{self, CodecId};

/// Serializes to / deserializes from the broker's commit-metadata field:
/// the codec bytes, base64-wrapped so the payload is valid UTF-8.
pub struct OffsetMapManager;

impl OffsetMapManager {
    /// Encodes `(base_offset, next_expected_offset, incomplete)` and
    /// base64-wraps it. Returns `None` if no codec applies
    /// (`EncodingNotSupported`, recovered locally by the caller).
    pub fn encode(
        base_offset: i64,
        next_expected_offset: i64,
        incomplete: &BTreeSet<i64>,
        forced: Option<CodecId>,
    ) -> Option<String> {
        let bytes = codec::encode(next_expected_offset, base_offset, incomplete, forced)?;
        Some(BASE64.encode(bytes))
    }

    /// Decodes a base64 metadata string relative to `base_offset`,
    /// returning `(next_expected_offset, incomplete)`. Any failure is
    /// `OffsetDecodingError` territory — callers should treat it as
    /// "incomplete set is empty".
    pub fn decode(base_offset: i64, metadata: &str) -> anyhow::Result<(i64, BTreeSet<i64>)> {
        let bytes = BASE64.decode(metadata)?;
        codec::decode(base_offset, &bytes)
    }
}

use std::collections::BTreeSet;

use super::{CodecId, OffsetCodec};

/// Width of each run-length field: u16 or u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W16,
    W32,
}

impl Width {
    fn max_run(self) -> u64 {
        match self {
            Width::W16 => u16::MAX as u64,
            Width::W32 => u32::MAX as u64,
        }
    }
}

/// Alternating run lengths describing consecutive "complete" then
/// "incomplete" offsets starting from `base_offset`. The first run is
/// always a complete run, even if its length is zero (the window starts
/// with an incomplete offset).
pub struct RunLengthCodec {
    width: Width,
}

impl RunLengthCodec {
    pub fn new(width: Width) -> Self {
        Self { width }
    }
}

/// Splits `[0, range)` into alternating complete/incomplete runs per
/// `incomplete`, starting with a (possibly zero-length) complete run.
fn runs(range: i64, incomplete: &BTreeSet<i64>) -> Vec<u64> {
    let mut out = Vec::new();
    let mut i = 0i64;
    let mut expect_incomplete = false;
    while i < range {
        let is_incomplete = incomplete.contains(&i);
        if is_incomplete != expect_incomplete {
            // Run boundary without having closed the previous run (can
            // only happen on the very first iteration): push the
            // implicit zero-length run so the alternation stays aligned.
            out.push(0);
            expect_incomplete = is_incomplete;
        }
        let run_start = i;
        while i < range && incomplete.contains(&i) == is_incomplete {
            i += 1;
        }
        out.push((i - run_start) as u64);
        expect_incomplete = !is_incomplete;
    }
    if out.is_empty() {
        // Empty window still has one (empty) complete run.
        out.push(0);
    }
    out
}

impl OffsetCodec for RunLengthCodec {
    fn id(&self) -> CodecId {
        match self.width {
            Width::W16 => CodecId::RunLength16,
            Width::W32 => CodecId::RunLength32,
        }
    }

    fn applies(&self, range: i64, incomplete: &BTreeSet<i64>) -> bool {
        if range < 0 {
            return false;
        }
        runs(range, incomplete)
            .into_iter()
            .all(|r| r <= self.width.max_run())
    }

    fn encode_body(&self, range: i64, incomplete: &BTreeSet<i64>) -> Vec<u8> {
        let mut out = Vec::new();
        for run in runs(range, incomplete) {
            match self.width {
                Width::W16 => out.extend_from_slice(&(run as u16).to_be_bytes()),
                Width::W32 => out.extend_from_slice(&(run as u32).to_be_bytes()),
            }
        }
        out
    }
}

pub(super) fn decode(width: Width, base: i64, body: &[u8]) -> anyhow::Result<(i64, BTreeSet<i64>)> {
    let field_len = match width {
        Width::W16 => 2,
        Width::W32 => 4,
    };
    if body.len() % field_len != 0 {
        anyhow::bail!("run-length payload is not a whole number of {field_len}-byte fields");
    }

    let mut incomplete = BTreeSet::new();
    let mut cursor = base;
    let mut is_incomplete_run = false;
    for chunk in body.chunks(field_len) {
        let run_len: u64 = match width {
            Width::W16 => u16::from_be_bytes([chunk[0], chunk[1]]) as u64,
            Width::W32 => u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as u64,
        };
        if is_incomplete_run {
            for o in cursor..cursor + run_len as i64 {
                incomplete.insert(o);
            }
        }
        cursor += run_len as i64;
        is_incomplete_run = !is_incomplete_run;
    }

    Ok((cursor, incomplete))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_alternating_runs() {
        let codec = RunLengthCodec::new(Width::W16);
        let incomplete: BTreeSet<i64> = [3, 4, 5].into_iter().collect();
        assert!(codec.applies(10, &incomplete));
        let body = codec.encode_body(10, &incomplete);
        // runs: complete=3, incomplete=3, complete=4 -> 3 fields * 2 bytes
        assert_eq!(body.len(), 6);
        let (next, decoded) = decode(Width::W16, 0, &body).unwrap();
        assert_eq!(next, 10);
        assert_eq!(decoded, incomplete);
    }

    #[test]
    fn window_starting_with_incomplete_offset_gets_zero_length_first_run() {
        let codec = RunLengthCodec::new(Width::W16);
        let incomplete: BTreeSet<i64> = [0, 1].into_iter().collect();
        let body = codec.encode_body(5, &incomplete);
        let (next, decoded) = decode(Width::W16, 100, &body).unwrap();
        assert_eq!(next, 105);
        let expected: BTreeSet<i64> = [100, 101].into_iter().collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn rejects_run_exceeding_u16_max() {
        let codec = RunLengthCodec::new(Width::W16);
        let incomplete: BTreeSet<i64> = [199_999].into_iter().collect();
        assert!(!codec.applies(200_000, &incomplete));
    }

    #[test]
    fn empty_window_round_trips() {
        let codec = RunLengthCodec::new(Width::W32);
        let incomplete = BTreeSet::new();
        let body = codec.encode_body(0, &incomplete);
        let (next, decoded) = decode(Width::W32, 42, &body).unwrap();
        assert_eq!(next, 42);
        assert!(decoded.is_empty());
    }
}

//! Newline-delimited record reassembly.
//!
//! The server frames one JSON record per line, but reads are chunked
//! arbitrarily: a single read may span several records, a single record may
//! span several reads, or both. [`FrameAssembler`] carries the unterminated
//! tail of each chunk into the next and emits only complete records, so no
//! record is ever lost or duplicated across chunk boundaries.

/// Reassembles newline-delimited records from a chunked byte stream.
///
/// Owned by the subscriber for the lifetime of one connection attempt; a
/// partial frame cannot span a reconnect boundary, so [`reset`] is called
/// on every reconnect.
///
/// [`reset`]: FrameAssembler::reset
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// Incomplete tail carried from the previous chunk
    segment: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            segment: String::new(),
        }
    }

    /// Discard the carried tail
    pub fn reset(&mut self) {
        self.segment.clear();
    }

    /// Feed one received chunk, returning every complete record it closes.
    ///
    /// A chunk without a terminator is appended to the carried tail and
    /// yields nothing. Otherwise the first piece completes the carried
    /// tail, interior pieces are complete records, and the final piece is
    /// emitted only when it is a self-contained JSON object (both braces
    /// present); an incomplete final piece becomes the new carried tail.
    /// Records are whitespace-trimmed; blank records are discarded.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let pieces: Vec<&str> = chunk.split('\n').collect();
        if pieces.len() < 2 {
            self.segment.push_str(pieces[0]);
            return Vec::new();
        }

        let mut records = Vec::with_capacity(pieces.len());

        let mut first = std::mem::take(&mut self.segment);
        first.push_str(pieces[0]);
        push_record(&mut records, &first);

        for piece in &pieces[1..pieces.len() - 1] {
            push_record(&mut records, piece);
        }

        let last = pieces[pieces.len() - 1];
        if last.contains('{') && last.contains('}') {
            // Self-contained object that merely lacks its newline so far.
            push_record(&mut records, last);
        } else {
            self.segment.push_str(last);
        }

        records
    }
}

fn push_record(records: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        records.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REC_A: &str = r#"{"N":"Vehicle.Speed","V":10.5}"#;
    const REC_B: &str = r#"{"N":"Vehicle.Speed","V":11.0}"#;
    const REC_C: &str = r#"{"REP":"sync"}"#;

    fn stream(records: &[&str]) -> String {
        let mut s = String::new();
        for r in records {
            s.push_str(r);
            s.push('\n');
        }
        s
    }

    #[test]
    fn test_single_chunk_multiple_records() {
        let mut asm = FrameAssembler::new();
        let records = asm.feed(&stream(&[REC_A, REC_B]));
        assert_eq!(records, vec![REC_A.to_string(), REC_B.to_string()]);
    }

    #[test]
    fn test_record_split_mid_body() {
        let mut asm = FrameAssembler::new();
        let wire = stream(&[REC_A]);
        assert!(asm.feed(&wire[..12]).is_empty());
        assert_eq!(asm.feed(&wire[12..]), vec![REC_A.to_string()]);
    }

    #[test]
    fn test_split_exactly_at_newline() {
        let mut asm = FrameAssembler::new();
        let wire = stream(&[REC_A, REC_B]);
        let cut = REC_A.len() + 1;
        assert_eq!(asm.feed(&wire[..cut]), vec![REC_A.to_string()]);
        assert_eq!(asm.feed(&wire[cut..]), vec![REC_B.to_string()]);
    }

    #[test]
    fn test_chunk_with_no_newline_then_completion() {
        let mut asm = FrameAssembler::new();
        assert!(asm.feed(r#"{"N":"Vehi"#).is_empty());
        assert!(asm.feed("cle.Speed\",").is_empty());
        assert_eq!(asm.feed("\"V\":10.5}\n"), vec![REC_A.to_string()]);
    }

    #[test]
    fn test_self_contained_tail_without_newline() {
        let mut asm = FrameAssembler::new();
        let mut wire = stream(&[REC_A]);
        wire.push_str(REC_C); // second record not yet terminated
        let records = asm.feed(&wire);
        assert_eq!(records, vec![REC_A.to_string(), REC_C.to_string()]);
    }

    #[test]
    fn test_blank_records_discarded() {
        let mut asm = FrameAssembler::new();
        let records = asm.feed("\n\n{\"REP\":\"sync\"}\n  \n");
        assert_eq!(records, vec![REC_C.to_string()]);
    }

    #[test]
    fn test_reassembly_is_split_invariant() {
        let wire = stream(&[REC_A, REC_B, REC_C]);
        let expected = vec![REC_A.to_string(), REC_B.to_string(), REC_C.to_string()];
        for cut in 1..wire.len() {
            let mut asm = FrameAssembler::new();
            let mut records = asm.feed(&wire[..cut]);
            records.extend(asm.feed(&wire[cut..]));
            assert_eq!(records, expected, "split at byte {}", cut);
        }
    }

    #[test]
    fn test_reset_discards_partial_tail() {
        let mut asm = FrameAssembler::new();
        assert!(asm.feed(r#"{"N":"Vehicle"#).is_empty());
        asm.reset();
        // The fresh connection starts with a clean record.
        assert_eq!(asm.feed(&stream(&[REC_B])), vec![REC_B.to_string()]);
    }
}

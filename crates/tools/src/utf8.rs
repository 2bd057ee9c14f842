//! Incremental UTF-8 decoding for byte-chunked input streams.
//!
//! Chunk boundaries may split a multi-byte sequence; the split suffix is
//! carried to the next call. Invalid sequences decode to U+FFFD so a
//! malformed stream still makes forward progress.

/// Carry state for a sequence split across chunk boundaries (at most 3
/// pending bytes).
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes` into `out`, resolving any carried prefix first.
    pub fn push(&mut self, out: &mut String, bytes: &[u8]) {
        let mut rest = bytes;
        if !self.pending.is_empty() {
            // A carried sequence needs at most 3 more bytes to resolve.
            let take = rest.len().min(3);
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            let buf = std::mem::take(&mut self.pending);
            decode_lossy(out, &mut self.pending, &buf);
        }
        decode_lossy(out, &mut self.pending, rest);
    }

    /// Flush a trailing incomplete sequence as U+FFFD at end of stream.
    pub fn finish(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push('\u{FFFD}');
            self.pending.clear();
        }
    }
}

fn decode_lossy(out: &mut String, pending: &mut Vec<u8>, mut bytes: &[u8]) {
    loop {
        match std::str::from_utf8(bytes) {
            Ok(s) => {
                out.push_str(s);
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                // The prefix below `valid_up_to` is valid, so this borrows.
                out.push_str(&String::from_utf8_lossy(&bytes[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push('\u{FFFD}');
                        bytes = &bytes[valid + bad..];
                    }
                    None => {
                        pending.extend_from_slice(&bytes[valid..]);
                        return;
                    }
                }
            }
        }
    }
}

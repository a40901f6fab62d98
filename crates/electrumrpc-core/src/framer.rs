//! Newline-delimited message framing.
//!
//! The byte-stream transport hands every chunk it reads to a [`Framer`],
//! which accumulates bytes and invokes its callback once per complete line,
//! in arrival order. Chunk boundaries are irrelevant: one chunk may hold a
//! fragment of a message or many messages at once.
//!
//! Extraction runs in passes of at most [`MAX_PASS_DEPTH`] messages; `feed`
//! keeps starting new passes until no delimiter is left in the buffer.
//!
//! There is no message length limit. A line with no delimiter stays in the
//! buffer until more data arrives, so a peer that never sends `\n` grows the
//! buffer without bound.

/// Line delimiter.
pub const DELIMITER: u8 = b'\n';

/// Maximum number of messages extracted in one pass before yielding.
pub const MAX_PASS_DEPTH: usize = 20;

enum Pass {
    /// No complete message remains.
    Drained,
    /// The depth cap was hit; another pass is needed.
    Yielded,
}

/// Accumulates a byte stream and emits one `String` per complete line.
pub struct Framer<F> {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to contain no delimiter.
    scanned: usize,
    on_message: F,
}

impl<F: FnMut(String)> Framer<F> {
    pub fn new(on_message: F) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            on_message,
        }
    }

    /// Append `chunk` and deliver every message it completes.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Pass::Yielded = self.extract_pass() {}
    }

    /// The incomplete trailing fragment, if any.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    fn extract_pass(&mut self) -> Pass {
        let mut consumed = 0;
        let mut depth = 0;

        let pass = loop {
            if depth == MAX_PASS_DEPTH {
                break Pass::Yielded;
            }
            let from = self.scanned.max(consumed);
            match self.buffer[from..].iter().position(|b| *b == DELIMITER) {
                Some(offset) => {
                    let end = from + offset;
                    let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
                    (self.on_message)(line);
                    consumed = end + 1;
                    depth += 1;
                }
                None => {
                    self.scanned = self.buffer.len();
                    break Pass::Drained;
                }
            }
        };

        self.buffer.drain(..consumed);
        self.scanned = self.scanned.saturating_sub(consumed);
        pass
    }
}

impl<F> std::fmt::Debug for Framer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framer")
            .field("buffered", &self.buffer.len())
            .field("scanned", &self.scanned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> (Vec<String>, Vec<u8>) {
        let mut out = Vec::new();
        let rest = {
            let mut framer = Framer::new(|m| out.push(m));
            for chunk in chunks {
                framer.feed(chunk);
            }
            framer.buffered().to_vec()
        };
        (out, rest)
    }

    #[test]
    fn split_across_chunks() {
        let (msgs, rest) = collect(&[&b"{\"a\":1"[..], &b"}\n{\"a\":2}\n"[..]]);
        assert_eq!(msgs, vec![r#"{"a":1}"#, r#"{"a":2}"#]);
        assert!(rest.is_empty());
    }

    #[test]
    fn one_byte_at_a_time_matches_whole_stream() {
        let stream = b"{\"id\":\"1\"}\n{\"id\":\"2\"}\n{\"method\":\"x\"}\n";
        let bytes: Vec<&[u8]> = stream.chunks(1).collect();
        let (by_byte, _) = collect(&bytes);
        let (whole, _) = collect(&[&stream[..]]);
        assert_eq!(by_byte, whole);
        assert_eq!(whole.len(), 3);
    }

    #[test]
    fn many_messages_in_one_chunk_cross_pass_boundary() {
        let mut stream = Vec::new();
        for i in 0..(MAX_PASS_DEPTH * 3 + 7) {
            stream.extend_from_slice(format!("{{\"n\":{i}}}\n").as_bytes());
        }
        let (msgs, rest) = collect(&[stream.as_slice()]);
        assert_eq!(msgs.len(), MAX_PASS_DEPTH * 3 + 7);
        assert_eq!(msgs[0], r#"{"n":0}"#);
        assert_eq!(msgs[MAX_PASS_DEPTH], format!("{{\"n\":{MAX_PASS_DEPTH}}}"));
        assert!(rest.is_empty());
    }

    #[test]
    fn exactly_one_pass_worth() {
        let stream: Vec<u8> = (0..MAX_PASS_DEPTH)
            .flat_map(|i| format!("{i}\n").into_bytes())
            .collect();
        let (msgs, rest) = collect(&[stream.as_slice()]);
        assert_eq!(msgs.len(), MAX_PASS_DEPTH);
        assert!(rest.is_empty());
    }

    #[test]
    fn incomplete_fragment_is_held() {
        let (msgs, rest) = collect(&[&b"{\"a\":1}\n{\"a\":"[..]]);
        assert_eq!(msgs, vec![r#"{"a":1}"#]);
        assert_eq!(rest, b"{\"a\":");
    }

    #[test]
    fn long_fragment_fed_piecewise_is_delivered_once() {
        let mut out = Vec::new();
        {
            let mut framer = Framer::new(|m| out.push(m));
            for _ in 0..50 {
                framer.feed(b"xxxxxxxx");
            }
            assert_eq!(framer.buffered().len(), 400);
            framer.feed(b"\nrest");
            assert_eq!(framer.buffered(), b"rest");
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 400);
    }

    #[test]
    fn multibyte_utf8_split_between_chunks() {
        let text = "{\"label\":\"caf\u{e9} \u{20bf}\"}\n";
        let bytes = text.as_bytes();
        // cut between the 2nd and 3rd byte of the bitcoin sign
        let split = bytes.len() - 4;
        let (msgs, _) = collect(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(msgs, vec![text.trim_end().to_string()]);
    }

    #[test]
    fn empty_lines_are_delivered_as_empty_messages() {
        let (msgs, _) = collect(&[&b"\n\nA\n"[..]]);
        assert_eq!(msgs, vec!["", "", "A"]);
    }
}

//! Outbound message chunking
//!
//! IRC lines are capped at 512 bytes including the command, target and CRLF.
//! Relayed text is cut into fixed-width pieces well below that so a
//! `PRIVMSG <channel> :` header always fits.

/// Maximum number of bytes of text carried by one outbound line
pub const MAX_FRAGMENT_BYTES: usize = 430;

/// Splits text into ordered fragments of at most `limit` bytes
///
/// The split is purely positional: word boundaries are ignored. A cut that
/// would land inside a multi-byte character moves back to the previous
/// character boundary, so every fragment is valid UTF-8 and the fragments
/// concatenate back to the original text.
#[derive(Debug, Clone, Copy)]
pub struct ChunkEncoder<'a> {
    text: &'a str,
    limit: usize,
}

impl<'a> ChunkEncoder<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::with_limit(text, MAX_FRAGMENT_BYTES)
    }

    /// Encoder with a custom fragment size; limits below 4 are raised to 4
    /// so a fragment can always hold at least one character.
    pub fn with_limit(text: &'a str, limit: usize) -> Self {
        Self {
            text,
            limit: limit.max(4),
        }
    }

    /// Fresh iterator over the fragments; may be called any number of times
    pub fn fragments(&self) -> Fragments<'a> {
        Fragments {
            rest: self.text,
            limit: self.limit,
        }
    }
}

impl<'a> IntoIterator for ChunkEncoder<'a> {
    type Item = &'a str;
    type IntoIter = Fragments<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments()
    }
}

/// Lazy iterator produced by [`ChunkEncoder`]
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    rest: &'a str,
    limit: usize,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        let mut cut = self.limit.min(self.rest.len());
        while !self.rest.is_char_boundary(cut) {
            cut -= 1;
        }

        let (head, tail) = self.rest.split_at(cut);
        self.rest = tail;
        Some(head)
    }
}

/// Convenience wrapper returning owned fragments
pub fn split(text: &str) -> Vec<String> {
    ChunkEncoder::new(text).fragments().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousand_bytes_gives_three_fragments() {
        let text = "a".repeat(1000);
        let lengths: Vec<usize> = ChunkEncoder::new(&text).fragments().map(str::len).collect();
        assert_eq!(lengths, vec![430, 430, 140]);
    }

    #[test]
    fn test_fragments_reassemble_exactly() {
        let samples = [
            String::new(),
            "short".to_string(),
            "x".repeat(430),
            "y".repeat(431),
            "héllo wörld ".repeat(80),
            "日本語のテキスト".repeat(40),
            "🦀".repeat(300),
        ];

        for sample in &samples {
            let fragments: Vec<&str> = ChunkEncoder::new(sample).into_iter().collect();
            assert_eq!(fragments.concat(), *sample);
            assert!(fragments.iter().all(|f| f.len() <= MAX_FRAGMENT_BYTES && !f.is_empty()));
        }
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        assert_eq!(ChunkEncoder::new("").fragments().count(), 0);
    }

    #[test]
    fn test_exact_limit_is_single_fragment() {
        let text = "z".repeat(MAX_FRAGMENT_BYTES);
        assert_eq!(split(&text), vec![text.clone()]);
    }

    #[test]
    fn test_encoder_is_restartable() {
        let text = "b".repeat(900);
        let encoder = ChunkEncoder::new(&text);
        let first: Vec<&str> = encoder.fragments().collect();
        let second: Vec<&str> = encoder.fragments().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multibyte_boundary_moves_back() {
        // 429 ASCII bytes then a 4-byte crab: the crab cannot start fragment one
        let text = format!("{}🦀tail", "a".repeat(429));
        let fragments = split(&text);
        assert_eq!(fragments[0].len(), 429);
        assert_eq!(fragments[1], "🦀tail");
    }
}

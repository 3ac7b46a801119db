//! Sentence chunking for incremental speech synthesis.
//!
//! Splits a growing response buffer into speakable units as soon as a
//! sentence boundary appears, so playback can start while the rest of the
//! response is still being generated.

/// Result of one chunking pass: complete chunks plus the unconsumed tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunked {
    /// Trimmed, non-empty chunks ready for synthesis, in order.
    pub chunks: Vec<String>,
    /// Text after the last delimiter, carried into the next pass.
    pub remainder: String,
}

/// Splits `buffer` at sentence delimiters (`.` `?` `!`).
///
/// With `allow_comma` set, `,` also counts as a delimiter. Callers enable it
/// until the first chunk of a turn has been queued, trading a slightly
/// awkward pause for a faster start of playback.
///
/// Each chunk includes its delimiter and is trimmed; chunks that trim to
/// nothing are dropped. The function is pure: chunking a remainder plus
/// appended text gives the same chunks as one pass over the concatenation.
pub fn chunk(buffer: &str, allow_comma: bool) -> Chunked {
    let mut chunks = Vec::new();
    let mut rest = buffer;

    while let Some(pos) = find_delimiter(rest, allow_comma) {
        // Delimiters are single-byte, so pos + 1 stays on a char boundary.
        let (head, tail) = rest.split_at(pos + 1);
        let trimmed = head.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_owned());
        }
        rest = tail;
    }

    Chunked {
        chunks,
        remainder: rest.to_owned(),
    }
}

/// Byte offset of the earliest delimiter in `text`, if any.
fn find_delimiter(text: &str, allow_comma: bool) -> Option<usize> {
    text.char_indices()
        .find(|&(_, c)| matches!(c, '.' | '?' | '!') || (allow_comma && c == ','))
        .map(|(i, _)| i)
}

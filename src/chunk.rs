//! Overlapping word-window text chunker.
//!
//! Splits document body text into sliding windows of `target_words`
//! whitespace-delimited words. Successive windows advance by
//! `target_words − overlap_words`, so the tail of each window reappears at
//! the head of the next and no context is lost across a boundary.
//!
//! The chunker is a pure function of its inputs: identical text and
//! parameters always yield an identical sequence. Re-run idempotence is not
//! enforced here — the indexer skips any document that already owns chunks.

/// Split text into overlapping word windows.
///
/// Windows advance by `max(1, target_words − overlap_words)` words. The final
/// window may be shorter than `target_words`; it is still emitted when
/// non-empty. Empty input yields an empty sequence.
pub fn split_words(text: &str, target_words: usize, overlap_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let step = target_words.saturating_sub(overlap_words).max(1);
    let mut out = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + target_words).min(words.len());
        if end > start {
            out.push(words[start..end].join(" "));
        }
        start += step;
    }
    out
}

/// Whitespace word count of a chunk's content.
pub fn word_count(content: &str) -> i64 {
    content.split_whitespace().count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(split_words("", 350, 40).is_empty());
        assert!(split_words("   \n\t  ", 350, 40).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_words("awareness is prior to thought", 350, 40);
        assert_eq!(chunks, vec!["awareness is prior to thought".to_string()]);
    }

    #[test]
    fn test_step_arithmetic() {
        // target 10, overlap 2 => step 8: windows start at 0, 8, 16, ...
        let text = numbered_words(31);
        let chunks = split_words(&text, 10, 2);
        assert_eq!(chunks.len(), 4);
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[1].starts_with("w8 "));
        assert!(chunks[2].starts_with("w16 "));
        assert!(chunks[3].starts_with("w24 "));
    }

    #[test]
    fn test_overlap_invariant() {
        let text = numbered_words(40);
        let overlap = 3;
        let chunks = split_words(&text, 12, overlap);
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split_whitespace().collect();
            let next: Vec<&str> = pair[1].split_whitespace().collect();
            if prev.len() == 12 {
                assert_eq!(
                    &prev[prev.len() - overlap..],
                    &next[..overlap],
                    "last {} words of a full window must open the next",
                    overlap
                );
            }
        }
    }

    #[test]
    fn test_tail_remainder_emitted() {
        // 20 words, target 8, overlap 2 => starts at 0, 6, 12, 18; the last
        // window holds only 2 words but is still emitted.
        let text = numbered_words(20);
        let chunks = split_words(&text, 8, 2);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3], "w18 w19");
    }

    #[test]
    fn test_deterministic() {
        let text = numbered_words(100);
        let a = split_words(&text, 10, 2);
        let b = split_words(&text, 10, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlap_ge_target_still_advances() {
        // Degenerate parameters clamp the step to 1 instead of looping forever.
        let text = numbered_words(5);
        let chunks = split_words(&text, 2, 4);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0], "w0 w1");
        assert_eq!(chunks[4], "w4");
    }

    #[test]
    fn test_collapses_interior_whitespace() {
        let chunks = split_words("a  b\n\nc\td", 10, 0);
        assert_eq!(chunks, vec!["a b c d".to_string()]);
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("one two  three"), 3);
    }
}

//! Fixed-size character window chunker.
//!
//! Splits extracted text into windows of `chunk_size` characters, each
//! starting `chunk_size - chunk_overlap` characters after the previous one.
//! Windows are measured in `char`s, never bytes, so multi-byte text is never
//! split inside a code point.

use crate::models::DocumentChunk;

/// Split `text` into overlapping windows.
///
/// Every window is at most `chunk_size` characters long. Dropping the first
/// `chunk_overlap` characters of every window after the first and
/// concatenating the rest reproduces `text` exactly.
///
/// `chunk_overlap` must be smaller than `chunk_size`; the config loader
/// enforces this, and an out-of-range overlap is clamped here.
pub fn split_windows(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size - 1);
    let step = chunk_size - overlap;

    let chars: Vec<char> = text.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

/// Chunk one extracted text and tag each chunk with its source file.
/// Whitespace-only windows are discarded.
pub fn chunk_text(
    text: &str,
    source_filename: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<DocumentChunk> {
    split_windows(text, chunk_size, chunk_overlap)
        .into_iter()
        .filter(|window| !window.trim().is_empty())
        .map(|window| DocumentChunk::new(window, source_filename))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reconstruct(windows: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, w) in windows.iter().enumerate() {
            if i == 0 {
                out.push_str(w);
            } else {
                out.extend(w.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_short_text_single_window() {
        let windows = split_windows("Hello, house!", 1000, 50);
        assert_eq!(windows, vec!["Hello, house!".to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(split_windows("", 10, 2).is_empty());
        assert!(chunk_text("", "a.md", 10, 2).is_empty());
    }

    #[test]
    fn test_windows_overlap() {
        let windows = split_windows("abcdefghij", 4, 1);
        assert_eq!(windows, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let windows = split_windows("ééééé", 2, 0);
        assert_eq!(windows, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn test_whitespace_windows_dropped() {
        let text = format!("roof{}tile", " ".repeat(12));
        let chunks = chunk_text(&text, "notes.txt", 4, 0);
        assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
        assert!(chunks.iter().all(|c| c.source_filename == "notes.txt"));
        assert_eq!(chunks.first().unwrap().text, "roof");
        assert_eq!(chunks.last().unwrap().text, "tile");
    }

    #[test]
    fn test_default_sizes() {
        let text = "x".repeat(2500);
        let windows = split_windows(&text, 1000, 50);
        assert_eq!(windows.len(), 3);
        assert_eq!(reconstruct(&windows, 50), text);
    }

    proptest! {
        #[test]
        fn windows_reconstruct_input(
            text in "\\PC{0,400}",
            size in 1usize..64,
            overlap_seed in 0usize..64,
        ) {
            let overlap = overlap_seed % size;
            let windows = split_windows(&text, size, overlap);
            prop_assert!(windows.iter().all(|w| w.chars().count() <= size));
            prop_assert_eq!(reconstruct(&windows, overlap), text);
        }
    }
}

//! Recursive character splitting into overlapping windows.
//!
//! The text is cut on the coarsest separator present (paragraphs, then
//! lines, then words, then characters). Pieces that are still too long are
//! cut again with the next separator; short pieces are merged back together
//! into windows of at most `chunk_size` characters, carrying up to
//! `chunk_overlap` characters of trailing pieces into the next window.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

/// Separators tried in order, coarsest first. `""` means "every character".
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Window sizing, measured in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Splits a document into overlapping windows
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: SplitterConfig,
}

impl TextSplitter {
    pub fn new(config: SplitterConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::config_invalid("chunk_size must be positive")
                .with_operation("splitter::new"));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(Error::config_invalid("chunk_overlap must be smaller than chunk_size")
                .with_operation("splitter::new")
                .with_context("chunk_size", config.chunk_size.to_string())
                .with_context("chunk_overlap", config.chunk_overlap.to_string()));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split `text` into trimmed, non-empty windows in document order
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut windows = Vec::new();
        let mut short: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.config.chunk_size {
                short.push(piece);
                continue;
            }
            if !short.is_empty() {
                windows.extend(self.merge(&short, separator));
                short.clear();
            }
            if finer.is_empty() {
                windows.push(piece.to_string());
            } else {
                windows.extend(self.split_with(piece, finer));
            }
        }
        if !short.is_empty() {
            windows.extend(self.merge(&short, separator));
        }
        windows
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let SplitterConfig { chunk_size, chunk_overlap } = self.config;

        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joint = if current.is_empty() { 0 } else { sep_len };

            if total + len + joint > chunk_size {
                if total > chunk_size {
                    warn!(total, chunk_size, "window longer than chunk_size");
                }
                if !current.is_empty() {
                    push_joined(&mut windows, &current, separator);

                    // drop leading pieces until only the overlap is carried over
                    loop {
                        let joint = if current.is_empty() { 0 } else { sep_len };
                        let too_long = total + len + joint > chunk_size && total > 0;
                        if !(total > chunk_overlap || too_long) {
                            break;
                        }
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        let dropped = char_len(first) + if current.is_empty() { 0 } else { sep_len };
                        total = total.saturating_sub(dropped);
                    }
                }
            }

            let joint = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
            total += len + joint;
        }

        push_joined(&mut windows, &current, separator);
        windows
    }
}

fn push_joined(windows: &mut Vec<String>, pieces: &VecDeque<&str>, separator: &str) {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        windows.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> TextSplitter {
        TextSplitter::new(SplitterConfig { chunk_size, chunk_overlap }).unwrap()
    }

    #[test]
    fn test_short_text_is_one_window() {
        let windows = splitter(500, 50).split("  The parallel construct.  ");
        assert_eq!(windows, vec!["The parallel construct.".to_string()]);
    }

    #[test]
    fn test_paragraphs_split_when_too_long_together() {
        let a = "a".repeat(300);
        let b = "b".repeat(300);
        let text = format!("{}\n\n{}", a, b);
        let windows = splitter(500, 50).split(&text);
        assert_eq!(windows, vec![a, b]);
    }

    #[test]
    fn test_windows_bounded_and_overlapping() {
        let words: Vec<String> = (0..400).map(|i| format!("w{:04}", i)).collect();
        let text = words.join(" ");
        let windows = splitter(500, 50).split(&text);

        assert!(windows.len() > 1);
        for window in &windows {
            assert!(window.chars().count() <= 500, "window too long: {}", window.len());
        }
        for pair in windows.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].contains(last_word), "no overlap between consecutive windows");
        }
        assert!(windows.last().unwrap().ends_with("w0399"));
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(1200);
        let windows = splitter(500, 50).split(&text);
        assert!(windows.len() >= 3);
        assert!(windows.iter().all(|w| w.chars().count() <= 500));
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "ﬁrstprivate ".repeat(100);
        let windows = splitter(120, 10).split(&text);
        assert!(windows.iter().all(|w| w.chars().count() <= 120));
    }

    #[test]
    fn test_empty_text_has_no_windows() {
        assert!(splitter(500, 50).split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_invalid_config() {
        assert!(TextSplitter::new(SplitterConfig { chunk_size: 0, chunk_overlap: 0 }).is_err());
        assert!(TextSplitter::new(SplitterConfig { chunk_size: 50, chunk_overlap: 50 }).is_err());
    }
}

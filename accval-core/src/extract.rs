//! # Artifact Extractor
//!
//! Pulls a single fenced code region out of a completion. The scanner walks
//! the text once, pairing each opening fence with the next fence marker, so
//! prose around or after the code never shifts the boundaries.

use crate::error::{self, Result};
use std::path::Path;
use tracing::debug;

/// The fence marker that opens and closes a code region
pub const FENCE: &str = "```";

/// A closed fenced region, as byte offsets into the scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    /// First byte after the opening marker
    start: usize,
    /// First byte of the closing marker
    end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Outside,
    Inside { start: usize },
}

/// Every closed fenced region in document order. An unterminated trailing
/// fence is not a region.
fn scan(text: &str) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut state = ScanState::Outside;
    let mut pos = 0;

    while let Some(found) = text[pos..].find(FENCE) {
        let at = pos + found;
        state = match state {
            ScanState::Outside => ScanState::Inside { start: at + FENCE.len() },
            ScanState::Inside { start } => {
                regions.push(Region { start, end: at });
                ScanState::Outside
            }
        };
        pos = at + FENCE.len();
    }

    regions
}

/// Count fence markers the way the scanner sees them
fn fence_count(text: &str) -> usize {
    text.matches(FENCE).count()
}

/// Drop a language tag written right after the opening marker, then trim.
///
/// A tag is a single word on the marker's own line (`c`, `cpp`, `c++`,
/// `fortran`, `f90`, ...). A first line that contains spaces or punctuation
/// is code, not a tag.
fn strip_language_tag(region: &str) -> &str {
    if let Some(newline) = region.find('\n') {
        let first = region[..newline].trim();
        if is_language_tag(first) {
            return region[newline + 1..].trim();
        }
    }
    region.trim()
}

fn is_language_tag(word: &str) -> bool {
    !word.is_empty()
        && word.len() <= 16
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'))
        && word.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Extract the code of the last fenced region in `raw`.
///
/// Returns `ExtractionNotFound` when `raw` holds no closed region.
pub fn extract(raw: &str) -> Result<String> {
    let regions = scan(raw);
    let Some(last) = regions.last() else {
        debug!(len = raw.len(), "no fenced region in completion");
        return Err(error::Error::extraction_not_found().with_operation("extract::extract"));
    };

    let code = strip_language_tag(&raw[last.start..last.end]);
    debug!(regions = regions.len(), code_len = code.len(), "extracted code");
    Ok(code.to_string())
}

/// Extract from a completion whose prompt already opened a fence.
///
/// Such completions usually begin with the code body and carry only a
/// closing marker. When `raw` has an odd number of markers and does not
/// start with one, an opening marker is assumed before it; otherwise this
/// is exactly [`extract`].
pub fn extract_primed(raw: &str) -> Result<String> {
    if fence_count(raw) % 2 == 1 && !raw.trim_start().starts_with(FENCE) {
        return extract(&format!("{}{}", FENCE, raw));
    }
    extract(raw)
}

/// Write extracted code to the fixed source path, creating parent
/// directories. Empty code still overwrites, so a stale attempt is never
/// compiled twice.
pub async fn persist(code: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| error::io_error(parent, e).with_operation("extract::persist"))?;
    }
    tokio::fs::write(path, code)
        .await
        .map_err(|e| error::io_error(path, e).with_operation("extract::persist"))
}

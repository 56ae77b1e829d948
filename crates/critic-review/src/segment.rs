//! Splits free-form review text into comment-sized chunks.
//!
//! Two tiers: a markdown-marker split on bold/bullet lines, then, if that
//! leaves a single overlong chunk, a greedy paragraph pack.

use critic_core::LimitsConfig;

/// Character thresholds for [`segment_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLimits {
    /// A lone chunk longer than this is re-split by paragraphs.
    pub split_threshold: usize,
    /// Upper bound for paragraph text packed into one chunk.
    pub pack_target: usize,
}

impl Default for SegmentLimits {
    fn default() -> Self {
        Self {
            split_threshold: 1000,
            pack_target: 800,
        }
    }
}

impl From<&LimitsConfig> for SegmentLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            split_threshold: limits.split_threshold,
            pack_target: limits.pack_target,
        }
    }
}

const SECTION_MARKERS: [&str; 4] = ["**", "-", "•", "*"];

fn starts_section(line: &str) -> bool {
    let trimmed = line.trim_start();
    SECTION_MARKERS.iter().any(|m| trimmed.starts_with(m))
}

/// Split `text` into an ordered, non-empty list of comment bodies.
///
/// Joining the chunks with `\n` gives back `text` when the marker split was
/// used; joining with `\n\n` does when the paragraph pack was used.
///
/// # Examples
///
/// ```
/// use critic_review::segment::{segment_response, SegmentLimits};
///
/// let chunks = segment_response("Looks fine.\n- Nit: rename x.", &SegmentLimits::default());
/// assert_eq!(chunks, vec!["Looks fine.", "- Nit: rename x."]);
/// ```
pub fn segment_response(text: &str, limits: &SegmentLimits) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if starts_section(line) && !current.is_empty() {
            chunks.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    if chunks.len() == 1 && chunks[0].chars().count() > limits.split_threshold {
        return pack_paragraphs(&chunks[0], limits.pack_target);
    }

    chunks
}

/// Greedily pack `\n\n`-separated paragraphs into chunks of at most
/// `target` characters of paragraph text. An oversized paragraph stands alone.
fn pack_paragraphs(text: &str, target: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for paragraph in text.split("\n\n") {
        let len = paragraph.chars().count();
        if !current.is_empty() && current_len + len > target {
            chunks.push(current.join("\n\n"));
            current.clear();
            current_len = 0;
        }
        current.push(paragraph);
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }

    chunks
}

//! Recursive document splitter
//!
//! Splits text using a hierarchy of separators, trying the most meaningful
//! boundary first (paragraphs, lines, sentences, clauses, words) and
//! falling back to a hard character split.

use ragweave_kernel::rag::{Document, TextSegment};

/// Metadata key holding the position of a segment within its document.
pub const SEGMENT_INDEX_KEY: &str = "index";

// =============================================================================
// RecursiveDocumentSplitter
// =============================================================================

/// Splits documents into segments of at most `max_segment_chars` characters.
#[derive(Debug, Clone)]
pub struct RecursiveDocumentSplitter {
    max_segment_chars: usize,
    overlap_chars: usize,
    separators: Vec<String>,
}

impl RecursiveDocumentSplitter {
    #[must_use]
    pub fn new(max_segment_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_segment_chars: max_segment_chars.max(1),
            overlap_chars: overlap_chars.min(max_segment_chars / 2),
            separators: vec![
                "\n\n".into(), // Paragraph
                "\n".into(),   // Line
                ". ".into(),   // Sentence
                ", ".into(),   // Clause
                " ".into(),    // Word
            ],
        }
    }

    #[must_use]
    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    /// Splits a document; every segment inherits the document metadata plus
    /// its position under [`SEGMENT_INDEX_KEY`].
    pub fn split(&self, document: &Document) -> Vec<TextSegment> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let mut segment = TextSegment::new(text);
                segment.metadata = document.metadata.clone();
                segment.metadata.insert(SEGMENT_INDEX_KEY, index);
                segment
            })
            .collect()
    }

    pub fn split_all(&self, documents: &[Document]) -> Vec<TextSegment> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }

    /// Splits raw text into trimmed, non-empty pieces.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        let pieces = self.recursive_split(text, 0);
        self.apply_overlap(pieces)
    }

    fn fits(&self, text: &str) -> bool {
        text.chars().count() <= self.max_segment_chars
    }

    fn recursive_split(&self, text: &str, separator_idx: usize) -> Vec<String> {
        if self.fits(text) {
            return vec![text.trim().to_string()];
        }

        let Some(separator) = self.separators.get(separator_idx) else {
            return self.hard_split(text);
        };

        let parts: Vec<&str> = text.split(separator.as_str()).collect();
        if parts.len() <= 1 {
            return self.recursive_split(text, separator_idx + 1);
        }

        let mut pieces = Vec::new();
        let mut current = String::new();

        for part in parts {
            let candidate = if current.is_empty() {
                part.to_string()
            } else {
                format!("{current}{separator}{part}")
            };

            if self.fits(&candidate) {
                current = candidate;
                continue;
            }

            if !current.trim().is_empty() {
                pieces.push(current.trim().to_string());
            }

            if self.fits(part) {
                current = part.to_string();
            } else {
                pieces.extend(self.recursive_split(part, separator_idx + 1));
                current = String::new();
            }
        }

        if !current.trim().is_empty() {
            pieces.push(current.trim().to_string());
        }

        pieces.retain(|p| !p.is_empty());
        pieces
    }

    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars
            .chunks(self.max_segment_chars)
            .map(|c| c.iter().collect::<String>().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Prefixes each piece with the tail of its predecessor when the result
    /// still fits the size limit.
    fn apply_overlap(&self, pieces: Vec<String>) -> Vec<String> {
        if self.overlap_chars == 0 || pieces.len() < 2 {
            return pieces;
        }

        let mut out = Vec::with_capacity(pieces.len());
        let mut previous: Option<&str> = None;
        for piece in &pieces {
            let merged = match previous {
                Some(prev) => {
                    let count = prev.chars().count();
                    let tail: String = prev
                        .chars()
                        .skip(count.saturating_sub(self.overlap_chars))
                        .collect();
                    let candidate = format!("{} {}", tail.trim(), piece);
                    if self.fits(&candidate) {
                        candidate
                    } else {
                        piece.clone()
                    }
                }
                None => piece.clone(),
            };
            out.push(merged);
            previous = Some(piece.as_str());
        }
        out
    }
}

impl Default for RecursiveDocumentSplitter {
    fn default() -> Self {
        Self::new(300, 0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ragweave_kernel::rag::MetadataValue;

    #[test]
    fn short_text_is_one_segment() {
        let splitter = RecursiveDocumentSplitter::new(300, 0);
        assert_eq!(
            splitter.split_text("Can I cancel my reservation?"),
            vec!["Can I cancel my reservation?"]
        );
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(RecursiveDocumentSplitter::default().split_text("  \n ").is_empty());
    }

    #[test]
    fn splits_at_paragraphs_within_limit() {
        let splitter = RecursiveDocumentSplitter::new(50, 0);
        let text = "First paragraph content.\n\nSecond paragraph content.\n\nThird paragraph content.";
        let pieces = splitter.split_text(text);
        assert_eq!(pieces.len(), 3);
        assert!(pieces.iter().all(|p| p.chars().count() <= 50));
        assert_eq!(pieces[0], "First paragraph content.");
    }

    #[test]
    fn long_word_is_hard_split() {
        let splitter = RecursiveDocumentSplitter::new(10, 0);
        let pieces = splitter.split_text(&"x".repeat(25));
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2], "xxxxx");
    }

    #[test]
    fn overlap_carries_tail_of_previous_piece() {
        let splitter = RecursiveDocumentSplitter::new(40, 8);
        let pieces = splitter.split_text("alpha beta gamma delta. epsilon zeta eta theta iota kappa.");
        assert!(pieces.len() >= 2);
        assert!(pieces.iter().all(|p| p.chars().count() <= 40));
    }

    #[test]
    fn segments_inherit_metadata_and_get_index() {
        let splitter = RecursiveDocumentSplitter::new(30, 0);
        let document = Document::new("One sentence here. Another sentence there. A third one.")
            .with_metadata("file_name", "terms.txt");

        let segments = splitter.split(&document);
        assert!(segments.len() >= 2);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.metadata.get_str("file_name"), Some("terms.txt"));
            assert_eq!(
                segment.metadata.get(SEGMENT_INDEX_KEY),
                Some(&MetadataValue::Int(i as i64))
            );
        }
    }
}

//! Splitting a document into overlapping chunks.
//!
//! Chunks are cut at the coarsest boundary that fits inside the size limit:
//! paragraph breaks, then line breaks, then sentence ends, then whitespace,
//! and finally a hard cut at the character limit. Every chunk after the
//! first starts exactly `overlap_size` chars before the previous chunk ends,
//! so the document can be rebuilt from its chunks with [`reconstruct`].
//!
//! All sizes and offsets are in chars, not bytes.

use serde::{Deserialize, Serialize};

use crate::{
    document::Document,
    error::{Error, Result},
};

/// Default maximum chunk length in chars.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in chars.
pub const DEFAULT_OVERLAP_SIZE: usize = 200;

/// Boundaries tried in order, coarsest first. Each group is one level.
const SEPARATOR_LEVELS: &[&[&str]] =
    &[&["\n\n"], &["\n"], &[". ", "? ", "! "], &[" "]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in chars.
    pub max_chunk_size: usize,
    /// Overlap between adjacent chunks in chars.
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(Error::InvalidChunking(
                "max_chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(Error::InvalidChunking(format!(
                "overlap_size ({}) must be smaller than max_chunk_size ({})",
                self.overlap_size, self.max_chunk_size
            )));
        }
        Ok(())
    }
}

/// A slice of a document, the unit of indexing and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Id of the source document.
    pub document_id: String,
    /// Zero-based position in the chunk sequence.
    pub index: usize,
    /// First char of the span (inclusive).
    pub start: usize,
    /// End of the span (exclusive).
    pub end: usize,
    pub text: String,
    /// Page containing `start`, when the document has pages.
    pub page: Option<u32>,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Splits documents according to a validated [`ChunkingConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker, rejecting impossible size parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use manualseek::chunking::{Chunker, ChunkingConfig};
    ///
    /// assert!(Chunker::new(ChunkingConfig { max_chunk_size: 100, overlap_size: 20 }).is_ok());
    /// assert!(Chunker::new(ChunkingConfig { max_chunk_size: 100, overlap_size: 100 }).is_err());
    /// ```
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Split a document into ordered, overlapping chunks.
    ///
    /// # Examples
    ///
    /// ```
    /// use manualseek::chunking::{Chunker, ChunkingConfig};
    /// use manualseek::document::Document;
    ///
    /// let chunker = Chunker::new(ChunkingConfig { max_chunk_size: 1000, overlap_size: 200 }).unwrap();
    /// let doc = Document::new("manual", "x".repeat(3000));
    /// let chunks = chunker.split(&doc);
    ///
    /// assert_eq!(chunks.len(), 4);
    /// assert_eq!((chunks[0].start, chunks[0].end), (0, 1000));
    /// assert_eq!(chunks[1].start, 800);
    /// ```
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text();

        // char index -> byte index, with one extra entry for the end.
        let char_to_byte: Vec<usize> = text
            .char_indices()
            .map(|(byte_idx, _)| byte_idx)
            .chain(std::iter::once(text.len()))
            .collect();

        self.spans(text, &char_to_byte)
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| Chunk {
                document_id: document.id().to_string(),
                index,
                start,
                end,
                text: text[char_to_byte[start]..char_to_byte[end]].to_string(),
                page: document.page_at(start),
            })
            .collect()
    }

    /// Compute the `[start, end)` char spans for `text`.
    fn spans(&self, text: &str, char_to_byte: &[usize]) -> Vec<(usize, usize)> {
        let ChunkingConfig {
            max_chunk_size,
            overlap_size,
        } = self.config;

        let char_count = char_to_byte.len() - 1;

        let mut spans = Vec::new();
        let mut start = 0;

        while start < char_count {
            let limit = start + max_chunk_size;
            if limit >= char_count {
                spans.push((start, char_count));
                break;
            }

            let cut = find_boundary(text, char_to_byte, start, limit, overlap_size)
                .unwrap_or(limit);
            spans.push((start, cut));
            start = cut - overlap_size;
        }

        spans
    }
}

/// Find the cut point for a window `[start, limit)`.
///
/// Returns the char position just after the last separator of the coarsest
/// level that occurs in the window, provided the cut leaves room for the
/// overlap (`cut > start + overlap`). `None` means a hard cut is needed.
fn find_boundary(
    text: &str,
    char_to_byte: &[usize],
    start: usize,
    limit: usize,
    overlap: usize,
) -> Option<usize> {
    let start_byte = char_to_byte[start];
    let window = &text[start_byte..char_to_byte[limit]];

    for level in SEPARATOR_LEVELS {
        let best_byte = level
            .iter()
            .filter_map(|sep| window.rfind(sep).map(|pos| pos + sep.len()))
            .max();

        let Some(rel_byte) = best_byte else {
            continue;
        };

        // Separators are ASCII, so the cut always lands on a char boundary.
        let cut = match char_to_byte.binary_search(&(start_byte + rel_byte)) {
            Ok(idx) => idx,
            Err(_) => continue,
        };
        if cut > start + overlap {
            return Some(cut);
        }
    }

    None
}

/// Rebuild the source text by concatenating chunks and dropping overlaps.
///
/// Chunks must be in sequence order and come from one [`Chunker::split`]
/// call.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered: usize = 0;

    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        out.extend(chunk.text.chars().skip(skip));
        covered = chunk.end;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig {
            max_chunk_size: max,
            overlap_size: overlap,
        })
        .unwrap()
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = Chunker::new(ChunkingConfig {
            max_chunk_size: 10,
            overlap_size: 10,
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidChunking(_)));
    }

    #[test]
    fn rejects_zero_size() {
        assert!(
            Chunker::new(ChunkingConfig {
                max_chunk_size: 0,
                overlap_size: 0,
            })
            .is_err()
        );
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let chunks = chunker(100, 10).split(&Document::new("d", ""));
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let doc = Document::new("d", "Check the tire pressure monthly.");
        let chunks = chunker(1000, 200).split(&doc);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, doc.text());
        assert_eq!((chunks[0].start, chunks[0].end), (0, doc.char_len()));
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn three_thousand_chars_make_four_chunks() {
        let doc = Document::new("d", "a".repeat(3000));
        let chunks = chunker(1000, 200).split(&doc);

        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(
            spans,
            vec![(0, 1000), (800, 1800), (1600, 2600), (2400, 3000)]
        );
    }

    #[test]
    fn prefers_paragraph_break_over_sentence_break() {
        let text = format!(
            "{}\n\n{}. {}",
            "a".repeat(40),
            "b".repeat(30),
            "c".repeat(60)
        );
        let chunks = chunker(100, 10).split(&Document::new("d", text.as_str()));

        // cut right after the blank line
        assert_eq!(chunks[0].end, 42);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn falls_back_to_sentence_then_whitespace() {
        let sentence = format!("{}. {}", "a".repeat(50), "b".repeat(80));
        let chunks =
            chunker(100, 10).split(&Document::new("d", sentence.as_str()));
        assert_eq!(chunks[0].end, 52);

        let words = format!("{} {}", "a".repeat(50), "b".repeat(80));
        let chunks = chunker(100, 10).split(&Document::new("d", words.as_str()));
        assert_eq!(chunks[0].end, 51);
    }

    #[test]
    fn boundary_inside_overlap_is_ignored() {
        // The only paragraph break sits before start + overlap, so the
        // whitespace level is used instead.
        let text = format!("ab\n\n{} {}", "c".repeat(60), "d".repeat(60));
        let chunks = chunker(100, 10).split(&Document::new("d", text.as_str()));
        assert_eq!(chunks[0].end, 65);
    }

    #[test]
    fn long_token_is_hard_split() {
        let doc = Document::new("d", "x".repeat(250));
        let chunks = chunker(100, 20).split(&doc);

        assert!(chunks.iter().all(|c| c.char_len() <= 100));
        assert_eq!(chunks[0].end, 100);
        assert_eq!(chunks[1].start, 80);
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text = "The brake pads wear over time. Replace them when worn.\n"
            .repeat(40);
        let chunks = chunker(120, 30).split(&Document::new("d", text.as_str()));

        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 30);
        }
    }

    #[test]
    fn reconstruct_round_trips_unicode() {
        let text = "Vérifiez le niveau d'huile ☕. 日本語のテキスト。 ".repeat(30);
        let doc = Document::new("d", text.as_str());
        let chunks = chunker(64, 16).split(&doc);

        assert_eq!(reconstruct(&chunks), text);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 64);
        }
    }

    #[test]
    fn chunks_carry_start_page() {
        let doc = Document::from_pages(
            "m",
            ["a".repeat(90).as_str(), "b".repeat(90).as_str()],
        );
        let chunks = chunker(100, 20).split(&doc);

        assert_eq!(chunks[0].page, Some(1));
        assert_eq!(chunks.last().unwrap().page, Some(2));
    }

    #[test]
    fn zero_overlap_is_allowed() {
        let doc = Document::new("d", "z".repeat(25));
        let chunks = chunker(10, 0).split(&doc);
        let spans: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(spans, vec![(0, 10), (10, 20), (20, 25)]);
    }
}

//! The source text handed to the indexer.
//!
//! Binary parsing happens elsewhere; a [`Document`] is already plain text
//! plus a mapping from char offsets to page numbers.

use std::path::Path;

use crate::error::{Error, Result};

/// Separator inserted between pages when a document is assembled from pages.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Page break character emitted by `pdftotext` and similar tools.
pub const FORM_FEED: char = '\x0c';

/// A page boundary: the page numbered `page` starts at char `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBoundary {
    pub offset: usize,
    pub page: u32,
}

/// An immutable source document.
#[derive(Debug, Clone)]
pub struct Document {
    id: String,
    text: String,
    char_len: usize,
    pages: Vec<PageBoundary>,
}

impl Document {
    /// A document without page information.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            char_len: text.chars().count(),
            text,
            pages: Vec::new(),
        }
    }

    /// A document whose text comes with its own page map.
    ///
    /// The text is kept exactly as given. Boundary offsets must be strictly
    /// increasing and no larger than the text's char length; text before the
    /// first boundary has no page.
    ///
    /// # Examples
    ///
    /// ```
    /// use manualseek::document::{Document, PageBoundary};
    ///
    /// let doc = Document::with_pages(
    ///     "manual",
    ///     "Cover\x0cEngine oil",
    ///     vec![
    ///         PageBoundary { offset: 0, page: 1 },
    ///         PageBoundary { offset: 6, page: 2 },
    ///     ],
    /// )
    /// .unwrap();
    /// assert_eq!(doc.text(), "Cover\x0cEngine oil");
    /// assert_eq!(doc.page_at(7), Some(2));
    /// ```
    pub fn with_pages(
        id: impl Into<String>,
        text: impl Into<String>,
        pages: Vec<PageBoundary>,
    ) -> Result<Self> {
        let text = text.into();
        let char_len = text.chars().count();

        if let Some(b) = pages.iter().find(|b| b.offset > char_len) {
            return Err(Error::InvalidPageMap(format!(
                "page {} starts at offset {} past the end of the text ({char_len} chars)",
                b.page, b.offset
            )));
        }
        if let Some(pair) = pages.windows(2).find(|w| w[0].offset >= w[1].offset) {
            return Err(Error::InvalidPageMap(format!(
                "page boundaries out of order: page {} at {} then page {} at {}",
                pair[0].page, pair[0].offset, pair[1].page, pair[1].offset
            )));
        }

        Ok(Self {
            id: id.into(),
            text,
            char_len,
            pages,
        })
    }

    /// Assemble a document from page texts, numbering pages from 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use manualseek::document::Document;
    ///
    /// let doc = Document::from_pages("manual", ["Cover", "Engine oil"]);
    /// assert_eq!(doc.text(), "Cover\n\nEngine oil");
    /// assert_eq!(doc.page_at(0), Some(1));
    /// assert_eq!(doc.page_at(7), Some(2));
    /// ```
    pub fn from_pages<I, S>(id: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let separator_len = PAGE_SEPARATOR.chars().count();
        let mut text = String::new();
        let mut boundaries = Vec::new();
        let mut offset = 0;

        for (i, page) in pages.into_iter().enumerate() {
            if i > 0 {
                text.push_str(PAGE_SEPARATOR);
                offset += separator_len;
            }
            let page = page.as_ref();
            boundaries.push(PageBoundary {
                offset,
                page: i as u32 + 1,
            });
            text.push_str(page);
            offset += page.chars().count();
        }

        Self {
            id: id.into(),
            char_len: offset,
            text,
            pages: boundaries,
        }
    }

    /// Split raw extractor output on form feeds, one page per segment.
    ///
    /// A single trailing form feed (as `pdftotext` writes) does not create
    /// an extra empty page.
    pub fn from_form_feed_text(id: impl Into<String>, raw: &str) -> Self {
        let raw = raw.strip_suffix(FORM_FEED).unwrap_or(raw);
        if raw.contains(FORM_FEED) {
            Self::from_pages(id, raw.split(FORM_FEED))
        } else {
            Self::from_pages(id, [raw])
        }
    }

    /// Read a text file produced by an external extractor.
    ///
    /// The document id defaults to the file stem.
    pub fn read_file(path: &Path, id: Option<&str>) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| {
            Error::SourceUnavailable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let id = match id {
            Some(id) => id.to_string(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document")
                .to_string(),
        };
        Ok(Self::from_form_feed_text(id, &raw))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in chars.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn pages(&self) -> &[PageBoundary] {
        &self.pages
    }

    /// Page number containing the given char offset.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        let idx = self.pages.partition_point(|b| b.offset <= offset);
        idx.checked_sub(1).map(|i| self.pages[i].page)
    }
}

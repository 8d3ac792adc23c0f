//! Fixed-size text chunking.

use crate::error::Result;
use crate::types::{Chunk, Document};

use super::{
    ChunkStrategy, Chunker, Piece, ceil_char_boundary, ensure_content, finalize,
    floor_char_boundary, validate_sizes,
};

/// Chunks text into fixed-size byte windows with configurable overlap.
///
/// Windows are `chunk_size` bytes wide and advance by `chunk_size - overlap`. A boundary that
/// would fall inside a multi-byte character moves back to the previous character boundary.
///
/// # Example
///
/// ```rust
/// use recall_rag::chunking::{Chunker, FixedSizeChunker};
/// use recall_rag::Document;
///
/// let chunker = FixedSizeChunker::new(100, 20).unwrap();
/// let doc = Document::new("notes", "Shorter than one window.");
/// let chunks = chunker.chunk(&doc).unwrap();
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    /// Maximum size of each chunk in bytes.
    chunk_size: usize,
    /// Number of overlapping bytes between consecutive chunks.
    overlap: usize,
}

impl FixedSizeChunker {
    /// Creates a chunker with `chunk_size`-byte windows sharing `overlap` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when `chunk_size` is zero or `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        validate_sizes(chunk_size, overlap)?;
        Ok(Self {
            chunk_size,
            overlap,
        })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        ensure_content(doc)?;
        let text = &doc.content;

        let mut pieces = Vec::new();
        if text.len() <= self.chunk_size {
            pieces.push(Piece::whole(text));
        } else {
            let step = self.chunk_size - self.overlap;
            let mut start = 0;
            loop {
                let mut end = floor_char_boundary(text, start + self.chunk_size);
                if end <= start {
                    // A single character wider than the window.
                    end = ceil_char_boundary(text, start + 1);
                }
                pieces.push(Piece {
                    start,
                    end,
                    content: text[start..end].to_string(),
                });
                if end >= text.len() {
                    break;
                }

                let next = floor_char_boundary(text, start + step);
                start = if next > start {
                    next
                } else {
                    ceil_char_boundary(text, start + 1)
                };
            }
        }

        Ok(finalize(doc, pieces, ChunkStrategy::FixedSize, None))
    }

    fn name(&self) -> &'static str {
        "fixed_size"
    }
}

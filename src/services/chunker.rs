//! Token-bounded text chunking with overlap.
//!
//! Sizes are configured in tokens and converted to characters with the same
//! estimate used for `token_count`, so chunk sizing is deterministic.
//!
//! Trailing policy: when the last window adds fewer than `min_chunk_size`
//! tokens of new text beyond the previous chunk, it is merged into that
//! previous chunk instead of being emitted on its own.

use crate::models::{Document, DocumentChunk, IndexingConfig};
use crate::utils::text::{estimate_tokens, tokens_to_chars};
use crate::utils::extract_keywords;

/// Half-open character range `[start, end)`.
type Span = (usize, usize);

/// Splits documents into overlapping, ordered chunks.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap size in characters
    overlap: usize,
    /// Minimum new characters a trailing chunk must contribute
    min_chunk: usize,
    keywords_per_chunk: usize,
}

impl TextChunker {
    pub fn new(config: &IndexingConfig) -> Self {
        Self::with_sizes(
            config.chunk_size as usize,
            config.chunk_overlap as usize,
            config.min_chunk_size as usize,
        )
        .with_keywords(config.keywords_per_chunk as usize)
    }

    /// Build a chunker from token sizes. Overlap is clamped below the chunk size.
    pub fn with_sizes(chunk_tokens: usize, overlap_tokens: usize, min_tokens: usize) -> Self {
        let chunk_size = tokens_to_chars(chunk_tokens.max(1));
        Self {
            chunk_size,
            overlap: tokens_to_chars(overlap_tokens).min(chunk_size - 1),
            min_chunk: tokens_to_chars(min_tokens).min(chunk_size),
            keywords_per_chunk: 8,
        }
    }

    pub fn with_keywords(mut self, keywords_per_chunk: usize) -> Self {
        self.keywords_per_chunk = keywords_per_chunk;
        self
    }

    pub fn with_defaults() -> Self {
        Self::new(&IndexingConfig::default())
    }

    /// Chunk a document's content. Empty or whitespace-only content yields no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<DocumentChunk> {
        let chars: Vec<char> = document.content.chars().collect();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        let line_of = line_index(&chars);

        self.split(&chars)
            .into_iter()
            .filter(|&(start, end)| chars[start..end].iter().any(|c| !c.is_whitespace()))
            .enumerate()
            .map(|(idx, (start, end))| {
                let content: String = chars[start..end].iter().collect();
                let chunk_index = idx as u32;
                DocumentChunk {
                    id: DocumentChunk::generate_id(&document.id, chunk_index),
                    document_id: document.id.clone(),
                    chunk_index,
                    token_count: estimate_tokens(&content) as u32,
                    keywords: extract_keywords(&content, self.keywords_per_chunk),
                    start_offset: start as u64,
                    end_offset: end as u64,
                    line_start: line_of[start],
                    line_end: line_of[end - 1],
                    content,
                    embedding: Vec::new(),
                }
            })
            .collect()
    }

    /// Compute overlapping windows over `chars`, in text order.
    fn split(&self, chars: &[char]) -> Vec<Span> {
        let total = chars.len();
        if total <= self.chunk_size {
            return vec![(0, total)];
        }

        let mut spans: Vec<Span> = Vec::new();
        let mut start = 0;

        loop {
            let prev_end = spans.last().map_or(0, |&(_, end)| end);
            let target = (start + self.chunk_size).min(total);
            let min_end = (start + 1).max(prev_end + 1);
            let end = self.find_break_point(chars, min_end, target, total);
            spans.push((start, end));

            if end >= total {
                break;
            }

            let mut next = snap_to_word_start(chars, end.saturating_sub(self.overlap), end);
            if next <= start {
                next = end;
            }
            start = next;
        }

        if spans.len() >= 2 {
            let (_, last_end) = spans[spans.len() - 1];
            let prev_end = spans[spans.len() - 2].1;
            if last_end - prev_end < self.min_chunk {
                spans.pop();
                if let Some(prev) = spans.last_mut() {
                    prev.1 = last_end;
                }
            }
        }

        spans
    }

    /// Find a natural break point in the last 20% of the window, never before `min_end`.
    fn find_break_point(&self, chars: &[char], min_end: usize, target_end: usize, total: usize) -> usize {
        if target_end >= total {
            return total;
        }

        let search_start = target_end
            .saturating_sub(self.chunk_size / 5)
            .max(min_end.saturating_sub(1));
        if search_start >= target_end {
            return target_end;
        }
        let search_range = &chars[search_start..target_end];

        // Priority: double newline > single newline > sentence end > space
        let mut paragraph = None;
        let mut newline = None;
        let mut sentence = None;
        let mut space = None;

        for (i, c) in search_range.iter().enumerate() {
            let pos = search_start + i;
            match c {
                '\n' => {
                    if i > 0 && search_range[i - 1] == '\n' {
                        paragraph = Some(pos + 1);
                    }
                    newline = Some(pos + 1);
                }
                '.' | '!' | '?' => {
                    if search_range.get(i + 1).is_some_and(|c| c.is_whitespace()) {
                        sentence = Some(pos + 1);
                    }
                }
                ' ' | '\t' => {
                    space = Some(pos + 1);
                }
                _ => {}
            }
        }

        paragraph
            .or(newline)
            .or(sentence)
            .or(space)
            .unwrap_or(target_end)
    }
}

/// 1-based line number for every character position.
fn line_index(chars: &[char]) -> Vec<u32> {
    let mut line = 1u32;
    chars
        .iter()
        .map(|c| {
            let current = line;
            if *c == '\n' {
                line += 1;
            }
            current
        })
        .collect()
}

/// Move `pos` forward past a partial word, without reaching `limit`.
fn snap_to_word_start(chars: &[char], pos: usize, limit: usize) -> usize {
    if pos == 0 || chars[pos - 1].is_whitespace() {
        return pos;
    }
    chars[pos..limit]
        .iter()
        .position(|c| c.is_whitespace())
        .map(|offset| pos + offset + 1)
        .filter(|&p| p < limit)
        .unwrap_or(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileType;

    fn create_test_document(content: &str) -> Document {
        Document::new(
            "inline:test",
            "test.txt",
            "test",
            FileType::Text,
            content.to_string(),
        )
    }

    fn prose(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_document() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk(&create_test_document("")).is_empty());
        assert!(chunker.chunk(&create_test_document("  \n\t \n")).is_empty());
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunker = TextChunker::with_defaults();
        let chunks = chunker.chunk(&create_test_document("Hello, world!"));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, 13);
        assert_eq!(chunks[0].token_count, 4);
    }

    #[test]
    fn test_ordinals_contiguous_and_ordered() {
        let chunker = TextChunker::with_sizes(20, 5, 2);
        let content = prose(200);
        let doc = create_test_document(&content);
        let chunks = chunker.chunk(&doc);

        assert!(chunks.len() > 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.document_id, doc.id);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].end_offset > pair[0].end_offset);
        }
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(
            chunks.last().unwrap().end_offset,
            content.chars().count() as u64
        );
    }

    #[test]
    fn test_consecutive_chunks_overlap_without_gaps() {
        let chunker = TextChunker::with_sizes(20, 5, 2);
        let chunks = chunker.chunk(&create_test_document(&prose(200)));

        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_offset < pair[0].end_offset,
                "chunk {} does not overlap chunk {}",
                pair[1].chunk_index,
                pair[0].chunk_index
            );
        }
    }

    #[test]
    fn test_chunks_start_on_word_boundaries() {
        let chunker = TextChunker::with_sizes(20, 5, 2);
        let chunks = chunker.chunk(&create_test_document(&prose(200)));

        for chunk in &chunks {
            assert!(
                chunk.content.starts_with("word"),
                "chunk {} starts mid-word: {:?}",
                chunk.chunk_index,
                &chunk.content[..8.min(chunk.content.len())]
            );
        }
    }

    #[test]
    fn test_trailing_fragment_merged_into_previous() {
        // 40-char windows, no overlap, 20-char minimum: the 10-char tail is merged.
        let chunker = TextChunker::with_sizes(10, 0, 5);
        let content = "a".repeat(50);
        let chunks = chunker.chunk(&create_test_document(&content));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content.len(), 50);
    }

    #[test]
    fn test_trailing_fragment_kept_when_large_enough() {
        let chunker = TextChunker::with_sizes(10, 0, 2);
        let chunks = chunker.chunk(&create_test_document(&"a".repeat(60)));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.len(), 40);
        assert_eq!(chunks[1].content.len(), 20);
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = TextChunker::with_sizes(16, 4, 2);
        let doc = create_test_document(&prose(150));
        assert_eq!(chunker.chunk(&doc), chunker.chunk(&doc));
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let chunker = TextChunker::with_sizes(10, 0, 1);
        let content = format!("{}\n\n{}", "x".repeat(35), "y".repeat(30));
        let chunks = chunker.chunk(&create_test_document(&content));

        assert_eq!(chunks[0].content, format!("{}\n\n", "x".repeat(35)));
    }

    #[test]
    fn test_line_tracking() {
        let chunker = TextChunker::with_defaults();
        let chunks = chunker.chunk(&create_test_document("Line 1\nLine 2\nLine 3"));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].line_start, 1);
        assert_eq!(chunks[0].line_end, 3);
    }

    #[test]
    fn test_chunks_carry_keywords() {
        let chunker = TextChunker::with_defaults().with_keywords(3);
        let chunks = chunker.chunk(&create_test_document(
            "Fitzer maintenance report. Fitzer pumps were inspected.",
        ));
        assert_eq!(chunks[0].keywords[0], "fitzer");
        assert!(chunks[0].keywords.len() <= 3);
    }
}

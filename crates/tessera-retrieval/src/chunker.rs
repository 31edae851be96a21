//! Token-window chunking.
//!
//! Text is split into a stream of tokens by a [`TokenSpans`] implementation,
//! then cut into windows of at most `max_tokens` that advance by
//! `max_tokens - overlap_tokens`. Each chunk carries the slice of the
//! original text covered by its window, so no detokenization is needed.

use std::ops::Range;
use std::path::Path;

use tessera_core::{Chunk, TesseraError};
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer};

/// Splits text into tokens, reporting each token as a byte range of the input.
///
/// Ranges must be non-empty, ascending, non-overlapping, and fall on UTF-8
/// character boundaries.
pub trait TokenSpans: Send + Sync {
    /// Byte ranges of the tokens of `text`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidConfig`] if the tokenizer cannot process the text.
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>, TesseraError>;
}

/// Word-level tokenizer that needs no vocabulary file.
///
/// Splits on whitespace and isolates punctuation, like the pre-tokenization
/// step of BERT-family models.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::chunker::{TokenSpans, WordTokenizer};
///
/// let spans = WordTokenizer.token_spans("Paris, France").unwrap();
/// assert_eq!(spans, vec![0..5, 5..6, 7..13]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl TokenSpans for WordTokenizer {
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>, TesseraError> {
        let mut pre = PreTokenizedString::from(text);
        BertPreTokenizer
            .pre_tokenize(&mut pre)
            .map_err(|e| TesseraError::InvalidConfig(format!("pre-tokenization failed: {e}")))?;

        Ok(pre
            .get_splits(OffsetReferential::Original, OffsetType::Byte)
            .into_iter()
            .map(|(_, (start, end), _)| start..end)
            .filter(|span| span.start < span.end)
            .collect())
    }
}

/// Subword tokenizer loaded from a Hugging Face `tokenizer.json`.
///
/// Use the embedding model's own tokenizer to make `max_tokens` match the
/// model's context limit exactly.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer").finish_non_exhaustive()
    }
}

impl HfTokenizer {
    /// Load a tokenizer definition from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::FileNotFound`] if the file does not exist, or
    /// [`TesseraError::InvalidConfig`] if it cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, TesseraError> {
        if !path.exists() {
            return Err(TesseraError::FileNotFound(path.to_path_buf()));
        }
        let inner = Tokenizer::from_file(path).map_err(|e| {
            TesseraError::InvalidConfig(format!(
                "failed to load tokenizer {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { inner })
    }
}

impl TokenSpans for HfTokenizer {
    fn token_spans(&self, text: &str) -> Result<Vec<Range<usize>>, TesseraError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TesseraError::InvalidConfig(format!("tokenization failed: {e}")))?;

        let mut spans: Vec<Range<usize>> = Vec::with_capacity(encoding.len());
        for &(start, end) in encoding.get_offsets() {
            if start >= end {
                continue;
            }
            // Subword pieces of one character share its offsets.
            if spans.last().is_some_and(|last| last.start == start && last.end == end) {
                continue;
            }
            spans.push(start..end);
        }
        Ok(spans)
    }
}

/// Splits documents into overlapping token windows.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::chunker::{Chunker, WordTokenizer};
///
/// let chunker = Chunker::new(Box::new(WordTokenizer), 4, 1).unwrap();
/// let chunks = chunker.chunk("doc", "one two three four five six seven").unwrap();
/// assert_eq!(chunks.len(), 2);
/// assert_eq!(chunks[0].text, "one two three four");
/// assert_eq!(chunks[1].text, "four five six seven");
/// ```
pub struct Chunker {
    tokenizer: Box<dyn TokenSpans>,
    max_tokens: usize,
    overlap_tokens: usize,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("max_tokens", &self.max_tokens)
            .field("overlap_tokens", &self.overlap_tokens)
            .finish_non_exhaustive()
    }
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidConfig`] unless `overlap_tokens < max_tokens`.
    pub fn new(
        tokenizer: Box<dyn TokenSpans>,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<Self, TesseraError> {
        validate_window(max_tokens, overlap_tokens)?;
        Ok(Self {
            tokenizer,
            max_tokens,
            overlap_tokens,
        })
    }

    /// Build a chunker from optional `tokenizer.json`, falling back to [`WordTokenizer`].
    ///
    /// # Errors
    ///
    /// Propagates tokenizer loading and window validation errors.
    pub fn from_settings(
        tokenizer_path: Option<&Path>,
        max_tokens: usize,
        overlap_tokens: usize,
    ) -> Result<Self, TesseraError> {
        let tokenizer: Box<dyn TokenSpans> = match tokenizer_path {
            Some(path) => Box::new(HfTokenizer::from_file(path)?),
            None => Box::new(WordTokenizer),
        };
        Self::new(tokenizer, max_tokens, overlap_tokens)
    }

    /// Window size in tokens.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Tokens shared by consecutive windows.
    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Chunk `text`, tagging every chunk with `source_id`.
    ///
    /// Empty or whitespace-only text produces no chunks.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidConfig`] if tokenization fails.
    pub fn chunk(&self, source_id: &str, text: &str) -> Result<Vec<Chunk>, TesseraError> {
        let spans = self.tokenizer.token_spans(text)?;
        windows(spans.len(), self.max_tokens, self.overlap_tokens)
            .into_iter()
            .map(|window| {
                let first = &spans[window.start];
                let last = &spans[window.end - 1];
                let slice = text.get(first.start..last.end).ok_or_else(|| {
                    TesseraError::InvalidConfig(format!(
                        "token offsets {}..{} are not character boundaries",
                        first.start, last.end
                    ))
                })?;
                Ok(Chunk {
                    source_id: source_id.to_string(),
                    text: slice.to_string(),
                    token_start: window.start,
                    token_end: window.end,
                })
            })
            .collect()
    }
}

/// Chunk `text` with the default word tokenizer.
///
/// # Errors
///
/// Returns [`TesseraError::InvalidConfig`] if `overlap_tokens >= max_tokens`.
///
/// # Examples
///
/// ```
/// use tessera_retrieval::chunker::chunk_text;
///
/// let chunks = chunk_text("note", "a b c d e", 3, 1).unwrap();
/// let ranges: Vec<_> = chunks.iter().map(|c| (c.token_start, c.token_end)).collect();
/// assert_eq!(ranges, vec![(0, 3), (2, 5)]);
///
/// assert!(chunk_text("note", "a b", 2, 2).is_err());
/// ```
pub fn chunk_text(
    source_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>, TesseraError> {
    Chunker::new(Box::new(WordTokenizer), max_tokens, overlap_tokens)?.chunk(source_id, text)
}

fn validate_window(max_tokens: usize, overlap_tokens: usize) -> Result<(), TesseraError> {
    if max_tokens == 0 {
        return Err(TesseraError::InvalidConfig(
            "max_tokens must be at least 1".into(),
        ));
    }
    if overlap_tokens >= max_tokens {
        return Err(TesseraError::InvalidConfig(format!(
            "overlap_tokens ({overlap_tokens}) must be smaller than max_tokens ({max_tokens})"
        )));
    }
    Ok(())
}

/// Token windows over a stream of `total` tokens.
///
/// Stops at the first window that reaches the end of the stream, so no
/// window is wholly contained in its predecessor.
fn windows(total: usize, max_tokens: usize, overlap_tokens: usize) -> Vec<Range<usize>> {
    let step = max_tokens - overlap_tokens;
    let mut out = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + max_tokens).min(total);
        out.push(start..end);
        if end == total {
            break;
        }
        start += step;
    }
    out
}

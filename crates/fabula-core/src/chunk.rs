//! Sentence-aware text chunking.
//!
//! Source text is split at sentence boundaries into pieces no longer than a
//! configurable character budget. Sentences that alone exceed the budget fall
//! back to word boundaries; a single word longer than the budget is
//! hard-split at the budget.

/// Smallest accepted chunk budget.
pub const MIN_CHUNK_CHARS: usize = 1;

/// Largest accepted chunk budget.
pub const MAX_CHUNK_CHARS: usize = 8000;

/// An ordered fragment of the source text. The index restores original
/// order after parallel synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

/// Splits text into bounded chunks. Deterministic for identical input.
#[derive(Debug, Clone)]
pub struct TextChunker {
    max_chars: usize,
}

impl TextChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.clamp(MIN_CHUNK_CHARS, MAX_CHUNK_CHARS),
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Chunk the text. Empty or whitespace-only input yields no chunks;
    /// every produced chunk is non-empty, trimmed, and within the budget.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut builder = ChunkBuilder::new(self.max_chars);
        for sentence in split_sentences(text) {
            let sentence = normalize_whitespace(&sentence);
            if sentence.is_empty() {
                continue;
            }
            builder.push_sentence(&sentence);
        }
        builder.finish()
    }
}

struct ChunkBuilder {
    max_chars: usize,
    chunks: Vec<TextChunk>,
    current: String,
    current_len: usize,
}

impl ChunkBuilder {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    fn push_sentence(&mut self, sentence: &str) {
        let len = sentence.chars().count();
        if len <= self.max_chars {
            self.push_piece(sentence, len);
            return;
        }

        // The sentence alone exceeds the budget: close the open chunk and
        // fall back to word boundaries.
        self.flush();
        for word in sentence.split_whitespace() {
            let word_len = word.chars().count();
            if word_len <= self.max_chars {
                self.push_piece(word, word_len);
            } else {
                self.flush();
                for piece in split_long_word(word, self.max_chars) {
                    let piece_len = piece.chars().count();
                    self.push_piece(&piece, piece_len);
                }
            }
        }
    }

    /// Append a piece that fits the budget, accounting for the joining
    /// space, or start a new chunk.
    fn push_piece(&mut self, piece: &str, piece_len: usize) {
        if self.current.is_empty() {
            self.current.push_str(piece);
            self.current_len = piece_len;
            return;
        }

        if self.current_len + 1 + piece_len <= self.max_chars {
            self.current.push(' ');
            self.current.push_str(piece);
            self.current_len += 1 + piece_len;
        } else {
            self.flush();
            self.current.push_str(piece);
            self.current_len = piece_len;
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let index = self.chunks.len();
        self.chunks.push(TextChunk {
            index,
            text: std::mem::take(&mut self.current),
        });
        self.current_len = 0;
    }

    fn finish(mut self) -> Vec<TextChunk> {
        self.flush();
        self.chunks
    }
}

/// Split at sentence terminators (`.`, `!`, `?`) followed by whitespace.
/// Runs of terminators stay attached to their sentence, and terminators
/// inside a token (decimals, abbreviations without a trailing space) do not
/// end a sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if !is_terminator(ch) {
            continue;
        }
        while let Some(&next) = chars.peek() {
            if is_terminator(next) {
                current.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if matches!(chars.peek(), Some(next) if next.is_whitespace()) {
            sentences.push(std::mem::take(&mut current));
        }
    }

    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

fn is_terminator(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?')
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_long_word(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect())
        .collect()
}

//! Splitting documents into bounded chunks

/// Splits a document into ordered, non-overlapping chunks
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<String>;
}

const MAIN_OPEN: &str = "<main-content>";
const MAIN_CLOSE: &str = "</main-content>";

/// Packs paragraphs greedily into chunks of at most `max_length` characters
///
/// Paragraphs (blank-line separated) are never split unless a single one is
/// longer than the limit; then it is cut on line breaks and, failing that,
/// on character boundaries. A chunk that ends inside a `<main-content>`
/// block is closed and the next one reopens it, so the limit can be exceeded
/// by the marker lengths.
#[derive(Debug, Clone, Copy)]
pub struct MaxLengthChunker {
    max_length: usize,
}

impl MaxLengthChunker {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    fn pieces<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
            if char_len(paragraph) <= self.max_length {
                pieces.push(paragraph);
                continue;
            }
            for line in paragraph.lines().filter(|l| !l.trim().is_empty()) {
                if char_len(line) <= self.max_length {
                    pieces.push(line);
                } else {
                    pieces.extend(split_chars(line, self.max_length));
                }
            }
        }
        pieces
    }
}

impl Chunker for MaxLengthChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;
        let mut in_main = false;

        for piece in self.pieces(text) {
            let piece_len = char_len(piece);
            if current_len > 0 && current_len + 2 + piece_len > self.max_length {
                if in_main {
                    current.push('\n');
                    current.push_str(MAIN_CLOSE);
                }
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
                if in_main && !piece.starts_with(MAIN_CLOSE) {
                    current.push_str(MAIN_OPEN);
                    current.push('\n');
                }
            }

            if current_len > 0 {
                current.push_str("\n\n");
                current_len += 2;
            }
            current.push_str(piece);
            current_len += piece_len;

            if let Some(open) = piece.rfind(MAIN_OPEN) {
                in_main = piece.rfind(MAIN_CLOSE).map_or(true, |close| close < open);
            } else if piece.contains(MAIN_CLOSE) {
                in_main = false;
            }
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_chars(s: &str, max: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in s.char_indices() {
        if count == max {
            out.push(&s[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}

// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Normalizes raw question/passage text and splits it into the
// word tokens and per-word character sequences the model
// embeds. The model is word-level over a GloVe vocabulary, so
// tokenization here is deliberately simple: lowercase words
// split on whitespace, punctuation separated into its own
// tokens.

use std::collections::HashMap;

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Normalize whitespace oddities before tokenization: exotic
    /// Unicode spaces and control characters become plain spaces,
    /// runs of spaces collapse to one.
    pub fn clean(&self, text: &str) -> String {
        let normalized: String = text
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' | '\t' | '\r' | '\n' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        let mut out = String::with_capacity(normalized.len());
        let mut last_space = true;
        for c in normalized.chars() {
            if c == ' ' {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }
        out.trim_end().to_string()
    }

    /// Lowercased word tokens; punctuation becomes separate tokens so
    /// "what?" yields ["what", "?"].
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();

        for c in self.clean(text).chars() {
            if c.is_whitespace() {
                flush(&mut tokens, &mut current);
            } else if c.is_alphanumeric() || c == '\'' {
                current.extend(c.to_lowercase());
            } else {
                flush(&mut tokens, &mut current);
                tokens.push(c.to_string());
            }
        }
        flush(&mut tokens, &mut current);
        tokens
    }
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── CharVocab ────────────────────────────────────────────────────────────────

/// Character-to-id mapping for the char-level embedding.
/// Id 0 is reserved for padding, id 1 for unseen characters.
#[derive(Debug, Clone)]
pub struct CharVocab {
    ids: HashMap<char, u32>,
}

pub const CHAR_PADDING_ID: u32 = 0;
pub const CHAR_UNKNOWN_ID: u32 = 1;

impl CharVocab {
    /// Collect every character appearing in the given words.
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        let mut ids = HashMap::new();
        let mut next = CHAR_UNKNOWN_ID + 1;
        for word in words {
            for c in word.chars() {
                ids.entry(c).or_insert_with(|| {
                    let id = next;
                    next += 1;
                    id
                });
            }
        }
        Self { ids }
    }

    /// Total id count, including the two reserved ids.
    pub fn size(&self) -> usize {
        self.ids.len() + 2
    }

    pub fn id_of(&self, c: char) -> u32 {
        self.ids.get(&c).copied().unwrap_or(CHAR_UNKNOWN_ID)
    }

    /// Character ids for one word.
    pub fn encode(&self, word: &str) -> Vec<u32> {
        word.chars().map(|c| self.id_of(c)).collect()
    }
}

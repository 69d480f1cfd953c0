//! Sentence splitter for TTS input
//!
//! Splits text into the sentence units that are sent to the synthesis engine
//! one call at a time. Paragraphs are split on runs of terminal punctuation,
//! except where the punctuation is part of a quotation (`「なに？」`), so the
//! quoted mark stays inside its sentence.

use regex::Regex;
use std::sync::OnceLock;

/// Characters that drive sentence splitting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitterConfig {
    /// Sentence-terminal punctuation; consecutive marks form one run
    pub terminals: Vec<char>,
    /// A run directly after one of these never starts a split
    pub opening_quotes: Vec<char>,
    /// A run directly before one of these never ends a split
    pub closing_quotes: Vec<char>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            terminals: vec!['。', '！', '？'],
            opening_quotes: vec!['「', '『'],
            closing_quotes: vec!['」', '』'],
        }
    }
}

/// Splits text into sentences according to a [`SplitterConfig`].
#[derive(Clone, Debug, Default)]
pub struct SentenceSplitter {
    config: SplitterConfig,
}

impl SentenceSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Split `text` into an ordered list of non-empty sentences.
    pub fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();

        for paragraph in text.split('\n') {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            self.split_paragraph(paragraph, &mut sentences);
        }

        sentences
            .into_iter()
            .filter(|s| !is_punctuation_only(s))
            .collect()
    }

    fn split_paragraph(&self, paragraph: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = paragraph.chars().collect();
        let mut fragment_start = 0;
        let mut pos = 0;

        while pos < chars.len() {
            match self.match_run(&chars, pos) {
                Some(run_end) => {
                    let body: String = chars[fragment_start..pos].iter().collect();
                    let run: String = chars[pos..run_end].iter().collect();
                    out.push(format!("{}{}", body.trim(), run));
                    fragment_start = run_end;
                    pos = run_end;
                }
                None => pos += 1,
            }
        }

        let tail: String = chars[fragment_start..].iter().collect();
        let tail = tail.trim();
        if !tail.is_empty() {
            out.push(tail.to_string());
        }
    }

    /// Try to match a split run starting at `start`, returning its end.
    ///
    /// The run is the longest stretch of terminal marks starting here whose
    /// following character is not a closing quote; it must not start right
    /// after an opening quote.
    fn match_run(&self, chars: &[char], start: usize) -> Option<usize> {
        if !self.is_terminal(chars[start]) {
            return None;
        }
        if start > 0 && self.config.opening_quotes.contains(&chars[start - 1]) {
            return None;
        }

        let mut max_end = start;
        while max_end < chars.len() && self.is_terminal(chars[max_end]) {
            max_end += 1;
        }

        (start + 1..=max_end)
            .rev()
            .find(|&end| match chars.get(end) {
                Some(next) => !self.config.closing_quotes.contains(next),
                None => true,
            })
    }

    fn is_terminal(&self, c: char) -> bool {
        self.config.terminals.contains(&c)
    }
}

/// Split text into sentences using the default punctuation set.
pub fn split_sentences(text: &str) -> Vec<String> {
    static SPLITTER: OnceLock<SentenceSplitter> = OnceLock::new();
    SPLITTER.get_or_init(SentenceSplitter::default).split(text)
}

fn is_punctuation_only(sentence: &str) -> bool {
    static PUNCT_RE: OnceLock<Regex> = OnceLock::new();
    let punct_re = PUNCT_RE.get_or_init(|| {
        Regex::new(r"^[\s\p{P}]*$").expect("punctuation pattern is valid")
    });
    punct_re.is_match(sentence)
}

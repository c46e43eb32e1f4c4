//! Splitting document text into speakable segments.

use super::Segment;
use super::cache::SegmentCache;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Default maximum segment length in characters.
pub const DEFAULT_MAX_SEGMENT_LEN: usize = 200;

/// Smallest usable maximum: one character plus a synthesized period.
const MIN_SEGMENT_LEN: usize = 2;

/// Characters that may close a sentence after its terminal mark.
const CLOSERS: &[char] = &['"', '\'', '\u{2019}', '\u{201d}', ')', ']'];

/// Whitespace following a sentence-ending mark (and any closing quotes).
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.!?]["'’”)\]]*\s+"#).expect("sentence boundary pattern should compile")
});

/// Split `text` into segments of at most `max_len` characters.
///
/// Every segment ends in `.`, `!` or `?`; a period is appended where the
/// source has none. Only a single word longer than `max_len` can produce a
/// longer segment.
pub fn split_segments(text: &str, max_len: usize) -> Vec<Segment> {
    let max_len = max_len.max(MIN_SEGMENT_LEN);
    let mut segments: Vec<String> = Vec::new();

    for sentence in split_sentences(text) {
        let terminated = is_terminated(sentence);
        let needed = sentence.chars().count() + usize::from(!terminated);

        if needed <= max_len {
            segments.push(terminate(sentence));
        } else {
            // Leave room for the period each chunk may need
            for chunk in split_on_words(sentence, max_len - 1) {
                segments.push(terminate(&chunk));
            }
        }
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(index, text)| Segment::new(index, text))
        .collect()
}

/// Split on whitespace after sentence punctuation, trimming and dropping blanks.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        push_trimmed(&mut sentences, &text[start..boundary.end()]);
        start = boundary.end();
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece);
    }
}

fn is_terminated(text: &str) -> bool {
    text.trim_end_matches(CLOSERS)
        .ends_with(['.', '!', '?'])
}

fn terminate(text: &str) -> String {
    if is_terminated(text) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

/// Pack words into chunks of at most `max_chars` characters.
///
/// A word longer than `max_chars` becomes a chunk of its own.
fn split_on_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for word in text.split_whitespace() {
        let word_chars = word.chars().count();

        if current.is_empty() {
            current.push_str(word);
            current_chars = word_chars;
        } else if current_chars + 1 + word_chars <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_chars += 1 + word_chars;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_chars = word_chars;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Caching segmenter with a fixed maximum segment length.
#[derive(Debug)]
pub struct Segmenter {
    max_len: usize,
    cache: SegmentCache,
}

impl Segmenter {
    pub fn new(max_len: usize, cache_capacity: usize) -> Self {
        Self {
            max_len: max_len.max(MIN_SEGMENT_LEN),
            cache: SegmentCache::new(cache_capacity),
        }
    }

    /// Segment `text`, reusing the cached sequence when the same text was seen before.
    pub fn segment(&mut self, text: &str) -> Arc<[Segment]> {
        if let Some(segments) = self.cache.get(text) {
            debug!("Segment cache hit ({} segments)", segments.len());
            return segments;
        }

        let segments: Arc<[Segment]> = split_segments(text, self.max_len).into();
        if !segments.is_empty() {
            self.cache.insert(text, Arc::clone(&segments));
        }
        segments
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SEGMENT_LEN, super::DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts(segments: &[Segment]) -> Vec<&str> {
        segments.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn test_two_sentences() {
        let segments = split_segments("Hello world. This is a test.", 200);
        assert_eq!(texts(&segments), vec!["Hello world.", "This is a test."]);
        assert_eq!(segments[1].index, 1);
    }

    #[test]
    fn test_short_text_without_punctuation() {
        let segments = split_segments("a b c", 200);
        assert_eq!(texts(&segments), vec!["a b c."]);
    }

    #[test]
    fn test_single_terminated_sentence_unchanged() {
        let segments = split_segments("Is this unchanged?", 200);
        assert_eq!(texts(&segments), vec!["Is this unchanged?"]);
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(split_segments("", 200).is_empty());
        assert!(split_segments("   \n\t  ", 200).is_empty());
    }

    #[test]
    fn test_exclamation_and_question_boundaries() {
        let segments = split_segments("Stop!  Who goes there?\nA friend.", 200);
        assert_eq!(texts(&segments), vec!["Stop!", "Who goes there?", "A friend."]);
    }

    #[test]
    fn test_closing_quote_stays_with_sentence() {
        let segments = split_segments("\"Run.\" She ran.", 200);
        assert_eq!(texts(&segments), vec!["\"Run.\"", "She ran."]);
    }

    #[test]
    fn test_no_punctuation_long_text_is_chunked() {
        let text = "one two three four five six seven eight nine ten";
        let segments = split_segments(text, 15);
        assert!(segments.len() > 1);
        for segment in &segments {
            assert!(segment.char_len() <= 15, "too long: {:?}", segment.text);
            assert!(segment.text.ends_with('.'));
        }
        assert_eq!(segments[0].text, "one two three.");
    }

    #[test]
    fn test_piece_that_only_fits_without_period_is_rechunked() {
        // Five chars, no terminal mark, max five: the period would overflow
        let segments = split_segments("ab cd", 5);
        assert_eq!(texts(&segments), vec!["ab.", "cd."]);
    }

    #[test]
    fn test_oversized_word_kept_whole() {
        let word = "x".repeat(30);
        let segments = split_segments(&format!("short {} end", word), 10);
        let long = format!("{}.", word);
        assert_eq!(texts(&segments), vec!["short.", long.as_str(), "end."]);
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "Ça va? Très bien! 日本語のテキスト。 Ünïcödé everywhere";
        let segments = split_segments(text, 8);
        assert!(!segments.is_empty());
    }

    #[test]
    fn test_tiny_max_len_is_raised() {
        let segments = split_segments("a b", 0);
        assert_eq!(texts(&segments), vec!["a.", "b."]);
    }

    #[test]
    fn test_segmenter_caches_sequences() {
        let mut segmenter = Segmenter::new(200, 4);
        let first = segmenter.segment("One. Two.");
        let second = segmenter.segment("One. Two.");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(segmenter.cache().len(), 1);
    }

    #[test]
    fn test_segmenter_does_not_cache_blank_text() {
        let mut segmenter = Segmenter::default();
        assert!(segmenter.segment("  ").is_empty());
        assert!(segmenter.cache().is_empty());
    }

    fn words_of(segments: &[Segment]) -> Vec<String> {
        segments
            .iter()
            .flat_map(|s| s.text.split_whitespace())
            .map(|w| w.trim_end_matches(['.', '!', '?']).to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }

    fn source_words(text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| w.trim_end_matches(['.', '!', '?']).to_string())
            .filter(|w| !w.is_empty())
            .collect()
    }

    fn document() -> impl Strategy<Value = String> {
        prop::collection::vec(("[a-zA-Z]{1,14}", prop::sample::select(vec!["", "", "", ".", "!", "?"])), 0..80)
            .prop_map(|words| {
                words
                    .into_iter()
                    .map(|(word, mark)| format!("{}{}", word, mark))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
    }

    proptest! {
        #[test]
        fn prop_word_sequence_preserved(text in document(), max_len in 2usize..120) {
            let segments = split_segments(&text, max_len);
            prop_assert_eq!(words_of(&segments), source_words(&text));
        }

        #[test]
        fn prop_length_bounded_unless_single_word(text in document(), max_len in 2usize..120) {
            for segment in split_segments(&text, max_len) {
                let single_word = segment.text.split_whitespace().count() == 1;
                prop_assert!(segment.char_len() <= max_len || single_word);
            }
        }

        #[test]
        fn prop_every_segment_terminated(text in document(), max_len in 2usize..120) {
            for segment in split_segments(&text, max_len) {
                prop_assert!(!segment.text.trim().is_empty());
                prop_assert!(segment.text.ends_with(['.', '!', '?']));
            }
        }

        #[test]
        fn prop_deterministic(text in document(), max_len in 2usize..120) {
            prop_assert_eq!(split_segments(&text, max_len), split_segments(&text, max_len));
        }
    }
}

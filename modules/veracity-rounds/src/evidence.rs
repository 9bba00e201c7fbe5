//! Ties a generated answer back to a literal sentence of its source text.
//!
//! Everything here is pure and deterministic: the same source and answer
//! always produce the same citation.

use tracing::{info, warn};
use veracity_common::Citation;

/// Abbreviations whose dots must not end a sentence, rewritten in this order.
const ABBREVIATIONS: [(&str, &str); 9] = [
    ("Dr.", "Dr"),
    ("Mr.", "Mr"),
    ("Mrs.", "Mrs"),
    ("Ms.", "Ms"),
    ("Prof.", "Prof"),
    ("Sr.", "Sr"),
    ("Jr.", "Jr"),
    ("U.S.", "US"),
    ("U.K.", "UK"),
];

/// Fragments of this many characters or fewer are noise unless they form a
/// terminated sentence of at least two words.
const MIN_FRAGMENT_CHARS: usize = 10;

/// Split text into sentences.
///
/// Known abbreviations lose their dots first, matched only as whole tokens.
/// A `.`, `!` or `?` closes the current sentence once it holds more than one
/// character. A terminated segment of two or more words is always kept; any
/// other segment, including the trailing remainder, is kept only when it is
/// longer than `MIN_FRAGMENT_CHARS` characters.
pub fn split_sentences(text: &str) -> Vec<String> {
    let normalized = collapse_abbreviations(text);

    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for c in normalized.chars() {
        current.push(c);
        current_chars += 1;
        if is_terminator(c) && current_chars > 1 {
            keep_if_sentence(&mut sentences, &current);
            current.clear();
            current_chars = 0;
        }
    }
    keep_if_sentence(&mut sentences, &current);

    sentences
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Rewrite each abbreviation where it starts a token. `PMs.` keeps its dot.
fn collapse_abbreviations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    'scan: while let Some(c) = rest.chars().next() {
        let at_token_start = out
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric());
        if at_token_start {
            for (abbreviation, replacement) in ABBREVIATIONS {
                if rest.starts_with(abbreviation) {
                    out.push_str(replacement);
                    rest = &rest[abbreviation.len()..];
                    continue 'scan;
                }
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn keep_if_sentence(sentences: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    let terminated = trimmed.chars().next_back().is_some_and(is_terminator);
    let words = trimmed.split_whitespace().count();
    if (terminated && words >= 2) || trimmed.chars().count() > MIN_FRAGMENT_CHARS {
        sentences.push(trimmed.to_string());
    }
}

/// Case-insensitive answer match.
///
/// Either the whole answer is a substring of the sentence, or, for answers of
/// several words, every word longer than two characters appears somewhere in
/// it. An answer with no such word only matches as a whole substring.
pub fn contains_answer(sentence: &str, answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    if answer.is_empty() {
        return false;
    }
    let sentence = sentence.to_lowercase();
    if sentence.contains(&answer) {
        return true;
    }

    let words: Vec<&str> = answer.split_whitespace().collect();
    if words.len() < 2 {
        return false;
    }
    let significant: Vec<&str> = words
        .into_iter()
        .filter(|w| w.chars().count() > 2)
        .collect();
    !significant.is_empty() && significant.iter().all(|w| sentence.contains(w))
}

/// Every sentence that supports `answer`, with its index in document order.
pub fn candidates(source: &str, answer: &str) -> Vec<(usize, String)> {
    split_sentences(source)
        .into_iter()
        .enumerate()
        .filter(|(_, sentence)| contains_answer(sentence, answer))
        .collect()
}

/// The first supporting sentence, as a citation.
pub fn extract(
    source: &str,
    answer: &str,
    section_title: &str,
    section_url: &str,
) -> Option<Citation> {
    let found = candidates(source, answer);
    let Some((sentence_index, sentence)) = found.first().cloned() else {
        warn!(answer, "No sentence supports the answer");
        return None;
    };

    if found.len() > 1 {
        info!(count = found.len(), sentence_index, "Multiple supporting sentences, using the first");
    }

    Some(Citation {
        sentence,
        section_title: section_title.to_string(),
        section_url: section_url.to_string(),
        sentence_index,
    })
}

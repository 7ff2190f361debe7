//! **Text Segmenter** - split a voice line into length-bounded phrases.
//!
//! Splits on `", "`, `" and "` and `" or "` (delimiters stay with the clause before
//! them), keeps a trailing conjunction with the clause it introduces, word-wraps
//! chunks that are still too long, then greedily re-groups phrases so the backend
//! is called as few times as possible without exceeding the ceiling.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Default phrase ceiling in characters.
pub const DEFAULT_MAX_PHRASE_LENGTH: usize = 150;

static DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r", | and | or ").expect("static delimiter pattern"));

const CONJUNCTIONS: [&str; 2] = ["and", "or"];

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into ordered phrases of at most `max_length` characters.
///
/// A single word longer than `max_length` is emitted as-is; words are never split.
pub fn segment(text: &str, max_length: usize) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for chunk in split_keeping_delimiters(text) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let carried = result.last_mut().and_then(take_trailing_conjunction);
        let current = match carried {
            Some(conj) => format!("{} {}", conj, chunk),
            None => chunk.to_string(),
        };
        if char_len(&current) <= max_length {
            result.push(current);
        } else {
            wrap_long_chunk(&current, max_length, &mut result);
        }
    }

    let grouped = group_phrases(result, max_length);
    debug!(phrases = ?grouped, "Split voiceline");
    grouped
}

/// Pieces of `text` with each delimiter appended to the piece before it.
fn split_keeping_delimiters(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for m in DELIMITER.find_iter(text) {
        pieces.push(&text[start..m.end()]);
        start = m.end();
    }
    pieces.push(&text[start..]);
    pieces
}

/// The `"and"` / `"or"` that ends `phrase` after a space, if any.
fn trailing_conjunction(phrase: &str) -> Option<&'static str> {
    CONJUNCTIONS.into_iter().find(|conj| {
        phrase.len() > conj.len()
            && phrase.ends_with(conj)
            && phrase[..phrase.len() - conj.len()].ends_with(' ')
    })
}

/// Strip a trailing `" and"` / `" or"` from `phrase`, returning the conjunction.
fn take_trailing_conjunction(phrase: &mut String) -> Option<&'static str> {
    let conj = trailing_conjunction(phrase)?;
    phrase.truncate(phrase.len() - conj.len() - 1);
    Some(conj)
}

/// Greedy word wrap. A conjunction ending a full line moves to the next one only
/// when it still fits there.
fn wrap_long_chunk(chunk: &str, max_length: usize, out: &mut Vec<String>) {
    let mut words = chunk.split_whitespace();
    let Some(first) = words.next() else {
        return;
    };
    let mut line = first.to_string();
    for word in words {
        if char_len(&line) + 1 + char_len(word) <= max_length {
            line.push(' ');
            line.push_str(word);
            continue;
        }
        let mut next = word.to_string();
        if let Some(conj) = trailing_conjunction(&line) {
            if char_len(conj) + 1 + char_len(word) <= max_length {
                take_trailing_conjunction(&mut line);
                next = format!("{} {}", conj, word);
            }
        }
        let flushed = line.trim();
        if !flushed.is_empty() {
            out.push(flushed.to_string());
        }
        line = next;
    }
    let flushed = line.trim();
    if !flushed.is_empty() {
        out.push(flushed.to_string());
    }
}

/// Greedily merge adjacent phrases while the space-joined result fits `max_length`.
/// Oversized phrases pass through untouched, after the pending group is flushed.
pub fn group_phrases(phrases: Vec<String>, max_length: usize) -> Vec<String> {
    let mut grouped = Vec::new();
    let mut pending = String::new();

    for phrase in phrases.into_iter().filter(|p| !p.trim().is_empty()) {
        if char_len(&phrase) > max_length {
            if !pending.is_empty() {
                grouped.push(std::mem::take(&mut pending));
            }
            grouped.push(phrase);
        } else if pending.is_empty() {
            pending = phrase;
        } else if char_len(&pending) + 1 + char_len(&phrase) <= max_length {
            pending.push(' ');
            pending.push_str(&phrase);
        } else {
            grouped.push(std::mem::replace(&mut pending, phrase));
        }
    }
    if !pending.is_empty() {
        grouped.push(pending);
    }
    grouped
}

//! Hook-opener repair for rewritten scripts.
//!
//! Models rewriting a script in a creator's voice tend to prepend generic
//! filler ("Okay so like, ...") before the hook. After every transformation
//! call the output is checked against the hook's opening words and repaired:
//!
//! 1. Accept if the script's first significant words are exactly the hook
//!    pattern (first four significant words of the hook).
//! 2. Strip leading filler phrases one at a time, re-checking after each.
//! 3. Locate the pattern within the first 100 normalized characters and
//!    drop everything before it. The filler-stripped text is searched first,
//!    then the original, since a filler phrase can swallow a hook that itself
//!    opens with "So" or "Like".
//! 4. Otherwise keep the filler-stripped text and log a warning.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Significant hook words that must open the script.
pub const PATTERN_WORDS: usize = 4;
/// How far into the normalized script the pattern is searched for.
pub const SEARCH_WINDOW_CHARS: usize = 100;
const MAX_STRIP_PASSES: usize = 10;

lazy_static! {
    /// Leading filler, multi-word phrases before single words.
    static ref FILLER_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)^\s*(?:okay|ok)[\s,]+so[\s,]+like\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*so[\s,]+like\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:okay|ok)[\s,]+so\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:okay|ok)[\s,]+(?:listen|look)\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:alright|all right)[\s,]+so\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:you know what)\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:okay|ok)\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:um+|uh+|erm+|hmm+)\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*so\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*like\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*well\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*honestly\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:look|listen)\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:alright|all right)\b[\s,.!?;:…-]*").unwrap(),
        Regex::new(r"(?i)^\s*(?:hey|yo)\b[\s,.!?;:…-]*").unwrap(),
    ];
    static ref WORD: Regex = Regex::new(r"\S+").unwrap();
}

/// How the opener check was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenerOutcome {
    /// The script already opened with the hook.
    AlreadyMatched,
    /// Leading filler was removed.
    StrippedFiller,
    /// Text before the hook was cut away.
    Sliced,
    /// The hook could not be located; filler-stripped text returned.
    NotFound,
    /// The hook has no significant words to check against.
    EmptyHook,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenerRepair {
    pub text: String,
    pub outcome: OpenerOutcome,
}

/// Lowercase, drop characters that are neither alphanumeric nor whitespace,
/// collapse whitespace.
pub fn normalize_for_match(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First [`PATTERN_WORDS`] significant words of the hook.
pub fn hook_pattern(hook: &str) -> Vec<String> {
    normalize_for_match(hook)
        .split(' ')
        .filter(|w| !w.is_empty())
        .take(PATTERN_WORDS)
        .map(str::to_string)
        .collect()
}

/// Whether the text's first significant words are exactly the pattern words.
pub fn starts_with_pattern(text: &str, pattern: &[String]) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let normalized = normalize_for_match(text);
    words_match(normalized.split(' '), pattern)
}

fn words_match<'a>(words: impl Iterator<Item = &'a str>, pattern: &[String]) -> bool {
    let leading: Vec<&str> = words.filter(|w| !w.is_empty()).take(pattern.len()).collect();
    leading.len() == pattern.len() && leading.iter().zip(pattern).all(|(w, p)| *w == p)
}

fn strip_one(text: &str) -> Option<&str> {
    FILLER_PATTERNS.iter().find_map(|re| {
        re.find(text)
            .filter(|m| m.end() > 0)
            .map(|m| &text[m.end()..])
    })
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Remove leading filler phrases until none match (bounded). Text without
/// leading filler is returned unchanged.
pub fn strip_leading_filler(text: &str) -> String {
    let mut current = text;
    for _ in 0..MAX_STRIP_PASSES {
        match strip_one(current) {
            Some(rest) if rest.len() < current.len() => current = rest,
            _ => break,
        }
    }
    if current.len() == text.len() {
        return text.to_string();
    }
    capitalize_first(current.trim_start())
}

/// Byte offset in `text` where the pattern begins, searching only words that
/// start within the first [`SEARCH_WINDOW_CHARS`] normalized characters.
fn locate_pattern(text: &str, pattern: &[String]) -> Option<usize> {
    let words: Vec<(usize, String)> = WORD
        .find_iter(text)
        .map(|m| (m.start(), normalize_for_match(m.as_str())))
        .filter(|(_, w)| !w.is_empty())
        .collect();

    let mut normalized_offset = 0;
    for start in 0..words.len() {
        if normalized_offset >= SEARCH_WINDOW_CHARS {
            break;
        }
        if words_match(words[start..].iter().map(|(_, w)| w.as_str()), pattern) {
            return Some(words[start].0);
        }
        normalized_offset += words[start].1.chars().count() + 1;
    }
    None
}

/// Make `script` open with the hook's first words.
pub fn repair_opener(hook: &str, script: &str) -> OpenerRepair {
    let pattern = hook_pattern(hook);
    if pattern.is_empty() {
        return OpenerRepair {
            text: script.to_string(),
            outcome: OpenerOutcome::EmptyHook,
        };
    }
    if starts_with_pattern(script, &pattern) {
        return OpenerRepair {
            text: script.to_string(),
            outcome: OpenerOutcome::AlreadyMatched,
        };
    }

    let mut current = script;
    for pass in 0..MAX_STRIP_PASSES {
        let Some(rest) = strip_one(current) else {
            break;
        };
        current = rest;
        if starts_with_pattern(current, &pattern) {
            debug!(passes = pass + 1, "Stripped leading filler before hook");
            return OpenerRepair {
                text: capitalize_first(current.trim_start()),
                outcome: OpenerOutcome::StrippedFiller,
            };
        }
    }
    let stripped = if current.len() == script.len() {
        script.to_string()
    } else {
        capitalize_first(current.trim_start())
    };

    for source in [stripped.as_str(), script] {
        if let Some(offset) = locate_pattern(source, &pattern) {
            let sliced = &source[offset..];
            if starts_with_pattern(sliced, &pattern) {
                debug!(dropped_bytes = offset, "Sliced preamble before hook");
                return OpenerRepair {
                    text: capitalize_first(sliced),
                    outcome: OpenerOutcome::Sliced,
                };
            }
        }
    }

    warn!(
        hook = %hook,
        opening = %stripped.chars().take(80).collect::<String>(),
        "Hook opener not found in transformed script"
    );
    OpenerRepair {
        text: stripped,
        outcome: OpenerOutcome::NotFound,
    }
}

//! Corpus ingestion from delimited files and embedding backfill.

use crate::embedding::EmbeddingProvider;
use crate::store::{CorpusStore, NewCorpusEntry};
use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Rows with fewer words than this are dropped.
pub const MIN_CONTENT_WORDS: usize = 20;
/// Words kept when deriving a missing hook from the first sentence.
const DERIVED_HOOK_WORDS: usize = 12;

lazy_static! {
    static ref BOILERPLATE_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\blink in (my )?bio\b").unwrap(),
        Regex::new(r"(?i)\b(like|follow)\s+(and|&)\s+subscribe\b").unwrap(),
        Regex::new(r"(?i)\buse (my )?code\b").unwrap(),
        Regex::new(r"(?i)\bthis video is sponsored\b").unwrap(),
        Regex::new(r"(?i)^\s*\[?(music|applause|no speech)\]?\s*$").unwrap(),
        Regex::new(r"(?i)\btranscript (unavailable|not available)\b").unwrap(),
    ];
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?](\s|$)").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub rows_read: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped_empty: usize,
    pub skipped_short: usize,
    pub skipped_boilerplate: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    pub embedded: usize,
    pub batches: usize,
}

/// Split delimited text into records, honoring double-quoted fields with
/// embedded delimiters, newlines and `""` escapes.
pub fn parse_delimited(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records.retain(|r| !(r.len() == 1 && r[0].trim().is_empty()));
    records
}

pub fn is_boilerplate(content: &str) -> bool {
    BOILERPLATE_PATTERNS.iter().any(|re| re.is_match(content))
}

/// First sentence of the content, capped at a handful of words.
pub fn derive_hook(content: &str) -> String {
    let first_sentence = match SENTENCE_END.find(content) {
        Some(m) => &content[..m.start() + 1],
        None => content,
    };
    first_sentence
        .split_whitespace()
        .take(DERIVED_HOOK_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Levers may be a JSON array or a `|`/`;`/`,` separated list.
fn parse_levers(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw.starts_with('[') {
        if let Ok(levers) = serde_json::from_str::<Vec<String>>(raw) {
            return levers;
        }
    }
    raw.split(['|', ';', ','])
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Ingest every valid row of a delimited file. Re-running on the same file
/// inserts nothing new.
pub fn ingest_delimited(
    store: &dyn CorpusStore,
    text: &str,
    delimiter: char,
) -> Result<IngestReport> {
    let mut records = parse_delimited(text, delimiter).into_iter();
    let header = records.next().context("Corpus file is empty")?;
    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();
    let Some(&content_col) = columns.get("content") else {
        bail!("Corpus file has no 'content' column");
    };
    let column = |record: &[String], name: &str| -> Option<String> {
        columns.get(name).and_then(|&i| non_empty(record.get(i)))
    };

    let mut report = IngestReport::default();
    for record in records {
        report.rows_read += 1;
        let Some(content) = non_empty(record.get(content_col)) else {
            report.skipped_empty += 1;
            continue;
        };
        if content.split_whitespace().count() < MIN_CONTENT_WORDS {
            report.skipped_short += 1;
            continue;
        }
        if is_boilerplate(&content) {
            report.skipped_boilerplate += 1;
            continue;
        }

        let quality_score = match column(&record, "quality_score") {
            Some(raw) => match raw.parse::<f32>() {
                Ok(q) if q.is_finite() => Some(q),
                _ => {
                    warn!(row = report.rows_read, "Unparseable quality_score '{}'", raw);
                    report.malformed += 1;
                    None
                }
            },
            None => None,
        };

        let entry = NewCorpusEntry {
            hook: Some(column(&record, "hook").unwrap_or_else(|| derive_hook(&content))),
            hook_type: column(&record, "hook_type").map(|t| t.to_lowercase()),
            script_archetype: column(&record, "script_archetype"),
            parasocial_levers: column(&record, "parasocial_levers")
                .map(|l| parse_levers(&l))
                .unwrap_or_default(),
            quality_score,
            content,
        };
        match store.insert_entry(&entry)? {
            Some(id) => {
                debug!(id, "Inserted corpus entry");
                report.inserted += 1;
            }
            None => report.duplicates += 1,
        }
    }

    info!(
        rows = report.rows_read,
        inserted = report.inserted,
        duplicates = report.duplicates,
        skipped = report.skipped_empty + report.skipped_short + report.skipped_boilerplate,
        "Corpus ingestion complete"
    );
    Ok(report)
}

/// Embed corpus rows missing an embedding, `batch_size` at a time, until none
/// remain or `limit` rows are done. `on_progress` receives the running count.
pub async fn backfill_embeddings(
    store: &dyn CorpusStore,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
    limit: Option<usize>,
    mut on_progress: impl FnMut(usize),
) -> Result<BackfillReport> {
    let batch_size = batch_size.max(1);
    let mut report = BackfillReport::default();

    loop {
        let remaining = limit.map(|l| l.saturating_sub(report.embedded));
        let take = remaining.map_or(batch_size, |r| r.min(batch_size));
        if take == 0 {
            break;
        }
        let rows = store.entries_missing_embedding(take)?;
        if rows.is_empty() {
            break;
        }

        let texts: Vec<String> = rows.iter().map(|(_, content)| content.clone()).collect();
        let vectors = embedder
            .embed_batch(&texts)
            .await
            .context("Embedding batch failed")?;
        if vectors.len() != rows.len() {
            bail!(
                "Embedding provider returned {} vectors for {} inputs",
                vectors.len(),
                rows.len()
            );
        }
        for ((id, _), vector) in rows.iter().zip(vectors.iter()) {
            store.set_embedding(*id, vector)?;
        }

        report.batches += 1;
        report.embedded += rows.len();
        on_progress(report.embedded);
        debug!(batch = report.batches, embedded = report.embedded, "Backfill batch done");
    }

    info!(embedded = report.embedded, batches = report.batches, "Embedding backfill complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteCorpusStore;
    use tempfile::TempDir;

    fn long_content(seed: &str) -> String {
        format!(
            "{} so I was at the gym today and this guy would not stop staring at me, \
             and honestly I did not hate it at all, which is a problem",
            seed
        )
    }

    #[test]
    fn test_parse_quoted_fields() {
        let text = "content,hook\n\"a, b\",\"say \"\"hi\"\"\"\n\"multi\nline\",x\n";
        let records = parse_delimited(text, ',');
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], vec!["a, b".to_string(), "say \"hi\"".to_string()]);
        assert_eq!(records[2][0], "multi\nline");
    }

    #[test]
    fn test_parse_tab_delimited_without_trailing_newline() {
        let records = parse_delimited("a\tb\r\n1\t2", '\t');
        assert_eq!(records, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn test_derive_hook_uses_first_sentence() {
        assert_eq!(derive_hook("Nobody talks about this. Anyway."), "Nobody talks about this.");
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen";
        assert_eq!(derive_hook(long).split_whitespace().count(), 12);
    }

    #[test]
    fn test_parse_levers_formats() {
        assert_eq!(parse_levers("[\"a\",\"b\"]"), vec!["a", "b"]);
        assert_eq!(parse_levers("Exclusivity | direct_address"), vec!["exclusivity", "direct_address"]);
        assert!(parse_levers("").is_empty());
    }

    #[test]
    fn test_ingest_filters_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteCorpusStore::new(tmp.path().join("corpus.db")).unwrap();
        let text = format!(
            "content,hook_type,parasocial_levers,quality_score\n\
             \"{}\",confession,exclusivity|vulnerability,0.9\n\
             too short,question,,\n\
             ,tease,,\n\
             \"{} link in bio\",tease,,\n\
             \"{}\",Tease,,abc\n",
            long_content("First,"),
            long_content("Second,"),
            long_content("Third,")
        );

        let report = ingest_delimited(&store, &text, ',').unwrap();
        assert_eq!(report.rows_read, 5);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_short, 1);
        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.skipped_boilerplate, 1);
        assert_eq!(report.malformed, 1);

        let again = ingest_delimited(&store, &text, ',').unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_ingest_requires_content_column() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteCorpusStore::new(tmp.path().join("corpus.db")).unwrap();
        assert!(ingest_delimited(&store, "hook,hook_type\nx,y\n", ',').is_err());
        assert!(ingest_delimited(&store, "", ',').is_err());
    }
}

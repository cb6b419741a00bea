//! In-process similarity ranking over corpus candidates.

use crate::embedding::cosine_similarity;
use crate::store::{CorpusCandidate, CorpusMatch, SimilarityQuery};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const ARCHETYPE_MATCH: &str = "archetype_match";
pub const LEVER_MATCH: &str = "lever_match";

/// Bucket for rows without a hook type in diversified search.
const UNTYPED_BUCKET: &str = "";

fn overlaps(values: &[String], filter: &Option<Vec<String>>) -> bool {
    let Some(filter) = filter else {
        return false;
    };
    values
        .iter()
        .any(|v| filter.iter().any(|f| f.eq_ignore_ascii_case(v.trim())))
}

fn to_match(candidate: CorpusCandidate, query: &SimilarityQuery) -> CorpusMatch {
    let similarity = cosine_similarity(&query.embedding, &candidate.embedding).max(0.0);

    let mut match_reasons = Vec::new();
    let archetype: Vec<String> = candidate.script_archetype.iter().cloned().collect();
    if overlaps(&archetype, &query.archetype_filter) {
        match_reasons.push(ARCHETYPE_MATCH.to_string());
    }
    if overlaps(&candidate.parasocial_levers, &query.lever_filter) {
        match_reasons.push(LEVER_MATCH.to_string());
    }

    CorpusMatch {
        id: candidate.id,
        content: candidate.content,
        hook: candidate.hook,
        hook_type: candidate.hook_type,
        script_archetype: candidate.script_archetype,
        parasocial_levers: candidate.parasocial_levers,
        quality_score: candidate.quality_score,
        similarity_score: similarity,
        match_reasons,
    }
}

fn has_reason(m: &CorpusMatch, reason: &str) -> bool {
    m.match_reasons.iter().any(|r| r == reason)
}

/// Similarity descending; ties go to lever matches, then quality, then lower ID.
fn compare(a: &CorpusMatch, b: &CorpusMatch) -> Ordering {
    b.similarity_score
        .partial_cmp(&a.similarity_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| has_reason(b, LEVER_MATCH).cmp(&has_reason(a, LEVER_MATCH)))
        .then_with(|| {
            b.quality_score
                .unwrap_or(0.0)
                .partial_cmp(&a.quality_score.unwrap_or(0.0))
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Score, filter by floor and hook type, and sort all candidates.
fn scored(candidates: Vec<CorpusCandidate>, query: &SimilarityQuery) -> Vec<CorpusMatch> {
    let mut matches: Vec<CorpusMatch> = candidates
        .into_iter()
        .filter(|c| match (&query.hook_types, &c.hook_type) {
            (None, _) => true,
            (Some(allowed), Some(t)) => allowed.iter().any(|a| a.eq_ignore_ascii_case(t)),
            (Some(_), None) => false,
        })
        .map(|c| to_match(c, query))
        .filter(|m| m.similarity_score >= query.min_similarity)
        .collect();
    matches.sort_by(compare);
    matches
}

/// Flat top-K.
pub fn rank_flat(candidates: Vec<CorpusCandidate>, query: &SimilarityQuery) -> Vec<CorpusMatch> {
    let mut matches = scored(candidates, query);
    matches.truncate(query.limit);
    matches
}

/// Top-K with at most `query.per_hook_type` matches per hook type.
pub fn rank_diversified(
    candidates: Vec<CorpusCandidate>,
    query: &SimilarityQuery,
) -> Vec<CorpusMatch> {
    let mut per_type: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::new();
    for m in scored(candidates, query) {
        if out.len() >= query.limit {
            break;
        }
        let bucket = m
            .hook_type
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_else(|| UNTYPED_BUCKET.to_string());
        let taken = per_type.entry(bucket).or_insert(0);
        if *taken >= query.per_hook_type {
            continue;
        }
        *taken += 1;
        out.push(m);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, hook_type: &str, embedding: Vec<f32>) -> CorpusCandidate {
        CorpusCandidate {
            id,
            content: format!("script {}", id),
            hook: None,
            hook_type: Some(hook_type.to_string()),
            script_archetype: Some("storytime".to_string()),
            parasocial_levers: vec!["direct_address".to_string()],
            quality_score: None,
            embedding,
        }
    }

    #[test]
    fn test_flat_orders_by_similarity_and_applies_floor() {
        let query = SimilarityQuery {
            min_similarity: 0.5,
            ..SimilarityQuery::new(vec![1.0, 0.0], 10)
        };
        let ranked = rank_flat(
            vec![
                candidate(1, "tease", vec![0.0, 1.0]),
                candidate(2, "tease", vec![1.0, 1.0]),
                candidate(3, "tease", vec![1.0, 0.0]),
            ],
            &query,
        );
        let ids: Vec<i64> = ranked.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!((ranked[0].similarity_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_lever_filter_tags_and_breaks_ties() {
        let mut plain = candidate(1, "tease", vec![1.0, 0.0]);
        plain.parasocial_levers = vec!["exclusivity".to_string()];
        let levered = candidate(2, "tease", vec![1.0, 0.0]);

        let query = SimilarityQuery {
            lever_filter: Some(vec!["direct_address".to_string()]),
            ..SimilarityQuery::new(vec![1.0, 0.0], 10)
        };
        let ranked = rank_flat(vec![plain, levered], &query);
        assert_eq!(ranked[0].id, 2);
        assert_eq!(ranked[0].match_reasons, vec![LEVER_MATCH.to_string()]);
        assert!(ranked[1].match_reasons.is_empty());
    }

    #[test]
    fn test_archetype_reason_only_when_filter_given() {
        let query = SimilarityQuery::new(vec![1.0], 10);
        let ranked = rank_flat(vec![candidate(1, "tease", vec![1.0])], &query);
        assert!(ranked[0].match_reasons.is_empty());

        let query = SimilarityQuery {
            archetype_filter: Some(vec!["Storytime".to_string()]),
            ..SimilarityQuery::new(vec![1.0], 10)
        };
        let ranked = rank_flat(vec![candidate(1, "tease", vec![1.0])], &query);
        assert_eq!(ranked[0].match_reasons, vec![ARCHETYPE_MATCH.to_string()]);
    }

    #[test]
    fn test_diversified_caps_per_hook_type() {
        let types = ["tease", "question", "confession", "hot_take", "relatable"];
        let mut candidates = Vec::new();
        let mut id = 0;
        for t in types {
            for k in 0..4 {
                id += 1;
                candidates.push(candidate(id, t, vec![1.0, k as f32 * 0.1]));
            }
        }
        let query = SimilarityQuery {
            per_hook_type: 2,
            ..SimilarityQuery::new(vec![1.0, 0.0], 10)
        };
        let ranked = rank_diversified(candidates, &query);
        assert_eq!(ranked.len(), 10);
        for t in types {
            let n = ranked
                .iter()
                .filter(|m| m.hook_type.as_deref() == Some(t))
                .count();
            assert_eq!(n, 2, "hook type {}", t);
        }
    }

    #[test]
    fn test_hook_type_filter_excludes_other_types() {
        let query = SimilarityQuery {
            hook_types: Some(vec!["question".to_string()]),
            ..SimilarityQuery::new(vec![1.0], 10)
        };
        let ranked = rank_flat(
            vec![
                candidate(1, "tease", vec![1.0]),
                candidate(2, "question", vec![1.0]),
            ],
            &query,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, 2);
    }
}

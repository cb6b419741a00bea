//! Records persisted by the studio and corpus databases.

use crate::llm::TokenUsage;
use crate::voice::VoiceProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A creator whose voice scripts are generated for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub voice_profile: VoiceProfile,
    pub archetype_tags: Vec<String>,
    pub explicitness_tier: u8,
    /// Voice embedding as stored: a JSON array string. Decoded on use.
    pub embedding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    Draft,
    Approved,
    Posted,
    Archived,
}

impl ScriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptStatus::Draft => "draft",
            ScriptStatus::Approved => "approved",
            ScriptStatus::Posted => "posted",
            ScriptStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ScriptStatus::Draft),
            "approved" => Some(ScriptStatus::Approved),
            "posted" => Some(ScriptStatus::Posted),
            "archived" => Some(ScriptStatus::Archived),
            _ => None,
        }
    }
}

/// A finished script ready to be saved as a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScript {
    pub model_id: String,
    pub batch_id: Option<String>,
    pub hook: String,
    pub hook_type: String,
    pub content: String,
    pub parasocial_levers: Vec<String>,
    pub voice_fidelity_score: Option<f32>,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScript {
    pub id: i64,
    pub model_id: String,
    pub batch_id: Option<String>,
    pub hook: String,
    pub hook_type: String,
    pub content: String,
    pub parasocial_levers: Vec<String>,
    pub voice_fidelity_score: Option<f32>,
    pub word_count: usize,
    pub status: ScriptStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub hooks_generated: usize,
    pub scripts_expanded: usize,
    pub scripts_transformed: usize,
    pub scripts_passed: usize,
    pub revision_attempts: u32,
    /// Token usage keyed by stage name.
    pub stage_tokens: BTreeMap<String, TokenUsage>,
    pub total_time_ms: u64,
    pub estimated_cost_usd: f64,
    /// Mean fidelity over passed scripts only.
    pub avg_fidelity: Option<f32>,
    /// Mean word count over passed scripts only.
    pub avg_word_count: Option<f32>,
}

/// A corpus row to ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCorpusEntry {
    pub content: String,
    pub hook: Option<String>,
    pub hook_type: Option<String>,
    pub script_archetype: Option<String>,
    pub parasocial_levers: Vec<String>,
    pub quality_score: Option<f32>,
}

/// A corpus row as loaded for ranking, with its decoded embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusCandidate {
    pub id: i64,
    pub content: String,
    pub hook: Option<String>,
    pub hook_type: Option<String>,
    pub script_archetype: Option<String>,
    pub parasocial_levers: Vec<String>,
    pub quality_score: Option<f32>,
    pub embedding: Vec<f32>,
}

/// One retrieved exemplar script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusMatch {
    pub id: i64,
    pub content: String,
    pub hook: Option<String>,
    pub hook_type: Option<String>,
    pub script_archetype: Option<String>,
    pub parasocial_levers: Vec<String>,
    pub quality_score: Option<f32>,
    pub similarity_score: f32,
    pub match_reasons: Vec<String>,
}

/// Parameters shared by the flat and diversified similarity searches.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
    pub embedding: Vec<f32>,
    pub min_similarity: f32,
    pub limit: usize,
    /// Diversified search only: cap per hook_type.
    pub per_hook_type: usize,
    /// Restrict to these hook types.
    pub hook_types: Option<Vec<String>>,
    /// Tags a `archetype_match` reason; never excludes rows.
    pub archetype_filter: Option<Vec<String>>,
    /// Tags a `lever_match` reason and wins ties; never excludes rows.
    pub lever_filter: Option<Vec<String>>,
}

impl SimilarityQuery {
    pub fn new(embedding: Vec<f32>, limit: usize) -> Self {
        Self {
            embedding,
            min_similarity: 0.0,
            limit,
            per_hook_type: limit,
            hook_types: None,
            archetype_filter: None,
            lever_filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_batch_record_json_keeps_timestamp() {
        let mut stage_tokens = BTreeMap::new();
        stage_tokens.insert("hook_generation".to_string(), TokenUsage::new(120, 80));
        let record = BatchRecord {
            id: "batch-1".to_string(),
            model_id: "m1".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 0).unwrap(),
            hooks_generated: 10,
            scripts_expanded: 9,
            scripts_transformed: 9,
            scripts_passed: 6,
            revision_attempts: 1,
            stage_tokens,
            total_time_ms: 48_000,
            estimated_cost_usd: 0.5,
            avg_fidelity: Some(86.5),
            avg_word_count: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["created_at"], "2024-03-09T18:30:00Z");

        let back: BatchRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}

//! Seed data for the studio and corpus databases.

use super::constants::{MODEL_ID, MODEL_NAME};
use hookforge::embedding::encode_embedding;
use hookforge::store::{CorpusStore, Model, NewCorpusEntry};
use hookforge::voice::VoiceProfile;
use serde_json::json;

/// A creator whose voice leans on "like" and who has a stored embedding.
pub fn test_model() -> Model {
    let voice_profile: VoiceProfile = serde_json::from_value(json!({
        "identity": { "name": MODEL_NAME, "bio": "Dating stories from a serial over-texter" },
        "voice_mechanics": {
            "filler_words": [{ "word": "like", "frequency": "high" }],
            "sentence_starters": ["Okay so"],
            "sentence_enders": ["you know?"],
            "swear_frequency": "low"
        },
        "personality": { "energy_level": "high", "humor_style": "self-deprecating" },
        "parasocial": { "strengths": ["intimacy"], "avoid": [] },
        "archetypes": {
            "primary": "girl_next_door",
            "secondary": "romantic",
            "mix": { "girl_next_door": 0.7, "romantic": 0.3 }
        },
        "sample_quotes": ["Okay so like, I texted him first again."]
    }))
    .unwrap();

    Model {
        id: MODEL_ID.to_string(),
        name: MODEL_NAME.to_string(),
        voice_profile,
        archetype_tags: vec!["girl_next_door".to_string(), "romantic".to_string()],
        explicitness_tier: 1,
        embedding: Some(encode_embedding(&[1.0, 0.0, 0.0, 0.0])),
    }
}

/// Insert one embedded corpus row per hook type.
pub fn seed_corpus(store: &dyn CorpusStore) {
    let rows = [
        ("confession", [1.0, 0.0, 0.0, 0.0]),
        ("question", [0.9, 0.1, 0.0, 0.0]),
        ("tease", [0.8, 0.2, 0.0, 0.0]),
        ("hot_take", [0.0, 1.0, 0.0, 0.0]),
    ];
    for (i, (hook_type, embedding)) in rows.iter().enumerate() {
        let content = format!(
            "Exemplar {} opens strong and keeps going with enough words to pass the ingestion \
             floor because short rows are dropped before they ever reach the corpus table",
            i
        );
        let id = store
            .insert_entry(&NewCorpusEntry {
                content,
                hook: Some(format!("Exemplar {} opens strong", i)),
                hook_type: Some(hook_type.to_string()),
                script_archetype: None,
                parasocial_levers: vec!["intimacy".to_string()],
                quality_score: Some(0.9),
            })
            .unwrap()
            .unwrap();
        store.set_embedding(id, embedding).unwrap();
    }
}

//! End-to-end tests for a full pipeline run
//!
//! Every stage runs against the scripted LLM, with real SQLite stores and a
//! fixed embedder for retrieval.

mod common;

use common::{scripted_hook, LlmStage, ScriptedVerdict, TestStudio, MODEL_ID};
use hookforge::llm::ModelTier;
use hookforge::pipeline::opener::normalize_for_match;
use hookforge::pipeline::{
    DurationTier, GeneratedHook, PipelineError, PipelineRequest, PipelineResult, ScriptExpander,
};
use hookforge::store::{ModelStore, ScriptStore};

fn stage_names(result: &PipelineResult) -> Vec<String> {
    result.stages.iter().map(|s| s.name.clone()).collect()
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_final_scripts_open_with_their_hook() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let request = studio.request(5).with_persist(false);

    let result = studio.pipeline().run(&request).await.unwrap();

    let expansion = result
        .stages
        .iter()
        .find(|s| s.name == "script_expansion")
        .unwrap();
    assert!(expansion.output_count <= 5);
    assert_eq!(result.scripts.len(), 5);

    for script in &result.scripts {
        assert!(!script.content.contains("\n\n"), "{}", script.content);
        let opener: Vec<&str> = script.hook.split_whitespace().take(4).collect();
        assert!(
            normalize_for_match(&script.content).starts_with(&normalize_for_match(&opener.join(" "))),
            "'{}' does not open with '{}'",
            script.content,
            script.hook
        );
        assert_eq!(script.word_count, script.content.split_whitespace().count());
        assert_eq!(script.voice_fidelity_score, 88.0);
    }
}

#[tokio::test]
async fn test_stages_run_in_order_on_their_tiers() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let result = studio
        .pipeline()
        .run(&studio.request(5).with_persist(false))
        .await
        .unwrap();

    assert_eq!(
        stage_names(&result),
        vec![
            "corpus_retrieval",
            "hook_generation",
            "script_expansion",
            "voice_transformation",
            "validation",
            "finalize",
        ]
    );
    assert_eq!(result.revision_attempts, 0);
    assert!(result.batch_id.is_none());

    for call in studio.llm.calls() {
        let expected = match call.stage {
            LlmStage::Hooks | LlmStage::Expansion => ModelTier::Mid,
            LlmStage::Transform => ModelTier::Premium,
            LlmStage::Validation | LlmStage::Shareability => ModelTier::Cheap,
        };
        assert_eq!(call.tier, expected, "{:?}", call.stage);
    }

    // 4 calls of 100 in / 50 out: hooks, expansion, transform, validation
    assert_eq!(result.totals.tokens.input_tokens, 400);
    assert_eq!(result.totals.tokens.output_tokens, 200);
    assert!(result.cost.total_usd > 0.0);
    assert_eq!(result.totals.final_count, 5);
}

#[tokio::test]
async fn test_exemplars_reach_the_hook_prompt() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let result = studio
        .pipeline()
        .run(&studio.request(3).with_persist(false))
        .await
        .unwrap();

    let stats = result.retrieval_stats.unwrap();
    // hot_take row sits below the similarity floor
    assert_eq!(stats.returned, 3);
    assert_eq!(stats.corpus_size, 4);

    let hook_calls = studio.llm.calls_for(LlmStage::Hooks);
    assert_eq!(hook_calls.len(), 1);
    assert!(hook_calls[0].prompt.contains("hook_type=confession"));
    assert!(!hook_calls[0].prompt.contains("hook_type=hot_take"));
}

#[tokio::test]
async fn test_theme_is_passed_to_hooks() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let request = studio
        .request(2)
        .with_theme(Some("first dates".to_string()))
        .with_duration(DurationTier::Medium)
        .with_persist(false);

    studio.pipeline().run(&request).await.unwrap();

    let hook_calls = studio.llm.calls_for(LlmStage::Hooks);
    assert!(hook_calls[0].prompt.contains("THEME: first dates"));
}

// =============================================================================
// Degraded and failing runs
// =============================================================================

#[tokio::test]
async fn test_retrieval_failure_continues_without_exemplars() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let mut model = studio.studio_store.get_model(MODEL_ID).unwrap().unwrap();
    model.embedding = None;
    studio.studio_store.upsert_model(&model).unwrap();

    let result = studio
        .pipeline()
        .run(&studio.request(3).with_persist(false))
        .await
        .unwrap();

    assert!(result.retrieval_stats.is_none());
    assert_eq!(result.stages[0].name, "corpus_retrieval");
    assert_eq!(result.stages[0].output_count, 0);
    assert_eq!(result.scripts.len(), 3);
    let hook_calls = studio.llm.calls_for(LlmStage::Hooks);
    assert!(hook_calls[0].prompt.contains("No exemplar scripts available"));
}

#[tokio::test]
async fn test_unknown_model_is_rejected() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let request = PipelineRequest::new("no-such-model", 5);

    let err = studio.pipeline().run(&request).await.unwrap_err();

    assert!(matches!(err, PipelineError::ModelNotFound(ref id) if id == "no-such-model"));
    assert!(studio.llm.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_run_stops_before_llm_calls() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    studio.cancellation_token.cancel();

    let err = studio
        .pipeline()
        .run(&studio.request(5))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Cancelled));
    assert!(studio.llm.calls().is_empty());
    assert!(studio
        .studio_store
        .list_scripts(MODEL_ID, None)
        .unwrap()
        .is_empty());
}

// =============================================================================
// Optional stages
// =============================================================================

#[tokio::test]
async fn test_shareability_reorders_hooks_before_expansion() {
    let mut studio = TestStudio::spawn(ScriptedVerdict::Pass);
    studio.config.shareability = true;

    let result = studio
        .pipeline()
        .run(&studio.request(5).with_persist(false))
        .await
        .unwrap();

    assert!(stage_names(&result).contains(&"shareability_scoring".to_string()));
    // The scripted scorer favours later hooks, so the last one leads.
    let first = result
        .scripts
        .iter()
        .find(|s| s.script_index == 0)
        .unwrap();
    assert_eq!(first.hook, scripted_hook(4));
    assert!(first.content.starts_with(&scripted_hook(4)));
}

// =============================================================================
// Batching
// =============================================================================

#[tokio::test]
async fn test_expansion_indices_are_global_across_batches() {
    let studio = TestStudio::spawn(ScriptedVerdict::Pass);
    let model = studio.studio_store.get_model(MODEL_ID).unwrap().unwrap();
    let hooks: Vec<GeneratedHook> = (0..25)
        .map(|i| GeneratedHook::new(scripted_hook(i), "confession"))
        .collect();

    let output = ScriptExpander::new(studio.context())
        .with_batch_size(15)
        .expand(&model.voice_profile, &hooks, &[], DurationTier::Medium)
        .await
        .unwrap();

    let indices: Vec<usize> = output.scripts.iter().map(|s| s.hook_index).collect();
    assert_eq!(indices, (0..25).collect::<Vec<_>>());
    for script in &output.scripts {
        assert!(script.script.starts_with(&hooks[script.hook_index].hook));
        assert_eq!(script.hook, hooks[script.hook_index].hook);
        assert!(script.validation_issues.is_empty(), "{:?}", script.validation_issues);
    }
    assert_eq!(studio.llm.calls_for(LlmStage::Expansion).len(), 2);
}

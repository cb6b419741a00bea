//! Prompt builders for every LLM-backed stage.
//!
//! Each stage asks for a bare JSON array; the shapes described here are the
//! ones the stage parsers accept.

use super::expansion::DurationTier;
use super::hooks::GeneratedHook;
use super::transform::{TransformInput, TransformedScript};
use crate::store::CorpusMatch;
use crate::voice::{HookType, PcmType, VoiceProfile};

const EXEMPLAR_CHARS: usize = 600;

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

fn exemplar_block(exemplars: &[CorpusMatch]) -> String {
    if exemplars.is_empty() {
        return "No exemplar scripts available. Rely on the voice profile.".to_string();
    }
    exemplars
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "[{}] hook_type={} levers={}\n{}",
                i + 1,
                m.hook_type.as_deref().unwrap_or("unknown"),
                m.parasocial_levers.join(","),
                excerpt(&m.content, EXEMPLAR_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// Hook generation
// ============================================================================

pub fn hook_system(profile: &VoiceProfile) -> String {
    format!(
        r#"You write scroll-stopping opening lines ("hooks") for short vertical videos.
Every hook is 5-12 words, spoken out loud by the creator below, in their voice.

CREATOR PROFILE:
{profile}
Never touch anything listed under hard nos or topics to avoid.
Respond with a JSON array only. No prose, no markdown."#,
        profile = profile.prompt_context()
    )
}

pub fn hook_prompt(
    distribution: &[(HookType, usize)],
    pcm_distribution: &[(PcmType, usize)],
    exemplars: &[CorpusMatch],
    theme: Option<&str>,
    variations_per_concept: Option<usize>,
) -> String {
    let types = distribution
        .iter()
        .map(|(t, n)| format!("- {}: {}", t, n))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = String::new();
    if let Some(theme) = theme {
        out.push_str(&format!("THEME: {}\n\n", theme));
    }
    out.push_str(&format!("EXEMPLAR SCRIPTS:\n{}\n\n", exemplar_block(exemplars)));
    out.push_str(&format!("HOOK TYPES (exact counts):\n{}\n\n", types));

    if !pcm_distribution.is_empty() {
        let pcm = pcm_distribution
            .iter()
            .map(|(t, n)| format!("- {}: {}", t.as_str(), n))
            .collect::<Vec<_>>()
            .join("\n");
        out.push_str(&format!(
            "PERSONALITY TYPES (spread hooks across these, tag each with pcm_type):\n{}\n\n",
            pcm
        ));
    }

    match variations_per_concept {
        Some(variations) => out.push_str(&format!(
            r#"Each count above is a number of CONCEPTS. For every concept write {variations} variations:
angle_shift, intensity, opener_swap, specificity (in that order, repeat if more are needed).
Return: [{{"concept_id": "c1", "hook_type": "...", "rationale": "...",
  "variations": [{{"hook": "...", "variation": "angle_shift", "parasocial_levers": ["..."], "recommended": false}}]}}]"#
        )),
        None => out.push_str(
            r#"Return: [{"hook": "...", "hook_type": "...", "parasocial_levers": ["..."], "rationale": "...", "pcm_type": "..."}]"#,
        ),
    }
    out
}

// ============================================================================
// Shareability
// ============================================================================

pub fn shareability_prompt(profile: &VoiceProfile, hooks: &[GeneratedHook]) -> String {
    let list = hooks
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}", i, h.hook))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Rate how likely each hook is to be shared or forwarded by viewers of {name}.
Score 0-100 and give a one-sentence reason.

HOOKS:
{list}

Return a JSON array only: [{{"index": 0, "score": 75, "reason": "..."}}]"#,
        name = profile.display_name(),
    )
}

// ============================================================================
// Expansion
// ============================================================================

pub fn expansion_system(profile: &VoiceProfile) -> String {
    format!(
        r#"You turn hooks into complete short-form video scripts.
Structure: hook, tension, payload, closer. The script MUST open with the hook's exact words.

CREATOR PROFILE:
{profile}
Respond with a JSON array only. No prose, no markdown."#,
        profile = profile.prompt_context()
    )
}

pub fn expansion_prompt(
    hooks: &[GeneratedHook],
    duration: DurationTier,
    exemplars: &[CorpusMatch],
) -> String {
    let (min_words, max_words) = duration.word_range();
    let list = hooks
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "{}. [{}] {} (levers: {})",
                i,
                h.hook_type,
                h.hook,
                h.parasocial_levers.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"EXEMPLAR SCRIPTS:
{exemplars}

Write one script per hook. Target {min_words}-{max_words} words (about {seconds} seconds spoken).

HOOKS:
{list}

Return: [{{"hook_index": 0, "script": "...", "structure_breakdown": {{"hook": "...", "tension": "...", "payload": "...", "closer": "..."}}, "parasocial_levers_used": ["..."]}}]
hook_index is the number shown before each hook."#,
        exemplars = exemplar_block(exemplars),
        seconds = duration.target_seconds(),
    )
}

// ============================================================================
// Voice transformation
// ============================================================================

pub fn transform_system(profile: &VoiceProfile, approved_excerpts: &[String]) -> String {
    let mut out = format!(
        r#"You rewrite scripts so they sound exactly like this creator talking, not like an AI.
Use their filler words at the stated frequency, their sentence starters and enders,
their vocabulary glossary and their energy. Remove AI tells: balanced grammar,
"Honestly," openers, tidy three-part lists, "right?" enders.

HARD RULES:
- The script MUST start with the original hook's first words. Do not put anything before them.
- One continuous paragraph. No line breaks.

CREATOR PROFILE:
{profile}"#,
        profile = profile.prompt_context()
    );
    if !approved_excerpts.is_empty() {
        out.push_str("\nAPPROVED SCRIPTS BY THIS CREATOR:\n");
        for e in approved_excerpts {
            out.push_str(&format!("- \"{}\"\n", e));
        }
    }
    out.push_str("\nRespond with a JSON array only. No prose, no markdown.");
    out
}

pub fn transform_prompt(batch: &[TransformInput]) -> String {
    let list = batch
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let mut item = format!(
                "SCRIPT {}\nOriginal hook: {}\nScript: {}",
                i, input.hook, input.script
            );
            if let Some(feedback) = &input.feedback {
                item.push_str(&format!("\nReviewer feedback to address: {}", feedback));
            }
            item
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        r#"{list}

Return: [{{"script_index": 0, "transformed_script": "...", "changes_made": ["..."], "voice_fidelity_score": 85, "ai_tells_removed": ["..."], "voice_elements_added": ["..."]}}]
script_index is the number after SCRIPT."#
    )
}

// ============================================================================
// Validation
// ============================================================================

pub fn validation_system(profile: &VoiceProfile) -> String {
    format!(
        r#"You are a strict reviewer of voice-matched short-form scripts.
For each script judge voice fidelity (0-100), whether it targets the right audience,
vocabulary accuracy, structural cleanliness, and boundary compliance.
List any AI-speech tells you spot and any boundary violations.

CREATOR PROFILE:
{profile}
Respond with a JSON array only. No prose, no markdown."#,
        profile = profile.prompt_context()
    )
}

pub fn validation_prompt(batch: &[TransformedScript]) -> String {
    let list = batch
        .iter()
        .enumerate()
        .map(|(i, s)| format!("SCRIPT {}\n{}", i, s.transformed_script))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        r#"{list}

Return: [{{"script_index": 0, "voice_fidelity_score": 82, "ai_tells": ["..."], "boundary_violations": [], "strengths": ["..."], "improvements": ["..."], "verdict": "PASS", "revision_priority": "none"}}]
verdict is PASS, REVISE or FAIL. script_index is the number after SCRIPT."#
    )
}

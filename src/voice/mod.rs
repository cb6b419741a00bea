//! Creator voice profiles.
//!
//! A [`VoiceProfile`] is stored as a JSON blob on the model record. Every
//! section defaults to empty so that partially extracted profiles still load;
//! boundary and audience fields in particular are never filled in with
//! invented content.

mod archetypes;

pub use archetypes::{
    distribute_hook_types, distribute_pcm_types, preferred_hook_types, HookType, PcmType,
    AFFINE_WEIGHT, BASE_WEIGHT,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How often a verbal habit shows up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyTier {
    Never,
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: String,
    pub stage_name: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillerWord {
    pub word: String,
    #[serde(default)]
    pub frequency: FrequencyTier,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceMechanics {
    pub filler_words: Vec<FillerWord>,
    pub sentence_starters: Vec<String>,
    pub sentence_enders: Vec<String>,
    pub catchphrases: Vec<String>,
    pub swear_frequency: FrequencyTier,
    pub sentence_style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personality {
    pub energy_level: Option<String>,
    pub humor_style: Option<String>,
}

/// Explicitness tier plus the creator's own vocabulary, keyed by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpicyConfig {
    pub explicitness_tier: u8,
    pub vocabulary: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudienceTargeting {
    pub description: Option<String>,
    pub fantasy_fulfilled: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParasocialConfig {
    /// Levers the creator pulls well.
    pub strengths: Vec<String>,
    /// Levers that feel off for this creator.
    pub avoid: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Boundaries {
    pub hard_nos: Vec<String>,
    pub topics_to_avoid: Vec<String>,
}

impl Boundaries {
    /// All boundary phrases, trimmed and non-empty.
    pub fn terms(&self) -> Vec<&str> {
        self.hard_nos
            .iter()
            .chain(self.topics_to_avoid.iter())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Boundary phrases that occur in `text`, case-insensitively.
    pub fn violations_in(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.terms()
            .into_iter()
            .filter(|term| haystack.contains(&term.to_lowercase()))
            .map(|term| term.to_string())
            .collect()
    }
}

/// Personality archetype assignment; `mix` proportions sum to 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeAssignment {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    pub mix: BTreeMap<String, f32>,
}

impl ArchetypeAssignment {
    /// Primary then secondary tag, whichever are set.
    pub fn tags(&self) -> Vec<String> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn mix_is_normalized(&self) -> bool {
        if self.mix.is_empty() {
            return true;
        }
        let sum: f32 = self.mix.values().sum();
        (sum - 1.0).abs() < 0.01
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    pub identity: Identity,
    pub voice_mechanics: VoiceMechanics,
    pub personality: Personality,
    pub spicy: SpicyConfig,
    pub audience: AudienceTargeting,
    pub parasocial: ParasocialConfig,
    pub boundaries: Boundaries,
    pub archetypes: ArchetypeAssignment,
    pub sample_quotes: Vec<String>,
}

impl VoiceProfile {
    pub fn display_name(&self) -> &str {
        self.identity
            .stage_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.identity.name)
    }

    /// Short text used to anchor thematic retrieval queries.
    pub fn bio_context(&self) -> String {
        let mut parts = vec![self.display_name().to_string()];
        if let Some(bio) = &self.identity.bio {
            parts.push(bio.clone());
        }
        if let Some(audience) = &self.audience.description {
            parts.push(format!("Audience: {}", audience));
        }
        parts.join(". ")
    }

    /// Multi-line voice description embedded in stage prompts.
    pub fn prompt_context(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Creator: {}\n", self.display_name()));
        if let Some(bio) = &self.identity.bio {
            out.push_str(&format!("Bio: {}\n", bio));
        }

        let mechanics = &self.voice_mechanics;
        if !mechanics.filler_words.is_empty() {
            let fillers: Vec<String> = mechanics
                .filler_words
                .iter()
                .map(|f| format!("{} ({:?})", f.word, f.frequency).to_lowercase())
                .collect();
            out.push_str(&format!("Filler words: {}\n", fillers.join(", ")));
        }
        push_list(&mut out, "Sentence starters", &mechanics.sentence_starters);
        push_list(&mut out, "Sentence enders", &mechanics.sentence_enders);
        push_list(&mut out, "Catchphrases", &mechanics.catchphrases);
        out.push_str(&format!(
            "Swearing: {}\n",
            format!("{:?}", mechanics.swear_frequency).to_lowercase()
        ));
        if let Some(style) = &mechanics.sentence_style {
            out.push_str(&format!("Sentence style: {}\n", style));
        }

        if let Some(energy) = &self.personality.energy_level {
            out.push_str(&format!("Energy: {}\n", energy));
        }
        if let Some(humor) = &self.personality.humor_style {
            out.push_str(&format!("Humor: {}\n", humor));
        }

        out.push_str(&format!("Explicitness tier: {}\n", self.spicy.explicitness_tier));
        for (category, terms) in &self.spicy.vocabulary {
            push_list(&mut out, &format!("Vocabulary [{}]", category), terms);
        }

        if let Some(audience) = &self.audience.description {
            out.push_str(&format!("Audience: {}\n", audience));
        }
        if let Some(fantasy) = &self.audience.fantasy_fulfilled {
            out.push_str(&format!("Fantasy fulfilled: {}\n", fantasy));
        }

        push_list(&mut out, "Parasocial strengths", &self.parasocial.strengths);
        push_list(&mut out, "Parasocial levers to avoid", &self.parasocial.avoid);
        push_list(&mut out, "Hard nos (never mention)", &self.boundaries.hard_nos);
        push_list(&mut out, "Topics to avoid", &self.boundaries.topics_to_avoid);

        let archetypes = self.archetypes.tags();
        push_list(&mut out, "Archetypes", &archetypes);

        if !self.sample_quotes.is_empty() {
            out.push_str("Sample quotes:\n");
            for quote in self.sample_quotes.iter().take(8) {
                out.push_str(&format!("- \"{}\"\n", quote));
            }
        }
        out
    }
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("{}: {}\n", label, items.join(", ")));
}

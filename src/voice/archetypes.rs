//! Hook-type taxonomy, PCM tags and the archetype affinity table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of a hook type preferred by one of the creator's archetypes.
pub const AFFINE_WEIGHT: usize = 2;
/// Weight of every other hook type.
pub const BASE_WEIGHT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    Confession,
    Question,
    HotTake,
    StoryOpener,
    DirectAddress,
    Challenge,
    Relatable,
    Tease,
}

impl HookType {
    pub const ALL: [HookType; 8] = [
        HookType::Confession,
        HookType::Question,
        HookType::HotTake,
        HookType::StoryOpener,
        HookType::DirectAddress,
        HookType::Challenge,
        HookType::Relatable,
        HookType::Tease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::Confession => "confession",
            HookType::Question => "question",
            HookType::HotTake => "hot_take",
            HookType::StoryOpener => "story_opener",
            HookType::DirectAddress => "direct_address",
            HookType::Challenge => "challenge",
            HookType::Relatable => "relatable",
            HookType::Tease => "tease",
        }
    }

    /// Parse a tag; accepts hyphens or spaces in place of underscores.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        HookType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process Communication Model personality tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcmType {
    Harmonizer,
    Thinker,
    Persister,
    Rebel,
    Promoter,
    Imaginer,
}

impl PcmType {
    pub const ALL: [PcmType; 6] = [
        PcmType::Harmonizer,
        PcmType::Thinker,
        PcmType::Persister,
        PcmType::Rebel,
        PcmType::Promoter,
        PcmType::Imaginer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PcmType::Harmonizer => "harmonizer",
            PcmType::Thinker => "thinker",
            PcmType::Persister => "persister",
            PcmType::Rebel => "rebel",
            PcmType::Promoter => "promoter",
            PcmType::Imaginer => "imaginer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        PcmType::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

/// Personality archetype -> hook types that archetype delivers best.
const ARCHETYPE_AFFINITY: &[(&str, &[HookType])] = &[
    (
        "girl_next_door",
        &[HookType::Relatable, HookType::Confession, HookType::StoryOpener],
    ),
    (
        "bratty_tease",
        &[HookType::Tease, HookType::Challenge, HookType::HotTake],
    ),
    (
        "nurturing",
        &[HookType::DirectAddress, HookType::Confession, HookType::Relatable],
    ),
    (
        "dominant",
        &[HookType::Challenge, HookType::DirectAddress, HookType::HotTake],
    ),
    (
        "mysterious",
        &[HookType::Tease, HookType::Question, HookType::StoryOpener],
    ),
    (
        "party_girl",
        &[HookType::StoryOpener, HookType::HotTake, HookType::Relatable],
    ),
    (
        "intellectual",
        &[HookType::Question, HookType::HotTake, HookType::Confession],
    ),
    (
        "romantic",
        &[HookType::Confession, HookType::DirectAddress, HookType::Question],
    ),
];

/// Hook types preferred by any of the given archetype tags, in table order.
///
/// Unknown tags contribute nothing.
pub fn preferred_hook_types(archetypes: &[String]) -> Vec<HookType> {
    let mut preferred = Vec::new();
    for tag in archetypes {
        let tag = tag.trim().to_lowercase().replace(['-', ' '], "_");
        let Some((_, types)) = ARCHETYPE_AFFINITY.iter().find(|(name, _)| *name == tag) else {
            continue;
        };
        for hook_type in types.iter() {
            if !preferred.contains(hook_type) {
                preferred.push(*hook_type);
            }
        }
    }
    preferred
}

/// Split `count` hooks across every hook type, weighted by archetype affinity.
///
/// Each type gets `floor(count * weight / total_weight)`; the rounding
/// remainder goes one at a time to the types ordered by weight (heaviest
/// first, ties in [`HookType::ALL`] order). Only types with a non-zero count
/// are returned, heaviest first.
pub fn distribute_hook_types(count: usize, archetypes: &[String]) -> Vec<(HookType, usize)> {
    if count == 0 {
        return Vec::new();
    }
    let preferred = preferred_hook_types(archetypes);

    let mut weighted: Vec<(HookType, usize)> = HookType::ALL
        .into_iter()
        .map(|t| {
            let weight = if preferred.contains(&t) {
                AFFINE_WEIGHT
            } else {
                BASE_WEIGHT
            };
            (t, weight)
        })
        .collect();
    // sort_by is stable, so equal weights keep ALL order
    weighted.sort_by(|a, b| b.1.cmp(&a.1));

    let total_weight: usize = weighted.iter().map(|(_, w)| w).sum();
    let mut counts: Vec<(HookType, usize)> = weighted
        .iter()
        .map(|(t, w)| (*t, count * w / total_weight))
        .collect();

    let assigned: usize = counts.iter().map(|(_, c)| c).sum();
    let remainder = count - assigned;
    for slot in counts.iter_mut().take(remainder) {
        slot.1 += 1;
    }

    counts.retain(|(_, c)| *c > 0);
    counts
}

/// Split `count` hooks evenly across PCM tags; the first tags absorb the remainder.
pub fn distribute_pcm_types(count: usize) -> Vec<(PcmType, usize)> {
    let n = PcmType::ALL.len();
    PcmType::ALL
        .into_iter()
        .enumerate()
        .map(|(i, t)| (t, count / n + usize::from(i < count % n)))
        .filter(|(_, c)| *c > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(dist: &[(HookType, usize)]) -> usize {
        dist.iter().map(|(_, c)| c).sum()
    }

    #[test]
    fn test_hook_type_parse() {
        assert_eq!(HookType::parse("hot_take"), Some(HookType::HotTake));
        assert_eq!(HookType::parse("Story Opener"), Some(HookType::StoryOpener));
        assert_eq!(HookType::parse("direct-address"), Some(HookType::DirectAddress));
        assert_eq!(HookType::parse("rant"), None);
    }

    #[test]
    fn test_distribution_sums_to_count() {
        for count in 0..40 {
            let dist = distribute_hook_types(count, &["bratty_tease".to_string()]);
            assert_eq!(total(&dist), count);
        }
    }

    #[test]
    fn test_distribution_favors_affine_types() {
        // weights: 3 types x2 + 5 types x1 = 11
        let dist = distribute_hook_types(11, &["bratty_tease".to_string()]);
        let get = |t: HookType| dist.iter().find(|(h, _)| *h == t).map(|(_, c)| *c);
        assert_eq!(get(HookType::Tease), Some(2));
        assert_eq!(get(HookType::Challenge), Some(2));
        assert_eq!(get(HookType::HotTake), Some(2));
        assert_eq!(get(HookType::Confession), Some(1));
        assert_eq!(dist[0].0, HookType::HotTake);
    }

    #[test]
    fn test_remainder_goes_to_heaviest_first() {
        // 5 hooks over weight 11: floors are 0 everywhere, remainder 5
        let dist = distribute_hook_types(5, &["girl_next_door".to_string()]);
        let types: Vec<HookType> = dist.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            types,
            vec![
                HookType::Confession,
                HookType::StoryOpener,
                HookType::Relatable,
                HookType::Question,
                HookType::HotTake,
            ]
        );
        assert!(dist.iter().all(|(_, c)| *c == 1));
    }

    #[test]
    fn test_no_archetypes_is_uniform() {
        let dist = distribute_hook_types(16, &[]);
        assert_eq!(dist.len(), 8);
        assert!(dist.iter().all(|(_, c)| *c == 2));
    }

    #[test]
    fn test_unknown_archetype_ignored() {
        assert!(preferred_hook_types(&["cowgirl_astronaut".to_string()]).is_empty());
    }

    #[test]
    fn test_pcm_distribution() {
        let dist = distribute_pcm_types(8);
        assert_eq!(dist[0], (PcmType::Harmonizer, 2));
        assert_eq!(dist[1], (PcmType::Thinker, 2));
        assert_eq!(dist[2], (PcmType::Persister, 1));
        assert_eq!(dist.iter().map(|(_, c)| c).sum::<usize>(), 8);
        assert_eq!(distribute_pcm_types(3).len(), 3);
    }
}

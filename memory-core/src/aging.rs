//! Relevance & Aging Engine: content classification, multi-factor scoring,
//! phase assignment, and migration recommendations. See `spec.md` §4.4.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::constants::MIN_REEVALUATION_DAYS;
use crate::types::{AgingProfile, ContentClass, MemoryId, MigrationRecommendation, Phase, Scope, Tier};

/// Static per-class aging parameters, taken verbatim from `spec.md` §4.4's
/// table.
#[derive(Debug, Clone, Copy)]
pub struct ClassProfile {
    /// Base half-life in days before usage/context adaptation.
    pub base_half_life_days: f32,
    /// Usage sensitivity in `[0, 1]`.
    pub usage_sensitivity: f32,
    /// Context importance in `[0, 1]`.
    pub context_importance: f32,
    /// Relationship factor weight in `[0, 1]`.
    pub relationship_factor: f32,
}

/// Look up the static parameters for a content class.
#[must_use]
pub fn class_profile(class: ContentClass) -> ClassProfile {
    match class {
        ContentClass::CodeSnippet => ClassProfile {
            base_half_life_days: 30.0,
            usage_sensitivity: 0.8,
            context_importance: 0.9,
            relationship_factor: 0.7,
        },
        ContentClass::Configuration => ClassProfile {
            base_half_life_days: 90.0,
            usage_sensitivity: 0.3,
            context_importance: 0.8,
            relationship_factor: 0.5,
        },
        ContentClass::Documentation => ClassProfile {
            base_half_life_days: 180.0,
            usage_sensitivity: 0.4,
            context_importance: 0.6,
            relationship_factor: 0.8,
        },
        ContentClass::UserPreference => ClassProfile {
            base_half_life_days: 365.0,
            usage_sensitivity: 0.9,
            context_importance: 0.5,
            relationship_factor: 0.2,
        },
        ContentClass::ProjectContext => ClassProfile {
            base_half_life_days: 60.0,
            usage_sensitivity: 0.7,
            context_importance: 1.0,
            relationship_factor: 0.9,
        },
        ContentClass::TemporaryNote => ClassProfile {
            base_half_life_days: 7.0,
            usage_sensitivity: 0.9,
            context_importance: 0.3,
            relationship_factor: 0.1,
        },
        ContentClass::SystemState => ClassProfile {
            base_half_life_days: 1.0,
            usage_sensitivity: 0.1,
            context_importance: 0.4,
            relationship_factor: 0.0,
        },
        ContentClass::LearningData => ClassProfile {
            base_half_life_days: 120.0,
            usage_sensitivity: 0.6,
            context_importance: 0.7,
            relationship_factor: 0.8,
        },
        ContentClass::ReferenceMaterial => ClassProfile {
            base_half_life_days: 365.0,
            usage_sensitivity: 0.2,
            context_importance: 0.5,
            relationship_factor: 0.9,
        },
        ContentClass::WorkflowPattern => ClassProfile {
            base_half_life_days: 45.0,
            usage_sensitivity: 0.8,
            context_importance: 0.8,
            relationship_factor: 0.6,
        },
    }
}

/// Rule-based content classification over tokens, tags, and scope.
///
/// Tag-based rules take priority (an explicit tag is a stronger signal than
/// a keyword guess); keyword rules fall back when no tag matches; global
/// scope with no other signal defaults to `ProjectContext`, matching the
/// spec's framing of scope as contextual, not a memory of its own.
#[must_use]
pub fn classify_content(content: &str, tags: &HashSet<String>, scope: Scope) -> ContentClass {
    let has_tag = |t: &str| tags.iter().any(|tag| tag.eq_ignore_ascii_case(t));

    if has_tag("deprecated") || has_tag("temporary") || has_tag("scratch") {
        return ContentClass::TemporaryNote;
    }
    if has_tag("preference") || has_tag("user_preference") {
        return ContentClass::UserPreference;
    }
    if has_tag("config") || has_tag("configuration") {
        return ContentClass::Configuration;
    }
    if has_tag("system") || has_tag("system_state") {
        return ContentClass::SystemState;
    }
    if has_tag("workflow") {
        return ContentClass::WorkflowPattern;
    }
    if has_tag("reference") {
        return ContentClass::ReferenceMaterial;
    }
    if has_tag("learning") {
        return ContentClass::LearningData;
    }

    let lower = content.to_lowercase();
    let has_code_markers = content.contains("fn ")
        || content.contains("function ")
        || content.contains("class ")
        || content.contains("def ")
        || content.contains("{")
        || content.contains(";");
    if has_code_markers {
        return ContentClass::CodeSnippet;
    }
    if lower.contains("config")
        || lower.contains("setting")
        || lower.contains("environment variable")
        || lower.contains(".toml")
        || lower.contains(".yaml")
        || lower.contains(".env")
    {
        return ContentClass::Configuration;
    }
    if lower.starts_with("i prefer")
        || lower.starts_with("please always")
        || lower.starts_with("never ")
        || lower.contains("prefers to")
    {
        return ContentClass::UserPreference;
    }
    if lower.contains("todo")
        || lower.contains("remember to")
        || lower.contains("for now")
        || lower.contains("temporarily")
    {
        return ContentClass::TemporaryNote;
    }
    if lower.contains("architecture")
        || lower.contains("directory structure")
        || lower.contains("this project")
        || lower.contains("this repo")
    {
        return ContentClass::ProjectContext;
    }
    if lower.contains("workflow") || lower.contains("process for") || lower.contains("steps to") {
        return ContentClass::WorkflowPattern;
    }
    if lower.contains("see ") || lower.contains("documentation") || lower.contains("api reference") {
        if scope == Scope::Global {
            return ContentClass::ReferenceMaterial;
        }
        return ContentClass::Documentation;
    }

    match scope {
        Scope::Global => ContentClass::ReferenceMaterial,
        Scope::Project => ContentClass::ProjectContext,
    }
}

/// Per-factor weights in the fixed composite-score sum.
pub mod weights {
    /// Temporal (recency-vs-half-life) weight.
    pub const TEMPORAL: f32 = 0.25;
    /// Usage weight.
    pub const USAGE: f32 = 0.30;
    /// Contextual weight.
    pub const CONTEXTUAL: f32 = 0.20;
    /// Semantic (information density) weight.
    pub const SEMANTIC: f32 = 0.10;
    /// Relationship weight.
    pub const RELATIONSHIP: f32 = 0.10;
    /// System-importance weight.
    pub const SYSTEM: f32 = 0.05;
}

/// Everything the aging engine needs to score one memory. Bundled so the
/// scoring functions stay pure and independently testable.
pub struct AgingInput<'a> {
    /// The memory's content (for semantic density and classification).
    pub content: &'a str,
    /// The memory's tags.
    pub tags: &'a HashSet<String>,
    /// The memory's scope.
    pub scope: Scope,
    /// The memory's current tier.
    pub tier: Tier,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Evaluation instant ("now").
    pub now: DateTime<Utc>,
    /// Total access count to date.
    pub access_count: u64,
    /// Timestamps of accesses in roughly the last 24h, paired with the
    /// context string recorded at access time, if any.
    pub recent_accesses: &'a [(DateTime<Utc>, Option<String>)],
    /// The caller-supplied current context string, if any.
    pub current_context: Option<&'a str>,
    /// `(related memory's last known composite score, edge strength)` pairs
    /// for every relationship touching this memory.
    pub related: &'a [(f32, f32)],
}

fn temporal_factor(age_hours: f32, half_life_days: f32) -> f32 {
    let half_life_hours = (half_life_days * 24.0).max(0.001);
    0.5_f32.powf(age_hours / half_life_hours)
}

fn usage_factor(access_count: u64, access_frequency_score: f32, usage_sensitivity: f32) -> f32 {
    let normalized_count = (access_count as f32 / 20.0).min(1.0);
    let combined = (normalized_count + access_frequency_score) / 2.0;
    combined.clamp(0.0, 1.0).powf(1.0 - usage_sensitivity)
}

fn jaccard_overlap(a: &str, b: &str) -> f32 {
    let tokenize = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .map(str::to_string)
            .collect()
    };
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f32;
    let union = ta.union(&tb).count() as f32;
    if union == 0.0 { 0.0 } else { intersection / union }
}

fn contextual_factor(content: &str, input: &AgingInput) -> f32 {
    let Some(context) = input.current_context else {
        return 0.5;
    };
    let day_ago = input.now - chrono::Duration::hours(24);
    let recent_overlapping = input
        .recent_accesses
        .iter()
        .filter(|(ts, ctx)| {
            *ts >= day_ago
                && ctx
                    .as_deref()
                    .is_some_and(|c| jaccard_overlap(c, context) > 0.0)
        })
        .count();
    let recent_score = (recent_overlapping as f32 / 5.0).min(1.0);
    let content_overlap = jaccard_overlap(content, context);
    ((recent_score + content_overlap) / 2.0).clamp(0.0, 1.0)
}

fn semantic_factor(content: &str) -> f32 {
    let tokens: Vec<&str> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let density = if tokens.is_empty() {
        0.0
    } else {
        let unique: HashSet<&str> = tokens.iter().copied().collect();
        unique.len() as f32 / tokens.len() as f32
    };
    let structured_markers = ['{', '}', '[', ']', ':', '=', '-', '>'];
    let marker_hits = content.chars().filter(|c| structured_markers.contains(c)).count();
    let marker_bonus = (marker_hits as f32 / 20.0).min(0.2);
    (density + marker_bonus).clamp(0.0, 1.0)
}

fn relationship_factor(related: &[(f32, f32)]) -> f32 {
    let contributing: Vec<(f32, f32)> = related
        .iter()
        .copied()
        .filter(|(_, strength)| *strength > crate::constants::RELATIONSHIP_BOOST_FLOOR)
        .collect();
    if contributing.is_empty() {
        return 0.0;
    }
    let weight_sum: f32 = contributing.iter().map(|(_, s)| *s).sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }
    contributing
        .iter()
        .map(|(score, strength)| score * strength)
        .sum::<f32>()
        / weight_sum
}

fn system_factor(scope: Scope, tags: &HashSet<String>) -> f32 {
    let mut score = 0.0;
    if scope == Scope::Global {
        score += 0.5;
    }
    if tags.iter().any(|t| t.eq_ignore_ascii_case("system") || t.eq_ignore_ascii_case("config")) {
        score += 0.5;
    }
    score.min(1.0)
}

/// Compute a full aging profile for one memory at `input.now`.
///
/// Re-running this for an unchanged memory with an unchanged `now` always
/// yields the same `composite_score` and `phase` (`spec.md` §8 property 7):
/// every input is either static memory state or explicitly passed in, never
/// a wall-clock read.
#[must_use]
pub fn generate_aging_profile(memory_id: MemoryId, input: &AgingInput) -> AgingProfile {
    let class = classify_content(input.content, input.tags, input.scope);
    let profile = class_profile(class);

    let age = input.now - input.created_at;
    let age_hours = (age.num_seconds().max(0) as f32) / 3600.0;
    let age_days = age_hours / 24.0;

    let access_frequency_score = (input.recent_accesses.len() as f32 / 10.0).min(1.0);

    let temporal = temporal_factor(age_hours, profile.base_half_life_days);
    let usage = usage_factor(input.access_count, access_frequency_score, profile.usage_sensitivity);
    let contextual = contextual_factor(input.content, input);
    let semantic = semantic_factor(input.content);
    let relationship = relationship_factor(input.related);
    let system = system_factor(input.scope, input.tags);

    let composite = weights::TEMPORAL * temporal
        + weights::USAGE * usage
        + weights::CONTEXTUAL * contextual
        + weights::SEMANTIC * semantic
        + weights::RELATIONSHIP * relationship
        + weights::SYSTEM * system;
    let composite = composite.clamp(0.0, 1.0);

    let aging_rate = (1.0 - composite).max(0.1);

    let half_life_days = profile.base_half_life_days
        * (1.0 + (usage - 0.5) * profile.usage_sensitivity)
        * (1.0 + (contextual - 0.5) * profile.context_importance);
    let half_life_days = half_life_days.max(0.1);

    let is_deprecated = input.tags.iter().any(|t| t.eq_ignore_ascii_case("deprecated"));
    let phase = if age_days < 1.0 {
        Phase::Fresh
    } else if is_deprecated {
        Phase::Deprecated
    } else if composite < 0.2 || (age_days > 180.0 && input.access_count == 0) {
        Phase::Stale
    } else if usage < 0.3 && semantic > 0.6 {
        Phase::Dormant
    } else if usage < 0.4 && age_days > 30.0 {
        Phase::Declining
    } else if usage > 0.6 && composite > 0.5 {
        Phase::Active
    } else {
        Phase::Stable
    };

    let next_in_days = (half_life_days / 4.0).max(MIN_REEVALUATION_DAYS);
    let next_evaluation_at = input.now + chrono::Duration::milliseconds((next_in_days * 86_400_000.0) as i64);

    AgingProfile {
        memory_id,
        content_class: class,
        aging_rate,
        half_life_days,
        composite_score: composite,
        phase,
        next_evaluation_at,
    }
}

/// Recommend a tier migration from a freshly computed profile. The
/// dispatcher or the maintenance scheduler decides whether to apply it.
#[must_use]
pub fn recommend_migration(tier: Tier, profile: &AgingProfile) -> MigrationRecommendation {
    match tier {
        Tier::Core if profile.composite_score < 0.4 => MigrationRecommendation::Demote,
        Tier::Longterm if profile.composite_score > 0.8 && profile.phase == Phase::Active => {
            MigrationRecommendation::Promote
        }
        _ => MigrationRecommendation::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input<'a>(
        content: &'a str,
        tags: &'a HashSet<String>,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AgingInput<'a> {
        AgingInput {
            content,
            tags,
            scope: Scope::Project,
            tier: Tier::Longterm,
            created_at,
            now,
            access_count: 0,
            recent_accesses: &[],
            current_context: None,
            related: &[],
        }
    }

    #[test]
    fn temporary_note_with_no_accesses_ages_to_stale_or_declining() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(10);
        let tags = HashSet::new();
        let content = "TODO remember to fix this temporarily";
        let input = base_input(content, &tags, created, now);
        let profile = generate_aging_profile(MemoryId::new(), &input);
        assert_eq!(profile.content_class, ContentClass::TemporaryNote);
        assert!(matches!(profile.phase, Phase::Stale | Phase::Declining));
        assert_ne!(profile.phase, Phase::Fresh);
        assert_ne!(profile.phase, Phase::Active);
    }

    #[test]
    fn brand_new_memory_is_fresh() {
        let now = Utc::now();
        let tags = HashSet::new();
        let input = base_input("hello", &tags, now, now);
        let profile = generate_aging_profile(MemoryId::new(), &input);
        assert_eq!(profile.phase, Phase::Fresh);
    }

    #[test]
    fn deprecated_tag_forces_deprecated_phase_even_if_old() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(400);
        let mut tags = HashSet::new();
        tags.insert("deprecated".to_string());
        let input = base_input("legacy note", &tags, created, now);
        let profile = generate_aging_profile(MemoryId::new(), &input);
        assert_eq!(profile.phase, Phase::Deprecated);
    }

    #[test]
    fn profile_is_deterministic_for_fixed_now() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(5);
        let tags = HashSet::new();
        let content = "fn main() { println!(\"hi\"); }";
        let input1 = AgingInput {
            access_count: 3,
            ..base_input(content, &tags, created, now)
        };
        let input2 = AgingInput {
            access_count: 3,
            ..base_input(content, &tags, created, now)
        };
        let p1 = generate_aging_profile(MemoryId::new(), &input1);
        let p2 = generate_aging_profile(MemoryId::new(), &input2);
        assert_eq!(p1.composite_score, p2.composite_score);
        assert_eq!(p1.phase, p2.phase);
    }

    #[test]
    fn demote_recommended_for_low_scoring_core_memory() {
        let profile = AgingProfile {
            memory_id: MemoryId::new(),
            content_class: ContentClass::TemporaryNote,
            aging_rate: 0.9,
            half_life_days: 7.0,
            composite_score: 0.1,
            phase: Phase::Stale,
            next_evaluation_at: Utc::now(),
        };
        assert_eq!(recommend_migration(Tier::Core, &profile), MigrationRecommendation::Demote);
    }

    #[test]
    fn promote_recommended_for_high_scoring_active_longterm_memory() {
        let profile = AgingProfile {
            memory_id: MemoryId::new(),
            content_class: ContentClass::ProjectContext,
            aging_rate: 0.1,
            half_life_days: 60.0,
            composite_score: 0.9,
            phase: Phase::Active,
            next_evaluation_at: Utc::now(),
        };
        assert_eq!(
            recommend_migration(Tier::Longterm, &profile),
            MigrationRecommendation::Promote
        );
    }

    #[test]
    fn next_evaluation_is_clamped_to_at_least_one_day() {
        let now = Utc::now();
        let tags = HashSet::new();
        // system_state has a 1-day base half-life; /4 would be 0.25 days
        // without the floor.
        let mut sys_tags = HashSet::new();
        sys_tags.insert("system".to_string());
        let input = base_input("current state snapshot", &sys_tags, now, now);
        let _ = tags;
        let profile = generate_aging_profile(MemoryId::new(), &input);
        let gap = profile.next_evaluation_at - now;
        assert!(gap.num_seconds() as f32 >= MIN_REEVALUATION_DAYS * 86_400.0 - 1.0);
    }
}

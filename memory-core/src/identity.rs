//! Scope & Identity: id generation and `(tier, scope, project)` routing.
//!
//! Resolves which backend a memory belongs to and normalizes project
//! identities so repeated initializations of the same project converge on
//! the same backend slug. See `spec.md` §4.3.

use crate::types::MemoryId;

/// Minimum normalized Levenshtein similarity for two project names to be
/// considered the same project.
pub const PROJECT_FUZZY_MATCH_THRESHOLD: f64 = 0.8;

/// Generates new, never-reused memory ids.
///
/// A thin wrapper today (`Uuid::new_v4` already gives us global uniqueness
/// with overwhelming probability), kept as its own type so the allocation
/// strategy can change — e.g. to a counter-backed scheme — without
/// disturbing callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGenerator;

impl IdGenerator {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next(&self) -> MemoryId {
        MemoryId::new()
    }
}

/// Normalize a caller-supplied `project_id` so that equivalent paths
/// converge on the same backend slug: trim whitespace, case-fold, and
/// collapse path separators into a single canonical separator.
#[must_use]
pub fn normalize_project_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let folded = trimmed.to_lowercase();
    let mut collapsed = String::with_capacity(folded.len());
    let mut last_was_sep = false;
    for ch in folded.chars() {
        let is_sep = ch == '/' || ch == '\\';
        if is_sep {
            if !last_was_sep && !collapsed.is_empty() {
                collapsed.push('/');
            }
            last_was_sep = true;
        } else {
            collapsed.push(ch);
            last_was_sep = false;
        }
    }
    while collapsed.ends_with('/') {
        collapsed.pop();
    }
    collapsed
}

/// Turn a normalized project id into a filesystem-safe backend slug
/// (`<root>/projects/<slug>.db`).
#[must_use]
pub fn project_slug(normalized_project_id: &str) -> String {
    normalized_project_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Find an existing project slug whose normalized name is a near-duplicate
/// (Levenshtein similarity ≥ `PROJECT_FUZZY_MATCH_THRESHOLD`) of `candidate`.
///
/// Returns the best match above the threshold, if any, so a caller
/// initializing a project whose name is a typo or rename of an existing one
/// converges onto the existing backend instead of creating a new one.
#[must_use]
pub fn find_fuzzy_match<'a>(
    candidate: &str,
    known_project_ids: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let normalized_candidate = normalize_project_id(candidate);
    let mut best: Option<(&str, f64)> = None;
    for known in known_project_ids {
        let normalized_known = normalize_project_id(known);
        if normalized_known == normalized_candidate {
            return Some(known);
        }
        let similarity = strsim::normalized_levenshtein(&normalized_candidate, &normalized_known);
        if similarity >= PROJECT_FUZZY_MATCH_THRESHOLD
            && best.is_none_or(|(_, best_sim)| similarity > best_sim)
        {
            best = Some((known, similarity));
        }
    }
    best.map(|(known, _)| known)
}

/// Generate a disambiguating suffix for a project name that has no fuzzy
/// match among known projects, derived from the parent directory component
/// when present, otherwise an incrementing counter.
#[must_use]
pub fn disambiguating_suffix(candidate: &str, existing_slugs: &[String], counter_seed: usize) -> String {
    let normalized = normalize_project_id(candidate);
    let base_slug = project_slug(&normalized);
    if !existing_slugs.contains(&base_slug) {
        return base_slug;
    }
    let parent = normalized
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|p| !p.is_empty());
    if let Some(parent) = parent {
        let candidate_slug = format!("{base_slug}-{}", project_slug(parent));
        if !existing_slugs.contains(&candidate_slug) {
            return candidate_slug;
        }
    }
    let mut n = counter_seed.max(1);
    loop {
        let candidate_slug = format!("{base_slug}-{n}");
        if !existing_slugs.contains(&candidate_slug) {
            return candidate_slug;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators_and_case() {
        assert_eq!(normalize_project_id("  /Foo//Bar\\Baz/ "), "foo/bar/baz");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_project_id("/My/Project/");
        let twice = normalize_project_id(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn project_slug_is_filesystem_safe() {
        let slug = project_slug("my/project one");
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn fuzzy_match_finds_near_duplicate_name() {
        let known = vec!["my-awesome-project", "other-project"];
        let found = find_fuzzy_match("my-awesome-projetc", known.clone());
        assert_eq!(found, Some("my-awesome-project"));
    }

    #[test]
    fn fuzzy_match_returns_none_when_nothing_close() {
        let known = vec!["completely-different"];
        assert_eq!(find_fuzzy_match("my-project", known), None);
    }

    #[test]
    fn exact_normalized_match_wins_over_fuzzy() {
        let known = vec!["My/Project", "my-project"];
        let found = find_fuzzy_match("my/project", known);
        assert_eq!(found, Some("My/Project"));
    }

    #[test]
    fn disambiguating_suffix_avoids_collisions() {
        let existing = vec!["proj".to_string(), "proj-1".to_string()];
        let suffix = disambiguating_suffix("proj", &existing, 1);
        assert_eq!(suffix, "proj-2");
    }

    #[test]
    fn id_generator_produces_unique_ids() {
        let gen = IdGenerator;
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }
}

//! Narrow the catalog to the tools relevant to one utterance.
//!
//! Phase 1 keeps every skill whose tags intersect the utterance tokens, in
//! catalog order. Phase 2 fills the remaining slots with the other skills
//! ranked by trigram similarity. Phase-1 matches are never re-scored.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::skill::tags::{normalized_tokens, utterance_tokens};
use crate::skill::SkillDescriptor;

/// Select at most `max_tools` descriptors for `utterance`.
pub fn select(
    utterance: &str,
    catalog: &[Arc<SkillDescriptor>],
    max_tools: usize,
) -> Vec<Arc<SkillDescriptor>> {
    if max_tools == 0 || catalog.is_empty() {
        return Vec::new();
    }
    let tokens = utterance_tokens(utterance);

    let mut selected = Vec::with_capacity(max_tools.min(catalog.len()));
    let mut taken = vec![false; catalog.len()];
    for (i, d) in catalog.iter().enumerate() {
        if selected.len() >= max_tools {
            break;
        }
        if d.tags.iter().any(|t| tokens.contains(t)) {
            selected.push(Arc::clone(d));
            taken[i] = true;
        }
    }
    let phase1 = selected.len();

    if selected.len() < max_tools {
        let query = trigrams(&normalized_tokens(utterance).join(" "));
        let mut scored: Vec<(usize, f64)> = catalog
            .iter()
            .enumerate()
            .filter(|(i, _)| !taken[*i])
            .map(|(i, d)| {
                let text = normalized_tokens(&format!(
                    "{} {}",
                    d.name.replace(['-', '_'], " "),
                    d.description
                ))
                .join(" ");
                (i, dice(&query, &trigrams(&text)))
            })
            .collect();
        // Stable sort keeps catalog order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        selected.extend(
            scored
                .into_iter()
                .take(max_tools - selected.len())
                .map(|(i, _)| Arc::clone(&catalog[i])),
        );
    }

    tracing::debug!(
        phase1,
        phase2 = selected.len() - phase1,
        max_tools,
        "tool selection"
    );
    selected
}

fn trigrams(text: &str) -> HashSet<String> {
    let padded: Vec<char> = format!("  {} ", text).chars().collect();
    padded
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Dice coefficient: 2|A∩B| / (|A|+|B|).
fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    2.0 * shared / (a.len() + b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skill::tags::extract_tags;
    use crate::skill::{Readiness, RiskLevel};
    use serde_json::json;
    use std::path::PathBuf;

    fn skill(name: &str, description: &str) -> Arc<SkillDescriptor> {
        Arc::new(SkillDescriptor {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            description: description.to_string(),
            parameters: json!({"type": "object", "properties": {}}),
            runtime_requirements: Vec::new(),
            tags: extract_tags(name, description, &[]),
            category: "general".to_string(),
            readiness: Readiness::ready(),
            fingerprint: "0000000000000000".to_string(),
            risk_level: RiskLevel::Low,
            network: false,
            estimated_tokens: 500,
            bundle_dir: PathBuf::from("/skills").join(name),
            entry_point: Some("scripts/main.py".to_string()),
            language: Some("python".to_string()),
            guide: String::new(),
            has_references: false,
        })
    }

    fn catalog() -> Vec<Arc<SkillDescriptor>> {
        vec![
            skill("calculator", "Evaluate arithmetic expressions"),
            skill("image-resizer", "Resize and crop pictures"),
            skill("sample-converter", "Convert text case or count words"),
            skill("weather", "Current weather forecast for a city"),
            skill("word-counter", "Count words in text"),
        ]
    }

    fn names(list: &[Arc<SkillDescriptor>]) -> Vec<&str> {
        list.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_tag_matches_come_first_in_catalog_order() {
        let cat = catalog();
        let picked = select("count the words in this text", &cat, 5);
        assert_eq!(&names(&picked)[..2], &["sample-converter", "word-counter"]);
        assert_eq!(picked.len(), 5);
    }

    #[test]
    fn test_bounded_by_max_tools() {
        let cat = catalog();
        for max in 0..7 {
            let picked = select("resize my photo", &cat, max);
            assert!(picked.len() <= max);
            assert_eq!(picked.len(), max.min(cat.len()));
        }
        assert_eq!(names(&select("resize my photo", &cat, 1)), vec!["image-resizer"]);
    }

    #[test]
    fn test_fallback_ranks_by_similarity() {
        let cat = catalog();
        let picked = select("forecasting", &cat, 2);
        assert_eq!(picked[0].name, "weather");
    }

    #[test]
    fn test_idempotent() {
        let cat = catalog();
        let a = select("convert text and weather", &cat, 3);
        let b = select("convert text and weather", &cat, 3);
        assert_eq!(names(&a), names(&b));
    }
}

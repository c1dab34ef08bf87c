use demoseed_core::RecordSchema;
use demoseed_plan::Theme;
use rand::seq::IndexedRandom;
use rand_chacha::ChaCha8Rng;

/// Fixed system instruction for every generation request.
pub const SYSTEM_PROMPT: &str = "You generate realistic demo data for business software. \
You answer with a single JSON array of objects and nothing else: no prose, no markdown, no code fences.";

/// A few entries of each theme vocabulary, in a reproducible order.
pub fn sample_vocabularies(theme: &Theme, rng: &mut ChaCha8Rng) -> Vec<(String, Vec<String>)> {
    theme
        .vocabularies
        .iter()
        .filter(|(_, words)| !words.is_empty())
        .map(|(name, words)| {
            let picked = words
                .choose_multiple(rng, theme.vocabulary_sample.max(1))
                .cloned()
                .collect();
            (name.clone(), picked)
        })
        .collect()
}

/// User prompt for one batch of `count` records.
pub fn build_prompt(
    schema: &RecordSchema,
    theme: &Theme,
    instructions: Option<&str>,
    count: usize,
    exclusion_clause: &str,
    rng: &mut ChaCha8Rng,
) -> String {
    let subject = schema.description.as_deref().unwrap_or(&schema.name);
    let mut out = format!(
        "Generate {count} realistic {subject} records for {}, a company in {}.\n",
        theme.company_name, theme.subject
    );
    for note in &theme.notes {
        out.push_str(note.trim());
        out.push('\n');
    }

    let samples = sample_vocabularies(theme, rng);
    if !samples.is_empty() {
        out.push_str("\nDraw inspiration from these themes:\n");
        for (name, words) in samples {
            out.push_str(&format!("- {}: {}\n", name.replace('_', " "), words.join(", ")));
        }
    }

    out.push_str("\nEach record is a JSON object with these fields:\n");
    out.push_str(&schema.field_guide());

    if let Some(instructions) = instructions.map(str::trim).filter(|text| !text.is_empty()) {
        out.push('\n');
        out.push_str(instructions);
        out.push('\n');
    }

    if !exclusion_clause.is_empty() {
        out.push('\n');
        out.push_str(exclusion_clause);
        out.push('\n');
    }

    out.push_str(&format!(
        "\nEvery record must be distinct. Respond with a JSON array of exactly {count} objects and nothing else.\n"
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use demoseed_core::{FieldKind, FieldSpec, KeyMatching, NaturalKey};
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn theme() -> Theme {
        let mut vocabularies = BTreeMap::new();
        vocabularies.insert(
            "product_lines".to_string(),
            ["tents", "stoves", "boots", "packs", "lamps", "poles"]
                .iter()
                .map(|word| word.to_string())
                .collect(),
        );
        Theme {
            subject: "outdoor retail".to_string(),
            company_name: "Summit Outfitters".to_string(),
            notes: vec!["Prices in USD.".to_string()],
            vocabularies,
            vocabulary_sample: 2,
        }
    }

    fn schema() -> RecordSchema {
        RecordSchema {
            name: "products".to_string(),
            description: None,
            natural_key: NaturalKey::single("name", KeyMatching::Exact),
            fields: vec![FieldSpec::new(
                "name",
                FieldKind::String {
                    format: None,
                    max_length: None,
                },
            )],
            constraints: Vec::new(),
        }
    }

    #[test]
    fn same_seed_samples_same_vocabulary() {
        let mut first = ChaCha8Rng::seed_from_u64(7);
        let mut second = ChaCha8Rng::seed_from_u64(7);
        let a = sample_vocabularies(&theme(), &mut first);
        let b = sample_vocabularies(&theme(), &mut second);

        assert_eq!(a, b);
        assert_eq!(a[0].1.len(), 2);
    }

    #[test]
    fn prompt_carries_theme_guide_count_and_exclusions() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let prompt = build_prompt(
            &schema(),
            &theme(),
            Some("Use outdoor brand-style names."),
            5,
            "Do not reuse any of these values (already used): Trail Tent.",
            &mut rng,
        );

        assert!(prompt.starts_with("Generate 5 realistic products records for Summit Outfitters"));
        assert!(prompt.contains("Prices in USD."));
        assert!(prompt.contains("- product lines: "));
        assert!(prompt.contains("- name (string, required)"));
        assert!(prompt.contains("Use outdoor brand-style names."));
        assert!(prompt.contains("Trail Tent"));
        assert!(prompt.contains("exactly 5 objects"));
    }
}

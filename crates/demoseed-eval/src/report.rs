use crate::metrics::AuditMetrics;
use crate::model::Violation;

/// Render a deterministic markdown report from metrics and violations.
pub fn render_report(metrics: &AuditMetrics, violations: &[Violation], max_examples: usize) -> String {
    let mut lines = Vec::new();

    lines.push("# Demoseed Record Audit".to_string());
    lines.push(String::new());
    lines.push("## Summary".to_string());
    lines.push(format!("- record_type: {}", metrics.record_type));
    if !metrics.source.is_empty() {
        lines.push(format!("- source: {}", metrics.source));
    }
    lines.push(format!("- records: {}", metrics.records));
    lines.push(format!("- valid: {}", metrics.valid));
    lines.push(format!("- invalid: {}", metrics.invalid));
    lines.push(format!("- duplicate_keys: {}", metrics.duplicate_keys));
    lines.push(format!("- missing_keys: {}", metrics.missing_keys));
    lines.push(String::new());

    if !metrics.violations_by_kind.is_empty() {
        lines.push("## Invalid records by kind".to_string());
        lines.push("| kind | records |".to_string());
        lines.push("| --- | --- |".to_string());
        for (kind, count) in &metrics.violations_by_kind {
            lines.push(format!("| {kind} | {count} |"));
        }
        lines.push(String::new());
    }

    lines.push("## Field population".to_string());
    lines.push("| field | required | populated | observed_pct | target_pct |".to_string());
    lines.push("| --- | --- | --- | --- | --- |".to_string());
    for field in &metrics.fields {
        let target = field
            .target_pct
            .map(|pct| pct.to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "| {} | {} | {} | {:.1} | {} |",
            field.field, field.required, field.populated, field.population_pct, target
        ));
    }
    lines.push(String::new());

    if !metrics.warnings.is_empty() {
        lines.push("## Warnings".to_string());
        for warning in &metrics.warnings {
            let hint = warning
                .hint
                .as_ref()
                .map(|hint| format!(" (hint: {hint})"))
                .unwrap_or_default();
            lines.push(format!("- {}: {}{}", warning.path, warning.message, hint));
        }
        lines.push(String::new());
    }

    if !violations.is_empty() {
        lines.push("## Top violations".to_string());
        for violation in violations.iter().take(max_examples) {
            let example = violation
                .example
                .as_ref()
                .map(|value| format!(" example={value}"))
                .unwrap_or_default();
            lines.push(format!(
                "- record {} {} [{}]: {}{}",
                violation.record_index, violation.path, violation.code, violation.message, example
            ));
        }
        if violations.len() > max_examples {
            lines.push(format!("- ... {} more", violations.len() - max_examples));
        }
        lines.push(String::new());
    }

    lines.push("## Recommendations".to_string());
    lines.extend(recommendations(metrics));
    lines.join("\n")
}

fn recommendations(metrics: &AuditMetrics) -> Vec<String> {
    let mut lines = Vec::new();
    if metrics.invalid > 0 {
        lines.push("- tighten field hints for the failing fields, or regenerate.".to_string());
    }
    if metrics.duplicate_keys > 0 {
        lines.push("- remove duplicates before seeding; later copies would be skipped or overwrite earlier ones.".to_string());
    }
    if metrics.missing_keys > 0 {
        lines.push("- records without a natural key cannot be seeded idempotently.".to_string());
    }
    if metrics
        .warnings
        .iter()
        .any(|warning| warning.code == "population_off_target")
    {
        lines.push("- review populate_pct targets against the observed population.".to_string());
    }
    if lines.is_empty() {
        lines.push("- no problems detected; the record set is ready to seed.".to_string());
    }
    lines
}

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::batch;
use crate::models::{BatchResultRow, Label};
use crate::roles::{Capability, RoleCapabilities};

/// Pass/fail counts per uploaded department name, most students first.
pub fn label_mix(rows: &[BatchResultRow]) -> Vec<(String, usize, usize)> {
    let mut map: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for row in rows {
        let Some(prediction) = row.prediction() else {
            continue;
        };
        let entry = map.entry(row.department.as_str()).or_insert((0, 0));
        match prediction.label {
            Label::Pass => entry.0 += 1,
            Label::Fail => entry.1 += 1,
        }
    }

    let mut mix: Vec<(String, usize, usize)> = map
        .into_iter()
        .map(|(department, (pass, fail))| (department.to_string(), pass, fail))
        .collect();
    mix.sort_by(|a, b| (b.1 + b.2).cmp(&(a.1 + a.2)));
    mix
}

pub fn build_report(
    scope: Option<&str>,
    capabilities: &RoleCapabilities,
    rows: &[BatchResultRow],
    generated_at: DateTime<Utc>,
) -> String {
    let summary = batch::summarize(rows);
    let mix = label_mix(rows);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("uploaded students");

    let _ = writeln!(output, "# Graduation Prediction Report");
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        scope_label,
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Rows: {}", summary.total);
    let _ = writeln!(output, "- Valid predictions: {}", summary.valid);
    let _ = writeln!(output, "- Rows with errors: {}", summary.errors);
    let _ = writeln!(output, "- LULUS: {}", summary.pass);
    let _ = writeln!(output, "- TIDAK LULUS: {}", summary.fail);
    match summary.mean_confidence {
        Some(confidence) => {
            let _ = writeln!(output, "- Mean confidence: {:.2}", confidence);
        }
        None => {
            let _ = writeln!(output, "- Mean confidence: n/a");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcome by Department");

    if mix.is_empty() {
        let _ = writeln!(output, "No valid predictions in this upload.");
    } else {
        for (department, pass, fail) in mix.iter() {
            let _ = writeln!(
                output,
                "- {}: {} LULUS, {} TIDAK LULUS",
                department, pass, fail
            );
        }
    }

    if capabilities.allows(Capability::AdvancedAnalysis) {
        let breakdown = batch::department_breakdown(rows);
        let _ = writeln!(output);
        let _ = writeln!(output, "## Advanced Analysis");

        if breakdown.is_empty() {
            let _ = writeln!(output, "No valid predictions in this upload.");
        } else {
            let _ = writeln!(
                output,
                "| Department | Students | Pass rate | Academic perf. | Engagement | Study eff. | Credits/term |"
            );
            let _ = writeln!(output, "|---|---|---|---|---|---|---|");
            for group in breakdown.iter() {
                let _ = writeln!(
                    output,
                    "| {} | {} | {:.0}% | {:.2} | {:.2} | {:.3} | {:.2} |",
                    group.department,
                    group.students,
                    group.passed as f64 * 100.0 / group.students as f64,
                    group.mean_features.academic_performance,
                    group.mean_features.engagement_score,
                    group.mean_features.study_efficiency,
                    group.mean_features.credits_per_term
                );
            }
        }
    }

    let errors: Vec<&BatchResultRow> = rows.iter().filter(|row| !row.is_valid()).collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Rejected Rows");

    if errors.is_empty() {
        let _ = writeln!(output, "Every row was predicted.");
    } else {
        for row in errors.iter() {
            let _ = writeln!(
                output,
                "- Row {} ({}, {}): {}",
                row.row_index + 1,
                row.name,
                row.nim,
                row.error().unwrap_or_default()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawStudentRow;
    use crate::roles::Role;
    use chrono::TimeZone;

    fn raw(nim: &str, department: &str, gpa: &str) -> RawStudentRow {
        RawStudentRow {
            name: Some(format!("Student {nim}")),
            nim: Some(nim.to_string()),
            department: Some(department.to_string()),
            gpa: Some(gpa.to_string()),
            credits: Some("144".to_string()),
            avg_score: Some("80".to_string()),
            attendance: Some("85".to_string()),
            assignments: Some("15".to_string()),
            evaluation_score: Some("4.0".to_string()),
            duration_terms: Some("8".to_string()),
            encoding_error: None,
        }
    }

    fn sample_rows() -> Vec<BatchResultRow> {
        batch::run(&[
            raw("001", "Manajemen", "3.2"),
            raw("002", "Manajemen", "1.7"),
            raw("003", "Akuntansi", "2.9"),
            raw("004", "Kedokteran", "3.0"),
        ])
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 9, 30, 0).unwrap()
    }

    #[test]
    fn mix_orders_departments_by_size() {
        let mix = label_mix(&sample_rows());
        assert_eq!(
            mix,
            vec![
                ("Manajemen".to_string(), 1, 1),
                ("Akuntansi".to_string(), 1, 0),
            ]
        );
    }

    #[test]
    fn report_lists_summary_and_rejected_rows() {
        let report = build_report(
            Some("Angkatan 2022"),
            &Role::Student.capabilities(),
            &sample_rows(),
            generated_at(),
        );
        assert!(report.contains("Generated for Angkatan 2022 on 2026-02-02 09:30 UTC"));
        assert!(report.contains("- Valid predictions: 3"));
        assert!(report.contains("- Mean confidence: 1.00"));
        assert!(report.contains("- Manajemen: 1 LULUS, 1 TIDAK LULUS"));
        assert!(report.contains(
            "- Row 4 (Student 004, 004): Department \"Kedokteran\" is not recognized"
        ));
        assert!(!report.contains("## Advanced Analysis"));
    }

    #[test]
    fn advanced_section_follows_role() {
        let report = build_report(
            None,
            &Role::Instructor.capabilities(),
            &sample_rows(),
            generated_at(),
        );
        assert!(report.contains("## Advanced Analysis"));
        assert!(report.contains("| Manajemen | 2 | 50% |"));
    }
}

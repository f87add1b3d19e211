use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::RowError;
use crate::models::{
    BatchResultRow, Department, DerivedFeatures, Label, RawStudentRow, RowOutcome, StudentRecord,
};
use crate::rule;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub valid: usize,
    pub errors: usize,
    pub pass: usize,
    pub fail: usize,
    pub mean_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentBreakdown {
    pub department: Department,
    pub code: u8,
    pub students: usize,
    pub passed: usize,
    pub mean_features: DerivedFeatures,
}

/// Predicts every uploaded row. The output has one row per input row, in
/// input order; a failing row becomes an error row and the batch continues.
pub fn run(rows: &[RawStudentRow]) -> Vec<BatchResultRow> {
    let results: Vec<BatchResultRow> = rows
        .iter()
        .enumerate()
        .map(|(row_index, raw)| process_row(row_index, raw))
        .collect();

    let valid = results.iter().filter(|row| row.is_valid()).count();
    info!(
        rows = results.len(),
        valid,
        errors = results.len() - valid,
        "batch prediction complete"
    );
    results
}

fn process_row(row_index: usize, raw: &RawStudentRow) -> BatchResultRow {
    let name = text(&raw.name);
    let nim = text(&raw.nim);
    let department = text(&raw.department);

    let outcome = match coerce(raw) {
        Ok(record) => RowOutcome::Predicted {
            gpa: record.gpa,
            prediction: rule::predict(&record),
        },
        Err(err) => {
            warn!(row = row_index, nim = %nim, error = %err, "row rejected");
            RowOutcome::Failed {
                error: err.to_string(),
            }
        }
    };

    BatchResultRow {
        row_index,
        name,
        nim,
        department,
        outcome,
    }
}

/// Converts a raw spreadsheet row into a typed record. The department is
/// resolved before any numeric field is looked at.
pub fn coerce(raw: &RawStudentRow) -> Result<StudentRecord, RowError> {
    if let Some(column) = &raw.encoding_error {
        return Err(RowError::InvalidEncoding {
            column: column.clone(),
        });
    }

    let department_name = text(&raw.department);
    let department = Department::lookup(&department_name)
        .ok_or(RowError::UnrecognizedDepartment(department_name))?;

    let record = StudentRecord {
        name: text(&raw.name),
        nim: text(&raw.nim),
        department,
        gpa: parse_float(&raw.gpa, "IPK")?,
        credits: parse_int(&raw.credits, "Jumlah_SKS")?,
        avg_score: parse_float(&raw.avg_score, "Nilai_Mata_Kuliah")?,
        attendance: parse_float(&raw.attendance, "Jumlah_Kehadiran")?,
        assignments: parse_int(&raw.assignments, "Jumlah_Tugas")?,
        evaluation_score: parse_float(&raw.evaluation_score, "Skor_Evaluasi")?,
        duration_terms: parse_int(&raw.duration_terms, "Lama_Studi")?,
    };
    record.validate()?;
    Ok(record)
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, RowError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RowError::MissingField { field }),
    }
}

fn parse_float(value: &Option<String>, field: &'static str) -> Result<f64, RowError> {
    let raw = required(value, field)?;
    raw.parse::<f64>().map_err(|e| RowError::InvalidNumber {
        field,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

// Spreadsheets export whole numbers as "8.0"; those truncate toward zero.
fn parse_int(value: &Option<String>, field: &'static str) -> Result<i64, RowError> {
    let raw = required(value, field)?;
    match raw.parse::<i64>() {
        Ok(parsed) => Ok(parsed),
        Err(int_err) => match raw.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => Ok(parsed.trunc() as i64),
            _ => Err(RowError::InvalidNumber {
                field,
                value: raw.to_string(),
                reason: int_err.to_string(),
            }),
        },
    }
}

pub fn summarize(rows: &[BatchResultRow]) -> BatchSummary {
    let mut summary = BatchSummary {
        total: rows.len(),
        valid: 0,
        errors: 0,
        pass: 0,
        fail: 0,
        mean_confidence: None,
    };
    let mut confidence_total = 0.0;

    for row in rows {
        match row.prediction() {
            Some(prediction) => {
                summary.valid += 1;
                confidence_total += prediction.confidence;
                match prediction.label {
                    Label::Pass => summary.pass += 1,
                    Label::Fail => summary.fail += 1,
                }
            }
            None => summary.errors += 1,
        }
    }

    if summary.valid > 0 {
        summary.mean_confidence = Some(confidence_total / summary.valid as f64);
    }
    summary
}

pub fn filter_by_label<'a>(
    rows: impl IntoIterator<Item = &'a BatchResultRow>,
    label: Label,
) -> Vec<&'a BatchResultRow> {
    rows.into_iter()
        .filter(|row| row.prediction().is_some_and(|p| p.label == label))
        .collect()
}

pub fn filter_by_department<'a>(
    rows: impl IntoIterator<Item = &'a BatchResultRow>,
    department: &str,
) -> Vec<&'a BatchResultRow> {
    rows.into_iter()
        .filter(|row| row.is_valid() && row.department == department)
        .collect()
}

/// Per-department pass counts and feature means over the valid rows,
/// ordered by department code.
pub fn department_breakdown(rows: &[BatchResultRow]) -> Vec<DepartmentBreakdown> {
    let mut groups: BTreeMap<Department, (usize, usize, [f64; 4])> = BTreeMap::new();

    for row in rows {
        let (Some(prediction), Some(department)) =
            (row.prediction(), Department::lookup(&row.department))
        else {
            continue;
        };
        let entry = groups.entry(department).or_insert((0, 0, [0.0; 4]));
        entry.0 += 1;
        if prediction.label == Label::Pass {
            entry.1 += 1;
        }
        entry.2[0] += prediction.features.academic_performance;
        entry.2[1] += prediction.features.engagement_score;
        entry.2[2] += prediction.features.study_efficiency;
        entry.2[3] += prediction.features.credits_per_term;
    }

    groups
        .into_iter()
        .map(|(department, (students, passed, sums))| {
            let n = students as f64;
            DepartmentBreakdown {
                department,
                code: department.code(),
                students,
                passed,
                mean_features: DerivedFeatures {
                    academic_performance: sums[0] / n,
                    engagement_score: sums[1] / n,
                    study_efficiency: sums[2] / n,
                    credits_per_term: sums[3] / n,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(nim: &str, department: &str, gpa: &str) -> RawStudentRow {
        RawStudentRow {
            name: Some(format!("Student {nim}")),
            nim: Some(nim.to_string()),
            department: Some(department.to_string()),
            gpa: Some(gpa.to_string()),
            credits: Some("144".to_string()),
            avg_score: Some("85".to_string()),
            attendance: Some("90".to_string()),
            assignments: Some("20".to_string()),
            evaluation_score: Some("4.5".to_string()),
            duration_terms: Some("8".to_string()),
            encoding_error: None,
        }
    }

    #[test]
    fn output_matches_input_length_and_order() {
        let rows = vec![
            raw("001", "Teknik Informatika", "3.5"),
            raw("002", "Kedokteran", "3.0"),
            raw("003", "Manajemen", "1.9"),
        ];
        let results = run(&rows);
        assert_eq!(results.len(), 3);
        let nims: Vec<&str> = results.iter().map(|r| r.nim.as_str()).collect();
        assert_eq!(nims, ["001", "002", "003"]);
        let indexes: Vec<usize> = results.iter().map(|r| r.row_index).collect();
        assert_eq!(indexes, [0, 1, 2]);
    }

    #[test]
    fn reference_row_predicts_pass_with_features() {
        let results = run(&[raw("001", "Teknik Informatika", "3.5")]);
        let prediction = results[0].prediction().unwrap();
        assert_eq!(prediction.label, Label::Pass);
        assert!((prediction.features.academic_performance - 2.44).abs() < 1e-9);
        assert!((prediction.features.engagement_score - 69.0).abs() < 1e-9);
        assert!((prediction.features.study_efficiency - 0.4375).abs() < 1e-9);
        assert!((prediction.features.credits_per_term - 18.0).abs() < 1e-9);
        assert_eq!(results[0].error(), None);
    }

    #[test]
    fn unknown_department_yields_error_row_only() {
        let results = run(&[raw("002", "Kedokteran", "not-a-number")]);
        assert_eq!(
            results[0].error(),
            Some("Department \"Kedokteran\" is not recognized")
        );
        assert!(results[0].prediction().is_none());
    }

    #[test]
    fn malformed_row_does_not_disturb_neighbours() {
        let clean = vec![
            raw("001", "Teknik Informatika", "3.5"),
            raw("003", "Akuntansi", "1.8"),
        ];
        let mixed = vec![
            raw("001", "Teknik Informatika", "3.5"),
            raw("002", "Sistem Informasi", "abc"),
            raw("003", "Akuntansi", "1.8"),
        ];

        let baseline = run(&clean);
        let results = run(&mixed);

        assert_eq!(results.iter().filter(|r| !r.is_valid()).count(), 1);
        let error = results[1].error().unwrap();
        assert!(error.contains("IPK"), "unexpected error: {error}");
        assert_eq!(results[0].outcome, baseline[0].outcome);
        assert_eq!(results[2].outcome, baseline[1].outcome);
    }

    #[test]
    fn missing_and_non_finite_values_are_rejected() {
        let mut missing = raw("004", "Manajemen", "3.0");
        missing.duration_terms = Some("  ".to_string());
        assert_eq!(
            coerce(&missing),
            Err(RowError::MissingField {
                field: "Lama_Studi"
            })
        );

        let nan = raw("005", "Manajemen", "NaN");
        assert!(matches!(
            coerce(&nan),
            Err(RowError::InvalidNumber { field: "IPK", .. })
        ));
    }

    #[test]
    fn integer_fields_accept_spreadsheet_floats() {
        let mut row = raw("006", "Teknik Elektro", "2.8");
        row.credits = Some("144.0".to_string());
        row.duration_terms = Some("8.0".to_string());
        let record = coerce(&row).unwrap();
        assert_eq!(record.credits, 144);
        assert_eq!(record.duration_terms, 8);

        row.assignments = Some("twenty".to_string());
        assert!(matches!(
            coerce(&row),
            Err(RowError::InvalidNumber {
                field: "Jumlah_Tugas",
                ..
            })
        ));
    }

    #[test]
    fn zero_duration_still_predicts() {
        let mut row = raw("007", "Akuntansi", "3.1");
        row.duration_terms = Some("0".to_string());
        let results = run(&[row]);
        let prediction = results[0].prediction().unwrap();
        assert_eq!(prediction.features.study_efficiency, 0.0);
        assert_eq!(prediction.features.credits_per_term, 0.0);
    }

    #[test]
    fn summary_counts_valid_rows_by_label() {
        let results = run(&[
            raw("001", "Teknik Informatika", "3.5"),
            raw("002", "Kedokteran", "3.0"),
            raw("003", "Manajemen", "1.9"),
            raw("004", "Manajemen", "2.4"),
        ]);
        let summary = summarize(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.pass, 2);
        assert_eq!(summary.fail, 1);
        assert_eq!(summary.mean_confidence, Some(1.0));
    }

    #[test]
    fn empty_upload_yields_empty_table() {
        let results = run(&[]);
        assert!(results.is_empty());
        let summary = summarize(&results);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.valid, 0);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.mean_confidence, None);
        assert!(department_breakdown(&results).is_empty());
    }

    #[test]
    fn encoding_error_becomes_error_row() {
        let mut bad = raw("002", "Manajemen", "3.0");
        bad.encoding_error = Some("Nama Lengkap".to_string());
        let results = run(&[
            raw("001", "Teknik Informatika", "3.5"),
            bad,
            raw("003", "Akuntansi", "2.5"),
        ]);
        assert_eq!(results.len(), 3);
        assert_eq!(
            results[1].error(),
            Some("column Nama Lengkap is not valid UTF-8")
        );
        assert!(results[0].is_valid());
        assert!(results[2].is_valid());
    }

    #[test]
    fn summary_of_all_errors_has_no_mean() {
        let results = run(&[raw("002", "Kedokteran", "3.0")]);
        let summary = summarize(&results);
        assert_eq!(summary.valid, 0);
        assert_eq!(summary.mean_confidence, None);
    }

    #[test]
    fn filters_slice_valid_rows() {
        let results = run(&[
            raw("001", "Manajemen", "3.5"),
            raw("002", "Manajemen", "1.0"),
            raw("003", "Akuntansi", "3.2"),
            raw("004", "Manajemen", "x"),
        ]);
        let passed = filter_by_label(&results, Label::Pass);
        assert_eq!(passed.len(), 2);
        let manajemen = filter_by_department(&results, "Manajemen");
        assert_eq!(manajemen.len(), 2);
        assert!(manajemen.iter().all(|r| r.is_valid()));
        let chained = filter_by_label(manajemen, Label::Pass);
        assert_eq!(chained.len(), 1);
        assert_eq!(chained[0].nim, "001");
    }

    #[test]
    fn breakdown_groups_by_department_code() {
        let results = run(&[
            raw("001", "Manajemen", "3.0"),
            raw("002", "Teknik Informatika", "1.0"),
            raw("003", "Manajemen", "2.0"),
        ]);
        let breakdown = department_breakdown(&results);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].department, Department::TeknikInformatika);
        assert_eq!(breakdown[1].department, Department::Manajemen);
        assert_eq!(breakdown[1].code, 2);
        assert_eq!(breakdown[1].students, 2);
        assert_eq!(breakdown[1].passed, 1);
        assert!((breakdown[1].mean_features.study_efficiency - 0.3125).abs() < 1e-9);
    }
}

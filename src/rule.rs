use crate::models::{Label, PredictionResult, StudentRecord};

/// GPA strictly above this value is labelled as graduating.
pub const PASS_GPA_THRESHOLD: f64 = 2.0;

/// Outcome of the GPA threshold. Probabilities are always the degenerate
/// pair matching the label, so confidence is always 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionOutcome {
    pub label: Label,
    pub pass_probability: f64,
    pub fail_probability: f64,
    pub confidence: f64,
}

pub fn classify(gpa: f64) -> PredictionOutcome {
    let label = if gpa > PASS_GPA_THRESHOLD {
        Label::Pass
    } else {
        Label::Fail
    };

    let (pass_probability, fail_probability) = match label {
        Label::Pass => (1.0, 0.0),
        Label::Fail => (0.0, 1.0),
    };

    PredictionOutcome {
        label,
        pass_probability,
        fail_probability,
        confidence: f64::max(pass_probability, fail_probability),
    }
}

pub fn predict(record: &StudentRecord) -> PredictionResult {
    let outcome = classify(record.gpa);
    PredictionResult {
        label: outcome.label,
        pass_probability: outcome.pass_probability,
        fail_probability: outcome.fail_probability,
        confidence: outcome.confidence,
        features: record.features(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Department;

    fn record(gpa: f64) -> StudentRecord {
        StudentRecord {
            name: "Budi Santoso".to_string(),
            nim: "2019001".to_string(),
            department: Department::TeknikInformatika,
            gpa,
            credits: 144,
            avg_score: 85.0,
            attendance: 90.0,
            assignments: 20,
            evaluation_score: 4.2,
            duration_terms: 8,
        }
    }

    #[test]
    fn gpa_above_threshold_passes() {
        for gpa in [2.01, 2.5, 3.5, 4.0] {
            let outcome = classify(gpa);
            assert_eq!(outcome.label, Label::Pass);
            assert_eq!(outcome.pass_probability, 1.0);
            assert_eq!(outcome.fail_probability, 0.0);
            assert_eq!(outcome.confidence, 1.0);
        }
    }

    #[test]
    fn gpa_at_or_below_threshold_fails() {
        for gpa in [0.0, 1.8, 2.0] {
            let outcome = classify(gpa);
            assert_eq!(outcome.label, Label::Fail);
            assert_eq!(outcome.pass_probability, 0.0);
            assert_eq!(outcome.fail_probability, 1.0);
            assert_eq!(outcome.confidence, 1.0);
        }
    }

    #[test]
    fn prediction_carries_features() {
        let result = predict(&record(3.5));
        assert_eq!(result.label, Label::Pass);
        assert!((result.features.academic_performance - 2.44).abs() < 1e-9);
        assert!((result.features.credits_per_term - 18.0).abs() < 1e-9);
    }

    #[test]
    fn low_gpa_fails_regardless_of_other_fields() {
        let mut strong = record(1.8);
        strong.avg_score = 100.0;
        strong.attendance = 100.0;
        strong.assignments = 50;
        let result = predict(&strong);
        assert_eq!(result.label, Label::Fail);
        assert_eq!(result.fail_probability, 1.0);
    }
}

use crate::models::{DerivedFeatures, StudentRecord};

/// Computes the display features shown next to every prediction.
///
/// The two per-term ratios are 0 when `duration_terms` is not positive.
pub fn derive_features(
    gpa: f64,
    avg_score: f64,
    attendance: f64,
    assignments: i64,
    credits: i64,
    duration_terms: i64,
) -> DerivedFeatures {
    let (study_efficiency, credits_per_term) = if duration_terms > 0 {
        let terms = duration_terms as f64;
        (gpa / terms, credits as f64 / terms)
    } else {
        (0.0, 0.0)
    };

    DerivedFeatures {
        academic_performance: gpa * 0.6 + avg_score * 0.4 / 100.0,
        engagement_score: attendance * 0.7 + assignments as f64 * 0.3,
        study_efficiency,
        credits_per_term,
    }
}

impl StudentRecord {
    pub fn features(&self) -> DerivedFeatures {
        derive_features(
            self.gpa,
            self.avg_score,
            self.attendance,
            self.assignments,
            self.credits,
            self.duration_terms,
        )
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RowError;

/// The five study programmes the dashboard recognizes, with their fixed
/// numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Department {
    #[serde(rename = "Teknik Informatika")]
    TeknikInformatika,
    #[serde(rename = "Sistem Informasi")]
    SistemInformasi,
    #[serde(rename = "Manajemen")]
    Manajemen,
    #[serde(rename = "Akuntansi")]
    Akuntansi,
    #[serde(rename = "Teknik Elektro")]
    TeknikElektro,
}

impl Department {
    pub const ALL: [Department; 5] = [
        Department::TeknikInformatika,
        Department::SistemInformasi,
        Department::Manajemen,
        Department::Akuntansi,
        Department::TeknikElektro,
    ];

    /// Exact-name lookup against the department table.
    pub fn lookup(name: &str) -> Option<Department> {
        Self::ALL.into_iter().find(|dept| dept.name() == name)
    }

    pub fn code(self) -> u8 {
        match self {
            Department::TeknikInformatika => 0,
            Department::SistemInformasi => 1,
            Department::Manajemen => 2,
            Department::Akuntansi => 3,
            Department::TeknikElektro => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Department::TeknikInformatika => "Teknik Informatika",
            Department::SistemInformasi => "Sistem Informasi",
            Department::Manajemen => "Manajemen",
            Department::Akuntansi => "Akuntansi",
            Department::TeknikElektro => "Teknik Elektro",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed transcript row. Column names follow the upload template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(rename = "Nama Lengkap")]
    pub name: String,
    #[serde(rename = "NIM")]
    pub nim: String,
    #[serde(rename = "Jurusan")]
    pub department: Department,
    #[serde(rename = "IPK")]
    pub gpa: f64,
    #[serde(rename = "Jumlah_SKS")]
    pub credits: i64,
    #[serde(rename = "Nilai_Mata_Kuliah")]
    pub avg_score: f64,
    #[serde(rename = "Jumlah_Kehadiran")]
    pub attendance: f64,
    #[serde(rename = "Jumlah_Tugas")]
    pub assignments: i64,
    #[serde(rename = "Skor_Evaluasi")]
    pub evaluation_score: f64,
    #[serde(rename = "Lama_Studi")]
    pub duration_terms: i64,
}

impl StudentRecord {
    /// Rejects NaN and infinite values in the float columns. Uploads, form
    /// input and stored transcripts all go through this check.
    pub fn validate(&self) -> Result<(), RowError> {
        let floats = [
            ("IPK", self.gpa),
            ("Nilai_Mata_Kuliah", self.avg_score),
            ("Jumlah_Kehadiran", self.attendance),
            ("Skor_Evaluasi", self.evaluation_score),
        ];
        for (field, value) in floats {
            if !value.is_finite() {
                return Err(RowError::InvalidNumber {
                    field,
                    value: value.to_string(),
                    reason: "value is not a finite number".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// An uploaded spreadsheet row before any coercion.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawStudentRow {
    #[serde(rename = "Nama Lengkap")]
    pub name: Option<String>,
    #[serde(rename = "NIM")]
    pub nim: Option<String>,
    #[serde(rename = "Jurusan")]
    pub department: Option<String>,
    #[serde(rename = "IPK")]
    pub gpa: Option<String>,
    #[serde(rename = "Jumlah_SKS")]
    pub credits: Option<String>,
    #[serde(rename = "Nilai_Mata_Kuliah")]
    pub avg_score: Option<String>,
    #[serde(rename = "Jumlah_Kehadiran")]
    pub attendance: Option<String>,
    #[serde(rename = "Jumlah_Tugas")]
    pub assignments: Option<String>,
    #[serde(rename = "Skor_Evaluasi")]
    pub evaluation_score: Option<String>,
    #[serde(rename = "Lama_Studi")]
    pub duration_terms: Option<String>,
    /// First column whose cell was not valid UTF-8, if any.
    #[serde(skip)]
    pub encoding_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub academic_performance: f64,
    pub engagement_score: f64,
    pub study_efficiency: f64,
    pub credits_per_term: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "LULUS")]
    Pass,
    #[serde(rename = "TIDAK LULUS")]
    Fail,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Pass => "LULUS",
            Label::Fail => "TIDAK LULUS",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "LULUS" | "PASS" => Ok(Label::Pass),
            "TIDAK LULUS" | "FAIL" => Ok(Label::Fail),
            other => Err(format!("unknown label \"{other}\" (expected LULUS or TIDAK LULUS)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub label: Label,
    pub pass_probability: f64,
    pub fail_probability: f64,
    pub confidence: f64,
    #[serde(flatten)]
    pub features: DerivedFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Predicted { gpa: f64, prediction: PredictionResult },
    Failed { error: String },
}

/// One line of the batch result table. `name`, `nim` and `department` are
/// carried as uploaded, best effort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResultRow {
    pub row_index: usize,
    pub name: String,
    pub nim: String,
    pub department: String,
    pub outcome: RowOutcome,
}

impl BatchResultRow {
    pub fn prediction(&self) -> Option<&PredictionResult> {
        match &self.outcome {
            RowOutcome::Predicted { prediction, .. } => Some(prediction),
            RowOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RowOutcome::Predicted { .. } => None,
            RowOutcome::Failed { error } => Some(error),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error().is_none()
    }
}

/// Flat export layout of a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Nama Lengkap")]
    pub name: String,
    #[serde(rename = "NIM")]
    pub nim: String,
    #[serde(rename = "Jurusan")]
    pub department: String,
    #[serde(rename = "IPK")]
    pub gpa: Option<f64>,
    #[serde(rename = "Prediksi")]
    pub label: Option<Label>,
    #[serde(rename = "Probabilitas_Lulus")]
    pub pass_probability: Option<f64>,
    #[serde(rename = "Probabilitas_Tidak_Lulus")]
    pub fail_probability: Option<f64>,
    #[serde(rename = "Confidence")]
    pub confidence: Option<f64>,
    #[serde(rename = "Academic_Performance")]
    pub academic_performance: Option<f64>,
    #[serde(rename = "Engagement_Score")]
    pub engagement_score: Option<f64>,
    #[serde(rename = "Study_Efficiency")]
    pub study_efficiency: Option<f64>,
    #[serde(rename = "Credits_Per_Semester")]
    pub credits_per_term: Option<f64>,
    #[serde(rename = "Error")]
    pub error: String,
}

impl From<&BatchResultRow> for ExportRow {
    fn from(row: &BatchResultRow) -> Self {
        let mut export = ExportRow {
            name: row.name.clone(),
            nim: row.nim.clone(),
            department: row.department.clone(),
            gpa: None,
            label: None,
            pass_probability: None,
            fail_probability: None,
            confidence: None,
            academic_performance: None,
            engagement_score: None,
            study_efficiency: None,
            credits_per_term: None,
            error: String::new(),
        };

        match &row.outcome {
            RowOutcome::Predicted { gpa, prediction } => {
                export.gpa = Some(*gpa);
                export.label = Some(prediction.label);
                export.pass_probability = Some(prediction.pass_probability);
                export.fail_probability = Some(prediction.fail_probability);
                export.confidence = Some(prediction.confidence);
                export.academic_performance = Some(prediction.features.academic_performance);
                export.engagement_score = Some(prediction.features.engagement_score);
                export.study_efficiency = Some(prediction.features.study_efficiency);
                export.credits_per_term = Some(prediction.features.credits_per_term);
            }
            RowOutcome::Failed { error } => export.error = error.clone(),
        }

        export
    }
}

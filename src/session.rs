use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::batch;
use crate::curriculum::{CurriculumMapping, CurriculumTable};
use crate::error::SessionError;
use crate::models::{BatchResultRow, PredictionResult, RawStudentRow, StudentRecord};
use crate::roles::{Capability, Role, RoleCapabilities};
use crate::rule;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub role: Role,
    pub action: String,
}

/// State of one user session: the loaded tables, the edit flag, the
/// prediction counter and the activity log. Handlers borrow it mutably.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    role: Role,
    records: Vec<StudentRecord>,
    mappings: CurriculumTable,
    predictions_made: u32,
    dirty: bool,
    activity: Vec<ActivityEntry>,
}

impl Session {
    pub fn new(role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            records: Vec::new(),
            mappings: CurriculumTable::default(),
            predictions_made: 0,
            dirty: false,
            activity: Vec::new(),
        }
    }

    /// Loads a transcript table, replacing whatever the session held.
    pub fn load_records(&mut self, records: Vec<StudentRecord>) {
        self.log(format!("loaded {} student records", records.len()));
        self.records = records;
        self.dirty = false;
    }

    pub fn load_mappings(&mut self, mappings: CurriculumTable) {
        self.log(format!("loaded {} curriculum mappings", mappings.len()));
        self.mappings = mappings;
        self.dirty = false;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn capabilities(&self) -> RoleCapabilities {
        self.role.capabilities()
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn mappings(&self) -> &CurriculumTable {
        &self.mappings
    }

    pub fn predictions_made(&self) -> u32 {
        self.predictions_made
    }

    /// True once a table was edited and not yet exported.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_exported(&mut self) {
        self.dirty = false;
        self.log("exported tables");
    }

    pub fn activity(&self) -> &[ActivityEntry] {
        &self.activity
    }

    pub fn require(&self, capability: Capability) -> Result<(), SessionError> {
        if self.capabilities().allows(capability) {
            return Ok(());
        }
        warn!(session = %self.id, role = %self.role, action = capability.action(), "permission denied");
        Err(SessionError::PermissionDenied {
            role: self.role,
            action: capability.action(),
        })
    }

    pub fn find_record(&self, nim: &str) -> Result<&StudentRecord, SessionError> {
        self.records
            .iter()
            .find(|record| record.nim == nim)
            .ok_or_else(|| SessionError::RecordNotFound(nim.to_string()))
    }

    /// Single prediction for a stored transcript.
    pub fn predict_nim(&mut self, nim: &str) -> Result<(StudentRecord, PredictionResult), SessionError> {
        let record = self.find_record(nim)?.clone();
        let prediction = self.predict_record(&record)?;
        Ok((record, prediction))
    }

    /// Predicts each NIM in turn and stops at the first failure. Predictions
    /// made before the failure are returned alongside it.
    pub fn predict_nims<'a>(
        &mut self,
        nims: impl IntoIterator<Item = &'a str>,
    ) -> (Vec<(StudentRecord, PredictionResult)>, Option<SessionError>) {
        let mut predictions = Vec::new();
        for nim in nims {
            match self.predict_nim(nim) {
                Ok(prediction) => predictions.push(prediction),
                Err(err) => return (predictions, Some(err)),
            }
        }
        (predictions, None)
    }

    /// Single prediction for form input. Counts against the role's limit.
    pub fn predict_record(&mut self, record: &StudentRecord) -> Result<PredictionResult, SessionError> {
        record.validate()?;
        if let Some(limit) = self.capabilities().prediction_limit {
            if self.predictions_made >= limit {
                warn!(session = %self.id, role = %self.role, limit, "prediction limit reached");
                return Err(SessionError::PredictionLimitReached {
                    role: self.role,
                    limit,
                });
            }
        }

        let prediction = rule::predict(record);
        self.predictions_made += 1;
        self.log(format!("predicted {} as {}", record.nim, prediction.label));
        Ok(prediction)
    }

    pub fn run_batch(&mut self, rows: &[RawStudentRow]) -> Result<Vec<BatchResultRow>, SessionError> {
        self.require(Capability::BatchUpload)?;
        let results = batch::run(rows);
        self.log(format!("batch prediction over {} rows", results.len()));
        Ok(results)
    }

    pub fn add_record(&mut self, record: StudentRecord) -> Result<(), SessionError> {
        self.require(Capability::ManageSpreadsheets)?;
        record.validate()?;
        if self.records.iter().any(|existing| existing.nim == record.nim) {
            return Err(SessionError::DuplicateRecord(record.nim));
        }
        self.log(format!("added record {}", record.nim));
        self.records.push(record);
        self.dirty = true;
        Ok(())
    }

    /// Replaces the stored record with the same NIM. Last write wins.
    pub fn update_record(&mut self, record: StudentRecord) -> Result<(), SessionError> {
        self.require(Capability::ManageSpreadsheets)?;
        record.validate()?;
        let slot = self
            .records
            .iter_mut()
            .find(|existing| existing.nim == record.nim)
            .ok_or_else(|| SessionError::RecordNotFound(record.nim.clone()))?;
        *slot = record;
        let nim = slot.nim.clone();
        self.log(format!("updated record {nim}"));
        self.dirty = true;
        Ok(())
    }

    /// Deleting transcripts is an administration feature on top of
    /// spreadsheet management.
    pub fn remove_record(&mut self, nim: &str) -> Result<StudentRecord, SessionError> {
        self.require(Capability::ManageSpreadsheets)?;
        self.require(Capability::Administer)?;
        let index = self
            .records
            .iter()
            .position(|record| record.nim == nim)
            .ok_or_else(|| SessionError::RecordNotFound(nim.to_string()))?;
        let removed = self.records.remove(index);
        self.log(format!("removed record {nim}"));
        self.dirty = true;
        Ok(removed)
    }

    pub fn add_mapping(&mut self, mapping: CurriculumMapping) -> Result<(), SessionError> {
        self.require(Capability::ManageCurriculumMapping)?;
        let action = format!("mapped {} {} to {}", mapping.course_code, mapping.cpmk, mapping.cpl);
        self.mappings.insert(mapping)?;
        self.log(action);
        self.dirty = true;
        Ok(())
    }

    pub fn remove_mapping(&mut self, course_code: &str, cpmk: &str) -> Result<CurriculumMapping, SessionError> {
        self.require(Capability::ManageCurriculumMapping)?;
        let removed = self.mappings.remove(course_code, cpmk)?;
        self.log(format!("unmapped {course_code} {cpmk}"));
        self.dirty = true;
        Ok(removed)
    }

    fn log(&mut self, action: impl Into<String>) {
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            at: Utc::now(),
            role: self.role,
            action: action.into(),
        };
        self.activity.push(entry);
    }
}

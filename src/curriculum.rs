use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Links a course-level outcome (CPMK) to a programme-level outcome (CPL).
/// Codes are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumMapping {
    #[serde(rename = "Kode_MK")]
    pub course_code: String,
    #[serde(rename = "Nama_MK")]
    pub course_name: String,
    #[serde(rename = "CPMK")]
    pub cpmk: String,
    #[serde(rename = "CPL")]
    pub cpl: String,
    #[serde(rename = "Bobot")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CplCoverage {
    pub cpl: String,
    pub courses: usize,
    pub cpmk_count: usize,
    pub total_weight: f64,
}

/// Mapping table kept in insertion order. A course maps each CPMK at most once.
#[derive(Debug, Clone, Default)]
pub struct CurriculumTable {
    entries: Vec<CurriculumMapping>,
}

impl CurriculumTable {
    pub fn from_entries(
        entries: impl IntoIterator<Item = CurriculumMapping>,
    ) -> Result<Self, SessionError> {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, mapping: CurriculumMapping) -> Result<(), SessionError> {
        if self.position(&mapping.course_code, &mapping.cpmk).is_some() {
            return Err(SessionError::DuplicateMapping {
                course: mapping.course_code,
                cpmk: mapping.cpmk,
            });
        }
        self.entries.push(mapping);
        Ok(())
    }

    pub fn remove(&mut self, course_code: &str, cpmk: &str) -> Result<CurriculumMapping, SessionError> {
        let index = self
            .position(course_code, cpmk)
            .ok_or_else(|| SessionError::MappingNotFound {
                course: course_code.to_string(),
                cpmk: cpmk.to_string(),
            })?;
        Ok(self.entries.remove(index))
    }

    pub fn for_cpl<'a>(&'a self, cpl: &'a str) -> impl Iterator<Item = &'a CurriculumMapping> + 'a {
        self.entries.iter().filter(move |entry| entry.cpl == cpl)
    }

    pub fn cpl_coverage(&self) -> Vec<CplCoverage> {
        let mut groups: BTreeMap<&str, (BTreeSet<&str>, BTreeSet<&str>, f64)> = BTreeMap::new();

        for entry in &self.entries {
            let group = groups
                .entry(entry.cpl.as_str())
                .or_insert_with(|| (BTreeSet::new(), BTreeSet::new(), 0.0));
            group.0.insert(entry.course_code.as_str());
            group.1.insert(entry.cpmk.as_str());
            group.2 += entry.weight;
        }

        groups
            .into_iter()
            .map(|(cpl, (courses, cpmks, total_weight))| CplCoverage {
                cpl: cpl.to_string(),
                courses: courses.len(),
                cpmk_count: cpmks.len(),
                total_weight,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CurriculumMapping> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, course_code: &str, cpmk: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.course_code == course_code && entry.cpmk == cpmk)
    }
}

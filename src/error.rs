use thiserror::Error;

use crate::roles::Role;

/// Failure of a single spreadsheet row. Recorded in the result table, never
/// propagated out of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("Department \"{0}\" is not recognized")]
    UnrecognizedDepartment(String),

    #[error("column {column} is not valid UTF-8")]
    InvalidEncoding { column: String },

    #[error("missing value for {field}")]
    MissingField { field: &'static str },

    #[error("invalid value \"{value}\" for {field}: {reason}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Request-level failures. These stop the operation that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("unknown role \"{0}\" (expected student, instructor, program-admin or system-admin)")]
    UnknownRole(String),

    #[error("no student record with NIM {0}")]
    RecordNotFound(String),

    #[error("a student record with NIM {0} already exists")]
    DuplicateRecord(String),

    #[error("role {role} is not allowed to {action}")]
    PermissionDenied { role: Role, action: &'static str },

    #[error("role {role} has reached its prediction limit of {limit}")]
    PredictionLimitReached { role: Role, limit: u32 },

    #[error("Department \"{0}\" is not recognized")]
    UnrecognizedDepartment(String),

    #[error(transparent)]
    InvalidInput(#[from] RowError),

    #[error("no mapping of {cpmk} for course {course}")]
    MappingNotFound { course: String, cpmk: String },

    #[error("course {course} already maps {cpmk}")]
    DuplicateMapping { course: String, cpmk: String },
}

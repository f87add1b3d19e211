use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Student,
    Instructor,
    ProgramAdmin,
    SystemAdmin,
}

/// Feature flags granted to a role. `prediction_limit` of `None` means
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleCapabilities {
    pub can_view_advanced_analysis: bool,
    pub can_administer: bool,
    pub can_batch_upload: bool,
    pub prediction_limit: Option<u32>,
    pub can_manage_spreadsheets: bool,
    pub can_manage_curriculum_mapping: bool,
}

/// A single gated feature, checked through [`RoleCapabilities::allows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    AdvancedAnalysis,
    Administer,
    BatchUpload,
    ManageSpreadsheets,
    ManageCurriculumMapping,
}

impl Capability {
    pub fn action(self) -> &'static str {
        match self {
            Capability::AdvancedAnalysis => "view advanced analysis",
            Capability::Administer => "use administration features",
            Capability::BatchUpload => "upload batch predictions",
            Capability::ManageSpreadsheets => "manage student spreadsheets",
            Capability::ManageCurriculumMapping => "manage curriculum mapping",
        }
    }
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Student,
        Role::Instructor,
        Role::ProgramAdmin,
        Role::SystemAdmin,
    ];

    pub fn capabilities(self) -> RoleCapabilities {
        match self {
            Role::Student => RoleCapabilities {
                can_view_advanced_analysis: false,
                can_administer: false,
                can_batch_upload: false,
                prediction_limit: Some(3),
                can_manage_spreadsheets: false,
                can_manage_curriculum_mapping: false,
            },
            Role::Instructor => RoleCapabilities {
                can_view_advanced_analysis: true,
                can_administer: false,
                can_batch_upload: true,
                prediction_limit: Some(10),
                can_manage_spreadsheets: false,
                can_manage_curriculum_mapping: false,
            },
            Role::ProgramAdmin => RoleCapabilities {
                can_view_advanced_analysis: false,
                can_administer: false,
                can_batch_upload: false,
                prediction_limit: None,
                can_manage_spreadsheets: false,
                can_manage_curriculum_mapping: true,
            },
            Role::SystemAdmin => RoleCapabilities {
                can_view_advanced_analysis: true,
                can_administer: true,
                can_batch_upload: true,
                prediction_limit: None,
                can_manage_spreadsheets: true,
                can_manage_curriculum_mapping: true,
            },
        }
    }

    /// Label shown on the dashboard header.
    pub fn title(self) -> &'static str {
        match self {
            Role::Student => "Mahasiswa",
            Role::Instructor => "Dosen",
            Role::ProgramAdmin => "Kaprodi",
            Role::SystemAdmin => "Admin",
        }
    }
}

impl RoleCapabilities {
    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::AdvancedAnalysis => self.can_view_advanced_analysis,
            Capability::Administer => self.can_administer,
            Capability::BatchUpload => self.can_batch_upload,
            Capability::ManageSpreadsheets => self.can_manage_spreadsheets,
            Capability::ManageCurriculumMapping => self.can_manage_curriculum_mapping,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::ProgramAdmin => "program-admin",
            Role::SystemAdmin => "system-admin",
        };
        f.write_str(name)
    }
}

// Unrecognized names are rejected instead of falling through to admin.
impl FromStr for Role {
    type Err = SessionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" | "mahasiswa" => Ok(Role::Student),
            "instructor" | "dosen" => Ok(Role::Instructor),
            "program-admin" | "program_admin" | "kaprodi" => Ok(Role::ProgramAdmin),
            "system-admin" | "system_admin" | "admin" => Ok(Role::SystemAdmin),
            _ => Err(SessionError::UnknownRole(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_limits_follow_role_table() {
        assert_eq!(Role::Student.capabilities().prediction_limit, Some(3));
        assert_eq!(Role::Instructor.capabilities().prediction_limit, Some(10));
        assert_eq!(Role::ProgramAdmin.capabilities().prediction_limit, None);
        assert_eq!(Role::SystemAdmin.capabilities().prediction_limit, None);
    }

    #[test]
    fn program_admin_only_manages_curriculum() {
        let caps = Role::ProgramAdmin.capabilities();
        assert!(caps.can_manage_curriculum_mapping);
        assert!(!caps.can_view_advanced_analysis);
        assert!(!caps.can_administer);
        assert!(!caps.can_batch_upload);
        assert!(!caps.can_manage_spreadsheets);
    }

    #[test]
    fn system_admin_allows_everything() {
        let caps = Role::SystemAdmin.capabilities();
        for capability in [
            Capability::AdvancedAnalysis,
            Capability::Administer,
            Capability::BatchUpload,
            Capability::ManageSpreadsheets,
            Capability::ManageCurriculumMapping,
        ] {
            assert!(caps.allows(capability));
        }
    }

    #[test]
    fn instructor_can_batch_but_not_administer() {
        let caps = Role::Instructor.capabilities();
        assert!(caps.allows(Capability::BatchUpload));
        assert!(caps.allows(Capability::AdvancedAnalysis));
        assert!(!caps.allows(Capability::Administer));
        assert!(!caps.allows(Capability::ManageSpreadsheets));
    }

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("Student".parse::<Role>(), Ok(Role::Student));
        assert_eq!("dosen".parse::<Role>(), Ok(Role::Instructor));
        assert_eq!("program_admin".parse::<Role>(), Ok(Role::ProgramAdmin));
        assert_eq!(" ADMIN ".parse::<Role>(), Ok(Role::SystemAdmin));
    }

    #[test]
    fn unknown_role_is_rejected_not_promoted() {
        let err = "guest".parse::<Role>().unwrap_err();
        assert_eq!(err, SessionError::UnknownRole("guest".to_string()));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>(), Ok(role));
        }
    }
}

use anyhow::Context;
use clap::ValueEnum;

use crate::roles::Role;

pub const ROLE_ENV: &str = "GRADPRED_ROLE";
pub const LOG_ENV: &str = "GRADPRED_LOG";
pub const FORMAT_ENV: &str = "GRADPRED_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Settings resolved from flags, then `GRADPRED_*` variables, then defaults.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub role: Role,
    pub log_level: String,
    pub format: OutputFormat,
}

impl AppConfig {
    pub fn resolve(role: &str, log_level: &str, format: OutputFormat) -> anyhow::Result<Self> {
        let role = role
            .parse::<Role>()
            .with_context(|| format!("invalid --role / {ROLE_ENV}"))?;
        Ok(Self {
            role,
            log_level: log_level.to_string(),
            format,
        })
    }

    /// Installs the stderr log subscriber. `RUST_LOG` overrides the
    /// configured level.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.log_level));
        // Only fails when a global subscriber is already installed.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_role_aliases() {
        let config = AppConfig::resolve("kaprodi", "debug", OutputFormat::Json).unwrap();
        assert_eq!(config.role, Role::ProgramAdmin);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, OutputFormat::Json);
    }

    #[test]
    fn tracing_can_be_initialised_twice() {
        let config = AppConfig::resolve("student", "warn", OutputFormat::Table).unwrap();
        config.init_tracing();
        config.init_tracing();
    }

    #[test]
    fn unknown_role_fails_instead_of_granting_admin() {
        let err = AppConfig::resolve("superuser", "info", OutputFormat::Table).unwrap_err();
        assert!(format!("{err:#}").contains("unknown role \"superuser\""));
    }
}

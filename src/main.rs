use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};

mod batch;
mod config;
mod curriculum;
mod error;
mod features;
mod models;
mod report;
mod roles;
mod rule;
mod session;
mod sheet;

use config::{AppConfig, OutputFormat};
use curriculum::{CurriculumMapping, CurriculumTable};
use error::SessionError;
use models::{BatchResultRow, Department, Label, PredictionResult, StudentRecord};
use roles::Role;
use session::Session;

#[derive(Parser)]
#[command(name = "graduation-predictor")]
#[command(about = "Role-gated graduation outlook for student transcripts", long_about = None)]
struct Cli {
    /// student, instructor, program-admin or system-admin
    #[arg(long, global = true, env = config::ROLE_ENV, default_value = "student")]
    role: String,
    #[arg(long, global = true, env = config::LOG_ENV, default_value = "info")]
    log_level: String,
    #[arg(long, global = true, env = config::FORMAT_ENV, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the capabilities of the active role
    Roles {
        #[arg(long)]
        all: bool,
    },
    /// Predict every row of an uploaded CSV
    Batch {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// LULUS or TIDAK LULUS
        #[arg(long)]
        label: Option<Label>,
        #[arg(long)]
        department: Option<String>,
    },
    /// Predict an uploaded CSV and write a markdown report
    Report {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Predict stored students by NIM
    ///
    /// The role's prediction limit is counted within this one invocation.
    Predict {
        #[arg(long)]
        records: PathBuf,
        #[arg(long = "nim", required = true)]
        nims: Vec<String>,
    },
    /// Predict a single student from form input
    ///
    /// The role's prediction limit is counted within this one invocation.
    Assess(RecordArgs),
    /// Manage the transcript table
    Records {
        #[arg(long)]
        file: PathBuf,
        #[command(subcommand)]
        action: RecordsAction,
    },
    /// Manage the CPMK/CPL curriculum mapping table
    Curriculum {
        #[arg(long)]
        file: PathBuf,
        #[command(subcommand)]
        action: CurriculumAction,
    },
}

#[derive(Subcommand)]
enum RecordsAction {
    List,
    Add(RecordArgs),
    Update(RecordArgs),
    Remove {
        #[arg(long)]
        nim: String,
    },
}

#[derive(Subcommand)]
enum CurriculumAction {
    List {
        #[arg(long)]
        cpl: Option<String>,
    },
    Add {
        #[arg(long)]
        course: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        cpmk: String,
        #[arg(long)]
        cpl: String,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
    Remove {
        #[arg(long)]
        course: String,
        #[arg(long)]
        cpmk: String,
    },
    Coverage,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    nim: String,
    #[arg(long)]
    department: String,
    #[arg(long)]
    ipk: f64,
    #[arg(long)]
    sks: i64,
    #[arg(long)]
    score: f64,
    #[arg(long)]
    attendance: f64,
    #[arg(long)]
    assignments: i64,
    #[arg(long)]
    evaluation: f64,
    #[arg(long)]
    terms: i64,
}

impl RecordArgs {
    fn into_record(self) -> Result<StudentRecord, SessionError> {
        let department = Department::lookup(&self.department)
            .ok_or_else(|| SessionError::UnrecognizedDepartment(self.department.clone()))?;
        Ok(StudentRecord {
            name: self.name,
            nim: self.nim,
            department,
            gpa: self.ipk,
            credits: self.sks,
            avg_score: self.score,
            attendance: self.attendance,
            assignments: self.assignments,
            evaluation_score: self.evaluation,
            duration_terms: self.terms,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::resolve(&cli.role, &cli.log_level, cli.format)?;
    config.init_tracing();

    let mut session = Session::new(config.role);
    info!(session = %session.id(), role = %config.role, "session started");

    let result = dispatch(&mut session, &config, cli.command);

    for entry in session.activity() {
        debug!(session = %session.id(), at = %entry.at, action = %entry.action, "activity");
    }
    result
}

fn dispatch(session: &mut Session, config: &AppConfig, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Roles { all } => {
            let roles: Vec<Role> = if all {
                Role::ALL.to_vec()
            } else {
                vec![session.role()]
            };
            print_roles(config.format, &roles)?;
        }
        Commands::Batch {
            csv,
            out,
            label,
            department,
        } => {
            let rows = sheet::read_upload(&csv)?;
            let results = session.run_batch(&rows)?;

            let mut shown: Vec<&BatchResultRow> = results.iter().collect();
            if let Some(label) = label {
                shown = batch::filter_by_label(shown, label);
            }
            if let Some(department) = department.as_deref() {
                shown = batch::filter_by_department(shown, department);
            }
            print_batch(config.format, &results, &shown)?;

            if let Some(out) = out {
                sheet::write_results(&out, &results)?;
                session.mark_exported();
                println!("Results written to {}.", out.display());
            }
        }
        Commands::Report { csv, scope, out } => {
            let rows = sheet::read_upload(&csv)?;
            let results = session.run_batch(&rows)?;
            let report = report::build_report(
                scope.as_deref(),
                &session.capabilities(),
                &results,
                chrono::Utc::now(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Predict { records, nims } => {
            session.load_records(sheet::read_records(&records)?);
            let (predictions, failure) = session.predict_nims(nims.iter().map(String::as_str));
            print_predictions(config.format, &predictions)?;
            info!(served = session.predictions_made(), "predictions served");
            if let Some(err) = failure {
                return Err(err.into());
            }
        }
        Commands::Assess(args) => {
            let record = args.into_record()?;
            let prediction = session.predict_record(&record)?;
            print_predictions(config.format, &[(record, prediction)])?;
            info!(served = session.predictions_made(), "predictions served");
        }
        Commands::Records { file, action } => {
            session.load_records(load_or_empty(&file, sheet::read_records)?);
            run_records(session, config, &file, action)?;
        }
        Commands::Curriculum { file, action } => {
            let table = CurriculumTable::from_entries(load_or_empty(&file, sheet::read_mappings)?)?;
            session.load_mappings(table);
            run_curriculum(session, config, &file, action)?;
        }
    }

    Ok(())
}

fn run_records(
    session: &mut Session,
    config: &AppConfig,
    file: &Path,
    action: RecordsAction,
) -> anyhow::Result<()> {
    match action {
        RecordsAction::List => {
            if config.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(session.records())?);
            } else if session.records().is_empty() {
                println!("No student records in {}.", file.display());
            } else {
                for record in session.records() {
                    println!(
                        "- {} ({}, {}) IPK {:.2}, {} SKS over {} terms",
                        record.name,
                        record.nim,
                        record.department,
                        record.gpa,
                        record.credits,
                        record.duration_terms
                    );
                }
            }
            return Ok(());
        }
        RecordsAction::Add(args) => session.add_record(args.into_record()?)?,
        RecordsAction::Update(args) => session.update_record(args.into_record()?)?,
        RecordsAction::Remove { nim } => {
            session.remove_record(&nim)?;
        }
    }

    if session.is_dirty() {
        sheet::write_records(file, session.records())?;
        session.mark_exported();
        println!(
            "{} student records written to {}.",
            session.records().len(),
            file.display()
        );
    }
    Ok(())
}

fn run_curriculum(
    session: &mut Session,
    config: &AppConfig,
    file: &Path,
    action: CurriculumAction,
) -> anyhow::Result<()> {
    match action {
        CurriculumAction::List { cpl } => {
            if session.mappings().is_empty() {
                println!("No curriculum mappings in {}.", file.display());
                return Ok(());
            }
            let mappings: Vec<&CurriculumMapping> = match cpl.as_deref() {
                Some(cpl) => session.mappings().for_cpl(cpl).collect(),
                None => session.mappings().iter().collect(),
            };
            if config.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&mappings)?);
            } else if mappings.is_empty() {
                println!("No curriculum mappings found.");
            } else {
                for mapping in mappings {
                    println!(
                        "- {} {} -> {} -> {} (weight {:.2})",
                        mapping.course_code,
                        mapping.course_name,
                        mapping.cpmk,
                        mapping.cpl,
                        mapping.weight
                    );
                }
            }
            return Ok(());
        }
        CurriculumAction::Coverage => {
            let coverage = session.mappings().cpl_coverage();
            if config.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&coverage)?);
            } else if coverage.is_empty() {
                println!("No curriculum mappings found.");
            } else {
                for item in coverage {
                    println!(
                        "- {}: {} courses, {} CPMK, total weight {:.2}",
                        item.cpl, item.courses, item.cpmk_count, item.total_weight
                    );
                }
            }
            return Ok(());
        }
        CurriculumAction::Add {
            course,
            name,
            cpmk,
            cpl,
            weight,
        } => session.add_mapping(CurriculumMapping {
            course_code: course,
            course_name: name,
            cpmk,
            cpl,
            weight,
        })?,
        CurriculumAction::Remove { course, cpmk } => {
            session.remove_mapping(&course, &cpmk)?;
        }
    }

    if session.is_dirty() {
        sheet::write_mappings(file, session.mappings().iter())?;
        session.mark_exported();
        println!(
            "{} curriculum mappings written to {}.",
            session.mappings().len(),
            file.display()
        );
    }
    Ok(())
}

fn load_or_empty<T>(
    path: &Path,
    load: fn(&Path) -> anyhow::Result<Vec<T>>,
) -> anyhow::Result<Vec<T>> {
    if path.exists() {
        load(path)
    } else {
        Ok(Vec::new())
    }
}

fn print_roles(format: OutputFormat, roles: &[Role]) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let value: Vec<_> = roles
            .iter()
            .map(|role| json!({ "role": role, "title": role.title(), "capabilities": role.capabilities() }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for role in roles {
        let caps = role.capabilities();
        let limit = caps
            .prediction_limit
            .map(|limit| limit.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        println!("{} ({})", role.title(), role);
        println!("  advanced analysis:   {}", caps.can_view_advanced_analysis);
        println!("  administration:      {}", caps.can_administer);
        println!("  batch upload:        {}", caps.can_batch_upload);
        println!("  prediction limit:    {}", limit);
        println!("  spreadsheet mgmt:    {}", caps.can_manage_spreadsheets);
        println!("  curriculum mapping:  {}", caps.can_manage_curriculum_mapping);
    }
    Ok(())
}

fn print_batch(
    format: OutputFormat,
    results: &[BatchResultRow],
    shown: &[&BatchResultRow],
) -> anyhow::Result<()> {
    let summary = batch::summarize(results);

    if format == OutputFormat::Json {
        let value = json!({ "summary": summary, "rows": shown });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("No rows match the selected filters.");
    }
    for row in shown {
        match row.prediction() {
            Some(prediction) => println!(
                "- {} ({}, {}) {} confidence {:.2} | performance {:.2} engagement {:.2} efficiency {:.3} credits/term {:.2}",
                row.name,
                row.nim,
                row.department,
                prediction.label,
                prediction.confidence,
                prediction.features.academic_performance,
                prediction.features.engagement_score,
                prediction.features.study_efficiency,
                prediction.features.credits_per_term
            ),
            None => println!(
                "- row {} ({}, {}) error: {}",
                row.row_index + 1,
                row.name,
                row.nim,
                row.error().unwrap_or_default()
            ),
        }
    }

    println!();
    println!(
        "{} rows, {} valid ({} LULUS, {} TIDAK LULUS), {} errors",
        summary.total, summary.valid, summary.pass, summary.fail, summary.errors
    );
    if let Some(confidence) = summary.mean_confidence {
        println!("Mean confidence {:.2}", confidence);
    }
    Ok(())
}

fn print_predictions(
    format: OutputFormat,
    predictions: &[(StudentRecord, PredictionResult)],
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let value: Vec<_> = predictions
            .iter()
            .map(|(record, prediction)| json!({ "student": record, "prediction": prediction }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (record, prediction) in predictions {
        println!(
            "{} ({}, {}): {}",
            record.name, record.nim, record.department, prediction.label
        );
        println!(
            "  P(LULUS) {:.2}  P(TIDAK LULUS) {:.2}  confidence {:.2}",
            prediction.pass_probability, prediction.fail_probability, prediction.confidence
        );
        println!(
            "  academic performance {:.2}, engagement {:.2}, study efficiency {:.3}, credits/term {:.2}",
            prediction.features.academic_performance,
            prediction.features.engagement_score,
            prediction.features.study_efficiency,
            prediction.features.credits_per_term
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn single_prediction_help_states_limit_scope() {
        let cli = Cli::command();
        for name in ["predict", "assess"] {
            let command = cli.find_subcommand(name).unwrap();
            let help = command
                .get_long_about()
                .map(|text| text.to_string())
                .unwrap_or_default();
            assert!(help.contains("within this one invocation"), "{name}: {help}");
        }
    }
}

//! Aura Motor CLI - Command-line interface for Aura Motor
//!
//! Commands:
//! - train: Fit the latent score and classifiers, write an artifact bundle
//! - score: Score one session against a trained bundle
//! - generate: Write a synthetic session dataset
//! - doctor: Diagnose a trained bundle

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use aura_motor::artifacts::ArtifactStore;
use aura_motor::schema::FEATURE_SCHEMA_VERSION;
use aura_motor::synthetic::{write_sessions, SyntheticConfig};
use aura_motor::{
    MotorError, MotorTrainer, RowSelector, ScoringService, SessionTable, TrainingConfig,
    TrainingOutcome, MOTOR_VERSION, PRODUCER_NAME,
};

/// Aura Motor - Latent motor-ability scoring for pointing-task sessions
#[derive(Parser)]
#[command(name = "aura-motor")]
#[command(author = "SenseCheck Aura contributors")]
#[command(version = MOTOR_VERSION)]
#[command(about = "Train and apply latent motor-ability models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the latent score and classifiers, write an artifact bundle
    Train {
        /// Session dataset (CSV)
        #[arg(long)]
        csv: PathBuf,

        /// Output directory for the bundle (must not hold a previous bundle)
        #[arg(long)]
        outdir: PathBuf,

        /// Number of participant-grouped folds
        #[arg(long)]
        folds: Option<usize>,

        /// Seed for fold assignment and the boosted trees
        #[arg(long)]
        seed: Option<u64>,

        /// Training configuration (JSON); flags override its folds and seed
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Score one session against a trained bundle
    Score {
        /// Dataset holding the session (CSV)
        #[arg(long)]
        csv: PathBuf,

        /// Directory of a trained bundle
        #[arg(long)]
        outdir: PathBuf,

        /// Session to score; takes precedence over --row
        #[arg(long)]
        session_id: Option<String>,

        /// Zero-based row to score
        #[arg(long)]
        row: Option<usize>,
    },

    /// Write a synthetic session dataset
    Generate {
        /// Output CSV path
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = "80")]
        participants: usize,

        #[arg(long, default_value = "2")]
        min_sessions: usize,

        #[arg(long, default_value = "5")]
        max_sessions: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Diagnose a trained bundle
    Doctor {
        /// Directory of a trained bundle
        #[arg(long)]
        outdir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aura_motor=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), MotorCliError> {
    match cli.command {
        Commands::Train {
            csv,
            outdir,
            folds,
            seed,
            config,
        } => cmd_train(&csv, &outdir, folds, seed, config.as_deref()),

        Commands::Score {
            csv,
            outdir,
            session_id,
            row,
        } => cmd_score(&csv, &outdir, RowSelector::from_options(session_id, row)),

        Commands::Generate {
            out,
            participants,
            min_sessions,
            max_sessions,
            seed,
        } => cmd_generate(
            &out,
            SyntheticConfig {
                participants,
                min_sessions,
                max_sessions,
                seed,
            },
        ),

        Commands::Doctor { outdir, json } => cmd_doctor(&outdir, json),
    }
}

/// Machine-readable summary of a training run
#[derive(Serialize)]
struct TrainSummary {
    run_id: String,
    outdir: String,
    retained_rows: usize,
    participants: usize,
    motor_features: usize,
    thresholds: [f64; 3],
    pc1_flipped: bool,
    model_a_macro_f1: f64,
    model_b_macro_f1: f64,
}

impl TrainSummary {
    fn new(outcome: &TrainingOutcome, outdir: &Path) -> Self {
        let report = &outcome.report;
        let t = &report.labeling.thresholds;
        Self {
            run_id: outcome.run_id.clone(),
            outdir: outdir.display().to_string(),
            retained_rows: report.data.retained_rows,
            participants: report.data.participants,
            motor_features: report.pca.motor_feature_columns.len(),
            thresholds: [t.p10, t.p30, t.p60],
            pc1_flipped: report.pca.pc1_flipped,
            model_a_macro_f1: report.model_a.overall.macro_f1,
            model_b_macro_f1: report.model_b.cv.overall.macro_f1,
        }
    }
}

fn cmd_train(
    csv: &Path,
    outdir: &Path,
    folds: Option<usize>,
    seed: Option<u64>,
    config: Option<&Path>,
) -> Result<(), MotorCliError> {
    let base = match config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };
    let trainer = MotorTrainer::new(base.with_overrides(folds, seed))?;
    let outcome = trainer.train_file(csv, outdir)?;
    let summary = TrainSummary::new(&outcome, outdir);

    if atty::is(atty::Stream::Stdout) {
        println!("Aura Motor Training Summary");
        println!("===========================");
        println!("Run:            {}", summary.run_id);
        println!("Artifacts:      {}", summary.outdir);
        println!("Retained rows:  {}", summary.retained_rows);
        println!("Participants:   {}", summary.participants);
        println!("Motor features: {}", summary.motor_features);
        println!(
            "Thresholds:     p10={:.4} p30={:.4} p60={:.4}",
            summary.thresholds[0], summary.thresholds[1], summary.thresholds[2]
        );
        println!("PC1 flipped:    {}", summary.pc1_flipped);
        println!("\nModel A (motor only):      macro-F1 {:.3}", summary.model_a_macro_f1);
        println!("Model B (motor + context): macro-F1 {:.3}", summary.model_b_macro_f1);
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

fn cmd_score(csv: &Path, outdir: &Path, selector: RowSelector) -> Result<(), MotorCliError> {
    let service = ScoringService::load(outdir)?;
    let table = SessionTable::from_path(csv)?;
    let output = service.score(&table, &selector)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_generate(out: &Path, config: SyntheticConfig) -> Result<(), MotorCliError> {
    let table = write_sessions(out, &config)?;
    eprintln!(
        "Wrote {} sessions for {} participants to {}",
        table.n_rows(),
        config.participants,
        out.display()
    );
    Ok(())
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

fn cmd_doctor(outdir: &Path, json: bool) -> Result<(), MotorCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "motor_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Aura Motor version {}", MOTOR_VERSION),
    });

    match ArtifactStore::new(outdir).verify() {
        Ok(bundle) => {
            let manifest = &bundle.manifest;
            checks.push(DoctorCheck {
                name: "bundle".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Run {} created {} by {} {}",
                    manifest.run_id,
                    manifest.created_at.to_rfc3339(),
                    manifest.producer.name,
                    manifest.producer.version
                ),
            });

            let schema_status = if manifest.schema.version == FEATURE_SCHEMA_VERSION {
                CheckStatus::Ok
            } else {
                CheckStatus::Error
            };
            checks.push(DoctorCheck {
                name: "feature_schema".to_string(),
                status: schema_status,
                message: format!(
                    "Schema v{} with {} motor, {} context numeric, {} context categorical columns",
                    manifest.schema.version,
                    manifest.schema.motor_numeric.len(),
                    manifest.schema.context_numeric.len(),
                    manifest.schema.context_categorical.len()
                ),
            });

            let t = &manifest.thresholds;
            let ordered = t.p10 < t.p30 && t.p30 < t.p60;
            checks.push(DoctorCheck {
                name: "thresholds".to_string(),
                status: if ordered {
                    CheckStatus::Ok
                } else {
                    CheckStatus::Warning
                },
                message: format!("p10={:.4} p30={:.4} p60={:.4}", t.p10, t.p30, t.p60),
            });

            if manifest.producer.version != MOTOR_VERSION {
                checks.push(DoctorCheck {
                    name: "producer_version".to_string(),
                    status: CheckStatus::Warning,
                    message: format!(
                        "Bundle written by version {}, running {}",
                        manifest.producer.version, MOTOR_VERSION
                    ),
                });
            }
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "bundle".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: MOTOR_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Aura Motor Doctor Report");
        println!("========================");
        println!("Producer:  {}", report.producer);
        println!("Version:   {}", report.version);
        println!("Artifacts: {}", outdir.display());
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(MotorCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error handling

#[derive(Debug)]
enum MotorCliError {
    Motor(MotorError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<MotorError> for MotorCliError {
    fn from(e: MotorError) -> Self {
        MotorCliError::Motor(e)
    }
}

impl From<serde_json::Error> for MotorCliError {
    fn from(e: serde_json::Error) -> Self {
        MotorCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<MotorCliError> for CliError {
    fn from(e: MotorCliError) -> Self {
        match e {
            MotorCliError::Motor(e) => CliError {
                code: e.code().to_string(),
                message: e.to_string(),
                hint: hint_for(&e).map(str::to_string),
            },
            MotorCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            MotorCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more checks failed".to_string(),
                hint: Some("Retrain into an empty directory to rebuild the bundle".to_string()),
            },
        }
    }
}

fn hint_for(e: &MotorError) -> Option<&'static str> {
    match e {
        MotorError::Schema(_) => {
            Some("The dataset needs sessionId, participantId and r1_/r2_/r3_/delta_ metric columns")
        }
        MotorError::InsufficientGroups { .. } => Some("Lower --folds or add participants"),
        MotorError::RecordNotFound(_) => Some("Check the sessionId or pass --row instead"),
        MotorError::IndexOutOfRange { .. } => Some("Rows are numbered from 0"),
        MotorError::ArtifactMismatch(_) => {
            Some("Score with the dataset layout the bundle was trained on, or retrain")
        }
        MotorError::IncompleteRecord { .. } => {
            Some("Too many motor values are missing for this session to be scored")
        }
        MotorError::ArtifactExists(_) => Some("Choose an empty --outdir; bundles are never overwritten"),
        MotorError::Config(_) => Some("Check the --config file and command-line flags"),
        MotorError::EmptyDataset(_) => Some("Ensure the input file has data rows"),
        MotorError::ParseError(_) | MotorError::Csv(_) => Some("Ensure the input is a well-formed CSV"),
        MotorError::Io(_) => Some("Check file paths and permissions"),
        MotorError::JsonError(_) => Some("Check JSON syntax"),
    }
}

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kira_sra_dump::accessions::load_accessions;
use kira_sra_dump::app::App;
use kira_sra_dump::config::{ConfigLoader, ConfigOverrides};
use kira_sra_dump::error::SraError;
use kira_sra_dump::output::{
    JsonOutput, LogProgress, OutputMode, print_plan_summary, print_run_summary,
};
use kira_sra_dump::srr::{SraToolkit, SrrToolStatus, SystemSraToolkit};
use kira_sra_dump::store::Store;

#[derive(Parser)]
#[command(name = "kira-sra")]
#[command(
    about = "Parallel download of SRA runs and conversion to FASTQ. Downloads are skipped for runs whose FASTQ output is already present."
)]
#[command(version, author)]
struct Cli {
    /// File listing one SRA run accession per line
    #[arg(long, short = 's')]
    sra: PathBuf,

    /// Output directory, created if missing
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Number of accessions processed in parallel
    #[arg(long, short = 'n')]
    cpu: Option<NonZeroUsize>,

    /// Write gzipped FASTQ
    #[arg(long, short = 'z')]
    gzip: bool,

    /// Write plain FASTQ even if the config file enables gzip
    #[arg(long, conflicts_with = "gzip")]
    no_gzip: bool,

    /// JSON config file (default: kira-sra.json if present)
    #[arg(long)]
    config: Option<String>,

    /// Dispatch rounds before giving up (default: retry until done)
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Base delay between rounds, grows linearly (default: none)
    #[arg(long)]
    backoff_secs: Option<u64>,

    /// Only report which accessions would be downloaded
    #[arg(long)]
    dry_run: bool,

    /// Print the result as JSON on stdout
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SraError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SraError) -> u8 {
    match error {
        SraError::AccessionList { .. }
        | SraError::ConfigRead(_)
        | SraError::ConfigParse(_)
        | SraError::InvalidWorkers => 2,
        SraError::RetryBudgetExhausted { .. } | SraError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let overrides = ConfigOverrides {
        workers: cli.cpu.map(NonZeroUsize::get),
        gzip: match (cli.gzip, cli.no_gzip) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        max_rounds: cli.max_rounds,
        backoff_secs: cli.backoff_secs,
    };
    let resolved = ConfigLoader::resolve(cli.config.as_deref(), &overrides)?;

    let ids = load_accessions(&cli.sra)?;
    info!(count = ids.len(), "accessions loaded");

    let store = Store::from_path(&cli.output, resolved.gzip)?;
    let toolkit =
        SystemSraToolkit::with_paths(resolved.tools.prefetch, resolved.tools.fastq_dump);
    if let SrrToolStatus::Missing { message } = toolkit.tool_status() {
        warn!("{message}");
    } else {
        let tools = toolkit.tool_info();
        info!(prefetch = ?tools.prefetch, fastq_dump = ?tools.sra_toolkit, "SRA Toolkit found");
    }
    let app = App::new(store, toolkit, resolved.settings);

    if cli.dry_run {
        let plan = app.plan(&ids)?;
        return match output_mode {
            OutputMode::NonInteractive => JsonOutput::print_plan(&plan).into_diagnostic(),
            OutputMode::Interactive => {
                print_plan_summary(&plan);
                Ok(())
            }
        };
    }

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.run(&ids, &JsonOutput)?;
            JsonOutput::print_run(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = app.run(&ids, &LogProgress)?;
            print_run_summary(&result);
        }
    }
    Ok(())
}

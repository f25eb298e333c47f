use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SraError {
    #[error("empty accession")]
    EmptyAccession,

    #[error("failed to read accession list at {path}: {message}")]
    #[diagnostic(help("pass a text file with one SRA run accession per line"))]
    AccessionList { path: PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("worker count must be at least 1")]
    InvalidWorkers,

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to launch {tool}: {message}")]
    ToolSpawn { tool: String, message: String },

    #[error("{tool} exited with {}: {message}", exit_label(.code))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("no downloaded archive found for {0}")]
    MissingArchive(String),

    #[error("layout probe failed for {accession}: {message}")]
    LayoutProbe { accession: String, message: String },

    #[error("conversion of {0} finished but FASTQ output is incomplete")]
    IncompleteOutput(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("gave up after {rounds} rounds; {} accessions still incomplete: {}", .pending.len(), .pending.join(", "))]
    #[diagnostic(help("inspect the <accession>.error logs in the output directory, then rerun"))]
    RetryBudgetExhausted { rounds: u32, pending: Vec<String> },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

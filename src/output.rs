use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{PlanResult, ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the log on stderr.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed = ?elapsed, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub fn print_run_summary(result: &RunReport) {
    let green = "\x1b[32m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}KIRA-SRA summary{reset}");
    println!(
        "{green}FASTQ outputs: {} in {} round(s){reset}",
        result.items.len(),
        result.rounds
    );
    for item in &result.items {
        let paths = item
            .artifact
            .paths()
            .iter()
            .map(|path| path.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  {} ({}) {paths}",
            item.accession,
            item.artifact.layout()
        );
    }
}

pub fn print_plan_summary(result: &PlanResult) {
    println!("already converted: {}", result.complete.len());
    println!("to download: {}", result.pending.len());
    for id in &result.pending {
        println!("  {id}");
    }
}

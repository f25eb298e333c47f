use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::debug;

use crate::domain::Accession;
use crate::error::SraError;

/// Read-name template handed to `fastq-dump --defline-seq`.
pub const DEFAULT_DEFLINE_SEQ: &str = "@$sn[_$rn]/$ri";

/// Value of `prefetch -X`.
pub const DEFAULT_MAX_SIZE: u64 = 104_857_600;

const STDERR_TAIL_LINES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub prefetch: Option<String>,
    pub sra_toolkit: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SrrToolStatus {
    Ready,
    Missing { message: String },
}

/// Outcome of one external invocation.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub tool: String,
    pub code: Option<i32>,
    pub stderr: String,
}

impl ToolRun {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn into_result(self) -> Result<(), SraError> {
        if self.success() {
            return Ok(());
        }
        let message = if self.stderr.is_empty() {
            format!("command failed: {}", self.tool)
        } else {
            self.stderr
        };
        Err(SraError::ToolFailed {
            tool: self.tool,
            code: self.code,
            message,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub gzip: bool,
    pub defline_seq: String,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            gzip: false,
            defline_seq: DEFAULT_DEFLINE_SEQ.to_string(),
        }
    }
}

/// The external SRA Toolkit. Implementations only run the tools; deciding
/// what a result means is left to the worker.
pub trait SraToolkit: Send + Sync {
    /// Downloads the archive for `id` into `out_dir`, writing stderr to
    /// `error_log`.
    fn prefetch(
        &self,
        id: &Accession,
        out_dir: &Path,
        max_size: u64,
        error_log: &Path,
    ) -> Result<ToolRun, SraError>;

    /// Dumps a single spot of `archive` to stdout, captured in `sink`.
    fn dump_one_spot(&self, archive: &Path, sink: &Path) -> Result<ToolRun, SraError>;

    /// Converts `archive` to split FASTQ files in `out_dir`.
    fn fastq_dump(
        &self,
        archive: &Path,
        out_dir: &Path,
        options: &DumpOptions,
    ) -> Result<ToolRun, SraError>;

    fn tool_info(&self) -> ToolInfo;
}

#[derive(Clone)]
pub struct SystemSraToolkit {
    prefetch: Option<PathBuf>,
    fastq_dump: Option<PathBuf>,
}

impl SystemSraToolkit {
    pub fn new() -> Self {
        Self {
            prefetch: find_in_path("prefetch"),
            fastq_dump: find_in_path("fastq-dump"),
        }
    }

    /// Explicit binaries take precedence over `PATH` lookup.
    pub fn with_paths(prefetch: Option<PathBuf>, fastq_dump: Option<PathBuf>) -> Self {
        Self {
            prefetch: prefetch.or_else(|| find_in_path("prefetch")),
            fastq_dump: fastq_dump.or_else(|| find_in_path("fastq-dump")),
        }
    }

    pub fn tool_status(&self) -> SrrToolStatus {
        if self.prefetch.is_none() {
            return SrrToolStatus::Missing {
                message: "missing prefetch (SRA Toolkit)".to_string(),
            };
        }
        if self.fastq_dump.is_none() {
            return SrrToolStatus::Missing {
                message: "missing fastq-dump (SRA Toolkit)".to_string(),
            };
        }
        SrrToolStatus::Ready
    }

    fn require_prefetch(&self) -> Result<&PathBuf, SraError> {
        self.prefetch
            .as_ref()
            .ok_or_else(|| SraError::MissingTool("prefetch".to_string()))
    }

    fn require_fastq_dump(&self) -> Result<&PathBuf, SraError> {
        self.fastq_dump
            .as_ref()
            .ok_or_else(|| SraError::MissingTool("fastq-dump".to_string()))
    }

    fn run_cmd(
        &self,
        program: &Path,
        args: &[String],
        stdout: Option<&Path>,
        stderr: Option<&Path>,
    ) -> Result<ToolRun, SraError> {
        let tool = tool_name(program);
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        cmd.stdout(match stdout {
            Some(path) => Stdio::from(create_file(path)?),
            None => Stdio::null(),
        });
        cmd.stderr(match stderr {
            Some(path) => Stdio::from(create_file(path)?),
            None => Stdio::piped(),
        });
        debug!(tool = %tool, ?args, "running");

        let output = cmd.output().map_err(|err| SraError::ToolSpawn {
            tool: tool.clone(),
            message: err.to_string(),
        })?;
        let stderr_text = match stderr {
            Some(path) => read_log(path)?,
            None => String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        Ok(ToolRun {
            tool,
            code: output.status.code(),
            stderr: tail(&stderr_text, STDERR_TAIL_LINES),
        })
    }
}

impl Default for SystemSraToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl SraToolkit for SystemSraToolkit {
    fn prefetch(
        &self,
        id: &Accession,
        out_dir: &Path,
        max_size: u64,
        error_log: &Path,
    ) -> Result<ToolRun, SraError> {
        let prefetch = self.require_prefetch()?;
        // Trailing separator: prefetch treats -O as a directory only then.
        let mut out = out_dir.as_os_str().to_os_string();
        out.push(std::path::MAIN_SEPARATOR_STR);
        let args = vec![
            "-X".to_string(),
            max_size.to_string(),
            "-O".to_string(),
            out.to_string_lossy().to_string(),
            id.as_str().to_string(),
        ];
        self.run_cmd(prefetch.as_path(), &args, None, Some(error_log))
    }

    fn dump_one_spot(&self, archive: &Path, sink: &Path) -> Result<ToolRun, SraError> {
        let fastq_dump = self.require_fastq_dump()?;
        let args = vec![
            "-X".to_string(),
            "1".to_string(),
            "-Z".to_string(),
            "--split-spot".to_string(),
            archive.to_string_lossy().to_string(),
        ];
        self.run_cmd(fastq_dump.as_path(), &args, Some(sink), None)
    }

    fn fastq_dump(
        &self,
        archive: &Path,
        out_dir: &Path,
        options: &DumpOptions,
    ) -> Result<ToolRun, SraError> {
        let fastq_dump = self.require_fastq_dump()?;
        let mut args = Vec::new();
        if options.gzip {
            args.push("--gzip".to_string());
        }
        args.extend([
            "--defline-seq".to_string(),
            options.defline_seq.clone(),
            "--outdir".to_string(),
            out_dir.to_string_lossy().to_string(),
            "--split-files".to_string(),
            archive.to_string_lossy().to_string(),
        ]);
        self.run_cmd(fastq_dump.as_path(), &args, None, None)
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            prefetch: self
                .prefetch
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
            sra_toolkit: self
                .fastq_dump
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
        }
    }
}

fn create_file(path: &Path) -> Result<File, SraError> {
    File::create(path)
        .map_err(|err| SraError::Filesystem(format!("create {}: {err}", path.display())))
}

/// Tool logs are not guaranteed UTF-8; invalid bytes are replaced.
fn read_log(path: &Path) -> Result<String, SraError> {
    let bytes = fs::read(path)
        .map_err(|err| SraError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

fn tail(text: &str, lines: usize) -> String {
    let kept = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>();
    let start = kept.len().saturating_sub(lines);
    kept[start..].join("\n")
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn tail_keeps_last_nonempty_lines() {
        let text = "a\n\nb\nc\n  \nd\n";
        assert_eq!(tail(text, 2), "c\nd");
        assert_eq!(tail("", 3), "");
    }

    #[test]
    fn non_utf8_log_keeps_its_tail() {
        let temp = tempfile::tempdir().unwrap();
        let log = temp.path().join("SRR000001.error");
        let mut bytes = b"connecting\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b" item not found\n");
        fs::write(&log, &bytes).unwrap();

        let text = read_log(&log).unwrap();
        assert_eq!(tail(&text, 1), "\u{fffd}\u{fffd} item not found");

        let err = read_log(&temp.path().join("absent.error")).unwrap_err();
        assert_matches!(err, SraError::Filesystem(_));
    }

    #[test]
    fn failed_run_carries_stderr() {
        let run = ToolRun {
            tool: "prefetch".to_string(),
            code: Some(3),
            stderr: "item not found".to_string(),
        };
        assert!(!run.success());
        assert_matches!(
            run.into_result(),
            Err(SraError::ToolFailed { code: Some(3), ref message, .. }) if message == "item not found"
        );
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let temp = tempfile::tempdir().unwrap();
        let toolkit = SystemSraToolkit {
            prefetch: Some(temp.path().join("no-such-prefetch")),
            fastq_dump: None,
        };
        let id: Accession = "SRR000001".parse().unwrap();
        let log = temp.path().join("SRR000001.error");

        let err = toolkit
            .prefetch(&id, temp.path(), DEFAULT_MAX_SIZE, &log)
            .unwrap_err();
        assert_matches!(err, SraError::ToolSpawn { .. });

        let err = toolkit
            .dump_one_spot(&temp.path().join("x.sra"), &temp.path().join("x.temp"))
            .unwrap_err();
        assert_matches!(err, SraError::MissingTool(_));
    }
}

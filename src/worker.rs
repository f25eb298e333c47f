use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Accession, Layout, Mate, OutputArtifact, OutputStatus};
use crate::error::SraError;
use crate::srr::{DumpOptions, SraToolkit};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    Completed { artifact: OutputArtifact },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub accession: Accession,
    #[serde(flatten)]
    pub status: TaskStatus,
}

impl TaskReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, TaskStatus::Completed { .. })
    }
}

/// Runs prefetch, layout probe and conversion for one accession.
pub struct Worker<'a, T: SraToolkit> {
    toolkit: &'a T,
    store: &'a Store,
    max_size: u64,
    dump: DumpOptions,
}

impl<'a, T: SraToolkit> Worker<'a, T> {
    pub fn new(toolkit: &'a T, store: &'a Store, max_size: u64, defline_seq: &str) -> Self {
        Self {
            toolkit,
            store,
            max_size,
            dump: DumpOptions {
                gzip: store.gzip(),
                defline_seq: defline_seq.to_string(),
            },
        }
    }

    pub fn fetch_and_convert(&self, id: &Accession) -> TaskReport {
        let status = match self.try_fetch_and_convert(id) {
            Ok(artifact) => {
                info!(accession = %id, layout = %artifact.layout(), "converted");
                TaskStatus::Completed { artifact }
            }
            Err(err) => {
                if let Err(cleanup) = self.store.remove_temp(id) {
                    warn!(accession = %id, error = %cleanup, "failed to remove probe file");
                }
                TaskStatus::Failed {
                    reason: err.to_string(),
                }
            }
        };
        TaskReport {
            accession: id.clone(),
            status,
        }
    }

    fn try_fetch_and_convert(&self, id: &Accession) -> Result<OutputArtifact, SraError> {
        let out_dir = self.store.root().as_std_path();
        let error_log = self.store.error_log_path(id);

        let prefetch = self
            .toolkit
            .prefetch(id, out_dir, self.max_size, error_log.as_std_path())?;
        let archive = match (prefetch.success(), self.store.locate_archive(id)) {
            (_, Some(archive)) => {
                if !prefetch.success() {
                    warn!(accession = %id, code = ?prefetch.code, "prefetch failed but archive is present");
                }
                archive
            }
            (true, None) => return Err(SraError::MissingArchive(id.to_string())),
            (false, None) => {
                prefetch.into_result()?;
                return Err(SraError::MissingArchive(id.to_string()));
            }
        };

        let layout = self.probe_layout(id, &archive)?;
        debug!(accession = %id, %layout, "layout probed");

        self.toolkit
            .fastq_dump(&archive, out_dir, &self.dump)?
            .into_result()?;

        if layout == Layout::Single {
            let first = self.store.mate_path(id, Mate::First);
            let single = self.store.single_path(id);
            if first.as_std_path().exists() {
                std::fs::rename(first.as_std_path(), single.as_std_path()).map_err(|err| {
                    SraError::Filesystem(format!("rename {first} -> {single}: {err}"))
                })?;
            }
        }

        let artifact = match self.store.probe(id)? {
            OutputStatus::Complete(artifact) | OutputStatus::Repaired(artifact) => artifact,
            OutputStatus::Missing => {
                return Err(SraError::IncompleteOutput(id.to_string()));
            }
        };
        self.store.remove_transient(id)?;
        Ok(artifact)
    }

    fn probe_layout(&self, id: &Accession, archive: &Path) -> Result<Layout, SraError> {
        let temp = self.store.temp_path(id);
        let probe_error = |message: String| SraError::LayoutProbe {
            accession: id.to_string(),
            message,
        };

        let run = self.toolkit.dump_one_spot(archive, temp.as_std_path())?;
        if !run.success() {
            let detail = if run.stderr.is_empty() {
                format!("{} exited with {:?}", run.tool, run.code)
            } else {
                run.stderr
            };
            return Err(probe_error(detail));
        }

        let lines = count_lines(temp.as_std_path()).map_err(probe_error)?;
        Ok(Layout::from_probe_lines(lines))
    }
}

/// Counts newline bytes, so an unterminated last line is not a line.
fn count_lines(path: &Path) -> Result<usize, String> {
    let file = File::open(path).map_err(|err| format!("open {}: {err}", path.display()))?;
    let mut count = 0;
    for byte in BufReader::new(file).bytes() {
        let byte = byte.map_err(|err| format!("read {}: {err}", path.display()))?;
        if byte == b'\n' {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn counts_fastq_record_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("SRR1.temp");
        fs::write(&path, "@r/1\nACGT\n+\nIIII\n").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 4);

        fs::write(&path, "@r/1\nACGT\n+\nIIII\n@r/2\nTTGA\n+\nIIII\n").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 8);
    }

    #[test]
    fn unterminated_last_line_is_not_counted() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("SRR1.temp");
        fs::write(&path, "@r/1\nACGT\n+\nIIII").unwrap();
        assert_eq!(count_lines(&path).unwrap(), 3);

        fs::write(&path, [b'@', 0xff, b'\n', b'A', b'\n']).unwrap();
        assert_eq!(count_lines(&path).unwrap(), 2);
    }

    #[test]
    fn missing_spot_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        assert!(count_lines(&temp.path().join("absent.temp")).is_err());
    }
}

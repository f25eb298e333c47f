use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;
use tracing::{debug, info};

use crate::domain::{Accession, Mate, OutputArtifact, OutputStatus, fastq_ext};
use crate::error::SraError;

/// Suffixes of leftovers from interrupted runs (prefetch locks, partial
/// downloads, probe counts, stderr logs).
const STALE_SUFFIXES: [&str; 4] = ["lock", "tmp", "error", "temp"];

pub const REPORT_FILE: &str = "kira-sra.report.json";

/// The output directory: every downloaded archive, transient file and
/// final FASTQ lives here, namespaced by accession.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
    gzip: bool,
}

impl Store {
    pub fn new(root: Utf8PathBuf, gzip: bool) -> Self {
        Self { root, gzip }
    }

    pub fn from_path(root: &Path, gzip: bool) -> Result<Self, SraError> {
        let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).map_err(|path| {
            SraError::Filesystem(format!("output path is not UTF-8: {}", path.display()))
        })?;
        Ok(Self::new(root, gzip))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn gzip(&self) -> bool {
        self.gzip
    }

    pub fn fastq_ext(&self) -> &'static str {
        fastq_ext(self.gzip)
    }

    pub fn single_path(&self, id: &Accession) -> Utf8PathBuf {
        self.root.join(format!("{id}{}", self.fastq_ext()))
    }

    pub fn mate_path(&self, id: &Accession, mate: Mate) -> Utf8PathBuf {
        self.root
            .join(format!("{id}{}{}", mate.suffix(), self.fastq_ext()))
    }

    pub fn archive_path(&self, id: &Accession) -> Utf8PathBuf {
        self.root.join(format!("{id}.sra"))
    }

    /// Directory newer prefetch releases create for the archive. `None` for
    /// ids that would name a path outside a single child of the root.
    pub fn archive_dir(&self, id: &Accession) -> Option<Utf8PathBuf> {
        let name = id.as_str();
        if matches!(name, "." | "..") || name.contains(['/', '\\']) {
            return None;
        }
        Some(self.root.join(name))
    }

    pub fn error_log_path(&self, id: &Accession) -> Utf8PathBuf {
        self.root.join(format!("{id}.error"))
    }

    pub fn temp_path(&self, id: &Accession) -> Utf8PathBuf {
        self.root.join(format!("{id}.temp"))
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.root.join(REPORT_FILE)
    }

    pub fn ensure_root(&self) -> Result<(), SraError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| SraError::Filesystem(format!("create {}: {err}", self.root)))
    }

    /// Finds the archive prefetch produced, flat or nested.
    pub fn locate_archive(&self, id: &Accession) -> Option<PathBuf> {
        let flat = self.archive_path(id);
        if flat.as_std_path().is_file() {
            return Some(flat.into_std_path_buf());
        }
        let dir = self.archive_dir(id)?;
        let nested = dir.join(format!("{id}.sra"));
        if nested.as_std_path().is_file() {
            return Some(nested.into_std_path_buf());
        }
        find_first_ext(dir.as_std_path(), "sra")
    }

    /// Reports whether the FASTQ output for `id` is on disk. A lone first
    /// mate is renamed to the single-end name and reported as `Repaired`.
    pub fn probe(&self, id: &Accession) -> Result<OutputStatus, SraError> {
        let single = self.single_path(id);
        if single.as_std_path().exists() {
            return Ok(OutputStatus::Complete(OutputArtifact::Single { path: single }));
        }

        let first = self.mate_path(id, Mate::First);
        let second = self.mate_path(id, Mate::Second);
        match (first.as_std_path().exists(), second.as_std_path().exists()) {
            (true, true) => Ok(OutputStatus::Complete(OutputArtifact::Paired { first, second })),
            (true, false) => {
                fs::rename(first.as_std_path(), single.as_std_path()).map_err(|err| {
                    SraError::Filesystem(format!("rename {first} -> {single}: {err}"))
                })?;
                info!(accession = %id, "promoted lone first mate to single-end output");
                Ok(OutputStatus::Repaired(OutputArtifact::Single { path: single }))
            }
            _ => Ok(OutputStatus::Missing),
        }
    }

    /// Removes every lock/tmp/error/temp entry in the directory, whichever
    /// accession it belongs to.
    pub fn sweep_stale(&self) -> Result<Vec<Utf8PathBuf>, SraError> {
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| SraError::Filesystem(format!("read {}: {err}", self.root)))?;
        let mut removed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SraError::Filesystem(err.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !STALE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
                continue;
            }
            let path = self.root.join(name);
            let result = if path.as_std_path().is_dir() {
                fs::remove_dir_all(path.as_std_path())
            } else {
                fs::remove_file(path.as_std_path())
            };
            result.map_err(|err| SraError::Filesystem(format!("remove {path}: {err}")))?;
            removed.push(path);
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "swept stale artifacts");
        }
        Ok(removed)
    }

    /// Deletes the downloaded archive and the probe temp file of `id`.
    /// The `.error` log stays for inspection.
    pub fn remove_transient(&self, id: &Accession) -> Result<(), SraError> {
        if let Some(archive) = self.locate_archive(id) {
            remove_if_exists(&archive)?;
        }
        if let Some(dir) = self.archive_dir(id)
            && dir.as_std_path().is_dir()
        {
            fs::remove_dir_all(dir.as_std_path())
                .map_err(|err| SraError::Filesystem(format!("remove {dir}: {err}")))?;
        }
        self.remove_temp(id)
    }

    pub fn remove_temp(&self, id: &Accession) -> Result<(), SraError> {
        remove_if_exists(self.temp_path(id).as_std_path())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SraError> {
        let parent = path
            .parent()
            .ok_or_else(|| SraError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SraError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".kira-sra-report")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| SraError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| SraError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| SraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<(), SraError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SraError::Filesystem(format!(
            "remove {}: {err}",
            path.display()
        ))),
    }
}

fn find_first_ext(root: &Path, ext: &str) -> Option<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let Ok(entries) = fs::read_dir(&path) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .and_then(|value| value.to_str())
                .map(|value| value.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
            {
                return Some(path);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new(Utf8PathBuf::from("/data/out"), false);
        let id: Accession = "SRR014966".parse().unwrap();

        assert_eq!(store.single_path(&id), "/data/out/SRR014966.fastq");
        assert_eq!(
            store.mate_path(&id, Mate::Second),
            "/data/out/SRR014966_2.fastq"
        );
        assert_eq!(store.error_log_path(&id), "/data/out/SRR014966.error");
        assert_eq!(store.temp_path(&id), "/data/out/SRR014966.temp");
        assert_eq!(store.archive_path(&id), "/data/out/SRR014966.sra");
    }

    #[test]
    fn gzip_paths() {
        let store = Store::new(Utf8PathBuf::from("/data/out"), true);
        let id: Accession = "SRR014966".parse().unwrap();

        assert_eq!(store.single_path(&id), "/data/out/SRR014966.fastq.gz");
        assert_eq!(
            store.mate_path(&id, Mate::First),
            "/data/out/SRR014966_1.fastq.gz"
        );
    }
}

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::Serialize;

use crate::error::SraError;

static RUN_ACCESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[SED]RR[0-9]+$").expect("static regex"));

/// Public accession naming one archive. Only trimmed and checked for
/// emptiness; malformed ids surface later as prefetch failures.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for SRR/ERR/DRR run accessions, the only kind prefetch turns
    /// into a single `.sra` file.
    pub fn looks_like_run(&self) -> bool {
        RUN_ACCESSION.is_match(&self.0)
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = SraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SraError::EmptyAccession);
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Single,
    Paired,
}

impl Layout {
    /// A one-spot dump of a single-end run is exactly one FASTQ record.
    pub fn from_probe_lines(lines: usize) -> Self {
        if lines == 4 { Layout::Single } else { Layout::Paired }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Single => write!(f, "single"),
            Layout::Paired => write!(f, "paired"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    First,
    Second,
}

impl Mate {
    pub fn suffix(self) -> &'static str {
        match self {
            Mate::First => "_1",
            Mate::Second => "_2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum OutputArtifact {
    Single { path: Utf8PathBuf },
    Paired { first: Utf8PathBuf, second: Utf8PathBuf },
}

impl OutputArtifact {
    pub fn layout(&self) -> Layout {
        match self {
            OutputArtifact::Single { .. } => Layout::Single,
            OutputArtifact::Paired { .. } => Layout::Paired,
        }
    }

    pub fn paths(&self) -> Vec<&Utf8PathBuf> {
        match self {
            OutputArtifact::Single { path } => vec![path],
            OutputArtifact::Paired { first, second } => vec![first, second],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputStatus {
    Complete(OutputArtifact),
    /// A lone `_1` file was promoted to the single-end name. Reported as
    /// not yet complete; the next probe sees the canonical file.
    Repaired(OutputArtifact),
    Missing,
}

impl OutputStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, OutputStatus::Complete(_))
    }
}

pub fn fastq_ext(gzip: bool) -> &'static str {
    if gzip { ".fastq.gz" } else { ".fastq" }
}

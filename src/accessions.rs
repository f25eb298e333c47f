use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::Accession;
use crate::error::SraError;

/// Reads a newline-delimited accession list. Lines are trimmed, blanks
/// dropped and duplicates collapsed.
pub fn load_accessions(path: &Path) -> Result<BTreeSet<Accession>, SraError> {
    let content = fs::read_to_string(path).map_err(|err| SraError::AccessionList {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let accessions = parse_accessions(&content);
    debug!(path = %path.display(), count = accessions.len(), "loaded accession list");
    Ok(accessions)
}

pub fn parse_accessions(content: &str) -> BTreeSet<Accession> {
    let accessions = content
        .split('\n')
        .filter_map(|line| line.parse::<Accession>().ok())
        .collect::<BTreeSet<_>>();
    for id in accessions.iter().filter(|id| !id.looks_like_run()) {
        warn!(accession = %id, "not a run accession; prefetch will likely reject it");
    }
    accessions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_and_drop_blanks() {
        let ids = parse_accessions("SRR000001\nSRR000001\n \nSRR000002\n");
        let ids = ids.iter().map(|id| id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["SRR000001", "SRR000002"]);
    }

    #[test]
    fn empty_content() {
        assert!(parse_accessions("").is_empty());
        assert!(parse_accessions("\n\n  \n").is_empty());
    }
}

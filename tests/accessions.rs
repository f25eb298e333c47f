use std::fs;

use assert_matches::assert_matches;

use kira_sra_dump::accessions::load_accessions;
use kira_sra_dump::error::SraError;

#[test]
fn loads_unique_non_blank_accessions() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ids.txt");
    fs::write(&path, "SRR000001\nSRR000001\n \nSRR000002").unwrap();

    let ids = load_accessions(&path).unwrap();
    let ids = ids.iter().map(|id| id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["SRR000001", "SRR000002"]);
}

#[test]
fn windows_line_endings_are_trimmed() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("ids.txt");
    fs::write(&path, "SRR000001\r\n\r\nERR000002\r\n").unwrap();

    let ids = load_accessions(&path).unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| !id.as_str().ends_with('\r')));
}

#[test]
fn missing_list_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let err = load_accessions(&temp.path().join("absent.txt")).unwrap_err();
    assert_matches!(err, SraError::AccessionList { .. });
}

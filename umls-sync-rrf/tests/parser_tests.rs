//! End-to-end parser + transformer tests over on-disk RRF fixtures.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use umls_sync_core::SuppressionHandling;
use umls_sync_rrf::record::RowFilter;
use umls_sync_rrf::{ParseOptions, RrfParser, RrfError, Transformer};

fn conso_row(cui: &str, sab: &str, code: &str, name: &str, suppress: &str) -> String {
    format!("{cui}|ENG|P|L000|PF|S000|Y|A000|||{code}|{sab}|PT|{code}|{name}|0|{suppress}|256|")
}

fn rel_row(cui1: &str, cui2: &str, rel: &str, rela: &str, sab: &str) -> String {
    format!("{cui1}|A1|SCUI|{rel}|{cui2}|A2|SCUI|{rela}|R1||{sab}|{sab}|||N||")
}

fn sty_row(cui: &str, tui: &str) -> String {
    format!("{cui}|{tui}|A1.2|Some Type|AT1|256|")
}

fn write_meta(dir: &Path, conso: &[String], rel: &[String], sty: &[String]) {
    fs::write(dir.join("MRCONSO.RRF"), conso.join("\n") + "\n").unwrap();
    fs::write(dir.join("MRREL.RRF"), rel.join("\n") + "\n").unwrap();
    fs::write(dir.join("MRSTY.RRF"), sty.join("\n") + "\n").unwrap();
}

fn options(workers: usize) -> ParseOptions {
    ParseOptions {
        filter: RowFilter::default(),
        workers,
        max_malformed_rows: 10,
    }
}

#[test]
fn parses_a_small_release() {
    let tmp = TempDir::new().unwrap();
    write_meta(
        tmp.path(),
        &[
            conso_row("C0000001", "RXNORM", "100", "Drug A", "N"),
            conso_row("C0000002", "MSH", "D01", "Disease B", "N"),
        ],
        &[rel_row("C0000001", "C0000002", "RO", "treats", "RXNORM")],
        &[
            sty_row("C0000001", "T121"),
            sty_row("C0000002", "T047"),
        ],
    );

    let parser = RrfParser::new(tmp.path(), options(2)).unwrap();
    let release = parser.parse_release().unwrap();
    assert_eq!(release.terms.len(), 2);
    assert_eq!(release.rels.len(), 1);
    assert_eq!(release.stys.len(), 2);
    assert!(release.deleted_cuis.is_empty());
    assert!(release.merges.is_empty());

    let snapshot = Transformer::new(&["RXNORM".to_string(), "MSH".to_string()])
        .build_snapshot(release.terms, release.rels, release.stys);

    assert_eq!(snapshot.concepts.len(), 2);
    assert_eq!(snapshot.concepts[0].labels, ["Concept", "biolink:Drug"]);
    assert_eq!(snapshot.concepts[1].labels, ["Concept", "biolink:Disease"]);
    assert_eq!(snapshot.codes.len(), 2);
    assert_eq!(snapshot.links.len(), 2);
    assert_eq!(snapshot.edges.len(), 1);
    assert_eq!(snapshot.edges[0].predicate, "biolink:treats");
}

#[test]
fn snapshot_is_invariant_across_worker_counts() {
    let tmp = TempDir::new().unwrap();
    let conso: Vec<String> = (0..200)
        .map(|i| {
            let cui = format!("C{:07}", i % 23);
            let sab = if i % 3 == 0 { "RXNORM" } else { "MSH" };
            conso_row(&cui, sab, &format!("K{i}"), &format!("Name {i}"), "N")
        })
        .collect();
    let rel: Vec<String> = (0..120)
        .map(|i| {
            let a = format!("C{:07}", i % 23);
            let b = format!("C{:07}", (i + 1) % 23);
            rel_row(&a, &b, "RO", "treats", if i % 2 == 0 { "RXNORM" } else { "MSH" })
        })
        .collect();
    let sty: Vec<String> = (0..23).map(|i| sty_row(&format!("C{:07}", i), "T047")).collect();
    write_meta(tmp.path(), &conso, &rel, &sty);

    let transformer = Transformer::new(&["RXNORM".to_string(), "MSH".to_string()]);
    let mut snapshots = Vec::new();
    for workers in [1, 2, 7] {
        let parser = RrfParser::new(tmp.path(), options(workers)).unwrap();
        let release = parser.parse_release().unwrap();
        snapshots.push(transformer.build_snapshot(release.terms, release.rels, release.stys));
    }
    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
}

#[test]
fn sab_filter_drops_foreign_vocabularies() {
    let tmp = TempDir::new().unwrap();
    write_meta(
        tmp.path(),
        &[
            conso_row("C0000001", "RXNORM", "100", "Drug A", "N"),
            conso_row("C0000002", "LNC", "LP1", "Lab Thing", "N"),
        ],
        &[rel_row("C0000001", "C0000002", "RO", "", "LNC")],
        &[sty_row("C0000001", "T121")],
    );

    let opts = ParseOptions {
        filter: RowFilter {
            sab_allowlist: ["RXNORM".to_string()].into(),
            suppression: SuppressionHandling::default(),
        },
        workers: 2,
        max_malformed_rows: 10,
    };
    let parser = RrfParser::new(tmp.path(), opts).unwrap();
    let release = parser.parse_release().unwrap();
    assert_eq!(release.terms.len(), 1);
    assert_eq!(release.terms[0].sab, "RXNORM");
    assert!(release.rels.is_empty());
    assert_eq!(release.stats.filtered, 2);
}

#[test]
fn malformed_rows_over_threshold_abort_the_parse() {
    let tmp = TempDir::new().unwrap();
    let mut conso = vec![conso_row("C0000001", "RXNORM", "100", "Drug A", "N")];
    conso.extend((0..5).map(|i| format!("broken|row|{i}")));
    write_meta(tmp.path(), &conso, &[rel_row("C0000001", "C0000001", "RO", "", "RXNORM")], &[sty_row("C0000001", "T121")]);

    let opts = ParseOptions {
        filter: RowFilter::default(),
        workers: 2,
        max_malformed_rows: 3,
    };
    let parser = RrfParser::new(tmp.path(), opts).unwrap();
    let err = parser.parse_mrconso().unwrap_err();
    match err {
        RrfError::MalformedRows { count, threshold, .. } => {
            assert_eq!(count, 5);
            assert_eq!(threshold, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_rows_under_threshold_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let conso = vec![
        conso_row("C0000001", "RXNORM", "100", "Drug A", "N"),
        "short|row|".to_string(),
    ];
    write_meta(tmp.path(), &conso, &[], &[]);
    // Empty MRREL/MRSTY files still need to exist.
    fs::write(tmp.path().join("MRREL.RRF"), "").unwrap();
    fs::write(tmp.path().join("MRSTY.RRF"), "").unwrap();

    let parser = RrfParser::new(tmp.path(), options(2)).unwrap();
    let (terms, stats) = parser.parse_mrconso().unwrap();
    assert_eq!(terms.len(), 1);
    assert_eq!(stats.malformed, 1);

    let (rels, _) = parser.parse_mrrel().unwrap();
    assert!(rels.is_empty());
}

#[test]
fn change_files_parse_when_present() {
    let tmp = TempDir::new().unwrap();
    write_meta(tmp.path(), &[conso_row("C0000001", "RXNORM", "100", "A", "N")], &[], &[]);
    fs::write(tmp.path().join("DELETEDCUI.RRF"), "C0000009|Retired thing|\nC0000010|Other|\n").unwrap();
    fs::write(tmp.path().join("MERGEDCUI.RRF"), "C0000001|C0000002|\n").unwrap();

    let parser = RrfParser::new(tmp.path(), options(1)).unwrap();
    assert_eq!(parser.parse_deleted_cuis().unwrap(), ["C0000009", "C0000010"]);
    let merges = parser.parse_merged_cuis().unwrap();
    assert_eq!(merges.len(), 1);
    assert_eq!(merges[0].old_cui, "C0000001");
}

#[test]
fn missing_mrconso_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let parser = RrfParser::new(tmp.path(), options(1)).unwrap();
    assert!(matches!(
        parser.parse_mrconso().unwrap_err(),
        RrfError::FileNotFound(_)
    ));
}

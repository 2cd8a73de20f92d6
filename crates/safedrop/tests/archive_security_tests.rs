//! Archive handling: members are reprocessed, hostile archives are
//! quarantined whole and nothing is ever written outside the trees.

mod common;

use std::fs;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use common::harness::zip_bytes;
use common::{FixedScanner, NameScanner, TestHarness};
use safedrop::Outcome;

#[test]
fn test_zip_members_are_organized_and_archive_kept() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_zip(
        "bundle.zip",
        &[("notes.txt", b"meeting notes"), ("data/report.csv", b"a,b\n1,2\n")],
    );

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(result.metadata["archive_format"], "zip");
    assert_eq!(result.metadata["file_count"], 2);
    assert_eq!(result.metadata["total_extracted_size"], 21);
    assert_eq!(
        harness.organized(),
        vec!["archives/bundle.zip", "documents/notes.txt", "spreadsheets/report.csv"]
    );
    assert!(!archive.exists());
}

#[test]
fn test_tar_members_are_organized() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_tar("backup.tar", &[("readme.txt", b"read me")]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(result.metadata["archive_format"], "tar");
    assert!(harness.organized().contains(&"documents/readme.txt".to_string()));
    assert!(harness.organized().contains(&"archives/backup.tar".to_string()));
}

#[test]
fn test_tar_with_root_directory_entry_is_organized() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    // Layout written by `tar -C dir -cf x.tar .`
    let archive = harness.write_tar("x.tar", &[("./", b""), ("./a.txt", b"alpha")]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(result.metadata["file_count"], 1);
    assert_eq!(harness.organized(), vec!["archives/x.tar", "documents/a.txt"]);
    assert!(harness.quarantined().is_empty());
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_single_gzip_file_is_organized_as_is() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let compressed = gzip(b"name,total\nacme,42\n");
    let source = harness.write_source("data.csv.gz", &compressed);

    let result = pipeline.process(&source);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(harness.organized(), vec!["archives/data.csv.gz"]);
    assert_eq!(fs::read(harness.dest_dir.join("archives/data.csv.gz")).unwrap(), compressed);
    assert!(!source.exists());
}

#[test]
fn test_gzipped_tar_without_tar_suffix_is_unpacked() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let tarball = harness.write_tar("staging.tar", &[("readme.txt", b"read me")]);
    let source = harness.write_source("backup.gz", &gzip(&fs::read(&tarball).unwrap()));
    fs::remove_file(&tarball).unwrap();

    let result = pipeline.process(&source);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(result.metadata["archive_format"], "tar");
    assert_eq!(harness.organized(), vec!["archives/backup.gz", "documents/readme.txt"]);
}

#[test]
fn test_too_many_members_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().max_files(2).build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_zip(
        "many.zip",
        &[("a.txt", b"a"), ("b.txt", b"b"), ("c.txt", b"c")],
    );

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
    assert_eq!(harness.quarantined().len(), 1);
    assert!(harness.quarantined()[0].ends_with("many.zip"));
    assert!(harness.organized().is_empty());
}

#[test]
fn test_oversized_total_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().max_total_size(1024).build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let big = vec![b'x'; 800];
    let archive = harness.write_zip("big.zip", &[("one.txt", &big), ("two.txt", &big)]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
    assert!(harness.organized().is_empty());
}

#[test]
fn test_oversized_member_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().max_file_size(100).build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let big = vec![b'x'; 500];
    let archive = harness.write_zip("fat.zip", &[("small.txt", b"small"), ("big.txt", &big)]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
    assert_eq!(harness.quarantined().len(), 1);
    assert!(harness.quarantined()[0].ends_with("fat.zip"));
    assert!(harness.organized().is_empty());
    assert!(harness.strays().is_empty(), "strays: {:?}", harness.strays());
    assert!(!archive.exists());
}

#[test]
fn test_directory_depth_beyond_limit_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().max_depth(2).build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_zip(
        "deep.zip",
        &[("top.txt", b"top"), ("a/b/c/d/e/f.txt", b"buried")],
    );

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
    assert_eq!(harness.quarantined().len(), 1);
    assert!(harness.quarantined()[0].ends_with("deep.zip"));
    assert!(harness.organized().is_empty());
    assert!(harness.strays().is_empty(), "strays: {:?}", harness.strays());
}

#[test]
fn test_zip_traversal_member_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_zip(
        "evil.zip",
        &[("fine.txt", b"fine"), ("../../escape.txt", b"pwned")],
    );

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
    assert!(harness.organized().is_empty());
    assert!(harness.strays().is_empty(), "strays: {:?}", harness.strays());
    assert!(!harness.temp_path().join("escape.txt").exists());
}

#[test]
fn test_tar_traversal_member_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_tar("evil.tar", &[("../../escape.txt", b"pwned")]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
    assert!(harness.strays().is_empty(), "strays: {:?}", harness.strays());
}

#[test]
fn test_absolute_tar_member_quarantines_archive() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_tar("abs.tar", &[("/tmp/safedrop-absolute.txt", b"pwned")]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Quarantined);
    assert_eq!(result.metadata["threat_name"], "ArchiveBomb");
}

#[test]
fn test_nested_archives_are_unpacked_recursively() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let inner = zip_bytes(&[("deep.txt", b"deep")]);
    let archive = harness.write_zip("outer.zip", &[("inner.zip", &inner), ("top.txt", b"top")]);

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(
        harness.organized(),
        vec![
            "archives/inner.zip",
            "archives/outer.zip",
            "documents/deep.txt",
            "documents/top.txt"
        ]
    );
}

#[test]
fn test_nesting_beyond_limit_quarantines_inner_archive() {
    let harness = TestHarness::new();
    let config = harness.config().max_depth(1).build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let inner = zip_bytes(&[("deep.txt", b"deep")]);
    let archive = harness.write_zip("outer.zip", &[("inner.zip", &inner)]);

    let result = pipeline.process(&archive);

    // The outer archive itself is fine; only the nested one is rejected.
    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    let quarantined = result.metadata["quarantined_files"].as_array().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(harness.quarantined().len(), 1);
    assert!(harness.quarantined()[0].ends_with("inner.zip"));
    assert_eq!(harness.organized(), vec!["archives/outer.zip"]);
}

#[test]
fn test_infected_member_is_quarantined_alone() {
    let harness = TestHarness::new();
    let config = harness.config().build();
    let pipeline = harness.pipeline(&config, NameScanner::flagging("eicar.com"));

    let archive = harness.write_zip(
        "mixed.zip",
        &[("clean.txt", b"hello"), ("eicar.com", common::EICAR)],
    );

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Organized, "error: {:?}", result.error);
    assert_eq!(result.metadata["quarantined_files"].as_array().unwrap().len(), 1);
    assert_eq!(harness.quarantined().len(), 1);
    assert!(harness.quarantined()[0].ends_with("eicar.com"));
    assert!(harness.audit_records()[0].contains("Threat Name: Eicar-Test-Signature"));
    assert_eq!(harness.organized(), vec!["archives/mixed.zip", "documents/clean.txt"]);
}

#[test]
fn test_extraction_disabled_keeps_archive_whole() {
    let harness = TestHarness::new();
    let config = harness.config().archive_extraction(false).build();
    let pipeline = harness.pipeline(&config, FixedScanner::clean());

    let archive = harness.write_zip("bundle.zip", &[("notes.txt", b"notes")]);
    let original = fs::read(&archive).unwrap();

    let result = pipeline.process(&archive);

    assert_eq!(result.outcome, Outcome::Organized);
    assert_eq!(harness.organized(), vec!["archives/bundle.zip"]);
    let kept = fs::read(harness.dest_dir.join("archives/bundle.zip")).unwrap();
    assert_eq!(kept, original);
}

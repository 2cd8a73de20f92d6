//! Test harness for isolated pipeline runs.
//!
//! Every harness owns a temporary directory holding an `inbox/` source tree
//! and a `sorted/` destination tree, and tears both down on drop.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use safedrop::config::Config;
use safedrop::security::Scanner;
use safedrop::{Collaborators, Pipeline, PipelineConfig, RuleClassifier, TextExtractor};

use super::builders::{CannedText, ConfigBuilder};

pub struct TestHarness {
    temp_dir: TempDir,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let source_dir = temp_dir.path().join("inbox");
        let dest_dir = temp_dir.path().join("sorted");
        fs::create_dir_all(&source_dir).expect("Failed to create source dir");

        Self {
            temp_dir,
            source_dir,
            dest_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.dest_dir.join("quarantine")
    }

    /// Config builder pointed at this harness's directories.
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new(&self.source_dir, &self.dest_dir)
    }

    /// Pipeline with the real classifier, the given scanner and no OCR text.
    pub fn pipeline(&self, config: &Config, scanner: Arc<dyn Scanner>) -> Pipeline {
        self.pipeline_with_text(config, scanner, CannedText::none())
    }

    pub fn pipeline_with_text(
        &self,
        config: &Config,
        scanner: Arc<dyn Scanner>,
        text: Arc<dyn TextExtractor>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(PipelineConfig::from_config(config)),
            Collaborators {
                classifier: Arc::new(RuleClassifier::new()),
                scanner,
                text_extractor: text,
            },
        )
    }

    pub fn write_source(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.source_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write source file");
        path
    }

    /// Writes a zip archive with the given members into the source tree.
    pub fn write_zip(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.source_dir.join(name);
        fs::write(&path, zip_bytes(entries)).expect("Failed to write zip");
        path
    }

    /// Writes a plain tar archive with the given members into the source
    /// tree. Member names are written raw, bypassing the tar builder's own
    /// path checks. A name ending in `/` becomes a directory entry.
    pub fn write_tar(&self, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let mut builder = tar::Builder::new(Vec::new());
        for (member, data) in entries {
            let kind = if member.ends_with('/') {
                tar::EntryType::Directory
            } else {
                tar::EntryType::Regular
            };
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(kind);
            {
                let old = header.as_old_mut();
                old.name = [0; 100];
                old.name[..member.len()].copy_from_slice(member.as_bytes());
            }
            header.set_cksum();
            builder.append(&header, *data).expect("Failed to append tar member");
        }
        let bytes = builder.into_inner().expect("Failed to finish tar");

        let path = self.source_dir.join(name);
        fs::write(&path, bytes).expect("Failed to write tar");
        path
    }

    /// Names of quarantined files, audit records excluded, sorted.
    pub fn quarantined(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.quarantine_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.ends_with(".log"))
            .collect();
        names.sort();
        names
    }

    /// Audit record contents, sorted by file name.
    pub fn audit_records(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.quarantine_dir()) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
            .collect();
        paths.sort();
        paths
            .iter()
            .map(|p| fs::read_to_string(p).expect("Failed to read audit record"))
            .collect()
    }

    /// Every organized file under the destination, relative to it, with
    /// the quarantine tree left out.
    pub fn organized(&self) -> Vec<String> {
        let quarantine = self.quarantine_dir();
        let mut files: Vec<String> = WalkDir::new(&self.dest_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && !e.path().starts_with(&quarantine))
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.dest_dir)
                    .ok()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        files
    }

    /// Every file under the harness root outside the source tree, the
    /// destination tree and the fake scanner's `bin/`.
    pub fn strays(&self) -> Vec<PathBuf> {
        let bin = self.temp_path().join("bin");
        WalkDir::new(self.temp_path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                !p.starts_with(&self.source_dir) && !p.starts_with(&self.dest_dir) && !p.starts_with(&bin)
            })
            .collect()
    }

    /// Installs an executable stand-in for `clamscan` that reports the EICAR
    /// test string as infected and everything else as clean.
    #[cfg(unix)]
    pub fn fake_clamscan(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = "#!/bin/sh\n\
            for target; do :; done\n\
            if grep -q 'EICAR-STANDARD-ANTIVIRUS-TEST-FILE' \"$target\"; then\n\
            \techo \"$target: Eicar-Test-Signature FOUND\"\n\
            \texit 1\n\
            fi\n\
            echo \"$target: OK\"\n\
            exit 0\n";

        let path = self.temp_path().join("bin").join("clamscan");
        fs::create_dir_all(path.parent().expect("script has a parent")).expect("Failed to create bin dir");
        fs::write(&path, script).expect("Failed to write fake scanner");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to mark fake scanner executable");
        path
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start zip entry");
        writer.write_all(data).expect("Failed to write zip entry");
    }
    writer.finish().expect("Failed to finish zip").into_inner()
}

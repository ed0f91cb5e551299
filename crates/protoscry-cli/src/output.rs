//! Output placement and file writing.
//!
//! Descriptors are identified by a blake3 digest of their raw bytes, the same
//! bytes the scanner deduplicates on within one input. The ledger extends that
//! across inputs and decides what happens when two different descriptors
//! share an output file name.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Hex digits of the raw digest used to tell same-named descriptors apart
const SUFFIX_DIGITS: usize = 8;

/// What to do when a different descriptor already claimed an output name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ConflictStrategy {
    /// Write it as name~<raw digest prefix>.proto
    #[default]
    HashSuffix,
    /// Keep the first descriptor only
    SkipConflicts,
}

/// Where one descriptor goes
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Write to this path
    Write(PathBuf),
    /// The same raw bytes were already placed at this path
    Repeat(PathBuf),
    /// A different descriptor holds the name and conflicts are skipped
    Skip,
}

#[derive(Debug, Default)]
pub(crate) struct OutputCounts {
    pub(crate) placed: usize,
    pub(crate) repeats: usize,
    pub(crate) renamed: usize,
    pub(crate) skipped: usize,
    pub(crate) incomplete: usize,
    pub(crate) written: usize,
}

/// Every descriptor placed so far in this run
#[derive(Debug, Default)]
pub(crate) struct OutputLedger {
    output_dir: PathBuf,
    strategy: ConflictStrategy,
    placed: HashMap<blake3::Hash, PathBuf>,
    names: HashMap<String, usize>,
    pub(crate) counts: OutputCounts,
}

impl OutputLedger {
    pub(crate) fn new(output_dir: impl Into<PathBuf>, strategy: ConflictStrategy) -> Self {
        Self {
            output_dir: output_dir.into(),
            strategy,
            ..Default::default()
        }
    }

    /// Decide where the descriptor with these raw bytes is written.
    pub(crate) fn place(&mut self, file_name: &str, raw: &[u8]) -> Placement {
        let digest = blake3::hash(raw);
        if let Some(path) = self.placed.get(&digest) {
            debug!("{} repeats {}", file_name, path.display());
            self.counts.repeats += 1;
            return Placement::Repeat(path.clone());
        }

        let claimed = self.names.entry(file_name.to_string()).or_insert(0);
        let path = if *claimed == 0 {
            self.output_dir.join(file_name)
        } else {
            match self.strategy {
                ConflictStrategy::SkipConflicts => {
                    debug!("{} already taken by another descriptor, skipping", file_name);
                    self.counts.skipped += 1;
                    return Placement::Skip;
                }
                ConflictStrategy::HashSuffix => {
                    let renamed = suffixed(file_name, &digest.to_hex()[..SUFFIX_DIGITS]);
                    info!("{} already taken by another descriptor, using {}", file_name, renamed);
                    self.counts.renamed += 1;
                    self.output_dir.join(renamed)
                }
            }
        };

        *claimed += 1;
        self.counts.placed += 1;
        self.placed.insert(digest, path.clone());
        Placement::Write(path)
    }

    pub(crate) fn log_summary(&self) {
        let c = &self.counts;
        info!(
            placed = c.placed,
            repeats = c.repeats,
            renamed = c.renamed,
            skipped = c.skipped,
            incomplete = c.incomplete,
            written = c.written,
            "Extraction finished"
        );
    }
}

/// `name.proto` -> `name~tag.proto`; other names get the tag appended
fn suffixed(file_name: &str, tag: &str) -> String {
    match file_name.strip_suffix(".proto") {
        Some(stem) => format!("{stem}~{tag}.proto"),
        None => format!("{file_name}~{tag}"),
    }
}

/// Sibling path holding the raw descriptor: `x.proto` -> `x.protoc`
pub(crate) fn raw_path(proto_path: &Path) -> PathBuf {
    let mut raw = proto_path.as_os_str().to_owned();
    raw.push("c");
    PathBuf::from(raw)
}

/// Write `content` to `path`, creating parent directories as needed
pub(crate) fn write_file(path: &Path, content: &[u8], force: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if path.exists() && !force {
        bail!("File already exists: {} (use --force to overwrite)", path.display());
    }

    fs::File::create(path)
        .and_then(|mut file| file.write_all(content))
        .with_context(|| format!("Failed to write file: {}", path.display()))
}

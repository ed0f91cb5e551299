//! Reading inputs and picking candidate binaries out of a directory tree.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::WalkDir;

/// Bytes inspected when deciding whether a file holds binary data
const SNIFF_LEN: u64 = 8 * 1024;

/// Leading bytes of object and executable formats
const OBJECT_MAGIC: &[&[u8]] = &[
    b"\x7fELF",
    b"MZ",
    b"\xcf\xfa\xed\xfe",
    b"\xce\xfa\xed\xfe",
    b"\xfe\xed\xfa\xcf",
    b"\xfe\xed\xfa\xce",
    b"\xca\xfe\xba\xbe",
    b"\0asm",
];

/// Read one input, "-" meaning stdin
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("Failed to read stdin")?;
        return Ok(data);
    }

    if !path.is_file() {
        bail!("Input path is not a file: {}", path.display());
    }
    fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))
}

/// Visible files under `root` whose contents look binary
pub(crate) fn binaries_under(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Path is not a directory: {}", root.display());
    }

    let mut found = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        match looks_binary(entry.path()) {
            Ok(true) => found.push(entry.into_path()),
            Ok(false) => trace!("Skipping text file: {}", entry.path().display()),
            Err(e) => trace!("Skipping unreadable {}: {}", entry.path().display(), e),
        }
    }

    Ok(found)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// A known object format header, or any NUL byte near the start.
///
/// Serialized descriptors are rarely NUL-free for long, while source and
/// config text never contains one.
fn looks_binary(path: &Path) -> std::io::Result<bool> {
    let mut head = Vec::new();
    fs::File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;

    if OBJECT_MAGIC.iter().any(|magic| head.starts_with(magic)) {
        return Ok(true);
    }
    Ok(head.contains(&0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_looks_binary() {
        let temp_dir = TempDir::new().unwrap();
        let write = |name: &str, content: &[u8]| {
            let path = temp_dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        };

        assert!(looks_binary(&write("app", b"\x7fELF\x02\x01\x01")).unwrap());
        assert!(looks_binary(&write("app.exe", b"MZ\x90")).unwrap());
        assert!(looks_binary(&write("blob.dat", b"abc\0def")).unwrap());
        assert!(!looks_binary(&write("notes.txt", b"just text\n")).unwrap());
        assert!(!looks_binary(&write("empty", b"")).unwrap());
    }

    #[test]
    fn test_binaries_under_skips_hidden_and_text() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("bin/server"), b"\x7fELF\x02\x01\x01").unwrap();
        fs::write(root.join("bin/.cache"), b"\x7fELF\x02\x01\x01").unwrap();
        fs::write(root.join(".git/index"), b"DIRC\0\0\0\x02").unwrap();
        fs::write(root.join("README.md"), b"# readme\n").unwrap();

        let found = binaries_under(root).unwrap();
        assert_eq!(found, vec![root.join("bin/server")]);
    }

    #[test]
    fn test_binaries_under_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a");
        fs::write(&file, b"x").unwrap();
        assert!(binaries_under(&file).is_err());
    }

    #[test]
    fn test_read_input_missing_file() {
        assert!(read_input(Path::new("/nonexistent/protoscry-input")).is_err());
    }
}

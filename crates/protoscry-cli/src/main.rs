//! protoscry - Extract Protocol Buffer definitions from compiled binaries
//!
//! This tool scans binary files for embedded protobuf file descriptors
//! and reconstructs them into human-readable `.proto` source files.

mod input;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, ValueEnum};
use input::{binaries_under, read_input};
use output::{raw_path, write_file, ConflictStrategy, OutputLedger, Placement};
use protoscry_core::{FileDescriptorProto, ProtoReconstructor, Scanner, ScannerConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;

/// Name used for descriptors that declare no file name
const UNKNOWN_PROTO_NAME: &str = "unknown.proto";

/// Extract Protocol Buffer definitions from compiled binaries
#[derive(Parser, Debug)]
#[command(name = "protoscry")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Output directory for extracted .proto files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "proto")]
    format: OutputFormat,

    /// Also write the raw descriptor bytes as <name>.protoc
    #[arg(long)]
    raw: bool,

    /// Maximum number of descriptors to extract per input (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_descriptors: usize,

    /// Maximum speculative decodes per input (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_decode_attempts: usize,

    /// Bytes searched past the estimated descriptor length
    #[arg(long, default_value_t = protoscry_core::scanner::DEFAULT_WINDOW_SLACK)]
    window_slack: usize,

    /// Show what would be written without touching the filesystem
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Only print the declared name of each descriptor found
    #[arg(long)]
    list_only: bool,

    /// What to do when two different descriptors share an output file name
    #[arg(long, value_enum, default_value = "hash-suffix")]
    conflict_strategy: ConflictStrategy,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Binary files to extract definitions from ("-" reads stdin)
    files: Vec<PathBuf>,

    /// Path to a directory of binaries to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for extracted definitions
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Standard .proto format
    Proto,
    /// Just the filename (for scripting)
    Filename,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut ledger = OutputLedger::new(&cli.output, cli.conflict_strategy);
    if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory, &mut ledger)?;
    } else {
        for file in &cli.input.files {
            process_input(&cli, file, &mut ledger)?;
        }
    }

    if !cli.list_only && !cli.dry_run {
        ledger.log_summary();
    }

    Ok(())
}

/// Scan every binary found under `directory`; failures are logged per file
fn process_directory(cli: &Cli, directory: &Path, ledger: &mut OutputLedger) -> Result<()> {
    info!("Scanning directory: {}", directory.display());
    let binaries = binaries_under(directory)?;

    for path in &binaries {
        debug!("Processing binary: {}", path.display());
        if let Err(e) = process_input(cli, path, ledger) {
            warn!("Error processing {}: {:#}", path.display(), e);
        }
    }

    info!("Processed {} binaries", binaries.len());
    Ok(())
}

/// Scan one input and emit every descriptor found in it
fn process_input(cli: &Cli, path: &Path, ledger: &mut OutputLedger) -> Result<()> {
    let data = read_input(path)?;
    trace!("Read {} bytes from {}", data.len(), path.display());

    let config = ScannerConfig::new()
        .max_results(cli.max_descriptors)
        .max_decode_attempts(cli.max_decode_attempts)
        .window_slack(cli.window_slack);

    let summary = Scanner::with_config(config)
        .extract(&data, |raw, descriptor| emit_descriptor(cli, raw, descriptor, ledger))
        .with_context(|| format!("Failed to extract from {}", path.display()))?;

    debug!(
        "{}: {} anchors, {} candidates, {} decode attempts, {} descriptors, {} duplicates",
        path.display(),
        summary.anchors,
        summary.candidates,
        summary.decode_attempts,
        summary.descriptors,
        summary.duplicates
    );
    if summary.budget_exhausted {
        warn!(
            "{}: decode attempt limit reached, later descriptors were not searched",
            path.display()
        );
    }

    Ok(())
}

/// Base name of the declared descriptor name, used as the output file name
fn output_filename(descriptor: &FileDescriptorProto) -> String {
    Path::new(descriptor.name())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_PROTO_NAME)
        .to_string()
}

/// Render one descriptor and write it out according to the CLI options
fn emit_descriptor(
    cli: &Cli,
    raw: &[u8],
    descriptor: FileDescriptorProto,
    ledger: &mut OutputLedger,
) -> Result<()> {
    let declared = descriptor.name().to_string();
    let filename = output_filename(&descriptor);

    if cli.list_only {
        println!("{}", declared);
        return Ok(());
    }

    let rendered = ProtoReconstructor::from_proto(descriptor)
        .reconstruct()
        .map_err(|e| {
            let what = if e.is_render_error() { "render" } else { "decode" };
            anyhow::Error::new(e).context(format!("Failed to {} {}", what, declared))
        })?;

    if !rendered.diagnostics.is_complete() {
        ledger.counts.incomplete += 1;
        for diagnostic in &rendered.diagnostics {
            warn!("{}: {} (output may be incomplete)", declared, diagnostic);
        }
    }

    if let OutputFormat::Filename = cli.format {
        println!("{}", declared);
        return Ok(());
    }

    let output_path = match ledger.place(&filename, raw) {
        Placement::Write(path) => path,
        Placement::Repeat(_) | Placement::Skip => return Ok(()),
    };

    if cli.dry_run {
        println!("Would write: {}", output_path.display());
        if cli.verbose > 0 {
            println!("---");
            println!("{}", rendered.source);
            println!("---");
        }
        return Ok(());
    }

    write_file(&output_path, rendered.source.as_bytes(), cli.force)?;
    if cli.raw {
        write_file(&raw_path(&output_path), raw, cli.force)?;
    }

    println!("Wrote {}", output_path.display());
    ledger.counts.written += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use prost_types::DescriptorProto;
    use std::ffi::OsString;
    use std::fs;
    use tempfile::TempDir;

    fn sample_descriptor(name: &str, message: &str) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(name.to_string()),
            package: Some("some.package".to_string()),
            message_type: vec![DescriptorProto {
                name: Some(message.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn write_binary(dir: &Path, name: &str, descriptors: &[&FileDescriptorProto]) -> PathBuf {
        let mut binary = b"\x7fELF".to_vec();
        binary.extend_from_slice(&[0xCCu8; 124]);
        for fd in descriptors {
            binary.extend_from_slice(&fd.encode_to_vec());
            binary.extend_from_slice(&[0u8; 128]);
        }
        let path = dir.join(name);
        fs::write(&path, &binary).unwrap();
        path
    }

    fn cli_for(out_dir: &Path, extra: &[&str], input: &Path) -> Cli {
        let mut args: Vec<OsString> = vec!["protoscry".into(), "--output".into(), out_dir.into()];
        args.extend(extra.iter().map(|arg| OsString::from(*arg)));
        args.push(input.into());
        Cli::parse_from(args)
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(
            output_filename(&sample_descriptor("google/protobuf/any.proto", "Any")),
            "any.proto"
        );
        assert_eq!(output_filename(&sample_descriptor("", "M")), UNKNOWN_PROTO_NAME);
        assert_eq!(output_filename(&FileDescriptorProto::default()), UNKNOWN_PROTO_NAME);
    }

    #[test]
    fn test_process_input_writes_proto_and_raw() {
        let temp_dir = TempDir::new().unwrap();
        let fd = sample_descriptor("pkg/sample.proto", "SomeMsg");
        let input = write_binary(temp_dir.path(), "app.bin", &[&fd]);

        let out_dir = temp_dir.path().join("out");
        let cli = cli_for(&out_dir, &["--raw"], &input);
        let mut ledger = OutputLedger::new(&cli.output, cli.conflict_strategy);
        process_input(&cli, &input, &mut ledger).unwrap();

        let source = fs::read_to_string(out_dir.join("sample.proto")).unwrap();
        assert!(source.starts_with("syntax = \"proto2\";\n\npackage some.package;\n\n"));
        assert!(source.contains("message SomeMsg {\n}\n"));
        assert_eq!(fs::read(out_dir.join("sample.protoc")).unwrap(), fd.encode_to_vec());
        assert_eq!(ledger.counts.written, 1);

        // The same descriptor bytes seen again are not written twice
        process_input(&cli, &input, &mut ledger).unwrap();
        assert_eq!(ledger.counts.written, 1);
        assert_eq!(ledger.counts.repeats, 1);
    }

    #[test]
    fn test_same_name_different_descriptor_is_suffixed() {
        let temp_dir = TempDir::new().unwrap();
        let first = sample_descriptor("v1/api.proto", "First");
        let second = sample_descriptor("v2/api.proto", "Second");
        let input = write_binary(temp_dir.path(), "app", &[&first, &second]);

        let out_dir = temp_dir.path().join("out");
        let cli = cli_for(&out_dir, &["--raw"], &input);
        let mut ledger = OutputLedger::new(&cli.output, cli.conflict_strategy);
        process_input(&cli, &input, &mut ledger).unwrap();

        let second_raw = second.encode_to_vec();
        let digest = blake3::hash(&second_raw).to_hex();
        let renamed = out_dir.join(format!("api~{}.proto", &digest[..8]));
        let first_source = fs::read_to_string(out_dir.join("api.proto")).unwrap();
        assert!(first_source.contains("message First"));
        assert!(fs::read_to_string(&renamed).unwrap().contains("message Second"));
        assert_eq!(fs::read(raw_path(&renamed)).unwrap(), second_raw);
        assert_eq!(ledger.counts.renamed, 1);
    }

    #[test]
    fn test_skip_conflicts_keeps_first() {
        let temp_dir = TempDir::new().unwrap();
        let first = sample_descriptor("v1/api.proto", "First");
        let second = sample_descriptor("v2/api.proto", "Second");
        let input = write_binary(temp_dir.path(), "app", &[&first, &second]);

        let out_dir = temp_dir.path().join("out");
        let cli = cli_for(&out_dir, &["--conflict-strategy", "skip-conflicts"], &input);
        let mut ledger = OutputLedger::new(&cli.output, cli.conflict_strategy);
        process_input(&cli, &input, &mut ledger).unwrap();

        assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 1);
        let source = fs::read_to_string(out_dir.join("api.proto")).unwrap();
        assert!(source.contains("message First"));
        assert_eq!(ledger.counts.skipped, 1);
    }

    #[test]
    fn test_directory_dedups_across_binaries() {
        let temp_dir = TempDir::new().unwrap();
        let bins = temp_dir.path().join("bins");
        fs::create_dir_all(&bins).unwrap();
        let fd = sample_descriptor("shared.proto", "Shared");
        write_binary(&bins, "one", &[&fd]);
        write_binary(&bins, "two", &[&fd]);

        let out_dir = temp_dir.path().join("out");
        let args: Vec<OsString> = vec![
            "protoscry".into(),
            "--output".into(),
            out_dir.clone().into(),
            "--directory".into(),
            bins.clone().into(),
        ];
        let cli = Cli::parse_from(args);
        let mut ledger = OutputLedger::new(&cli.output, cli.conflict_strategy);
        process_directory(&cli, &bins, &mut ledger).unwrap();

        assert!(out_dir.join("shared.proto").is_file());
        assert_eq!(ledger.counts.written, 1);
        assert_eq!(ledger.counts.repeats, 1);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

//! # protoscry-core
//!
//! A library for finding Protocol Buffer file descriptors embedded in
//! compiled binaries and turning them back into `.proto` source.
//!
//! This crate provides the core functionality for:
//! - Locating serialized `FileDescriptorProto`s in an arbitrary byte buffer
//! - Estimating message extents from the raw wire format
//! - Reconstructing human-readable `.proto` source files
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`scanner`]: Binary scanning and wire format walking
//! - [`proto`]: Proto definition reconstruction
//! - [`error`]: Error types and handling
//!
//! Everything works on in-memory buffers. Reading inputs and writing the
//! results anywhere is left to the caller.
//!
//! ## Example
//!
//! ```no_run
//! use protoscry_core::{extract, render};
//!
//! let data = std::fs::read("./target/release/my_app")?;
//!
//! extract(&data, |raw, descriptor| {
//!     let mut source = String::new();
//!     let diagnostics = render(&mut source, &descriptor)?;
//!     println!("// {} ({} bytes)", descriptor.name(), raw.len());
//!     println!("{}", source);
//!     for diagnostic in &diagnostics {
//!         eprintln!("warning: {}", diagnostic);
//!     }
//!     Ok::<(), protoscry_core::Error>(())
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod proto;
pub mod scanner;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use proto::{
    render, Diagnostic, Diagnostics, ProtoReconstructor, ProtoSyntax, Reconstruction,
    ReconstructorConfig, Scope, Unsupported,
};
pub use scanner::{extract, Descriptors, Extracted, ScanSummary, Scanner, ScannerConfig};

/// Re-exported so callers can name the decoded tree without depending on prost-types
pub use prost_types::FileDescriptorProto;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

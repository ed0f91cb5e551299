//! Constructs the renderer leaves out.
//!
//! Options, extensions, oneofs and source info have no rendering yet. The
//! output stays syntactically valid without them but no longer describes the
//! full schema, so every omission is recorded for the caller to report.

use std::fmt;
use tracing::debug;

/// A kind of construct that is not rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Unsupported {
    /// `option` statements at file level
    FileOptions,
    /// `extend` blocks at file level
    FileExtensions,
    /// Source locations and comments
    SourceCodeInfo,
    /// Message-level options
    MessageOptions,
    /// `extend` blocks nested in a message
    MessageExtensions,
    /// `extensions` ranges
    ExtensionRanges,
    /// `oneof` groupings (fields are still rendered)
    Oneofs,
    /// Field options
    FieldOptions,
    /// Enum-level options
    EnumOptions,
    /// Enum value options
    EnumValueOptions,
    /// Service-level options
    ServiceOptions,
    /// Method options
    MethodOptions,
}

impl Unsupported {
    /// Short description of the construct
    pub fn as_str(&self) -> &'static str {
        match self {
            Unsupported::FileOptions => "file options",
            Unsupported::FileExtensions => "extensions",
            Unsupported::SourceCodeInfo => "source code info",
            Unsupported::MessageOptions => "message options",
            Unsupported::MessageExtensions => "extension fields",
            Unsupported::ExtensionRanges => "extension ranges",
            Unsupported::Oneofs => "oneof fields",
            Unsupported::FieldOptions => "field options",
            Unsupported::EnumOptions => "enum options",
            Unsupported::EnumValueOptions => "enum value options",
            Unsupported::ServiceOptions => "service options",
            Unsupported::MethodOptions => "service method options",
        }
    }
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One omitted construct and where it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What was left out
    pub kind: Unsupported,
    /// Dotted path of the declaration that carried it
    pub location: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.location.is_empty() {
            write!(f, "{} not rendered", self.kind)
        } else {
            write!(f, "{}: {} not rendered", self.location, self.kind)
        }
    }
}

/// Omissions collected while rendering one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an omitted construct
    pub fn record(&mut self, kind: Unsupported, location: impl Into<String>) {
        let diagnostic = Diagnostic {
            kind,
            location: location.into(),
        };
        debug!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    /// True when nothing was left out
    pub fn is_complete(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded omissions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Same as [`is_complete`](Self::is_complete)
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the recorded omissions in rendering order
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Whether a kind of construct was left out anywhere
    pub fn contains(&self, kind: Unsupported) -> bool {
        self.entries.iter().any(|d| d.kind == kind)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

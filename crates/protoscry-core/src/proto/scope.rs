//! Type reference shortening.
//!
//! Descriptors store every message and enum reference fully qualified
//! (`.pkg.Outer.Inner`). Source files spell them relative to where they are
//! used, so each reference is trimmed against the scope the renderer is in.

/// The package and chain of enclosing declarations at a point in a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    package: Vec<String>,
    nested: Vec<String>,
}

impl Scope {
    /// Creates the top-level scope of a file in `package`.
    pub fn new(package: &str) -> Self {
        Self {
            package: split_name(package),
            nested: Vec::new(),
        }
    }

    /// Creates a scope from a bare path with no package component.
    pub fn from_path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package: Vec::new(),
            nested: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Enters a message, enum or service.
    pub fn push(&mut self, name: impl Into<String>) {
        self.nested.push(name.into());
    }

    /// Leaves the innermost declaration.
    pub fn pop(&mut self) -> Option<String> {
        self.nested.pop()
    }

    /// Nesting depth below the package.
    pub fn depth(&self) -> usize {
        self.nested.len()
    }

    /// Dotted path of the scope, package included.
    pub fn path(&self) -> String {
        self.package
            .iter()
            .chain(&self.nested)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Returns the shortest spelling of `reference` that is visible here.
    ///
    /// A reference inside this file's package loses the package prefix
    /// first. The remaining segments are then compared with the nesting
    /// path from the outside in: the suffix from the first mismatch is
    /// kept, or the part past the end of the path if the whole path
    /// matched. A reference that names the scope itself (or one of its
    /// parents) falls back to its last segment.
    pub fn resolve(&self, reference: &str) -> String {
        let name = reference.strip_prefix('.').unwrap_or(reference);
        let segments: Vec<&str> = name.split('.').collect();
        if segments.len() == 1 {
            return name.to_string();
        }

        let in_package = segments.len() > self.package.len()
            && self
                .package
                .iter()
                .zip(&segments)
                .all(|(scope, segment)| scope == segment);
        let segments = if in_package {
            &segments[self.package.len()..]
        } else {
            &segments[..]
        };
        if segments.len() == 1 {
            return segments[0].to_string();
        }

        for (i, (segment, scope)) in segments.iter().zip(&self.nested).enumerate() {
            if segment != scope {
                return segments[i..].join(".");
            }
        }
        if self.nested.len() < segments.len() {
            return segments[self.nested.len()..].join(".");
        }

        segments[segments.len() - 1].to_string()
    }
}

fn split_name(name: &str) -> Vec<String> {
    name.split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

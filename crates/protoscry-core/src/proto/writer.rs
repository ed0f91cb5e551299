//! Indentation-aware text sink.
//!
//! Tracks nesting depth and the [`Scope`] together, since every block the
//! renderer opens is also a naming scope.

use super::scope::Scope;
use std::fmt::{self, Write};

pub(crate) struct SourceWriter<'a, W: Write> {
    out: &'a mut W,
    indent: &'a str,
    scope: Scope,
}

impl<'a, W: Write> SourceWriter<'a, W> {
    pub(crate) fn new(out: &'a mut W, indent: &'a str, package: &str) -> Self {
        Self {
            out,
            indent,
            scope: Scope::new(package),
        }
    }

    pub(crate) fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Opens a block named `name`: one more indent level and scope segment.
    pub(crate) fn push(&mut self, name: &str) {
        self.scope.push(name);
    }

    pub(crate) fn pop(&mut self) {
        self.scope.pop();
    }

    pub(crate) fn write_indent(&mut self) -> fmt::Result {
        for _ in 0..self.scope.depth() {
            self.out.write_str(self.indent)?;
        }
        Ok(())
    }

    pub(crate) fn write_str(&mut self, s: &str) -> fmt::Result {
        self.out.write_str(s)
    }

    pub(crate) fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        self.out.write_fmt(args)
    }

    /// Writes an indented line.
    pub(crate) fn line(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        self.write_indent()?;
        self.out.write_fmt(args)?;
        self.out.write_char('\n')
    }

    /// Closes the innermost block with `}` and a blank line.
    pub(crate) fn close_block(&mut self) -> fmt::Result {
        self.pop();
        self.line(format_args!("}}"))?;
        self.out.write_char('\n')
    }
}

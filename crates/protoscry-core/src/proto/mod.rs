//! Proto definition reconstruction module.
//!
//! This module turns a decoded `FileDescriptorProto` back into `.proto`
//! source text.
//!
//! ## Output layout
//!
//! The statement order is fixed so that output can be compared byte for
//! byte:
//!
//! 1. `syntax` declaration (`proto2` when the descriptor declares none)
//! 2. `package` declaration
//! 3. one `import` per dependency, in declared order
//! 4. enums, then messages, then services
//!
//! Inside a message: nested enums, nested messages, fields, reserved names,
//! reserved ranges. Each block is closed by `}` and a blank line, and every
//! nesting level is indented with one tab.
//!
//! Constructs without a rendering (options, extensions, oneofs, source
//! info) are skipped and reported through [`Diagnostics`].

mod diagnostics;
mod scope;
mod writer;

use crate::error::{Error, Result};
use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    ServiceDescriptorProto,
};
use std::collections::HashSet;
use std::fmt::Write as FmtWrite;
use writer::SourceWriter;

pub use diagnostics::{Diagnostic, Diagnostics, Unsupported};
pub use scope::Scope;

/// Configuration for proto reconstruction
#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    /// Indentation string per nesting level (default: one tab)
    pub indent_str: String,
    /// Render `import public` / `import weak` for flagged dependencies
    pub mark_public_imports: bool,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            indent_str: "\t".to_string(),
            mark_public_imports: false,
        }
    }
}

impl ReconstructorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether public and weak imports are marked
    pub fn mark_public_imports(mut self, mark: bool) -> Self {
        self.mark_public_imports = mark;
        self
    }
}

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoSyntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl ProtoSyntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtoSyntax::Proto2 => "proto2",
            ProtoSyntax::Proto3 => "proto3",
        }
    }
}

impl From<&str> for ProtoSyntax {
    /// Only an exact `"proto3"` selects proto3 label rules.
    fn from(value: &str) -> Self {
        if value == "proto3" {
            ProtoSyntax::Proto3
        } else {
            ProtoSyntax::Proto2
        }
    }
}

/// Rendered source together with everything that was left out of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    /// The `.proto` source text
    pub source: String,
    /// Constructs omitted from `source`
    pub diagnostics: Diagnostics,
}

/// Reconstructs proto definitions from FileDescriptorProto
#[derive(Debug)]
pub struct ProtoReconstructor {
    proto: FileDescriptorProto,
    config: ReconstructorConfig,
}

impl ProtoReconstructor {
    /// Creates a new reconstructor from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let proto = FileDescriptorProto::decode(data)?;
        Ok(Self::from_proto(proto))
    }

    /// Creates a new reconstructor from a FileDescriptorProto
    pub fn from_proto(proto: FileDescriptorProto) -> Self {
        Self {
            proto,
            config: ReconstructorConfig::default(),
        }
    }

    /// Creates a new reconstructor with custom config
    pub fn with_config(mut self, config: ReconstructorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the original filename from the descriptor
    pub fn filename(&self) -> &str {
        self.proto.name()
    }

    /// Returns the proto syntax version
    pub fn syntax(&self) -> ProtoSyntax {
        ProtoSyntax::from(self.proto.syntax())
    }

    /// Returns the raw FileDescriptorProto
    pub fn proto(&self) -> &FileDescriptorProto {
        &self.proto
    }

    /// Reconstruct the proto definition as a string
    pub fn reconstruct(&self) -> Result<Reconstruction> {
        let mut source = String::new();
        let mut diagnostics = Diagnostics::new();
        self.write_to(&mut source, &mut diagnostics)?;
        Ok(Reconstruction {
            source,
            diagnostics,
        })
    }

    /// Write the reconstructed proto to a writer.
    ///
    /// On error, whatever was already written is incomplete.
    pub fn write_to(&self, w: &mut impl FmtWrite, diagnostics: &mut Diagnostics) -> Result<()> {
        let mut renderer = SourceRenderer {
            writer: SourceWriter::new(w, &self.config.indent_str, self.proto.package()),
            config: &self.config,
            syntax: self.syntax(),
            diagnostics,
        };
        renderer.write_file(&self.proto)
    }
}

/// Render `file` into `out` with the default configuration.
pub fn render(out: &mut impl FmtWrite, file: &FileDescriptorProto) -> Result<Diagnostics> {
    let mut diagnostics = Diagnostics::new();
    let mut renderer = SourceRenderer {
        writer: SourceWriter::new(out, "\t", file.package()),
        config: &ReconstructorConfig::default(),
        syntax: ProtoSyntax::from(file.syntax()),
        diagnostics: &mut diagnostics,
    };
    renderer.write_file(file)?;
    Ok(diagnostics)
}

struct SourceRenderer<'a, W: FmtWrite> {
    writer: SourceWriter<'a, W>,
    config: &'a ReconstructorConfig,
    syntax: ProtoSyntax,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, W: FmtWrite> SourceRenderer<'a, W> {
    fn unsupported(&mut self, kind: Unsupported, name: &str) {
        let mut location = self.writer.scope().path();
        if !name.is_empty() {
            if !location.is_empty() {
                location.push('.');
            }
            location.push_str(name);
        }
        self.diagnostics.record(kind, location);
    }

    fn write_file(&mut self, file: &FileDescriptorProto) -> Result<()> {
        let syntax = file.syntax.as_deref().filter(|s| !s.is_empty());
        self.writer.line(format_args!(
            "syntax = \"{}\";",
            escape_string(syntax.unwrap_or(ProtoSyntax::Proto2.as_str()))
        ))?;
        self.writer.write_str("\n")?;

        self.writer.line(format_args!("package {};", file.package()))?;
        self.writer.write_str("\n")?;

        self.write_imports(file)?;

        if file.options.is_some() {
            self.unsupported(Unsupported::FileOptions, "");
        }
        if !file.extension.is_empty() {
            self.unsupported(Unsupported::FileExtensions, "");
        }
        if file
            .source_code_info
            .as_ref()
            .is_some_and(|info| !info.location.is_empty())
        {
            self.unsupported(Unsupported::SourceCodeInfo, "");
        }

        for enum_type in &file.enum_type {
            self.write_enum(enum_type)?;
        }
        for message in &file.message_type {
            self.write_message(message)?;
        }
        for service in &file.service {
            self.write_service(service)?;
        }

        Ok(())
    }

    fn write_imports(&mut self, file: &FileDescriptorProto) -> Result<()> {
        if file.dependency.is_empty() {
            return Ok(());
        }

        let (public_deps, weak_deps): (HashSet<usize>, HashSet<usize>) =
            if self.config.mark_public_imports {
                (
                    file.public_dependency.iter().map(|&i| i as usize).collect(),
                    file.weak_dependency.iter().map(|&i| i as usize).collect(),
                )
            } else {
                Default::default()
            };

        for (i, dep) in file.dependency.iter().enumerate() {
            let modifier = if public_deps.contains(&i) {
                "public "
            } else if weak_deps.contains(&i) {
                "weak "
            } else {
                ""
            };
            self.writer.line(format_args!("import {}\"{}\";", modifier, escape_string(dep)))?;
        }

        self.writer.write_str("\n")?;
        Ok(())
    }

    fn write_enum(&mut self, enum_type: &EnumDescriptorProto) -> Result<()> {
        let name = enum_type.name();
        self.writer.line(format_args!("enum {} {{", name))?;
        self.writer.push(name);

        if enum_type.options.is_some() {
            self.unsupported(Unsupported::EnumOptions, "");
        }

        for value in &enum_type.value {
            self.writer.line(format_args!("{}\t= {};", value.name(), value.number()))?;
            if value.options.is_some() {
                self.unsupported(Unsupported::EnumValueOptions, value.name());
            }
        }

        self.write_reserved_names(&enum_type.reserved_name)?;
        self.write_reserved_ranges(
            enum_type
                .reserved_range
                .iter()
                .map(|range| (range.start, range.end)),
        )?;

        self.writer.close_block()?;
        Ok(())
    }

    fn write_message(&mut self, message: &DescriptorProto) -> Result<()> {
        let name = message.name();
        self.writer.line(format_args!("message {} {{", name))?;
        self.writer.push(name);

        if message.options.is_some() {
            self.unsupported(Unsupported::MessageOptions, "");
        }

        for enum_type in &message.enum_type {
            self.write_enum(enum_type)?;
        }
        for nested in &message.nested_type {
            self.write_message(nested)?;
        }

        if !message.extension.is_empty() {
            self.unsupported(Unsupported::MessageExtensions, "");
        }
        if !message.extension_range.is_empty() {
            self.unsupported(Unsupported::ExtensionRanges, "");
        }

        for field in &message.field {
            self.write_field(field)?;
        }

        if !message.oneof_decl.is_empty() {
            self.unsupported(Unsupported::Oneofs, "");
        }

        self.write_reserved_names(&message.reserved_name)?;
        self.write_reserved_ranges(
            message
                .reserved_range
                .iter()
                .map(|range| (range.start, range.end)),
        )?;

        self.writer.close_block()?;
        Ok(())
    }

    fn write_field(&mut self, field: &FieldDescriptorProto) -> Result<()> {
        self.writer.write_indent()?;

        match field.label.unwrap_or(0) {
            0 => {
                if self.syntax == ProtoSyntax::Proto2 {
                    return Err(Error::missing_label(field.name()));
                }
            }
            raw => match Label::try_from(raw) {
                Ok(Label::Optional) => {
                    if self.syntax == ProtoSyntax::Proto2 {
                        self.writer.write_str("optional ")?;
                    }
                }
                Ok(Label::Required) => self.writer.write_str("required ")?,
                Ok(Label::Repeated) => self.writer.write_str("repeated ")?,
                Err(_) => return Err(Error::unknown_label(field.name(), raw)),
            },
        }

        let type_code = field.r#type.unwrap_or(0);
        let type_name = match Type::try_from(type_code) {
            Ok(ty) => match scalar_type_name(ty) {
                Some(scalar) => scalar.to_string(),
                None => self.writer.scope().resolve(field.type_name()),
            },
            Err(_) => return Err(Error::unknown_field_type(field.name(), type_code)),
        };

        write!(
            self.writer,
            "{}\t{}\t= {}",
            type_name,
            field.name(),
            field.number()
        )?;

        if let Some(default) = field.default_value.as_deref().filter(|d| !d.is_empty()) {
            match field.r#type() {
                Type::String | Type::Bytes => {
                    write!(self.writer, " [default = \"{}\"]", escape_string(default))?
                }
                _ => write!(self.writer, " [default = {}]", default)?,
            }
        }

        if field.options.is_some() {
            self.unsupported(Unsupported::FieldOptions, field.name());
        }

        self.writer.write_str(";\n")?;
        Ok(())
    }

    fn write_service(&mut self, service: &ServiceDescriptorProto) -> Result<()> {
        let name = service.name();
        self.writer.line(format_args!("service {} {{", name))?;
        self.writer.push(name);

        for method in &service.method {
            let mut input = self.writer.scope().resolve(method.input_type());
            let mut output = self.writer.scope().resolve(method.output_type());
            if method.client_streaming() {
                input.insert_str(0, "stream ");
            }
            if method.server_streaming() {
                output.insert_str(0, "stream ");
            }

            self.writer.line(format_args!(
                "rpc {} ({}) returns ({}) {{}}",
                method.name(),
                input,
                output
            ))?;

            if method.options.is_some() {
                self.unsupported(Unsupported::MethodOptions, method.name());
            }
        }

        if service.options.is_some() {
            self.unsupported(Unsupported::ServiceOptions, "");
        }

        self.writer.close_block()?;
        Ok(())
    }

    fn write_reserved_names(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let quoted: Vec<String> = names
            .iter()
            .map(|name| format!("\"{}\"", escape_string(name)))
            .collect();
        self.writer.line(format_args!("reserved {};", quoted.join(", ")))?;
        Ok(())
    }

    /// Ranges are rendered with the bounds as stored: `start` alone when the
    /// bounds are equal, `start to max` when there is no end. A range
    /// without a start has no spelling and is dropped.
    fn write_reserved_ranges(
        &mut self,
        ranges: impl Iterator<Item = (Option<i32>, Option<i32>)>,
    ) -> Result<()> {
        let rendered: Vec<String> = ranges
            .filter_map(|range| match range {
                (Some(start), Some(end)) if start == end => Some(start.to_string()),
                (Some(start), Some(end)) => Some(format!("{} to {}", start, end)),
                (Some(start), None) => Some(format!("{} to max", start)),
                (None, _) => None,
            })
            .collect();

        if !rendered.is_empty() {
            self.writer.line(format_args!("reserved {};", rendered.join(", ")))?;
        }
        Ok(())
    }
}

/// Source spelling of a scalar field type; `None` for named types
fn scalar_type_name(ty: Type) -> Option<&'static str> {
    Some(match ty {
        Type::Double => "double",
        Type::Float => "float",
        Type::Int64 => "int64",
        Type::Uint64 => "uint64",
        Type::Int32 => "int32",
        Type::Fixed64 => "fixed64",
        Type::Fixed32 => "fixed32",
        Type::Bool => "bool",
        Type::String => "string",
        Type::Group => "group",
        Type::Bytes => "bytes",
        Type::Uint32 => "uint32",
        Type::Sfixed32 => "sfixed32",
        Type::Sfixed64 => "sfixed64",
        Type::Sint32 => "sint32",
        Type::Sint64 => "sint64",
        Type::Message | Type::Enum => return None,
    })
}

/// Escape a string for proto syntax
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                result.push_str(&format!("\\x{:02x}", c as u8));
            }
            _ => result.push(c),
        }
    }
    result
}

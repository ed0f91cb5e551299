//! Error types for the protoscry-core library.
//!
//! Candidate-level failures during scanning (bad wire data, descriptors that
//! fail to decode) never surface through this type; the scanner skips them.
//! What does surface is either a decode error from an explicit call such as
//! [`ProtoReconstructor::from_bytes`](crate::ProtoReconstructor::from_bytes),
//! or a fatal rendering condition.

use thiserror::Error;

/// Result type alias for protoscry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all protoscry-core operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid protobuf wire format
    #[error("invalid protobuf wire format at offset {offset}: {details}")]
    InvalidWireFormat {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to decode varint
    #[error("failed to decode varint at offset {offset}: buffer too small or invalid encoding")]
    VarintDecode {
        /// Byte offset where the error occurred
        offset: usize,
    },

    /// Failed to parse FileDescriptorProto
    #[error("failed to parse FileDescriptorProto: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// A field carries no label in a proto2 file
    #[error("empty label for field '{field}'")]
    MissingLabel {
        /// Name of the offending field
        field: String,
    },

    /// A field carries a label value outside the known set
    #[error("unknown label for field '{field}': {label}")]
    UnknownLabel {
        /// Name of the offending field
        field: String,
        /// The raw label value
        label: i32,
    },

    /// A field carries a type code that has no source spelling
    #[error("unknown type for field '{field}': {type_code}")]
    UnknownFieldType {
        /// Name of the offending field
        field: String,
        /// The raw type code
        type_code: i32,
    },

    /// The output sink rejected a write
    #[error("failed to write rendered source: {0}")]
    Write(#[from] std::fmt::Error),
}

impl Error {
    /// Creates a new wire format error
    pub fn invalid_wire_format(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidWireFormat {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new varint decode error
    pub fn varint_decode(offset: usize) -> Self {
        Self::VarintDecode { offset }
    }

    /// Creates a new missing label error
    pub fn missing_label(field: impl Into<String>) -> Self {
        Self::MissingLabel {
            field: field.into(),
        }
    }

    /// Creates a new unknown label error
    pub fn unknown_label(field: impl Into<String>, label: i32) -> Self {
        Self::UnknownLabel {
            field: field.into(),
            label,
        }
    }

    /// Creates a new unknown field type error
    pub fn unknown_field_type(field: impl Into<String>, type_code: i32) -> Self {
        Self::UnknownFieldType {
            field: field.into(),
            type_code,
        }
    }

    /// Returns true if this error was raised while rendering a descriptor.
    ///
    /// Text already written for that descriptor must be treated as incomplete.
    pub fn is_render_error(&self) -> bool {
        matches!(
            self,
            Self::MissingLabel { .. }
                | Self::UnknownLabel { .. }
                | Self::UnknownFieldType { .. }
                | Self::Write(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_label("count", 7);
        assert!(err.to_string().contains("count"));
        assert!(err.to_string().contains('7'));

        let err = Error::missing_label("id");
        assert_eq!(err.to_string(), "empty label for field 'id'");
    }

    #[test]
    fn test_is_render_error() {
        assert!(Error::missing_label("id").is_render_error());
        assert!(Error::unknown_field_type("id", 42).is_render_error());
        assert!(!Error::varint_decode(3).is_render_error());
        assert!(!Error::invalid_wire_format(0, "empty data").is_render_error());
    }
}

// ABOUTME: Error types for the optimized object-graph codec.
// ABOUTME: Variants are grouped as format, classification, protocol misuse, hook, fallback and sink errors.

use crate::types::FieldKind;
use std::fmt;
use std::sync::Arc;

/// The result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error raised by user code (custom hooks, fallback marshallers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while encoding or decoding an object graph.
#[derive(Debug)]
pub enum Error {
    /// Unexpected end of input data.
    Truncated,

    /// Unconsumed bytes after decoding a complete root value.
    TrailingBytes,

    /// Unrecognized tag or type code encountered.
    InvalidTypeCode(u8),

    /// Invalid (modified) UTF-8 byte sequence in a string.
    InvalidUtf8,

    /// A handle was referenced before the object it names was read.
    ForwardHandle(i32),

    /// A type id on the wire is not known to the resolver.
    UnknownTypeId(i32),

    /// Structurally malformed input (negative counts, mismatched shapes).
    Format(String),

    /// Object nesting too deep.
    MaxDepthExceeded,

    /// A declared element count exceeds the configured limit.
    MaxCollectionSizeExceeded(usize),

    /// The resolver could not produce a descriptor for a type.
    Classification { type_name: String, reason: String },

    /// The type is not eligible for serialization.
    NotSerializable(String),

    /// A type name was registered twice.
    DuplicateType(String),

    /// Two type names map to the same type id.
    TypeIdCollision {
        type_name: String,
        existing: String,
        type_id: i32,
    },

    /// A field value does not match the declared field kind.
    FieldKind { field: String, expected: FieldKind },

    /// A field name is not declared by the type (or level).
    UnknownField { type_name: String, field: String },

    /// Named-field or default-field operations used outside their protocol.
    ProtocolMisuse(String),

    /// A custom hook failed; the original cause is attached.
    Hook {
        type_name: String,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The fallback marshaller failed; the original cause is attached.
    Fallback {
        message: String,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// I/O error raised by the underlying sink.
    Io(std::io::Error),

    /// Invalid configuration document.
    Config(String),
}

impl Error {
    /// Returns a stable identifier for the error variant.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Truncated => "truncated",
            Error::TrailingBytes => "trailing_bytes",
            Error::InvalidTypeCode(_) => "invalid_type_code",
            Error::InvalidUtf8 => "invalid_utf8",
            Error::ForwardHandle(_) => "forward_handle",
            Error::UnknownTypeId(_) => "unknown_type_id",
            Error::Format(_) => "format",
            Error::MaxDepthExceeded => "max_depth_exceeded",
            Error::MaxCollectionSizeExceeded(_) => "max_collection_size_exceeded",
            Error::Classification { .. } => "classification",
            Error::NotSerializable(_) => "not_serializable",
            Error::DuplicateType(_) => "duplicate_type",
            Error::TypeIdCollision { .. } => "type_id_collision",
            Error::FieldKind { .. } => "field_kind",
            Error::UnknownField { .. } => "unknown_field",
            Error::ProtocolMisuse(_) => "protocol_misuse",
            Error::Hook { .. } => "hook",
            Error::Fallback { .. } => "fallback",
            Error::Io(_) => "io_error",
            Error::Config(_) => "config",
        }
    }

    /// Returns true for errors caused by malformed input on the read path.
    #[must_use]
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::Truncated
                | Error::TrailingBytes
                | Error::InvalidTypeCode(_)
                | Error::InvalidUtf8
                | Error::ForwardHandle(_)
                | Error::UnknownTypeId(_)
                | Error::Format(_)
        )
    }

    pub(crate) fn misuse(msg: impl Into<String>) -> Self {
        Error::ProtocolMisuse(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Wrap an error raised by a custom hook of `type_name`.
    ///
    /// Codec errors that merely travelled through the hook (misuse, sink or
    /// nested hook failures) are returned as they are.
    pub(crate) fn hook(type_name: &str, source: BoxError) -> Self {
        match source.downcast::<Error>() {
            Ok(err) => *err,
            Err(other) => Error::Hook {
                type_name: type_name.to_owned(),
                source: Arc::from(other),
            },
        }
    }

    /// Translate an error raised by the fallback marshaller.
    ///
    /// Sink failures surface unchanged; anything else is re-described with
    /// a codec diagnostic and keeps the original as its source.
    pub(crate) fn fallback(message: String, source: BoxError) -> Self {
        match source.downcast::<Error>() {
            Ok(err) if matches!(*err, Error::Io(_) | Error::Truncated) => *err,
            Ok(err) => Error::Fallback {
                message,
                source: Arc::new(*err),
            },
            Err(other) => Error::Fallback {
                message,
                source: Arc::from(other),
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Truncated => write!(f, "unexpected end of input"),
            Error::TrailingBytes => write!(f, "trailing bytes after root value"),
            Error::InvalidTypeCode(code) => write!(f, "invalid type code: 0x{code:02x}"),
            Error::InvalidUtf8 => write!(f, "invalid UTF-8 sequence"),
            Error::ForwardHandle(h) => write!(f, "handle {h} referenced before it was assigned"),
            Error::UnknownTypeId(id) => write!(f, "unknown type id: {id}"),
            Error::Format(msg) => write!(f, "malformed input: {msg}"),
            Error::MaxDepthExceeded => write!(f, "maximum object depth exceeded"),
            Error::MaxCollectionSizeExceeded(n) => {
                write!(f, "collection size {n} exceeds configured maximum")
            }
            Error::Classification { type_name, reason } => {
                write!(f, "failed to classify type {type_name}: {reason}")
            }
            Error::NotSerializable(name) => write!(f, "type is not serializable: {name}"),
            Error::DuplicateType(name) => write!(f, "type already registered: {name}"),
            Error::TypeIdCollision {
                type_name,
                existing,
                type_id,
            } => write!(
                f,
                "type id {type_id} of {type_name} collides with registered type {existing}"
            ),
            Error::FieldKind { field, expected } => {
                write!(f, "field `{field}` expects a value of kind {expected:?}")
            }
            Error::UnknownField { type_name, field } => {
                write!(f, "type {type_name} declares no field `{field}`")
            }
            Error::ProtocolMisuse(msg) => write!(f, "protocol misuse: {msg}"),
            Error::Hook { type_name, source } => {
                write!(f, "custom hook of {type_name} failed: {source}")
            }
            Error::Fallback { message, source } => write!(f, "{message}: {source}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Config(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Hook { source, .. } | Error::Fallback { source, .. } => Some(source.as_ref()),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Error::Truncated;
        }
        Error::Io(err)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

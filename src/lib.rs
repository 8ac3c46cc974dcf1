// ABOUTME: Compact binary object-graph codec with identity handles, custom field hooks and container fast paths.
// ABOUTME: Crate root: module layout, re-exports and crate-level documentation.

//! # Optimized marshaller
//!
//! Serializes arbitrary object graphs into a compact, self-describing byte
//! stream and rebuilds equivalent graphs on read.
//!
//! - Shared references and cycles are written once and referenced by handle
//!   afterwards.
//! - Types are classified once by a [`TypeResolver`] (usually a
//!   [`Registry`]) into a closed set of strategies.
//! - Classes may take over the writing of any level of their fields with
//!   custom hooks, either writing the defaults or staging fields by name.
//! - Well-known containers (lists, hash and insertion-ordered maps and
//!   sets, linked lists, property tables) use dedicated compact encodings.
//!
//! ## Quick Start
//!
//! ```rust
//! use optimized_marshaller::{ClassBuilder, FieldKind, Marshaller, Registry, Value};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! registry
//!     .register(
//!         ClassBuilder::new("demo.Node")
//!             .field("id", FieldKind::Int)
//!             .field("next", FieldKind::Other),
//!     )
//!     .unwrap();
//!
//! // A node pointing at itself.
//! let node = registry.instantiate("demo.Node").unwrap().with("id", 7).unwrap().into_ref();
//! node.set_field("next", node.clone()).unwrap();
//!
//! let marshaller = Marshaller::new(registry);
//! let bytes = marshaller.marshal(&Value::Object(node)).unwrap();
//! let decoded = marshaller.unmarshal(&bytes).unwrap();
//!
//! let decoded = decoded.as_object().unwrap();
//! assert_eq!(decoded.field("id").unwrap(), Value::Int(7));
//! assert_eq!(decoded.field("next").unwrap(), Value::Object(decoded.clone()));
//! ```
//!
//! ## Wire format
//!
//! Every value starts with one byte: `NULL`, `HANDLE` (followed by a
//! 32-bit handle), `JDK` (followed by fallback-defined bytes) or a type
//! code followed by the type's payload. Multi-byte numbers are big-endian;
//! strings are length-prefixed modified UTF-8. See [`type_code`].
//!
//! ## Resource Limits
//!
//! Default limits (see [`MarshallerConfig`]):
//! - Maximum nesting depth: 100
//! - Maximum collection size: 16,777,216 elements

pub mod config;
mod context;
pub mod decoder;
pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod fallback;
pub mod handles;
pub mod io;
pub mod marshaller;
pub mod registry;
pub mod types;
pub mod value;

// Re-export commonly used items at the crate root
pub use config::MarshallerConfig;
pub use decoder::{Decoder, NamedFields, ObjectInput};
pub use descriptor::{
    ClassBuilder, ClassLayout, HookResult, SerializationKind, Strategy, TypeDescriptor, TypeKey,
};
pub use encoder::{Encoder, ObjectOutput};
pub use error::{BoxError, Error, Result};
pub use fallback::{FallbackMarshaller, JsonFallback};
pub use io::{DataInput, DataOutput, SliceInput, StreamInput, StreamOutput};
pub use marshaller::Marshaller;
pub use registry::{IdMapper, Registry, StringHashIdMapper, TypeResolver};
pub use types::{limits, type_code, BuiltinType, FieldKind};
pub use value::{
    EnumValue, HashMapObject, HashSetObject, Instance, LinkedHashMapObject, LinkedHashSetObject,
    Object, ObjectRef, PrimitiveArray, Properties, Throwable, Uuid, Value,
};

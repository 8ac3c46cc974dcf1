// ABOUTME: Defines wire type codes, field kinds and built-in type identities.
// ABOUTME: Type codes are the single-byte prefixes that govern every value on the wire.

/// Tag and type codes for encoded values.
pub mod type_code {
    // Tags that are not followed by a type description.
    pub const NULL: u8 = 0x70;
    pub const HANDLE: u8 = 0xff;
    pub const JDK: u8 = 0xfe;

    // Boxed primitives
    pub const BYTE: u8 = 1;
    pub const SHORT: u8 = 2;
    pub const INT: u8 = 3;
    pub const LONG: u8 = 4;
    pub const FLOAT: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CHAR: u8 = 7;
    pub const BOOLEAN: u8 = 8;

    // Primitive arrays: 0x09-0x10
    pub const BYTE_ARR: u8 = 9;
    pub const SHORT_ARR: u8 = 10;
    pub const INT_ARR: u8 = 11;
    pub const LONG_ARR: u8 = 12;
    pub const FLOAT_ARR: u8 = 13;
    pub const DOUBLE_ARR: u8 = 14;
    pub const CHAR_ARR: u8 = 15;
    pub const BOOLEAN_ARR: u8 = 16;

    pub const OBJ_ARR: u8 = 17;
    pub const STR: u8 = 18;
    pub const UUID: u8 = 19;
    pub const PROPS: u8 = 20;
    pub const ARRAY_LIST: u8 = 21;
    pub const HASH_MAP: u8 = 22;
    pub const HASH_SET: u8 = 23;
    pub const LINKED_LIST: u8 = 24;
    pub const LINKED_HASH_MAP: u8 = 25;
    pub const LINKED_HASH_SET: u8 = 26;
    pub const DATE: u8 = 27;
    pub const CLS: u8 = 28;

    // Class-level codes, followed by a 32-bit type id
    pub const ENUM: u8 = 100;
    pub const EXTERNALIZABLE: u8 = 101;
    pub const SERIALIZABLE: u8 = 102;

    /// Check if a type code denotes a primitive array.
    #[inline]
    pub const fn is_primitive_array(code: u8) -> bool {
        code >= BYTE_ARR && code <= BOOLEAN_ARR
    }

    /// Check if a type code is followed by a type id.
    #[inline]
    pub const fn has_type_id(code: u8) -> bool {
        code >= ENUM && code <= SERIALIZABLE
    }
}

/// The storage kind of a declared field.
///
/// Primitive kinds are written raw (no tag); `Other` fields are written as
/// full tagged values and may recurse into the object graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Boolean,
    Other,
}

/// Types with a fixed, built-in descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Boolean,
    String,
    Uuid,
    Date,
    Class,
    ObjectArray,
    ByteArray,
    ShortArray,
    IntArray,
    LongArray,
    FloatArray,
    DoubleArray,
    CharArray,
    BooleanArray,
    List,
    LinkedList,
    HashMap,
    HashSet,
    LinkedHashMap,
    LinkedHashSet,
    Properties,
    Throwable,
}

impl BuiltinType {
    pub const ALL: [BuiltinType; 29] = [
        BuiltinType::Byte,
        BuiltinType::Short,
        BuiltinType::Int,
        BuiltinType::Long,
        BuiltinType::Float,
        BuiltinType::Double,
        BuiltinType::Char,
        BuiltinType::Boolean,
        BuiltinType::String,
        BuiltinType::Uuid,
        BuiltinType::Date,
        BuiltinType::Class,
        BuiltinType::ObjectArray,
        BuiltinType::ByteArray,
        BuiltinType::ShortArray,
        BuiltinType::IntArray,
        BuiltinType::LongArray,
        BuiltinType::FloatArray,
        BuiltinType::DoubleArray,
        BuiltinType::CharArray,
        BuiltinType::BooleanArray,
        BuiltinType::List,
        BuiltinType::LinkedList,
        BuiltinType::HashMap,
        BuiltinType::HashSet,
        BuiltinType::LinkedHashMap,
        BuiltinType::LinkedHashSet,
        BuiltinType::Properties,
        BuiltinType::Throwable,
    ];

    /// The wire type code written in front of values of this type.
    #[must_use]
    pub const fn type_code(self) -> u8 {
        match self {
            BuiltinType::Byte => type_code::BYTE,
            BuiltinType::Short => type_code::SHORT,
            BuiltinType::Int => type_code::INT,
            BuiltinType::Long => type_code::LONG,
            BuiltinType::Float => type_code::FLOAT,
            BuiltinType::Double => type_code::DOUBLE,
            BuiltinType::Char => type_code::CHAR,
            BuiltinType::Boolean => type_code::BOOLEAN,
            BuiltinType::String => type_code::STR,
            BuiltinType::Uuid => type_code::UUID,
            BuiltinType::Date => type_code::DATE,
            BuiltinType::Class => type_code::CLS,
            BuiltinType::ObjectArray => type_code::OBJ_ARR,
            BuiltinType::ByteArray => type_code::BYTE_ARR,
            BuiltinType::ShortArray => type_code::SHORT_ARR,
            BuiltinType::IntArray => type_code::INT_ARR,
            BuiltinType::LongArray => type_code::LONG_ARR,
            BuiltinType::FloatArray => type_code::FLOAT_ARR,
            BuiltinType::DoubleArray => type_code::DOUBLE_ARR,
            BuiltinType::CharArray => type_code::CHAR_ARR,
            BuiltinType::BooleanArray => type_code::BOOLEAN_ARR,
            BuiltinType::List => type_code::ARRAY_LIST,
            BuiltinType::LinkedList => type_code::LINKED_LIST,
            BuiltinType::HashMap => type_code::HASH_MAP,
            BuiltinType::HashSet => type_code::HASH_SET,
            BuiltinType::LinkedHashMap => type_code::LINKED_HASH_MAP,
            BuiltinType::LinkedHashSet => type_code::LINKED_HASH_SET,
            BuiltinType::Properties => type_code::PROPS,
            BuiltinType::Throwable => type_code::JDK,
        }
    }

    /// Human-readable type name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            BuiltinType::Byte => "byte",
            BuiltinType::Short => "short",
            BuiltinType::Int => "int",
            BuiltinType::Long => "long",
            BuiltinType::Float => "float",
            BuiltinType::Double => "double",
            BuiltinType::Char => "char",
            BuiltinType::Boolean => "boolean",
            BuiltinType::String => "string",
            BuiltinType::Uuid => "uuid",
            BuiltinType::Date => "date",
            BuiltinType::Class => "class",
            BuiltinType::ObjectArray => "object[]",
            BuiltinType::ByteArray => "byte[]",
            BuiltinType::ShortArray => "short[]",
            BuiltinType::IntArray => "int[]",
            BuiltinType::LongArray => "long[]",
            BuiltinType::FloatArray => "float[]",
            BuiltinType::DoubleArray => "double[]",
            BuiltinType::CharArray => "char[]",
            BuiltinType::BooleanArray => "boolean[]",
            BuiltinType::List => "list",
            BuiltinType::LinkedList => "linked-list",
            BuiltinType::HashMap => "hash-map",
            BuiltinType::HashSet => "hash-set",
            BuiltinType::LinkedHashMap => "linked-hash-map",
            BuiltinType::LinkedHashSet => "linked-hash-set",
            BuiltinType::Properties => "properties",
            BuiltinType::Throwable => "throwable",
        }
    }

    /// Immutable values that are written inline and never get a handle.
    #[must_use]
    pub const fn is_value(self) -> bool {
        matches!(
            self,
            BuiltinType::Byte
                | BuiltinType::Short
                | BuiltinType::Int
                | BuiltinType::Long
                | BuiltinType::Float
                | BuiltinType::Double
                | BuiltinType::Char
                | BuiltinType::Boolean
                | BuiltinType::String
                | BuiltinType::Uuid
                | BuiltinType::Date
                | BuiltinType::Class
        )
    }

    /// Array shapes (object and primitive arrays).
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(
            self,
            BuiltinType::ObjectArray
                | BuiltinType::ByteArray
                | BuiltinType::ShortArray
                | BuiltinType::IntArray
                | BuiltinType::LongArray
                | BuiltinType::FloatArray
                | BuiltinType::DoubleArray
                | BuiltinType::CharArray
                | BuiltinType::BooleanArray
        )
    }
}

/// Default resource limits.
pub mod limits {
    /// Maximum nesting of described values on encode and decode.
    ///
    /// Encoding and decoding recurse once per level, so this stays within
    /// what a 2 MiB thread stack holds in an unoptimized build.
    pub const MAX_DEPTH: usize = 100;

    /// Maximum element count accepted for a single collection or array.
    pub const MAX_COLLECTION_SIZE: usize = 16 * 1024 * 1024;

    /// Initial capacity of the handle table.
    pub const INITIAL_HANDLE_CAPACITY: usize = 16;

    /// Load factor written for hash containers that do not track one.
    pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_ranges() {
        assert!(type_code::is_primitive_array(type_code::BYTE_ARR));
        assert!(type_code::is_primitive_array(type_code::BOOLEAN_ARR));
        assert!(!type_code::is_primitive_array(type_code::OBJ_ARR));

        assert!(type_code::has_type_id(type_code::ENUM));
        assert!(type_code::has_type_id(type_code::SERIALIZABLE));
        assert!(!type_code::has_type_id(type_code::CLS));
    }

    #[test]
    fn test_builtin_codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for ty in BuiltinType::ALL {
            assert!(seen.insert(ty.type_code()), "duplicate code for {}", ty.name());
        }
    }

    #[test]
    fn test_builtin_shapes() {
        assert!(BuiltinType::String.is_value());
        assert!(BuiltinType::Class.is_value());
        assert!(!BuiltinType::List.is_value());
        assert!(BuiltinType::IntArray.is_array());
        assert!(!BuiltinType::HashMap.is_array());
    }
}

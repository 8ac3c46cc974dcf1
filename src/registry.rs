// ABOUTME: Type descriptor resolution: the resolver trait, type id mapping and a concurrent registry.
// ABOUTME: Descriptors are built once at registration and shared by every encoder and decoder.

use crate::descriptor::{ClassBuilder, ClassLayout, Strategy, TypeDescriptor, TypeKey};
use crate::error::{Error, Result};
use crate::types::BuiltinType;
use crate::value::{EnumValue, Instance};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolves runtime types and wire type ids to descriptors.
///
/// Implementations are shared by concurrent encoders and decoders and must
/// be deterministic for a fixed configuration.
pub trait TypeResolver: Send + Sync {
    /// Classify a runtime type.
    fn classify(&self, key: &TypeKey) -> Result<Arc<TypeDescriptor>>;

    /// Look up the descriptor registered under a wire type id.
    fn descriptor_by_id(&self, type_id: i32) -> Result<Arc<TypeDescriptor>>;
}

/// Maps type names to 32-bit wire type ids.
pub trait IdMapper: Send + Sync {
    fn type_id(&self, type_name: &str) -> i32;
}

/// The 32-bit polynomial string hash over UTF-16 code units (`h = 31 * h + unit`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StringHashIdMapper;

impl IdMapper for StringHashIdMapper {
    fn type_id(&self, type_name: &str) -> i32 {
        type_name
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }
}

#[derive(Default)]
struct Types {
    by_name: HashMap<Arc<str>, Arc<TypeDescriptor>>,
    by_id: HashMap<i32, Arc<TypeDescriptor>>,
}

/// An in-memory, thread-safe type registry.
pub struct Registry {
    id_mapper: Box<dyn IdMapper>,
    builtins: HashMap<BuiltinType, Arc<TypeDescriptor>>,
    types: RwLock<Types>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry using the default id mapper.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id_mapper(StringHashIdMapper)
    }

    /// Create a registry with a custom id mapper.
    pub fn with_id_mapper(id_mapper: impl IdMapper + 'static) -> Self {
        let builtins = BuiltinType::ALL
            .iter()
            .map(|&ty| (ty, Arc::new(TypeDescriptor::builtin(ty))))
            .collect();
        Self {
            id_mapper: Box::new(id_mapper),
            builtins,
            types: RwLock::new(Types::default()),
        }
    }

    /// The wire type id of a type name.
    #[must_use]
    pub fn type_id_of(&self, type_name: &str) -> i32 {
        self.id_mapper.type_id(type_name)
    }

    /// Register a class.
    pub fn register(&self, builder: ClassBuilder) -> Result<Arc<TypeDescriptor>> {
        let type_id = self.id_mapper.type_id(builder.name());
        let desc = builder.build(type_id)?;
        self.insert(desc)
    }

    /// Register an enum with its constants in ordinal order.
    pub fn register_enum(&self, name: &str, constants: &[&str]) -> Result<Arc<TypeDescriptor>> {
        let type_id = self.id_mapper.type_id(name);
        let constants = constants.iter().map(|&c| Arc::from(c)).collect();
        self.insert(TypeDescriptor::enumeration(Arc::from(name), type_id, constants))
    }

    fn insert(&self, desc: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        let mut types = self.types.write();
        if types.by_name.contains_key(desc.name()) {
            return Err(Error::DuplicateType(desc.name().to_owned()));
        }
        if let Some(existing) = types.by_id.get(&desc.type_id()) {
            return Err(Error::TypeIdCollision {
                type_name: desc.name().to_owned(),
                existing: existing.name().to_owned(),
                type_id: desc.type_id(),
            });
        }
        debug!(type_name = %desc.name(), type_id = desc.type_id(), "registered type");
        let desc = Arc::new(desc);
        types.by_name.insert(desc.name_arc(), desc.clone());
        types.by_id.insert(desc.type_id(), desc.clone());
        Ok(desc)
    }

    /// Descriptor of a registered type, by name.
    pub fn descriptor(&self, type_name: &str) -> Result<Arc<TypeDescriptor>> {
        self.types
            .read()
            .by_name
            .get(type_name)
            .cloned()
            .ok_or_else(|| unregistered(type_name))
    }

    /// Instance layout of a registered class.
    pub fn layout(&self, type_name: &str) -> Result<Arc<ClassLayout>> {
        let desc = self.descriptor(type_name)?;
        desc.layout().cloned().ok_or_else(|| Error::Classification {
            type_name: type_name.to_owned(),
            reason: "type has no instance layout".into(),
        })
    }

    /// Create a blank instance of a registered class.
    pub fn instantiate(&self, type_name: &str) -> Result<Instance> {
        self.descriptor(type_name)?.instantiate()
    }

    /// Look up an enum constant by name.
    pub fn enum_value(&self, type_name: &str, constant: &str) -> Result<EnumValue> {
        let desc = self.descriptor(type_name)?;
        let Strategy::Enum(constants) = desc.strategy() else {
            return Err(Error::Classification {
                type_name: type_name.to_owned(),
                reason: "type is not an enum".into(),
            });
        };
        let ordinal = constants
            .iter()
            .position(|c| &**c == constant)
            .ok_or_else(|| Error::Classification {
                type_name: type_name.to_owned(),
                reason: format!("no constant `{constant}`"),
            })?;
        Ok(EnumValue::new(desc.name_arc(), ordinal as i32))
    }
}

fn unregistered(type_name: &str) -> Error {
    Error::Classification {
        type_name: type_name.to_owned(),
        reason: "type is not registered".into(),
    }
}

impl TypeResolver for Registry {
    fn classify(&self, key: &TypeKey) -> Result<Arc<TypeDescriptor>> {
        match key {
            TypeKey::Builtin(ty) => self
                .builtins
                .get(ty)
                .cloned()
                .ok_or_else(|| unregistered(ty.name())),
            TypeKey::Enum(name) => {
                let desc = self.descriptor(name)?;
                match desc.strategy() {
                    Strategy::Enum(_) => Ok(desc),
                    _ => Err(Error::Classification {
                        type_name: name.to_string(),
                        reason: "type is not an enum".into(),
                    }),
                }
            }
            TypeKey::Named(name) => self.descriptor(name),
        }
    }

    fn descriptor_by_id(&self, type_id: i32) -> Result<Arc<TypeDescriptor>> {
        self.types
            .read()
            .by_id
            .get(&type_id)
            .cloned()
            .ok_or(Error::UnknownTypeId(type_id))
    }
}

impl<T: TypeResolver + ?Sized> TypeResolver for Arc<T> {
    fn classify(&self, key: &TypeKey) -> Result<Arc<TypeDescriptor>> {
        (**self).classify(key)
    }

    fn descriptor_by_id(&self, type_id: i32) -> Result<Arc<TypeDescriptor>> {
        (**self).descriptor_by_id(type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SerializationKind;
    use crate::types::FieldKind;

    #[test]
    fn test_string_hash_ids() {
        let mapper = StringHashIdMapper;
        assert_eq!(mapper.type_id(""), 0);
        assert_eq!(mapper.type_id("a"), 97);
        assert_eq!(mapper.type_id("hello"), 99_162_322);
    }

    #[test]
    fn test_register_and_classify() {
        let registry = Registry::new();
        let desc = registry
            .register(ClassBuilder::new("demo.Point").field("x", FieldKind::Int))
            .unwrap();
        let key = TypeKey::Named(Arc::from("demo.Point"));
        let found = registry.classify(&key).unwrap();
        assert!(Arc::ptr_eq(&desc, &found));
        let by_id = registry.descriptor_by_id(desc.type_id()).unwrap();
        assert!(Arc::ptr_eq(&desc, &by_id));
    }

    #[test]
    fn test_builtins_always_resolve() {
        let registry = Registry::new();
        for ty in BuiltinType::ALL {
            let desc = registry.classify(&TypeKey::Builtin(ty)).unwrap();
            assert_eq!(desc.name(), ty.name());
        }
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = Registry::new();
        registry.register(ClassBuilder::new("demo.A")).unwrap();
        let err = registry.register(ClassBuilder::new("demo.A")).unwrap_err();
        assert!(matches!(err, Error::DuplicateType(_)));
    }

    #[test]
    fn test_type_id_collision() {
        struct Constant;
        impl IdMapper for Constant {
            fn type_id(&self, _: &str) -> i32 {
                42
            }
        }
        let registry = Registry::with_id_mapper(Constant);
        registry.register(ClassBuilder::new("demo.A")).unwrap();
        let err = registry.register(ClassBuilder::new("demo.B")).unwrap_err();
        assert!(matches!(err, Error::TypeIdCollision { type_id: 42, .. }));
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = Registry::new();
        let err = registry
            .classify(&TypeKey::Named(Arc::from("demo.Missing")))
            .unwrap_err();
        assert_eq!(err.error_type(), "classification");
        assert!(matches!(
            registry.descriptor_by_id(5),
            Err(Error::UnknownTypeId(5))
        ));
    }

    #[test]
    fn test_enum_values() {
        let registry = Registry::new();
        let desc = registry
            .register_enum("demo.Color", &["RED", "GREEN"])
            .unwrap();
        assert_eq!(desc.kind(), SerializationKind::Enum);
        let green = registry.enum_value("demo.Color", "GREEN").unwrap();
        assert_eq!(green.ordinal, 1);
        assert!(registry.enum_value("demo.Color", "BLUE").is_err());
    }
}

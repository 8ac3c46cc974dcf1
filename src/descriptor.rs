// ABOUTME: Type descriptors: how one runtime type is classified and laid out for serialization.
// ABOUTME: Descriptors are built once (see `ClassBuilder`) and shared read-only by encoders and decoders.

use crate::decoder::ObjectInput;
use crate::encoder::ObjectOutput;
use crate::error::{BoxError, Error, Result};
use crate::types::{type_code, BuiltinType, FieldKind};
use crate::value::{Instance, ObjectRef, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Result returned by user-supplied hooks.
pub type HookResult = std::result::Result<(), BoxError>;

/// Custom write hook for one serialization level.
pub type WriteHook = Arc<dyn Fn(&ObjectRef, &mut dyn ObjectOutput) -> HookResult + Send + Sync>;

/// Custom read hook for one serialization level.
pub type ReadHook = Arc<dyn Fn(&ObjectRef, &mut dyn ObjectInput) -> HookResult + Send + Sync>;

/// Substitutes a value before it is encoded.
pub type ReplaceFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// The key a runtime value is classified by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    Builtin(BuiltinType),
    Enum(Arc<str>),
    Named(Arc<str>),
}

impl TypeKey {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            TypeKey::Builtin(b) => b.name(),
            TypeKey::Enum(name) | TypeKey::Named(name) => name,
        }
    }
}

/// Coarse classification of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationKind {
    Primitive,
    Enum,
    Array,
    Class,
    Excluded,
}

impl FieldKind {
    /// Check whether a value may be stored in a field of this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldKind::Byte, Value::Byte(_))
                | (FieldKind::Short, Value::Short(_))
                | (FieldKind::Int, Value::Int(_))
                | (FieldKind::Long, Value::Long(_))
                | (FieldKind::Float, Value::Float(_))
                | (FieldKind::Double, Value::Double(_))
                | (FieldKind::Char, Value::Char(_))
                | (FieldKind::Boolean, Value::Bool(_))
                | (FieldKind::Other, _)
        )
    }

    /// The value a freshly created field of this kind holds.
    #[must_use]
    pub fn default_value(self) -> Value {
        match self {
            FieldKind::Byte => Value::Byte(0),
            FieldKind::Short => Value::Short(0),
            FieldKind::Int => Value::Int(0),
            FieldKind::Long => Value::Long(0),
            FieldKind::Float => Value::Float(0.0),
            FieldKind::Double => Value::Double(0.0),
            FieldKind::Char => Value::Char(0),
            FieldKind::Boolean => Value::Bool(false),
            FieldKind::Other => Value::Null,
        }
    }
}

/// Storage layout shared by every instance of a class.
#[derive(Debug)]
pub struct ClassLayout {
    type_name: Arc<str>,
    fields: Vec<(Arc<str>, FieldKind)>,
    index: HashMap<Arc<str>, usize>,
}

impl ClassLayout {
    fn new(type_name: Arc<str>, fields: Vec<(Arc<str>, FieldKind)>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(slot, (name, _))| (name.clone(), slot))
            .collect();
        Self {
            type_name,
            fields,
            index,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn type_name_arc(&self) -> Arc<str> {
        self.type_name.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in slot order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| &**name)
    }

    /// Slot of the named field.
    pub fn slot_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownField {
                type_name: self.type_name.to_string(),
                field: name.to_owned(),
            })
    }

    /// Type-check a value against the kind of a slot.
    pub fn check(&self, slot: usize, value: &Value) -> Result<()> {
        let (name, kind) = &self.fields[slot];
        if kind.accepts(value) {
            Ok(())
        } else {
            Err(Error::FieldKind {
                field: name.to_string(),
                expected: *kind,
            })
        }
    }

    pub(crate) fn default_slots(&self) -> Vec<Value> {
        self.fields.iter().map(|(_, kind)| kind.default_value()).collect()
    }
}

/// Reads and writes one declared field of an instance.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    pub name: Arc<str>,
    pub kind: FieldKind,
    slot: usize,
}

impl FieldAccessor {
    #[must_use]
    pub fn get<'a>(&self, instance: &'a Instance) -> &'a Value {
        instance.slot(self.slot)
    }

    pub fn set(&self, instance: &mut Instance, value: Value) -> Result<()> {
        instance.set_slot(self.slot, value)
    }
}

/// Ordered fields of one level plus a name index for the named-field protocol.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<FieldAccessor>,
    index: HashMap<Arc<str>, (usize, FieldKind)>,
}

impl FieldSchema {
    /// Fields in ordinal order.
    #[must_use]
    pub fn fields(&self) -> &[FieldAccessor] {
        &self.fields
    }

    /// Ordinal and kind of a named field.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<(usize, FieldKind)> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One serialization step in a class hierarchy.
#[derive(Clone)]
pub struct Level {
    pub schema: FieldSchema,
    pub write_hook: Option<WriteHook>,
    pub read_hook: Option<ReadHook>,
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("schema", &self.schema)
            .field("write_hook", &self.write_hook.is_some())
            .field("read_hook", &self.read_hook.is_some())
            .finish()
    }
}

/// Hooks of a type that writes and reads its own payload.
#[derive(Clone)]
pub struct SelfHooks {
    pub write: WriteHook,
    pub read: ReadHook,
}

/// How values of a type travel through the codec, resolved once per type.
#[derive(Clone)]
pub enum Strategy {
    /// Immutable value written inline
    Value(BuiltinType),
    /// Enum constant, written by ordinal
    Enum(Vec<Arc<str>>),
    /// Built-in container with a dedicated fast path
    Container(BuiltinType),
    /// Field levels, most-ancestral first
    Fields(Vec<Level>),
    SelfSerializing(SelfHooks),
    /// Delegated to the fallback marshaller
    Fallback,
    /// Never written; encodes as null
    Excluded,
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Value(b) => write!(f, "Value({})", b.name()),
            Strategy::Enum(constants) => write!(f, "Enum({} constants)", constants.len()),
            Strategy::Container(b) => write!(f, "Container({})", b.name()),
            Strategy::Fields(levels) => f.debug_tuple("Fields").field(levels).finish(),
            Strategy::SelfSerializing(_) => write!(f, "SelfSerializing"),
            Strategy::Fallback => write!(f, "Fallback"),
            Strategy::Excluded => write!(f, "Excluded"),
        }
    }
}

/// Cached metadata describing how a type is serialized.
pub struct TypeDescriptor {
    name: Arc<str>,
    type_id: i32,
    strategy: Strategy,
    layout: Option<Arc<ClassLayout>>,
    replace: Option<ReplaceFn>,
    serializable: bool,
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("strategy", &self.strategy)
            .field("replace", &self.replace.is_some())
            .field("serializable", &self.serializable)
            .finish()
    }
}

impl TypeDescriptor {
    /// Descriptor of a built-in type.
    #[must_use]
    pub fn builtin(ty: BuiltinType) -> Self {
        let strategy = if ty.is_value() {
            Strategy::Value(ty)
        } else if ty == BuiltinType::Throwable {
            Strategy::Fallback
        } else {
            Strategy::Container(ty)
        };
        Self {
            name: Arc::from(ty.name()),
            type_id: 0,
            strategy,
            layout: None,
            replace: None,
            serializable: true,
        }
    }

    /// Descriptor of an enum type with the given constants in ordinal order.
    #[must_use]
    pub fn enumeration(name: Arc<str>, type_id: i32, constants: Vec<Arc<str>>) -> Self {
        Self {
            name,
            type_id,
            strategy: Strategy::Enum(constants),
            layout: None,
            replace: None,
            serializable: true,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn name_arc(&self) -> Arc<str> {
        self.name.clone()
    }

    #[must_use]
    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    #[must_use]
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    #[must_use]
    pub fn layout(&self) -> Option<&Arc<ClassLayout>> {
        self.layout.as_ref()
    }

    #[must_use]
    pub fn replace_fn(&self) -> Option<&ReplaceFn> {
        self.replace.as_ref()
    }

    #[must_use]
    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    #[must_use]
    pub fn is_excluded(&self) -> bool {
        matches!(self.strategy, Strategy::Excluded)
    }

    /// Field levels, empty unless the type is written field by field.
    #[must_use]
    pub fn levels(&self) -> &[Level] {
        match &self.strategy {
            Strategy::Fields(levels) => levels,
            _ => &[],
        }
    }

    #[must_use]
    pub fn kind(&self) -> SerializationKind {
        match &self.strategy {
            Strategy::Value(_) => SerializationKind::Primitive,
            Strategy::Enum(_) => SerializationKind::Enum,
            Strategy::Container(b) if b.is_array() => SerializationKind::Array,
            Strategy::Excluded => SerializationKind::Excluded,
            Strategy::Container(_)
            | Strategy::Fields(_)
            | Strategy::SelfSerializing(_)
            | Strategy::Fallback => SerializationKind::Class,
        }
    }

    /// The code written in front of described values of this type.
    #[must_use]
    pub fn type_code(&self) -> u8 {
        match &self.strategy {
            Strategy::Value(b) | Strategy::Container(b) => b.type_code(),
            Strategy::Enum(_) => type_code::ENUM,
            Strategy::Fields(_) => type_code::SERIALIZABLE,
            Strategy::SelfSerializing(_) => type_code::EXTERNALIZABLE,
            Strategy::Fallback => type_code::JDK,
            Strategy::Excluded => type_code::NULL,
        }
    }

    /// Create a blank instance to be populated by the decoder.
    pub fn instantiate(&self) -> Result<Instance> {
        let layout = self.layout.as_ref().ok_or_else(|| Error::Classification {
            type_name: self.name.to_string(),
            reason: "type has no instance layout".into(),
        })?;
        Ok(Instance::new(layout.clone()))
    }
}

struct LevelSpec {
    fields: Vec<(Arc<str>, FieldKind)>,
    write_hook: Option<WriteHook>,
    read_hook: Option<ReadHook>,
}

impl LevelSpec {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            write_hook: None,
            read_hook: None,
        }
    }
}

/// Builder for class descriptors.
///
/// Fields are declared level by level, starting with the most-ancestral
/// class; within a level, declaration order is ordinal order.
///
/// ```
/// use optimized_marshaller::{ClassBuilder, FieldKind};
///
/// let point = ClassBuilder::new("geo.Point")
///     .field("x", FieldKind::Int)
///     .field("y", FieldKind::Int);
/// # let _ = point;
/// ```
pub struct ClassBuilder {
    name: Arc<str>,
    levels: Vec<LevelSpec>,
    self_hooks: Option<SelfHooks>,
    replace: Option<ReplaceFn>,
    serializable: bool,
    fallback: bool,
    excluded: bool,
}

impl ClassBuilder {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            levels: vec![LevelSpec::new()],
            self_hooks: None,
            replace: None,
            serializable: true,
            fallback: false,
            excluded: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a field on the current level.
    #[must_use]
    pub fn field(mut self, name: impl Into<Arc<str>>, kind: FieldKind) -> Self {
        self.current().fields.push((name.into(), kind));
        self
    }

    /// Start the level of the next, more derived class.
    #[must_use]
    pub fn next_level(mut self) -> Self {
        self.levels.push(LevelSpec::new());
        self
    }

    /// Install a custom write hook on the current level.
    #[must_use]
    pub fn write_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ObjectRef, &mut dyn ObjectOutput) -> HookResult + Send + Sync + 'static,
    {
        self.current().write_hook = Some(Arc::new(hook));
        self
    }

    /// Install a custom read hook on the current level.
    #[must_use]
    pub fn read_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ObjectRef, &mut dyn ObjectInput) -> HookResult + Send + Sync + 'static,
    {
        self.current().read_hook = Some(Arc::new(hook));
        self
    }

    /// Make the type write and read its own payload, bypassing field levels.
    #[must_use]
    pub fn self_serializing<W, R>(mut self, write: W, read: R) -> Self
    where
        W: Fn(&ObjectRef, &mut dyn ObjectOutput) -> HookResult + Send + Sync + 'static,
        R: Fn(&ObjectRef, &mut dyn ObjectInput) -> HookResult + Send + Sync + 'static,
    {
        self.self_hooks = Some(SelfHooks {
            write: Arc::new(write),
            read: Arc::new(read),
        });
        self
    }

    /// Substitute instances with another value before they are written.
    #[must_use]
    pub fn replace_with<F>(mut self, replace: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.replace = Some(Arc::new(replace));
        self
    }

    /// Mark the type as not eligible for serialization.
    #[must_use]
    pub fn not_serializable(mut self) -> Self {
        self.serializable = false;
        self
    }

    /// Route instances through the fallback marshaller.
    #[must_use]
    pub fn fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    /// Never write instances; they encode as null.
    #[must_use]
    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    fn current(&mut self) -> &mut LevelSpec {
        if self.levels.is_empty() {
            self.levels.push(LevelSpec::new());
        }
        let last = self.levels.len() - 1;
        &mut self.levels[last]
    }

    /// Build the descriptor under the given type id.
    pub fn build(self, type_id: i32) -> Result<TypeDescriptor> {
        let mut seen = HashSet::new();
        let mut all_fields = Vec::new();
        for level in &self.levels {
            for (name, kind) in &level.fields {
                if !seen.insert(name.clone()) {
                    return Err(Error::Classification {
                        type_name: self.name.to_string(),
                        reason: format!("field `{name}` is declared twice"),
                    });
                }
                all_fields.push((name.clone(), *kind));
            }
        }
        let layout = Arc::new(ClassLayout::new(self.name.clone(), all_fields));

        let strategy = if self.excluded {
            Strategy::Excluded
        } else if self.fallback {
            Strategy::Fallback
        } else if let Some(hooks) = self.self_hooks {
            Strategy::SelfSerializing(hooks)
        } else {
            let mut slot = 0;
            let levels = self
                .levels
                .into_iter()
                .map(|spec| {
                    let mut schema = FieldSchema::default();
                    for (ordinal, (name, kind)) in spec.fields.into_iter().enumerate() {
                        schema.index.insert(name.clone(), (ordinal, kind));
                        schema.fields.push(FieldAccessor { name, kind, slot });
                        slot += 1;
                    }
                    Level {
                        schema,
                        write_hook: spec.write_hook,
                        read_hook: spec.read_hook,
                    }
                })
                .collect();
            Strategy::Fields(levels)
        };

        Ok(TypeDescriptor {
            name: self.name,
            type_id,
            strategy,
            layout: Some(layout),
            replace: self.replace,
            serializable: self.serializable,
        })
    }
}

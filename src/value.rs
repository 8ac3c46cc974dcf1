// ABOUTME: Runtime object model walked by the encoder and rebuilt by the decoder.
// ABOUTME: Only `ObjectRef` carries identity; every other `Value` variant is an immutable value.

use crate::descriptor::{ClassLayout, TypeKey};
use crate::error::{Error, Result};
use crate::types::{limits, BuiltinType};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

/// An edge in an object graph.
///
/// Equality and hashing compare primitives by value (floats by bit
/// pattern) and objects by identity, which makes `Value` usable as a key
/// of the hash-based containers.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Absent value
    #[default]
    Null,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// A UTF-16 code unit
    Char(u16),
    Bool(bool),
    String(String),
    /// Opaque 128-bit identifier
    Uuid(Uuid),
    /// Milliseconds since the epoch
    Date(i64),
    Enum(EnumValue),
    /// A class literal, by type name
    Class(String),
    /// An identity-bearing heap object
    Object(ObjectRef),
}

impl Value {
    /// Returns true if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// If this is an object, returns its reference.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// If this is an int, returns the value.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// If this is a long, returns the value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(n) => Some(*n),
            _ => None,
        }
    }

    /// If this is a string, returns a reference to it.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true if both values are the same object.
    ///
    /// Non-object values are never identical to anything.
    #[must_use]
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The key used to classify this value, or `None` for null.
    #[must_use]
    pub fn type_key(&self) -> Option<TypeKey> {
        let builtin = match self {
            Value::Null => return None,
            Value::Byte(_) => BuiltinType::Byte,
            Value::Short(_) => BuiltinType::Short,
            Value::Int(_) => BuiltinType::Int,
            Value::Long(_) => BuiltinType::Long,
            Value::Float(_) => BuiltinType::Float,
            Value::Double(_) => BuiltinType::Double,
            Value::Char(_) => BuiltinType::Char,
            Value::Bool(_) => BuiltinType::Boolean,
            Value::String(_) => BuiltinType::String,
            Value::Uuid(_) => BuiltinType::Uuid,
            Value::Date(_) => BuiltinType::Date,
            Value::Class(_) => BuiltinType::Class,
            Value::Enum(e) => return Some(TypeKey::Enum(e.type_name.clone())),
            Value::Object(obj) => return Some(obj.borrow().type_key()),
        };
        Some(TypeKey::Builtin(builtin))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Byte(v) => v.hash(state),
            Value::Short(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Char(v) => v.hash(state),
            Value::Bool(v) => v.hash(state),
            Value::String(v) | Value::Class(v) => v.hash(state),
            Value::Uuid(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Enum(v) => v.hash(state),
            Value::Object(v) => v.addr().hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Self {
        Value::Enum(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A 128-bit identifier stored as its high and low 64-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Uuid {
    pub most: i64,
    pub least: i64,
}

impl Uuid {
    #[must_use]
    pub const fn new(most: i64, least: i64) -> Self {
        Self { most, least }
    }

    #[must_use]
    pub const fn from_u128(v: u128) -> Self {
        Self {
            most: (v >> 64) as i64,
            least: v as i64,
        }
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        ((self.most as u64 as u128) << 64) | (self.least as u64 as u128)
    }
}

/// A constant of a registered enum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_name: Arc<str>,
    pub ordinal: i32,
}

impl EnumValue {
    pub fn new(type_name: impl Into<Arc<str>>, ordinal: i32) -> Self {
        Self {
            type_name: type_name.into(),
            ordinal,
        }
    }
}

/// A shared, identity-bearing reference to a heap object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Object>>);

impl ObjectRef {
    pub fn new(object: Object) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    /// Immutably borrow the referenced object.
    ///
    /// # Panics
    /// Panics if the object is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    /// Mutably borrow the referenced object.
    ///
    /// # Panics
    /// Panics if the object is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    /// Returns true if both references point at the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the referenced object, stable for as long as it is alive.
    #[must_use]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Read a field of an instance by name.
    pub fn field(&self, name: &str) -> Result<Value> {
        match &*self.borrow() {
            Object::Instance(inst) => inst.get(name).cloned(),
            other => Err(Error::UnknownField {
                type_name: other.type_name().to_owned(),
                field: name.to_owned(),
            }),
        }
    }

    /// Set a field of an instance by name.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        match &mut *self.borrow_mut() {
            Object::Instance(inst) => inst.set(name, value.into()),
            other => Err(Error::UnknownField {
                type_name: other.type_name().to_owned(),
                field: name.to_owned(),
            }),
        }
    }
}

impl fmt::Debug for ObjectRef {
    // Graphs may be cyclic: never recurse into the referenced object.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(obj) => write!(f, "ObjectRef({}@{:#x})", obj.type_name(), self.addr()),
            Err(_) => write!(f, "ObjectRef(<borrowed>@{:#x})", self.addr()),
        }
    }
}

/// The shapes a heap object can take.
#[derive(Debug, Clone)]
pub enum Object {
    /// Array of object references
    Array(Vec<Value>),
    /// Array of a primitive kind
    Primitives(PrimitiveArray),
    /// Array-backed ordered sequence
    List(Vec<Value>),
    /// Linked sequence
    LinkedList(VecDeque<Value>),
    HashMap(HashMapObject),
    HashSet(HashSetObject),
    LinkedHashMap(LinkedHashMapObject),
    LinkedHashSet(LinkedHashSetObject),
    Properties(Properties),
    Throwable(Throwable),
    /// Instance of a registered class
    Instance(Instance),
}

impl Object {
    /// The key used to classify this object.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        match self {
            Object::Instance(inst) => TypeKey::Named(inst.layout().type_name_arc()),
            other => TypeKey::Builtin(other.builtin().unwrap_or(BuiltinType::ObjectArray)),
        }
    }

    /// The built-in type of this object, if it is not an instance.
    #[must_use]
    pub fn builtin(&self) -> Option<BuiltinType> {
        Some(match self {
            Object::Array(_) => BuiltinType::ObjectArray,
            Object::Primitives(arr) => arr.builtin(),
            Object::List(_) => BuiltinType::List,
            Object::LinkedList(_) => BuiltinType::LinkedList,
            Object::HashMap(_) => BuiltinType::HashMap,
            Object::HashSet(_) => BuiltinType::HashSet,
            Object::LinkedHashMap(_) => BuiltinType::LinkedHashMap,
            Object::LinkedHashSet(_) => BuiltinType::LinkedHashSet,
            Object::Properties(_) => BuiltinType::Properties,
            Object::Throwable(_) => BuiltinType::Throwable,
            Object::Instance(_) => return None,
        })
    }

    /// Type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Object::Instance(inst) => inst.type_name(),
            other => other.builtin().map_or("instance", BuiltinType::name),
        }
    }

    /// If this is an instance, returns it.
    #[must_use]
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Object::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// If this is an instance, returns it mutably.
    pub fn as_instance_mut(&mut self) -> Option<&mut Instance> {
        match self {
            Object::Instance(inst) => Some(inst),
            _ => None,
        }
    }
}

/// Arrays of primitive elements, written through the sink's bulk writers.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Char(Vec<u16>),
    Boolean(Vec<bool>),
}

impl PrimitiveArray {
    #[must_use]
    pub fn builtin(&self) -> BuiltinType {
        match self {
            PrimitiveArray::Byte(_) => BuiltinType::ByteArray,
            PrimitiveArray::Short(_) => BuiltinType::ShortArray,
            PrimitiveArray::Int(_) => BuiltinType::IntArray,
            PrimitiveArray::Long(_) => BuiltinType::LongArray,
            PrimitiveArray::Float(_) => BuiltinType::FloatArray,
            PrimitiveArray::Double(_) => BuiltinType::DoubleArray,
            PrimitiveArray::Char(_) => BuiltinType::CharArray,
            PrimitiveArray::Boolean(_) => BuiltinType::BooleanArray,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            PrimitiveArray::Byte(v) => v.len(),
            PrimitiveArray::Short(v) => v.len(),
            PrimitiveArray::Int(v) => v.len(),
            PrimitiveArray::Long(v) => v.len(),
            PrimitiveArray::Float(v) => v.len(),
            PrimitiveArray::Double(v) => v.len(),
            PrimitiveArray::Char(v) => v.len(),
            PrimitiveArray::Boolean(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash-based map together with its load factor.
#[derive(Debug, Clone)]
pub struct HashMapObject {
    pub entries: HashMap<Value, Value>,
    pub load_factor: f32,
}

impl HashMapObject {
    #[must_use]
    pub fn new() -> Self {
        Self::with_load_factor(limits::DEFAULT_LOAD_FACTOR)
    }

    #[must_use]
    pub fn with_load_factor(load_factor: f32) -> Self {
        Self {
            entries: HashMap::new(),
            load_factor,
        }
    }
}

impl Default for HashMapObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash-based set together with the load factor of its backing map.
#[derive(Debug, Clone)]
pub struct HashSetObject {
    pub elements: HashSet<Value>,
    pub load_factor: f32,
}

impl HashSetObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: HashSet::new(),
            load_factor: limits::DEFAULT_LOAD_FACTOR,
        }
    }
}

impl Default for HashSetObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-ordered map, optionally kept in access order.
#[derive(Debug, Clone)]
pub struct LinkedHashMapObject {
    pub entries: IndexMap<Value, Value>,
    pub load_factor: f32,
    pub access_order: bool,
}

impl LinkedHashMapObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            load_factor: limits::DEFAULT_LOAD_FACTOR,
            access_order: false,
        }
    }

    /// A map that moves entries to the end whenever they are read.
    #[must_use]
    pub fn access_ordered() -> Self {
        Self {
            access_order: true,
            ..Self::new()
        }
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        if self.access_order {
            let old = self.entries.shift_remove(&key);
            self.entries.insert(key, value);
            return old;
        }
        self.entries.insert(key, value)
    }

    /// Look up a key, refreshing its position when access order is enabled.
    pub fn get(&mut self, key: &Value) -> Option<&Value> {
        if self.access_order {
            let value = self.entries.shift_remove(key)?;
            self.entries.insert(key.clone(), value);
        }
        self.entries.get(key)
    }
}

impl Default for LinkedHashMapObject {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-ordered set.
#[derive(Debug, Clone)]
pub struct LinkedHashSetObject {
    pub elements: IndexSet<Value>,
    pub load_factor: f32,
}

impl LinkedHashSetObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: IndexSet::new(),
            load_factor: limits::DEFAULT_LOAD_FACTOR,
        }
    }
}

impl Default for LinkedHashSetObject {
    fn default() -> Self {
        Self::new()
    }
}

/// String key/value table with an optional chain of defaults.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// The table's own entries (defaults excluded)
    pub entries: BTreeMap<String, String>,
    /// Another properties object consulted for missing keys
    pub defaults: Option<ObjectRef>,
}

impl Properties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a key in this table, then in the defaults chain.
    ///
    /// The chain is walked iteratively and stops at the first table seen
    /// twice, so a cyclic chain yields `None` for a missing key.
    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<String> {
        if let Some(v) = self.entries.get(key) {
            return Some(v.clone());
        }
        let mut visited: Vec<usize> = Vec::new();
        let mut next = self.defaults.clone();
        while let Some(table) = next {
            if visited.contains(&table.addr()) {
                return None;
            }
            visited.push(table.addr());
            let borrowed = table.borrow();
            let Object::Properties(props) = &*borrowed else {
                return None;
            };
            if let Some(v) = props.entries.get(key) {
                return Some(v.clone());
            }
            next = props.defaults.clone();
        }
        None
    }
}

/// A built-in error value.
///
/// Built-in throwables have no custom serialization protocol, so they
/// always travel through the fallback marshaller. An error type that
/// serializes itself is registered as a class instead (for example with
/// `ClassBuilder::self_serializing`) and is written by its own strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Throwable {
    pub class_name: String,
    pub message: Option<String>,
    pub cause: Option<Box<Throwable>>,
    pub stack_trace: Vec<String>,
}

impl Throwable {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: Throwable) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// An instance of a registered class: one slot per declared field.
#[derive(Debug, Clone)]
pub struct Instance {
    layout: Arc<ClassLayout>,
    slots: Vec<Value>,
}

impl Instance {
    /// Create an instance with every field at its kind's default value.
    #[must_use]
    pub fn new(layout: Arc<ClassLayout>) -> Self {
        let slots = layout.default_slots();
        Self { layout, slots }
    }

    #[must_use]
    pub fn layout(&self) -> &Arc<ClassLayout> {
        &self.layout
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.layout.type_name()
    }

    /// Read a field by name.
    pub fn get(&self, name: &str) -> Result<&Value> {
        let slot = self.layout.slot_of(name)?;
        Ok(&self.slots[slot])
    }

    /// Set a field by name, checking the value against the declared kind.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let slot = self.layout.slot_of(name)?;
        self.set_slot(slot, value)
    }

    #[must_use]
    pub fn slot(&self, slot: usize) -> &Value {
        &self.slots[slot]
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) -> Result<()> {
        self.layout.check(slot, &value)?;
        self.slots[slot] = value;
        Ok(())
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value.into())?;
        Ok(self)
    }

    /// Wrap the instance into a shared object reference.
    #[must_use]
    pub fn into_ref(self) -> ObjectRef {
        ObjectRef::new(Object::Instance(self))
    }
}

// ABOUTME: Object-graph decoder: the mirror of the encoder, rebuilding handles in read order.
// ABOUTME: Objects are registered as placeholders before their contents are read, so cycles resolve.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::config::MarshallerConfig;
use crate::context::{ContextStack, Frame};
use crate::descriptor::{FieldSchema, Strategy, TypeDescriptor};
use crate::error::{Error, Result};
use crate::fallback::{FallbackMarshaller, JsonFallback};
use crate::io::DataInput;
use crate::registry::TypeResolver;
use crate::types::{type_code, FieldKind};
use crate::value::{
    EnumValue, HashMapObject, HashSetObject, LinkedHashMapObject, LinkedHashSetObject, Object,
    ObjectRef, PrimitiveArray, Properties, Uuid, Value,
};
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Upper bound on capacity reserved up front for a declared element count.
const MAX_PREALLOCATION: usize = 4096;

/// The source handed to custom read hooks; the mirror of
/// [`ObjectOutput`](crate::encoder::ObjectOutput).
pub trait ObjectInput {
    fn read_byte(&mut self) -> Result<i8>;
    fn read_bool(&mut self) -> Result<bool>;
    fn read_short(&mut self) -> Result<i16>;
    fn read_char(&mut self) -> Result<u16>;
    fn read_int(&mut self) -> Result<i32>;
    fn read_long(&mut self) -> Result<i64>;
    fn read_float(&mut self) -> Result<f32>;
    fn read_double(&mut self) -> Result<f64>;
    fn read_utf(&mut self) -> Result<String>;
    fn read_raw(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read a complete tagged value.
    fn read_object(&mut self) -> Result<Value>;

    /// Read the current level's fields into the object being decoded.
    fn default_read_fields(&mut self) -> Result<()>;

    /// Read the current level's fields without assigning them.
    fn read_named_fields(&mut self) -> Result<NamedFields>;
}

/// Field values of one level, read in ordinal order and looked up by name.
#[derive(Debug, Clone)]
pub struct NamedFields {
    type_name: Arc<str>,
    fields: Vec<(Arc<str>, Value)>,
}

impl NamedFields {
    /// The value of a declared field.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| Error::UnknownField {
                type_name: self.type_name.to_string(),
                field: name.to_owned(),
            })
    }

    /// Fields in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (&**n, v))
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

/// An object-graph decoder reading from a primitive source.
pub struct Decoder<I: DataInput> {
    input: I,
    resolver: Arc<dyn TypeResolver>,
    fallback: Arc<dyn FallbackMarshaller>,
    config: MarshallerConfig,
    handles: Vec<ObjectRef>,
    contexts: ContextStack,
    depth: usize,
}

impl<I: DataInput> Decoder<I> {
    /// Create a decoder with the default configuration and fallback.
    pub fn new(input: I, resolver: Arc<dyn TypeResolver>) -> Self {
        Self::with_config(input, resolver, MarshallerConfig::default())
    }

    /// Create a decoder with custom configuration.
    pub fn with_config(input: I, resolver: Arc<dyn TypeResolver>, config: MarshallerConfig) -> Self {
        Self {
            input,
            resolver,
            fallback: Arc::new(JsonFallback),
            handles: Vec::with_capacity(config.initial_handle_capacity),
            config,
            contexts: ContextStack::default(),
            depth: 0,
        }
    }

    /// Replace the fallback marshaller.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackMarshaller>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Consume the decoder and return the underlying source.
    pub fn into_inner(self) -> I {
        self.input
    }

    /// Get a reference to the underlying source.
    pub fn get_ref(&self) -> &I {
        &self.input
    }

    /// Objects registered by the last top-level read, in handle order.
    #[must_use]
    pub fn handled_objects(&self) -> &[ObjectRef] {
        &self.handles
    }

    /// Clear the handle table and any hook context.
    pub fn reset(&mut self) {
        self.handles.clear();
        self.contexts.clear();
        self.depth = 0;
    }

    /// Decode one independent graph.
    pub fn read_root(&mut self) -> Result<Value> {
        self.reset();
        let result = self.read_value();
        self.contexts.clear();
        self.depth = 0;
        result
    }

    fn read_value(&mut self) -> Result<Value> {
        let code = self.input.read_u8()?;
        Ok(match code {
            type_code::NULL => Value::Null,
            type_code::HANDLE => {
                let handle = self.input.read_int()?;
                let obj = usize::try_from(handle)
                    .ok()
                    .and_then(|h| self.handles.get(h))
                    .ok_or(Error::ForwardHandle(handle))?;
                Value::Object(obj.clone())
            }
            type_code::JDK => self.read_fallback()?,
            type_code::BYTE => Value::Byte(self.input.read_byte()?),
            type_code::SHORT => Value::Short(self.input.read_short()?),
            type_code::INT => Value::Int(self.input.read_int()?),
            type_code::LONG => Value::Long(self.input.read_long()?),
            type_code::FLOAT => Value::Float(self.input.read_float()?),
            type_code::DOUBLE => Value::Double(self.input.read_double()?),
            type_code::CHAR => Value::Char(self.input.read_char()?),
            type_code::BOOLEAN => Value::Bool(self.input.read_bool()?),
            type_code::STR => Value::String(self.input.read_utf()?),
            type_code::UUID => {
                let most = self.input.read_long()?;
                let least = self.input.read_long()?;
                Value::Uuid(Uuid::new(most, least))
            }
            type_code::DATE => Value::Date(self.input.read_long()?),
            type_code::CLS => Value::Class(self.input.read_utf()?),
            code if type_code::has_type_id(code) => {
                let type_id = self.input.read_int()?;
                let desc = self.resolver.descriptor_by_id(type_id)?;
                if code == type_code::ENUM {
                    self.read_enum(&desc)?
                } else {
                    self.enter()?;
                    let result = self.read_instance(code, &desc);
                    self.depth -= 1;
                    Value::Object(result?)
                }
            }
            code if (type_code::BYTE_ARR..=type_code::CLS).contains(&code) => {
                self.enter()?;
                let result = self.read_container(code);
                self.depth -= 1;
                Value::Object(result?)
            }
            other => return Err(Error::InvalidTypeCode(other)),
        })
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    fn read_count(&mut self) -> Result<usize> {
        let n = self.input.read_len()?;
        if n > self.config.max_collection_size {
            return Err(Error::MaxCollectionSizeExceeded(n));
        }
        Ok(n)
    }

    fn register(&mut self, object: Object) -> ObjectRef {
        let obj = ObjectRef::new(object);
        self.handles.push(obj.clone());
        obj
    }

    fn read_fallback(&mut self) -> Result<Value> {
        debug!("delegating to fallback unmarshaller");
        let object = self
            .fallback
            .unmarshal(&mut self.input, &*self.resolver)
            .map_err(|e| {
                Error::fallback("failed to deserialize object with the fallback marshaller".into(), e)
            })?;
        Ok(Value::Object(ObjectRef::new(object)))
    }

    fn read_enum(&mut self, desc: &TypeDescriptor) -> Result<Value> {
        let ordinal = self.input.read_int()?;
        let Strategy::Enum(constants) = desc.strategy() else {
            return Err(Error::format(format!("type {} is not an enum", desc.name())));
        };
        if ordinal < 0 || ordinal as usize >= constants.len() {
            return Err(Error::format(format!(
                "ordinal {ordinal} out of range for {}",
                desc.name()
            )));
        }
        Ok(Value::Enum(EnumValue::new(desc.name_arc(), ordinal)))
    }

    #[inline(never)]
    fn read_instance(&mut self, code: u8, desc: &Arc<TypeDescriptor>) -> Result<ObjectRef> {
        match (code, desc.strategy()) {
            (type_code::SERIALIZABLE, Strategy::Fields(levels)) => {
                let obj = self.register(Object::Instance(desc.instantiate()?));
                for (index, level) in levels.iter().enumerate() {
                    match &level.read_hook {
                        None => self.read_fields(&obj, &level.schema)?,
                        Some(hook) => {
                            self.contexts.push(Frame::new(obj.clone(), desc.clone(), index));
                            let result = hook(&obj, self);
                            self.contexts.pop();
                            result.map_err(|e| {
                                debug!(type_name = %desc.name(), "read hook failed");
                                Error::hook(desc.name(), e)
                            })?;
                        }
                    }
                }
                Ok(obj)
            }
            (type_code::EXTERNALIZABLE, Strategy::SelfSerializing(hooks)) => {
                let obj = self.register(Object::Instance(desc.instantiate()?));
                self.contexts.push_barrier();
                let result = (hooks.read)(&obj, self);
                self.contexts.pop();
                result.map_err(|e| Error::hook(desc.name(), e))?;
                Ok(obj)
            }
            _ => Err(Error::format(format!(
                "type code {code} does not match the layout of {}",
                desc.name()
            ))),
        }
    }

    fn read_field(&mut self, kind: FieldKind) -> Result<Value> {
        Ok(match kind {
            FieldKind::Byte => Value::Byte(self.input.read_byte()?),
            FieldKind::Short => Value::Short(self.input.read_short()?),
            FieldKind::Int => Value::Int(self.input.read_int()?),
            FieldKind::Long => Value::Long(self.input.read_long()?),
            FieldKind::Float => Value::Float(self.input.read_float()?),
            FieldKind::Double => Value::Double(self.input.read_double()?),
            FieldKind::Char => Value::Char(self.input.read_char()?),
            FieldKind::Boolean => Value::Bool(self.input.read_bool()?),
            FieldKind::Other => self.read_value()?,
        })
    }

    #[inline(never)]
    fn read_fields(&mut self, obj: &ObjectRef, schema: &FieldSchema) -> Result<()> {
        for field in schema.fields() {
            let value = self.read_field(field.kind)?;
            let mut borrowed = obj.borrow_mut();
            let inst = borrowed
                .as_instance_mut()
                .ok_or_else(|| Error::misuse("field target is not an instance"))?;
            field.set(inst, value)?;
        }
        Ok(())
    }

    fn read_values(&mut self, n: usize) -> Result<Vec<Value>> {
        let mut items = Vec::with_capacity(n.min(MAX_PREALLOCATION));
        for _ in 0..n {
            items.push(self.read_value()?);
        }
        Ok(items)
    }

    // Each shape is read out of line so a nested value only pays for the
    // stack frame of its own shape.
    #[inline(never)]
    fn read_container(&mut self, code: u8) -> Result<ObjectRef> {
        match code {
            type_code::OBJ_ARR | type_code::ARRAY_LIST | type_code::LINKED_LIST => {
                self.read_sequence(code)
            }
            type_code::HASH_MAP => self.read_hash_map(),
            type_code::HASH_SET => self.read_hash_set(),
            type_code::LINKED_HASH_MAP => self.read_linked_hash_map(),
            type_code::LINKED_HASH_SET => self.read_linked_hash_set(),
            type_code::PROPS => self.read_properties(),
            code if type_code::is_primitive_array(code) => {
                let n = self.read_count()?;
                let arr = self.read_primitive_array(code, n)?;
                Ok(self.register(Object::Primitives(arr)))
            }
            other => Err(Error::InvalidTypeCode(other)),
        }
    }

    #[inline(never)]
    fn read_sequence(&mut self, code: u8) -> Result<ObjectRef> {
        let obj = self.register(Object::List(Vec::new()));
        let n = self.read_count()?;
        let items = self.read_values(n)?;
        *obj.borrow_mut() = match code {
            type_code::OBJ_ARR => Object::Array(items),
            type_code::ARRAY_LIST => Object::List(items),
            _ => Object::LinkedList(VecDeque::from(items)),
        };
        Ok(obj)
    }

    #[inline(never)]
    fn read_hash_map(&mut self) -> Result<ObjectRef> {
        let obj = self.register(Object::HashMap(HashMapObject::new()));
        let n = self.read_count()?;
        let load_factor = self.input.read_float()?;
        let mut entries = HashMap::with_capacity(n.min(MAX_PREALLOCATION));
        for _ in 0..n {
            let k = self.read_value()?;
            let v = self.read_value()?;
            entries.insert(k, v);
        }
        *obj.borrow_mut() = Object::HashMap(HashMapObject {
            entries,
            load_factor,
        });
        Ok(obj)
    }

    #[inline(never)]
    fn read_hash_set(&mut self) -> Result<ObjectRef> {
        let obj = self.register(Object::HashSet(HashSetObject::new()));
        let n = self.read_count()?;
        let load_factor = self.input.read_float()?;
        let mut elements = HashSet::with_capacity(n.min(MAX_PREALLOCATION));
        for _ in 0..n {
            elements.insert(self.read_value()?);
        }
        *obj.borrow_mut() = Object::HashSet(HashSetObject {
            elements,
            load_factor,
        });
        Ok(obj)
    }

    #[inline(never)]
    fn read_linked_hash_map(&mut self) -> Result<ObjectRef> {
        let obj = self.register(Object::LinkedHashMap(LinkedHashMapObject::new()));
        let n = self.read_count()?;
        let load_factor = self.input.read_float()?;
        let access_order = self.input.read_bool()?;
        let mut entries = IndexMap::with_capacity(n.min(MAX_PREALLOCATION));
        for _ in 0..n {
            let k = self.read_value()?;
            let v = self.read_value()?;
            entries.insert(k, v);
        }
        *obj.borrow_mut() = Object::LinkedHashMap(LinkedHashMapObject {
            entries,
            load_factor,
            access_order,
        });
        Ok(obj)
    }

    #[inline(never)]
    fn read_linked_hash_set(&mut self) -> Result<ObjectRef> {
        let obj = self.register(Object::LinkedHashSet(LinkedHashSetObject::new()));
        let n = self.read_count()?;
        let load_factor = self.input.read_float()?;
        // Sets never use access order.
        self.input.read_bool()?;
        let mut elements = IndexSet::with_capacity(n.min(MAX_PREALLOCATION));
        for _ in 0..n {
            elements.insert(self.read_value()?);
        }
        *obj.borrow_mut() = Object::LinkedHashSet(LinkedHashSetObject {
            elements,
            load_factor,
        });
        Ok(obj)
    }

    #[inline(never)]
    fn read_properties(&mut self) -> Result<ObjectRef> {
        let obj = self.register(Object::Properties(Properties::new()));
        let defaults = if self.input.read_bool()? {
            match self.read_value()? {
                Value::Object(d) if d.ptr_eq(&obj) => {
                    return Err(Error::format("property table cannot be its own defaults"));
                }
                Value::Object(d) if matches!(&*d.borrow(), Object::Properties(_)) => Some(d),
                Value::Null => None,
                _ => return Err(Error::format("property defaults must be a property table")),
            }
        } else {
            None
        };
        let n = self.read_count()?;
        let mut entries = BTreeMap::new();
        for _ in 0..n {
            let k = self.input.read_utf()?;
            let v = self.input.read_utf()?;
            entries.insert(k, v);
        }
        *obj.borrow_mut() = Object::Properties(Properties { entries, defaults });
        Ok(obj)
    }

    fn read_primitive_array(&mut self, code: u8, n: usize) -> Result<PrimitiveArray> {
        macro_rules! read_be {
            ($input:expr, $ty:ty, $variant:ident) => {{
                const SIZE: usize = std::mem::size_of::<$ty>();
                let len = n
                    .checked_mul(SIZE)
                    .ok_or(Error::MaxCollectionSizeExceeded(n))?;
                let bytes = $input.read_vec(len)?;
                PrimitiveArray::$variant(
                    bytes
                        .chunks_exact(SIZE)
                        .map(|c| {
                            let mut b = [0u8; SIZE];
                            b.copy_from_slice(c);
                            <$ty>::from_be_bytes(b)
                        })
                        .collect(),
                )
            }};
        }

        Ok(match code {
            type_code::BYTE_ARR => {
                PrimitiveArray::Byte(self.input.read_vec(n)?.into_iter().map(|b| b as i8).collect())
            }
            type_code::SHORT_ARR => read_be!(self.input, i16, Short),
            type_code::INT_ARR => read_be!(self.input, i32, Int),
            type_code::LONG_ARR => read_be!(self.input, i64, Long),
            type_code::FLOAT_ARR => read_be!(self.input, f32, Float),
            type_code::DOUBLE_ARR => read_be!(self.input, f64, Double),
            type_code::CHAR_ARR => read_be!(self.input, u16, Char),
            type_code::BOOLEAN_ARR => PrimitiveArray::Boolean(
                self.input
                    .read_vec(n)?
                    .into_iter()
                    .map(|b| match b {
                        0 => Ok(false),
                        1 => Ok(true),
                        other => Err(Error::format(format!("invalid boolean byte 0x{other:02x}"))),
                    })
                    .collect::<Result<_>>()?,
            ),
            other => return Err(Error::InvalidTypeCode(other)),
        })
    }
}

impl<I: DataInput> ObjectInput for Decoder<I> {
    fn read_byte(&mut self) -> Result<i8> {
        self.input.read_byte()
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.input.read_bool()
    }

    fn read_short(&mut self) -> Result<i16> {
        self.input.read_short()
    }

    fn read_char(&mut self) -> Result<u16> {
        self.input.read_char()
    }

    fn read_int(&mut self) -> Result<i32> {
        self.input.read_int()
    }

    fn read_long(&mut self) -> Result<i64> {
        self.input.read_long()
    }

    fn read_float(&mut self) -> Result<f32> {
        self.input.read_float()
    }

    fn read_double(&mut self) -> Result<f64> {
        self.input.read_double()
    }

    fn read_utf(&mut self) -> Result<String> {
        self.input.read_utf()
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        self.input.read_exact(buf)
    }

    fn read_object(&mut self) -> Result<Value> {
        self.read_value()
    }

    fn default_read_fields(&mut self) -> Result<()> {
        let frame = self.contexts.current()?;
        frame.take_default()?;
        let obj = frame.object.clone();
        let desc = frame.descriptor.clone();
        let schema = &desc.levels()[frame.level].schema;
        self.read_fields(&obj, schema)
    }

    fn read_named_fields(&mut self) -> Result<NamedFields> {
        let frame = self.contexts.current()?;
        frame.take_default()?;
        let desc = frame.descriptor.clone();
        let schema = &desc.levels()[frame.level].schema;
        let mut fields = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let value = self.read_field(field.kind)?;
            fields.push((field.name.clone(), value));
        }
        Ok(NamedFields {
            type_name: desc.name_arc(),
            fields,
        })
    }
}

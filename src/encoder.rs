// ABOUTME: Object-graph encoder: classification, handle tracking, container fast paths and field levels.
// ABOUTME: Custom hooks drive it through the `ObjectOutput` trait, reentrantly.

use crate::config::MarshallerConfig;
use crate::context::{ContextStack, Frame};
use crate::descriptor::{FieldSchema, Strategy, TypeDescriptor};
use crate::error::{Error, Result};
use crate::fallback::{FallbackMarshaller, JsonFallback};
use crate::handles::HandleTable;
use crate::io::DataOutput;
use crate::registry::TypeResolver;
use crate::types::{type_code, BuiltinType, FieldKind};
use crate::value::{Object, ObjectRef, PrimitiveArray, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, trace};

/// The sink handed to custom write hooks.
///
/// Besides raw primitive writes, a hook can write whole values (which go
/// through handle tracking like any other reference) and drive the fields
/// of the level it was invoked for: either by default, or by staging named
/// fields and committing them.
pub trait ObjectOutput {
    fn write_byte(&mut self, v: i8) -> Result<()>;
    fn write_bool(&mut self, v: bool) -> Result<()>;
    fn write_short(&mut self, v: i16) -> Result<()>;
    fn write_char(&mut self, v: u16) -> Result<()>;
    fn write_int(&mut self, v: i32) -> Result<()>;
    fn write_long(&mut self, v: i64) -> Result<()>;
    fn write_float(&mut self, v: f32) -> Result<()>;
    fn write_double(&mut self, v: f64) -> Result<()>;
    fn write_utf(&mut self, s: &str) -> Result<()>;
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    /// Write a complete value, tagged, with handle tracking.
    fn write_object(&mut self, value: &Value) -> Result<()>;

    /// Write the current level's fields in ordinal order.
    fn default_write_fields(&mut self) -> Result<()>;

    /// Open the named-field staging buffer for the current level.
    fn begin_named_fields(&mut self) -> Result<()>;

    /// Stage one field by name.
    fn set_named_field(&mut self, name: &str, value: Value) -> Result<()>;

    /// Write every staged field in ordinal order.
    fn commit_named_fields(&mut self) -> Result<()>;
}

/// An object-graph encoder writing to a primitive sink.
///
/// One encoder serves one thread; each [`write_root`](Self::write_root) is
/// an independent graph with its own handle numbering.
pub struct Encoder<O: DataOutput> {
    out: O,
    resolver: Arc<dyn TypeResolver>,
    fallback: Arc<dyn FallbackMarshaller>,
    config: MarshallerConfig,
    handles: HandleTable,
    contexts: ContextStack,
    depth: usize,
}

impl<O: DataOutput> Encoder<O> {
    /// Create an encoder with the default configuration and fallback.
    pub fn new(out: O, resolver: Arc<dyn TypeResolver>) -> Self {
        Self::with_config(out, resolver, MarshallerConfig::default())
    }

    /// Create an encoder with custom configuration.
    pub fn with_config(out: O, resolver: Arc<dyn TypeResolver>, config: MarshallerConfig) -> Self {
        Self {
            out,
            resolver,
            fallback: Arc::new(JsonFallback),
            handles: HandleTable::with_capacity(config.initial_handle_capacity),
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

    /// Consume the encoder and return the underlying sink.
    pub fn into_inner(self) -> O {
        self.out
    }

    /// Get a reference to the underlying sink.
    pub fn get_ref(&self) -> &O {
        &self.out
    }

    /// Objects assigned handles by the last top-level write, in handle order.
    #[must_use]
    pub fn handled_objects(&self) -> &[ObjectRef] {
        self.handles.objects()
    }

    /// Clear the handle table and any hook context.
    pub fn reset(&mut self) {
        self.handles.clear();
        self.contexts.clear();
        self.depth = 0;
    }

    /// Encode `value` as an independent graph.
    pub fn write_root(&mut self, value: &Value) -> Result<()> {
        self.reset();
        let result = self.write_value(value);
        self.contexts.clear();
        self.depth = 0;
        result
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        let Some(key) = value.type_key() else {
            return self.out.write_u8(type_code::NULL);
        };
        let mut desc = self.resolver.classify(&key)?;
        if desc.is_excluded() {
            trace!(type_name = %desc.name(), "excluded type written as null");
            return self.out.write_u8(type_code::NULL);
        }

        let original = value.as_object();
        if let Some(handle) = original.and_then(|obj| self.handles.lookup(obj)) {
            trace!(handle, "back-reference");
            self.out.write_u8(type_code::HANDLE)?;
            return self.out.write_int(handle);
        }

        let mut value = Cow::Borrowed(value);
        if let Some(replace) = desc.replace_fn() {
            let replaced = replace(&value);
            if replaced.is_null() {
                trace!(type_name = %desc.name(), "replaced with null");
                return self.out.write_u8(type_code::NULL);
            }
            if !replaced.same_identity(&value) {
                trace!(type_name = %desc.name(), "replaced with another value");
                if let Some(key) = replaced.type_key() {
                    desc = self.resolver.classify(&key)?;
                }
                if desc.is_excluded() {
                    return self.out.write_u8(type_code::NULL);
                }
                if let Some(handle) = replaced.as_object().and_then(|obj| self.handles.lookup(obj)) {
                    trace!(handle, "back-reference to replacement");
                    self.out.write_u8(type_code::HANDLE)?;
                    return self.out.write_int(handle);
                }
                value = Cow::Owned(replaced);
            }
        }

        if self.config.require_serializable && !desc.is_serializable() {
            return Err(Error::NotSerializable(desc.name().to_owned()));
        }

        match desc.strategy() {
            Strategy::Value(ty) => self.write_plain(*ty, &value),
            Strategy::Enum(constants) => {
                let Value::Enum(e) = &*value else {
                    return Err(mismatch(&desc, &value));
                };
                if e.ordinal < 0 || e.ordinal as usize >= constants.len() {
                    return Err(Error::Classification {
                        type_name: desc.name().to_owned(),
                        reason: format!("ordinal {} out of range", e.ordinal),
                    });
                }
                self.out.write_u8(type_code::ENUM)?;
                self.out.write_int(desc.type_id())?;
                self.out.write_int(e.ordinal)
            }
            Strategy::Excluded => self.out.write_u8(type_code::NULL),
            Strategy::Fallback => {
                let obj = value.as_object().ok_or_else(|| mismatch(&desc, &value))?;
                self.write_fallback(obj, &desc)
            }
            Strategy::Container(_) | Strategy::Fields(_) | Strategy::SelfSerializing(_) => {
                let obj = value.as_object().ok_or_else(|| mismatch(&desc, &value))?;
                // The original reference owns the handle, even when replaced.
                let identity = original.unwrap_or(obj);
                self.handles.assign(identity.clone());
                self.enter()?;
                let result = self.write_described(obj, &desc);
                self.depth -= 1;
                result
            }
        }
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_depth {
            return Err(Error::MaxDepthExceeded);
        }
        self.depth += 1;
        Ok(())
    }

    fn write_plain(&mut self, ty: BuiltinType, value: &Value) -> Result<()> {
        self.out.write_u8(ty.type_code())?;
        match value {
            Value::Byte(v) => self.out.write_byte(*v),
            Value::Short(v) => self.out.write_short(*v),
            Value::Int(v) => self.out.write_int(*v),
            Value::Long(v) => self.out.write_long(*v),
            Value::Float(v) => self.out.write_float(*v),
            Value::Double(v) => self.out.write_double(*v),
            Value::Char(v) => self.out.write_char(*v),
            Value::Bool(v) => self.out.write_bool(*v),
            Value::String(s) | Value::Class(s) => self.out.write_utf(s),
            Value::Uuid(id) => {
                self.out.write_long(id.most)?;
                self.out.write_long(id.least)
            }
            Value::Date(millis) => self.out.write_long(*millis),
            Value::Null | Value::Enum(_) | Value::Object(_) => Err(Error::Classification {
                type_name: ty.name().to_owned(),
                reason: "value does not match its descriptor".into(),
            }),
        }
    }

    #[inline(never)]
    fn write_fallback(&mut self, obj: &ObjectRef, desc: &TypeDescriptor) -> Result<()> {
        debug!(type_name = %desc.name(), "delegating to fallback marshaller");
        self.out.write_u8(type_code::JDK)?;
        let fallback = self.fallback.clone();
        let borrowed = obj.borrow();
        fallback.marshal(&borrowed, &mut self.out).map_err(|e| {
            Error::fallback(
                format!("failed to serialize {} with the fallback marshaller", desc.name()),
                e,
            )
        })
    }

    #[inline(never)]
    fn write_described(&mut self, obj: &ObjectRef, desc: &Arc<TypeDescriptor>) -> Result<()> {
        self.out.write_u8(desc.type_code())?;
        match desc.strategy() {
            Strategy::Container(ty) => self.write_container(obj, *ty),
            Strategy::Fields(levels) => {
                self.out.write_int(desc.type_id())?;
                for (index, level) in levels.iter().enumerate() {
                    match &level.write_hook {
                        None => self.write_fields(obj, &level.schema)?,
                        Some(hook) => {
                            self.contexts.push(Frame::new(obj.clone(), desc.clone(), index));
                            let result = hook(obj, self);
                            let frame = self.contexts.pop();
                            result.map_err(|e| {
                                debug!(type_name = %desc.name(), "write hook failed");
                                Error::hook(desc.name(), e)
                            })?;
                            if frame.is_some_and(|f| f.is_staging()) {
                                return Err(Error::misuse(format!(
                                    "named fields of {} were begun but never committed",
                                    desc.name()
                                )));
                            }
                        }
                    }
                }
                Ok(())
            }
            Strategy::SelfSerializing(hooks) => {
                self.out.write_int(desc.type_id())?;
                self.contexts.push_barrier();
                let result = (hooks.write)(obj, self);
                self.contexts.pop();
                result.map_err(|e| Error::hook(desc.name(), e))
            }
            _ => Err(mismatch(desc, &Value::Object(obj.clone()))),
        }
    }

    #[inline(never)]
    fn write_fields(&mut self, obj: &ObjectRef, schema: &FieldSchema) -> Result<()> {
        let borrowed = obj.borrow();
        let inst = borrowed.as_instance().ok_or_else(|| Error::Classification {
            type_name: borrowed.type_name().to_owned(),
            reason: "object has no declared fields".into(),
        })?;
        for field in schema.fields() {
            self.write_field(&field.name, field.kind, field.get(inst))?;
        }
        Ok(())
    }

    /// Primitive kinds are written untagged; everything else is a full value.
    fn write_field(&mut self, name: &str, kind: FieldKind, value: &Value) -> Result<()> {
        match (kind, value) {
            (FieldKind::Byte, Value::Byte(v)) => self.out.write_byte(*v),
            (FieldKind::Short, Value::Short(v)) => self.out.write_short(*v),
            (FieldKind::Int, Value::Int(v)) => self.out.write_int(*v),
            (FieldKind::Long, Value::Long(v)) => self.out.write_long(*v),
            (FieldKind::Float, Value::Float(v)) => self.out.write_float(*v),
            (FieldKind::Double, Value::Double(v)) => self.out.write_double(*v),
            (FieldKind::Char, Value::Char(v)) => self.out.write_char(*v),
            (FieldKind::Boolean, Value::Bool(v)) => self.out.write_bool(*v),
            (FieldKind::Other, v) => self.write_value(v),
            (expected, _) => Err(Error::FieldKind {
                field: name.to_owned(),
                expected,
            }),
        }
    }

    #[inline(never)]
    fn write_container(&mut self, obj: &ObjectRef, ty: BuiltinType) -> Result<()> {
        let borrowed = obj.borrow();
        match &*borrowed {
            Object::Array(items) | Object::List(items) => self.write_sequence(items.iter(), items.len()),
            Object::LinkedList(items) => self.write_sequence(items.iter(), items.len()),
            Object::Primitives(arr) => match arr {
                PrimitiveArray::Byte(v) => self.out.write_byte_array(v),
                PrimitiveArray::Short(v) => self.out.write_short_array(v),
                PrimitiveArray::Int(v) => self.out.write_int_array(v),
                PrimitiveArray::Long(v) => self.out.write_long_array(v),
                PrimitiveArray::Float(v) => self.out.write_float_array(v),
                PrimitiveArray::Double(v) => self.out.write_double_array(v),
                PrimitiveArray::Char(v) => self.out.write_char_array(v),
                PrimitiveArray::Boolean(v) => self.out.write_bool_array(v),
            },
            Object::HashMap(map) => {
                self.out.write_len(map.entries.len())?;
                self.out.write_float(map.load_factor)?;
                for (k, v) in &map.entries {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
                Ok(())
            }
            Object::HashSet(set) => {
                self.out.write_len(set.elements.len())?;
                self.out.write_float(set.load_factor)?;
                for k in &set.elements {
                    self.write_value(k)?;
                }
                Ok(())
            }
            Object::LinkedHashMap(map) => {
                self.out.write_len(map.entries.len())?;
                self.out.write_float(map.load_factor)?;
                self.out.write_bool(map.access_order)?;
                for (k, v) in &map.entries {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
                Ok(())
            }
            Object::LinkedHashSet(set) => {
                self.out.write_len(set.elements.len())?;
                self.out.write_float(set.load_factor)?;
                self.out.write_bool(false)?;
                for k in &set.elements {
                    self.write_value(k)?;
                }
                Ok(())
            }
            Object::Properties(props) => {
                match &props.defaults {
                    Some(defaults) => {
                        self.out.write_bool(true)?;
                        self.write_value(&Value::Object(defaults.clone()))?;
                    }
                    None => self.out.write_bool(false)?,
                }
                self.out.write_len(props.entries.len())?;
                for (k, v) in &props.entries {
                    self.out.write_utf(k)?;
                    self.out.write_utf(v)?;
                }
                Ok(())
            }
            Object::Throwable(_) | Object::Instance(_) => Err(Error::Classification {
                type_name: ty.name().to_owned(),
                reason: "object is not a container".into(),
            }),
        }
    }

    fn write_sequence<'v>(
        &mut self,
        items: impl Iterator<Item = &'v Value>,
        len: usize,
    ) -> Result<()> {
        self.out.write_len(len)?;
        for item in items {
            self.write_value(item)?;
        }
        Ok(())
    }
}

fn mismatch(desc: &TypeDescriptor, value: &Value) -> Error {
    Error::Classification {
        type_name: desc.name().to_owned(),
        reason: format!("value {value:?} does not match its descriptor"),
    }
}

impl<O: DataOutput> ObjectOutput for Encoder<O> {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.out.write_byte(v)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.out.write_bool(v)
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.out.write_short(v)
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.out.write_char(v)
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.out.write_int(v)
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.out.write_long(v)
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.out.write_float(v)
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.out.write_double(v)
    }

    fn write_utf(&mut self, s: &str) -> Result<()> {
        self.out.write_utf(s)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_raw(bytes)
    }

    fn write_object(&mut self, value: &Value) -> Result<()> {
        self.write_value(value)
    }

    fn default_write_fields(&mut self) -> Result<()> {
        let frame = self.contexts.current()?;
        frame.take_default()?;
        let obj = frame.object.clone();
        let desc = frame.descriptor.clone();
        let schema = &desc.levels()[frame.level].schema;
        self.write_fields(&obj, schema)
    }

    fn begin_named_fields(&mut self) -> Result<()> {
        self.contexts.current()?.begin_named()
    }

    fn set_named_field(&mut self, name: &str, value: Value) -> Result<()> {
        self.contexts.current()?.set_named(name, value)
    }

    fn commit_named_fields(&mut self) -> Result<()> {
        let frame = self.contexts.current()?;
        let values = frame.commit_named()?;
        let desc = frame.descriptor.clone();
        let schema = &desc.levels()[frame.level].schema;
        for (field, value) in schema.fields().iter().zip(&values) {
            self.write_field(&field.name, field.kind, value)?;
        }
        Ok(())
    }
}

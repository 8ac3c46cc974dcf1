// ABOUTME: Fallback marshaller used for objects the optimized path declines (throwables, fallback-only classes).
// ABOUTME: The default implementation writes a length-prefixed JSON document per object.

use crate::descriptor::TypeKey;
use crate::error::BoxError;
use crate::io::{DataInput, DataOutput};
use crate::registry::TypeResolver;
use crate::value::{Object, Throwable, Uuid, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A fully general, less compact serializer for single objects.
///
/// Errors are reported as boxed errors; the encoder and decoder re-describe
/// them with a codec diagnostic and keep them as the cause.
pub trait FallbackMarshaller: Send + Sync {
    /// Write `obj` to the sink.
    fn marshal(&self, obj: &Object, out: &mut dyn DataOutput) -> Result<(), BoxError>;

    /// Read one object written by [`marshal`](Self::marshal).
    fn unmarshal(
        &self,
        input: &mut dyn DataInput,
        resolver: &dyn TypeResolver,
    ) -> Result<Object, BoxError>;
}

/// JSON-backed fallback.
///
/// Handles throwables (with their cause chain) and instances whose fields
/// hold no object references.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFallback;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Payload {
    Throwable(Throwable),
    Instance {
        type_name: String,
        fields: Vec<(String, Scalar)>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
enum Scalar {
    Null,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u16),
    Bool(bool),
    String(String),
    Uuid(Uuid),
    Date(i64),
}

impl Scalar {
    fn from_value(field: &str, value: &Value) -> Result<Self, BoxError> {
        Ok(match value {
            Value::Null => Scalar::Null,
            Value::Byte(v) => Scalar::Byte(*v),
            Value::Short(v) => Scalar::Short(*v),
            Value::Int(v) => Scalar::Int(*v),
            Value::Long(v) => Scalar::Long(*v),
            Value::Float(v) => Scalar::Float(*v),
            Value::Double(v) => Scalar::Double(*v),
            Value::Char(v) => Scalar::Char(*v),
            Value::Bool(v) => Scalar::Bool(*v),
            Value::String(v) => Scalar::String(v.clone()),
            Value::Uuid(v) => Scalar::Uuid(*v),
            Value::Date(v) => Scalar::Date(*v),
            Value::Enum(_) | Value::Class(_) | Value::Object(_) => {
                return Err(format!("field `{field}` holds a reference the fallback cannot write").into())
            }
        })
    }

    fn into_value(self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Byte(v) => Value::Byte(v),
            Scalar::Short(v) => Value::Short(v),
            Scalar::Int(v) => Value::Int(v),
            Scalar::Long(v) => Value::Long(v),
            Scalar::Float(v) => Value::Float(v),
            Scalar::Double(v) => Value::Double(v),
            Scalar::Char(v) => Value::Char(v),
            Scalar::Bool(v) => Value::Bool(v),
            Scalar::String(v) => Value::String(v),
            Scalar::Uuid(v) => Value::Uuid(v),
            Scalar::Date(v) => Value::Date(v),
        }
    }
}

impl FallbackMarshaller for JsonFallback {
    fn marshal(&self, obj: &Object, out: &mut dyn DataOutput) -> Result<(), BoxError> {
        let payload = match obj {
            Object::Throwable(t) => Payload::Throwable(t.clone()),
            Object::Instance(inst) => {
                let fields = inst
                    .layout()
                    .field_names()
                    .map(|name| -> Result<(String, Scalar), BoxError> {
                        let value = inst.get(name)?;
                        Ok((name.to_owned(), Scalar::from_value(name, value)?))
                    })
                    .collect::<Result<Vec<_>, BoxError>>()?;
                Payload::Instance {
                    type_name: inst.type_name().to_owned(),
                    fields,
                }
            }
            other => {
                return Err(format!("{} is not supported by the JSON fallback", other.type_name()).into())
            }
        };
        let json = serde_json::to_vec(&payload)?;
        out.write_len(json.len())?;
        out.write_raw(&json)?;
        Ok(())
    }

    fn unmarshal(
        &self,
        input: &mut dyn DataInput,
        resolver: &dyn TypeResolver,
    ) -> Result<Object, BoxError> {
        let len = input.read_len()?;
        let json = input.read_vec(len)?;
        match serde_json::from_slice::<Payload>(&json)? {
            Payload::Throwable(t) => Ok(Object::Throwable(t)),
            Payload::Instance { type_name, fields } => {
                let desc = resolver.classify(&TypeKey::Named(Arc::from(type_name.as_str())))?;
                let mut inst = desc.instantiate()?;
                for (name, scalar) in fields {
                    inst.set(&name, scalar.into_value())?;
                }
                Ok(Object::Instance(inst))
            }
        }
    }
}

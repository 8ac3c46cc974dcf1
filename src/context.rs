// ABOUTME: Scoped hook contexts: the object and level a custom hook is working on, kept on a stack.
// ABOUTME: Also holds the named-field staging buffer used by the put-fields protocol.

use crate::descriptor::{FieldSchema, TypeDescriptor};
use crate::error::{Error, Result};
use crate::value::{ObjectRef, Value};
use std::sync::Arc;

/// Progress of the field protocol within one hook invocation.
#[derive(Debug)]
pub(crate) enum FieldsState {
    /// Neither default fields nor named fields were requested yet
    Untouched,
    /// Named fields are being staged
    Staging(NamedFieldBuffer),
    /// The level's fields have been handled
    Done,
}

/// The object and level a field-level hook is bound to.
#[derive(Debug)]
pub(crate) struct Frame {
    pub object: ObjectRef,
    pub descriptor: Arc<TypeDescriptor>,
    pub level: usize,
    pub state: FieldsState,
}

impl Frame {
    pub fn new(object: ObjectRef, descriptor: Arc<TypeDescriptor>, level: usize) -> Self {
        Self {
            object,
            descriptor,
            level,
            state: FieldsState::Untouched,
        }
    }

    pub fn schema(&self) -> Result<&FieldSchema> {
        self.descriptor
            .levels()
            .get(self.level)
            .map(|level| &level.schema)
            .ok_or_else(|| Error::misuse("hook context has no field level"))
    }

    /// True while named fields are staged but not yet committed.
    pub fn is_staging(&self) -> bool {
        matches!(self.state, FieldsState::Staging(_))
    }

    /// Claim the level's fields for default handling.
    pub fn take_default(&mut self) -> Result<()> {
        match self.state {
            FieldsState::Untouched => {
                self.state = FieldsState::Done;
                Ok(())
            }
            _ => Err(Error::misuse("fields of this level were already handled")),
        }
    }

    /// Open the staging buffer for named fields.
    pub fn begin_named(&mut self) -> Result<()> {
        match self.state {
            FieldsState::Untouched => {
                let len = self.schema()?.len();
                self.state = FieldsState::Staging(NamedFieldBuffer::new(len));
                Ok(())
            }
            FieldsState::Staging(_) => Err(Error::misuse("named-field buffer acquired twice")),
            FieldsState::Done => Err(Error::misuse("fields of this level were already handled")),
        }
    }

    /// Stage one named field, checked against the level's name index.
    pub fn set_named(&mut self, name: &str, value: Value) -> Result<()> {
        let Some((ordinal, kind)) = self.schema()?.lookup(name) else {
            return Err(Error::misuse(format!(
                "{} declares no field `{name}` at this level",
                self.descriptor.name()
            )));
        };
        if !kind.accepts(&value) {
            return Err(Error::FieldKind {
                field: name.to_owned(),
                expected: kind,
            });
        }
        match &mut self.state {
            FieldsState::Staging(buf) => {
                buf.values[ordinal] = Some(value);
                Ok(())
            }
            _ => Err(Error::misuse("named field set without an open buffer")),
        }
    }

    /// Close the staging buffer, returning values in ordinal order.
    pub fn commit_named(&mut self) -> Result<Vec<Value>> {
        let FieldsState::Staging(buf) = std::mem::replace(&mut self.state, FieldsState::Done) else {
            return Err(Error::misuse("named fields committed without an open buffer"));
        };
        let schema = self.schema()?;
        buf.values
            .into_iter()
            .zip(schema.fields())
            .map(|(value, field)| {
                value.ok_or_else(|| {
                    Error::misuse(format!("named field `{}` was never set", field.name))
                })
            })
            .collect()
    }
}

/// Values staged by name, stored by ordinal.
#[derive(Debug)]
pub(crate) struct NamedFieldBuffer {
    values: Vec<Option<Value>>,
}

impl NamedFieldBuffer {
    fn new(len: usize) -> Self {
        Self {
            values: vec![None; len],
        }
    }
}

/// Stack of active hook contexts.
///
/// Field-level hooks push a frame; self-serializing hooks push a barrier so
/// that field operations inside them are rejected rather than applied to an
/// enclosing object.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: Vec<Option<Frame>>,
}

impl ContextStack {
    pub fn push(&mut self, frame: Frame) {
        self.frames.push(Some(frame));
    }

    pub fn push_barrier(&mut self) {
        self.frames.push(None);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop().flatten()
    }

    /// The innermost frame, if a field-level hook is executing.
    pub fn current(&mut self) -> Result<&mut Frame> {
        match self.frames.last_mut() {
            Some(Some(frame)) => Ok(frame),
            _ => Err(Error::misuse("field operation outside of a custom field hook")),
        }
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ClassBuilder;
    use crate::types::FieldKind;
    use crate::value::Instance;

    fn frame() -> Frame {
        let desc = Arc::new(
            ClassBuilder::new("demo.Pair")
                .field("a", FieldKind::Int)
                .field("b", FieldKind::Int)
                .build(1)
                .unwrap(),
        );
        let layout = desc.layout().unwrap().clone();
        Frame::new(Instance::new(layout).into_ref(), desc, 0)
    }

    #[test]
    fn test_commit_orders_by_ordinal() {
        let mut f = frame();
        f.begin_named().unwrap();
        f.set_named("b", Value::Int(2)).unwrap();
        f.set_named("a", Value::Int(1)).unwrap();
        assert_eq!(f.commit_named().unwrap(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_misuse_cases() {
        let mut f = frame();
        assert!(f.set_named("a", Value::Int(1)).is_err());
        assert!(f.commit_named().is_err());

        let mut f = frame();
        f.begin_named().unwrap();
        assert!(matches!(f.begin_named(), Err(Error::ProtocolMisuse(_))));
        assert!(matches!(
            f.set_named("zzz", Value::Int(1)),
            Err(Error::ProtocolMisuse(_))
        ));
        assert!(matches!(
            f.set_named("a", Value::Long(1)),
            Err(Error::FieldKind { .. })
        ));
        f.set_named("a", Value::Int(1)).unwrap();
        assert!(matches!(f.commit_named(), Err(Error::ProtocolMisuse(_))));
    }

    #[test]
    fn test_staging_until_commit() {
        let mut f = frame();
        assert!(!f.is_staging());
        f.begin_named().unwrap();
        assert!(f.is_staging());
        f.set_named("a", Value::Int(1)).unwrap();
        f.set_named("b", Value::Int(2)).unwrap();
        f.commit_named().unwrap();
        assert!(!f.is_staging());
    }

    #[test]
    fn test_default_then_named_is_misuse() {
        let mut f = frame();
        f.take_default().unwrap();
        assert!(f.begin_named().is_err());
        assert!(f.take_default().is_err());
    }

    #[test]
    fn test_barrier_hides_outer_frame() {
        let mut stack = ContextStack::default();
        assert!(stack.current().is_err());
        stack.push(frame());
        assert!(stack.current().is_ok());
        stack.push_barrier();
        assert!(stack.current().is_err());
        assert!(stack.pop().is_none());
        assert!(stack.current().is_ok());
        assert_eq!(stack.depth(), 1);
        stack.clear();
        assert_eq!(stack.depth(), 0);
    }
}

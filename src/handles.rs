// ABOUTME: Identity-keyed handle table assigning sequential handles in first-encounter order.
// ABOUTME: Holds a clone of every registered object so identities stay unique for the table's lifetime.

use crate::value::ObjectRef;
use std::collections::HashMap;

/// Maps object identities to handles for one top-level write.
#[derive(Debug, Default)]
pub struct HandleTable {
    handles: HashMap<usize, i32>,
    objects: Vec<ObjectRef>,
}

impl HandleTable {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: HashMap::with_capacity(capacity),
            objects: Vec::with_capacity(capacity),
        }
    }

    /// The handle previously assigned to `obj`, if any.
    #[inline]
    #[must_use]
    pub fn lookup(&self, obj: &ObjectRef) -> Option<i32> {
        self.handles.get(&obj.addr()).copied()
    }

    /// Assign the next handle to `obj`.
    ///
    /// The caller must have checked [`lookup`](Self::lookup) first.
    pub fn assign(&mut self, obj: ObjectRef) -> i32 {
        let handle = self.objects.len() as i32;
        self.handles.insert(obj.addr(), handle);
        self.objects.push(obj);
        handle
    }

    /// Forget every assignment; numbering restarts at zero.
    pub fn clear(&mut self) {
        self.handles.clear();
        self.objects.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Registered objects in handle order.
    #[must_use]
    pub fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn test_sequential_handles() {
        let mut table = HandleTable::default();
        let a = ObjectRef::new(Object::List(vec![]));
        let b = ObjectRef::new(Object::List(vec![]));

        assert_eq!(table.lookup(&a), None);
        assert_eq!(table.assign(a.clone()), 0);
        assert_eq!(table.assign(b.clone()), 1);
        assert_eq!(table.lookup(&a), Some(0));
        assert_eq!(table.lookup(&b.clone()), Some(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let mut table = HandleTable::with_capacity(4);
        let a = ObjectRef::new(Object::List(vec![]));
        table.assign(a.clone());
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.lookup(&a), None);
        assert_eq!(table.assign(a), 0);
    }
}

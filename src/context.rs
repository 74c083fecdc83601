//! Build-time context: the document an aggregate is currently packing from or parsing
//! into, plus a borrowed link to the enclosing aggregate's context.
//!
//! A `Context` lives on the stack of one aggregate call. Children see it read-only
//! (lookups) and write to it only through the deliver callback their parent hands
//! them. The public document is moved out with [`Context::into_document`], so the
//! parent link never ends up in a result.

use crate::error::TranscodeError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct Context<'a> {
    document: RefCell<Value>,
    parent: Option<&'a Context<'a>>,
}

impl<'a> Context<'a> {
    pub fn new(document: Value, parent: Option<&'a Context<'a>>) -> Self {
        Context {
            document: RefCell::new(document),
            parent,
        }
    }

    pub(crate) fn named(parent: Option<&'a Context<'a>>) -> Self {
        Context::new(Value::Map(HashMap::new()), parent)
    }

    pub(crate) fn positional(parent: Option<&'a Context<'a>>) -> Self {
        Context::new(Value::List(Vec::new()), parent)
    }

    /// The enclosing aggregate's context, if any.
    pub fn parent(&self) -> Option<&'a Context<'a>> {
        self.parent
    }

    /// Value of `name` in this document (keyed documents only).
    pub fn get(&self, name: &str) -> Option<Value> {
        match &*self.document.borrow() {
            Value::Map(m) => m.get(name).cloned(),
            _ => None,
        }
    }

    /// Element `index` of this document (list documents only).
    pub fn at(&self, index: usize) -> Option<Value> {
        match &*self.document.borrow() {
            Value::List(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    /// Like [`Context::get`] but fails with `MissingField`.
    pub fn require(&self, name: &str) -> Result<Value, TranscodeError> {
        self.get(name).ok_or_else(|| TranscodeError::MissingField {
            field: name.to_string(),
            available: self.keys(),
        })
    }

    /// Walks up the chain and returns the first value named `name`.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(v) = ctx.get(name) {
                return Some(v);
            }
            current = ctx.parent;
        }
        None
    }

    /// The context `levels` steps up the chain (0 is `self`).
    pub fn ancestor(&self, levels: usize) -> Option<&Context<'a>> {
        let mut current = self;
        for _ in 0..levels {
            current = current.parent?;
        }
        Some(current)
    }

    /// Sorted keys of a keyed document; empty for lists.
    pub fn keys(&self) -> Vec<String> {
        match &*self.document.borrow() {
            Value::Map(m) => {
                let mut keys: Vec<String> = m.keys().cloned().collect();
                keys.sort();
                keys
            }
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match &*self.document.borrow() {
            Value::Map(m) => m.len(),
            Value::List(items) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_named(&self) -> bool {
        matches!(&*self.document.borrow(), Value::Map(_))
    }

    pub fn is_positional(&self) -> bool {
        matches!(&*self.document.borrow(), Value::List(_))
    }

    /// A copy of the document as it stands.
    pub fn snapshot(&self) -> Value {
        self.document.borrow().clone()
    }

    pub(crate) fn set(&self, name: &str, value: Value) -> Result<(), TranscodeError> {
        match &mut *self.document.borrow_mut() {
            Value::Map(m) => {
                m.insert(name.to_string(), value);
                Ok(())
            }
            other => Err(TranscodeError::Configuration(format!(
                "cannot store field {} into a {} document",
                name,
                other.type_name()
            ))),
        }
    }

    pub(crate) fn push(&self, value: Value) -> Result<(), TranscodeError> {
        match &mut *self.document.borrow_mut() {
            Value::List(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(TranscodeError::Configuration(format!(
                "cannot append an element to a {} document",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn into_document(self) -> Value {
        self.document.into_inner()
    }
}

/// Unwraps the active context or fails with a `Configuration` error naming `what`.
pub fn active<'c, 'a>(
    context: Option<&'c Context<'a>>,
    what: &str,
) -> Result<&'c Context<'a>, TranscodeError> {
    context.ok_or_else(|| TranscodeError::Configuration(format!("{} requires an active context", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_up() {
        let root = Context::new(Value::map([("n", Value::Uint(3))]), None);
        let middle = Context::named(Some(&root));
        middle.set("kind", Value::Uint(1)).unwrap();
        let leaf = Context::positional(Some(&middle));
        leaf.push(Value::Uint(9)).unwrap();

        assert_eq!(leaf.lookup("n"), Some(Value::Uint(3)));
        assert_eq!(leaf.lookup("kind"), Some(Value::Uint(1)));
        assert_eq!(leaf.get("kind"), None);
        assert_eq!(leaf.at(0), Some(Value::Uint(9)));
        assert_eq!(leaf.ancestor(2).and_then(|c| c.get("n")), Some(Value::Uint(3)));
        assert!(leaf.ancestor(3).is_none());
    }

    #[test]
    fn test_shape_mismatch() {
        let ctx = Context::positional(None);
        assert!(matches!(ctx.set("a", Value::Null), Err(TranscodeError::Configuration(_))));
        let ctx = Context::named(None);
        assert!(matches!(ctx.push(Value::Null), Err(TranscodeError::Configuration(_))));
    }

    #[test]
    fn test_require_lists_available() {
        let ctx = Context::new(Value::map([("b", Value::Null), ("a", Value::Null)]), None);
        match ctx.require("c") {
            Err(TranscodeError::MissingField { field, available }) => {
                assert_eq!(field, "c");
                assert_eq!(available, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

//! Variables: shared, mutable (or read-only) cells holding values.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Error;
use crate::value::Value;

/// A named slot holding a value.
///
/// Cloning a `Variable` clones the handle, not the cell: closures capture
/// variables this way, so a closure and its defining scope observe each
/// other's writes.
#[derive(Clone, Debug)]
pub struct Variable(Repr);

#[derive(Clone, Debug)]
enum Repr {
    /// An ordinary mutable cell.
    Cell(Arc<RwLock<Value>>),
    /// A cell that rejects writes, used for builtin values and functions.
    ReadOnly(Arc<Value>),
    /// A proxy for an environment variable of the process.
    Env(String),
    /// A proxy for one element of a container held by another variable.
    Element(Arc<ElementVar>),
}

#[derive(Debug)]
struct ElementVar {
    base: Variable,
    indices: Vec<Value>,
}

impl Variable {
    /// Returns a new mutable variable holding `value`.
    pub fn new(value: Value) -> Self {
        Self(Repr::Cell(Arc::new(RwLock::new(value))))
    }

    /// Returns a read-only variable holding `value`.
    pub fn read_only(value: Value) -> Self {
        Self(Repr::ReadOnly(Arc::new(value)))
    }

    /// Returns a variable backed by the environment variable `name`.
    pub fn env(name: impl Into<String>) -> Self {
        Self(Repr::Env(name.into()))
    }

    /// Returns a variable addressing `base[indices[0]][indices[1]]...`.
    /// Reads index into the current base value; writes rebuild the
    /// containers along the path and store the result back into `base`.
    pub(crate) fn element(base: Variable, indices: Vec<Value>) -> Self {
        Self(Repr::Element(Arc::new(ElementVar { base, indices })))
    }

    /// Reads the current value.
    pub fn get(&self) -> Result<Value, Error> {
        match &self.0 {
            Repr::Cell(cell) => Ok(read_lock(cell).clone()),
            Repr::ReadOnly(v) => Ok((**v).clone()),
            Repr::Env(name) => Ok(Value::Str(std::env::var(name).unwrap_or_default())),
            Repr::Element(el) => {
                let mut cur = el.base.get()?;
                for index in &el.indices {
                    cur = cur.index(index)?;
                }
                Ok(cur)
            }
        }
    }

    /// Replaces the value.
    pub fn set(&self, value: Value) -> Result<(), Error> {
        match &self.0 {
            Repr::Cell(cell) => {
                *write_lock(cell) = value;
                Ok(())
            }
            Repr::ReadOnly(_) => Err(Error::SetReadOnly),
            Repr::Env(name) => {
                let text = value
                    .to_text()
                    .ok_or_else(|| crate::error::BadValue::new(
                        "environment variable value",
                        "string",
                        value.kind(),
                    ))?;
                std::env::set_var(name, text);
                Ok(())
            }
            Repr::Element(el) => {
                let cur = el.base.get()?;
                let new = assoc_path(&cur, &el.indices, value)?;
                el.base.set(new)
            }
        }
    }

    /// Whether writes are rejected.
    pub fn is_read_only(&self) -> bool {
        matches!(self.0, Repr::ReadOnly(_))
    }

    /// Whether two handles address the same underlying cell.
    pub fn cell_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Cell(a), Repr::Cell(b)) => Arc::ptr_eq(a, b),
            (Repr::ReadOnly(a), Repr::ReadOnly(b)) => Arc::ptr_eq(a, b),
            (Repr::Env(a), Repr::Env(b)) => a == b,
            (Repr::Element(a), Repr::Element(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn assoc_path(cur: &Value, indices: &[Value], value: Value) -> Result<Value, Error> {
    match indices.split_first() {
        None => Ok(value),
        Some((index, rest)) => {
            let inner = cur.index(index)?;
            let new_inner = assoc_path(&inner, rest, value)?;
            cur.assoc(index, new_inner)
        }
    }
}

fn read_lock(cell: &RwLock<Value>) -> RwLockReadGuard<'_, Value> {
    cell.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock(cell: &RwLock<Value>) -> RwLockWriteGuard<'_, Value> {
    cell.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn clones_share_the_cell() {
        let a = Variable::new(Value::Int(1));
        let b = a.clone();
        b.set(Value::Int(2)).unwrap();
        assert_eq!(a.get().unwrap(), Value::Int(2));
        assert!(a.cell_eq(&b));
    }

    #[test]
    fn distinct_variables_do_not_share() {
        let a = Variable::new(Value::Int(1));
        let b = Variable::new(Value::Int(1));
        assert!(!a.cell_eq(&b));
    }

    #[test]
    fn read_only_rejects_writes() {
        let v = Variable::read_only(Value::Bool(true));
        assert!(matches!(v.set(Value::Nil), Err(Error::SetReadOnly)));
        assert_eq!(v.get().unwrap(), Value::Bool(true));
    }

    #[test]
    fn element_writes_rebuild_the_path() {
        let inner: Value = [Value::Int(1), Value::Int(2)].into_iter().collect();
        let outer: Value = [inner].into_iter().collect();
        let base = Variable::new(outer);
        let el = Variable::element(base.clone(), vec![Value::Int(0), Value::Int(1)]);

        el.set(Value::Int(9)).unwrap();
        assert_eq!(el.get().unwrap(), Value::Int(9));
        let got = base
            .get()
            .unwrap()
            .index(&Value::Int(0))
            .unwrap()
            .index(&Value::Int(1))
            .unwrap();
        assert_eq!(got, Value::Int(9));
    }
}

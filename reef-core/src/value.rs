//! The dynamic values commands pass around.

use std::fs::File;
use std::sync::Arc;

use crate::commands::Callable;
use crate::error::{BadValue, Error, OutOfRange};
use crate::ns::Ns;

/// A persistent list of values. Updates produce a new list sharing structure
/// with the old one, which is what lets values cross task boundaries without
/// locks.
pub type List = rpds::VectorSync<Value>;

/// A persistent map from string keys to values.
pub type Map = rpds::HashTrieMapSync<String, Value>;

/// A dynamically typed runtime value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value; the initial content of declared variables.
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(List),
    Map(Map),
    /// Anything callable as a command: closures, native functions, external
    /// commands.
    Fn(Arc<dyn Callable>),
    /// A named namespace, as bound to `mod:` style variables.
    Ns(Ns),
    /// A pre-opened OS pipe; either end can be a redirection source.
    Pipe(Arc<PipeValue>),
    /// An open file usable as a redirection source.
    File(Arc<File>),
}

/// An OS pipe exposed as a first-class value.
#[derive(Debug)]
pub struct PipeValue {
    pub reader: File,
    pub writer: File,
}

impl Value {
    /// A short name for the value's type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::Float(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Fn(_) => "fn",
            Self::Ns(_) => "ns",
            Self::Pipe(_) => "pipe",
            Self::File(_) => "file",
        }
    }

    /// Whether the value counts as true in conditions. Only `$false` and
    /// `$nil` are false.
    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// The string form of a stringable value (strings and numbers), or
    /// `None` for everything else.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(n) => Some(fmt_float(*n)),
            _ => None,
        }
    }

    /// The integer form of the value, converting strings and integral
    /// floats.
    pub fn to_int(&self, what: &str) -> Result<i64, Error> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Float(n) if n.fract() == 0.0 => Ok(*n as i64),
            Self::Str(s) => Ok(s.trim().parse()?),
            other => Err(BadValue::new(what, "integer", other.kind()).into()),
        }
    }

    /// The float form of the value, converting integers and strings.
    pub fn to_float(&self, what: &str) -> Result<f64, Error> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Float(n) => Ok(*n),
            Self::Str(s) => Ok(s.trim().parse()?),
            other => Err(BadValue::new(what, "number", other.kind()).into()),
        }
    }

    /// The callable behind a `Fn` value.
    pub fn as_callable(&self) -> Option<Arc<dyn Callable>> {
        match self {
            Self::Fn(f) => Some(f.clone()),
            _ => None,
        }
    }

    /// How the value renders on an output stream: strings and numbers print
    /// bare, everything else prints its repr.
    pub fn to_display(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// A representation close to the source syntax that would produce the
    /// value.
    pub fn repr(&self) -> String {
        match self {
            Self::Nil => "$nil".to_string(),
            Self::Bool(true) => "$true".to_string(),
            Self::Bool(false) => "$false".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(n) => fmt_float(*n),
            Self::Str(s) => {
                if s.is_empty() || s.contains(char::is_whitespace) {
                    format!("'{s}'")
                } else {
                    s.clone()
                }
            }
            Self::List(items) => {
                let body: Vec<String> = items.iter().map(Self::repr).collect();
                format!("[{}]", body.join(" "))
            }
            Self::Map(map) => {
                let body: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("&{}={}", k, v.repr()))
                    .collect();
                format!("[{}]", body.join(" "))
            }
            Self::Fn(f) => format!("<fn {}>", f.name()),
            Self::Ns(_) => "<ns>".to_string(),
            Self::Pipe(_) => "<pipe>".to_string(),
            Self::File(_) => "<file>".to_string(),
        }
    }

    /// Indexes the value with another value. Lists take integer indices
    /// (negative counts from the back), maps take string keys.
    pub fn index(&self, index: &Value) -> Result<Value, Error> {
        match self {
            Self::List(items) => {
                let len = items.len() as i64;
                let raw = index.to_int("index")?;
                let i = if raw < 0 { raw + len } else { raw };
                if i < 0 || i >= len {
                    return Err(OutOfRange {
                        what: "index".to_string(),
                        min: (-len).to_string(),
                        max: (len - 1).to_string(),
                        actual: raw.to_string(),
                    }
                    .into());
                }
                Ok(items.get(i as usize).cloned().unwrap_or_default())
            }
            Self::Map(map) => {
                let key = index
                    .to_text()
                    .ok_or_else(|| BadValue::new("key", "string", index.kind()))?;
                map.get(&key)
                    .cloned()
                    .ok_or_else(|| Error::NoSuchKey(key))
            }
            other => Err(BadValue::new("indexed value", "list or map", other.kind()).into()),
        }
    }

    /// Returns a copy of the value with one element replaced. The receiver
    /// is unchanged.
    pub fn assoc(&self, index: &Value, val: Value) -> Result<Value, Error> {
        match self {
            Self::List(items) => {
                let len = items.len() as i64;
                let raw = index.to_int("index")?;
                let i = if raw < 0 { raw + len } else { raw };
                if i < 0 || i >= len {
                    return Err(OutOfRange {
                        what: "index".to_string(),
                        min: (-len).to_string(),
                        max: (len - 1).to_string(),
                        actual: raw.to_string(),
                    }
                    .into());
                }
                Ok(Self::List(items.set(i as usize, val).unwrap_or_else(|| items.clone())))
            }
            Self::Map(map) => {
                let key = index
                    .to_text()
                    .ok_or_else(|| BadValue::new("key", "string", index.kind()))?;
                Ok(Self::Map(map.insert(key, val)))
            }
            other => Err(BadValue::new("assoc target", "list or map", other.kind()).into()),
        }
    }
}

fn fmt_float(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fn(c) => write!(f, "Fn({})", c.name()),
            Self::Ns(_) => write!(f, "Ns(..)"),
            Self::Pipe(_) => write!(f, "Pipe(..)"),
            Self::File(_) => write!(f, "File(..)"),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Fn(a), Self::Fn(b)) => Arc::ptr_eq(a, b),
            (Self::Ns(a), Self::Ns(b)) => a.ptr_eq(b),
            (Self::Pipe(a), Self::Pipe(b)) => Arc::ptr_eq(a, b),
            (Self::File(a), Self::File(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Self::List(v)
    }
}

impl From<Map> for Value {
    fn from(v: Map) -> Self {
        Self::Map(v)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<T: IntoIterator<Item = Value>>(iter: T) -> Self {
        Self::List(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn list(items: &[Value]) -> Value {
        items.iter().cloned().collect()
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Bool(true).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::Str(String::new()).truthy());
    }

    #[test]
    fn list_indexing_supports_negative_indices() {
        let l = list(&["a".into(), "b".into(), "c".into()]);
        assert_eq!(l.index(&Value::Int(0)).unwrap(), "a".into());
        assert_eq!(l.index(&Value::Str("2".into())).unwrap(), "c".into());
        assert_eq!(l.index(&Value::Int(-1)).unwrap(), "c".into());
        assert!(matches!(
            l.index(&Value::Int(3)),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn assoc_leaves_the_original_untouched() {
        let l = list(&["a".into(), "b".into()]);
        let l2 = l.assoc(&Value::Int(1), "x".into()).unwrap();
        assert_eq!(l2.index(&Value::Int(1)).unwrap(), "x".into());
        assert_eq!(l.index(&Value::Int(1)).unwrap(), "b".into());
    }

    #[test]
    fn map_indexing() {
        let m = Value::Map(Map::new_sync().insert("k".to_string(), "v".into()));
        assert_eq!(m.index(&Value::Str("k".into())).unwrap(), "v".into());
        assert!(matches!(
            m.index(&Value::Str("missing".into())),
            Err(Error::NoSuchKey(_))
        ));
    }

    #[test]
    fn reprs() {
        assert_eq!(Value::Nil.repr(), "$nil");
        assert_eq!(Value::Bool(true).repr(), "$true");
        assert_eq!(Value::Int(233).repr(), "233");
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::Str("a b".into()).repr(), "'a b'");
        assert_eq!(list(&[Value::Int(1), "x".into()]).repr(), "[1 x]");
    }
}

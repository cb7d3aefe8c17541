//! KFX fragment representation.
//!
//! A fragment is the fundamental unit of KFX content: a typed, identified
//! value that becomes one entity in the container. Identifiers and symbol
//! values are kept as symbol *names*; numeric IDs are only assigned when the
//! document symbol table is built at packing time.

use std::collections::{BTreeMap, HashSet};

use crate::error::{Error, Result};
use crate::kfx::symbols::RAW_FRAGMENT_TYPES;

pub use crate::kfx::ion::Decimal;

/// Fragment payload value.
///
/// Struct fields are kept sorted by key name so that encoding the same
/// logical value always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    String(String),
    /// Symbol reference by name (`"$307"` or a local name like `"c12"`)
    Symbol(String),
    List(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Blob(Vec<u8>),
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    /// List of symbol references.
    pub fn symbol_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(names.into_iter().map(|n| Value::Symbol(n.into())).collect())
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    #[inline]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Struct field by key name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_struct()?.get(key)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<StructBuilder> for Value {
    fn from(builder: StructBuilder) -> Self {
        builder.build()
    }
}

/// Chained construction of struct values.
///
/// ```
/// use fb2kfx::kfx::fragment::StructBuilder;
/// use fb2kfx::kfx::symbols::sym;
///
/// let anchor = StructBuilder::new()
///     .symbol(sym::ANCHOR_NAME, "note1")
///     .structure(sym::POSITION, StructBuilder::new().int(sym::ID, 1042))
///     .build();
/// assert_eq!(anchor.get(sym::ANCHOR_NAME).and_then(|v| v.as_symbol()), Some("note1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StructBuilder {
    fields: BTreeMap<String, Value>,
}

impl StructBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int(self, key: impl Into<String>, value: i64) -> Self {
        self.set(key, Value::Int(value))
    }

    pub fn string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, Value::String(value.into()))
    }

    pub fn decimal(self, key: impl Into<String>, value: Decimal) -> Self {
        self.set(key, Value::Decimal(value))
    }

    pub fn boolean(self, key: impl Into<String>, value: bool) -> Self {
        self.set(key, Value::Bool(value))
    }

    /// Set a symbol reference.
    pub fn symbol(self, key: impl Into<String>, name: impl Into<String>) -> Self {
        self.set(key, Value::Symbol(name.into()))
    }

    /// Set a nested struct.
    pub fn structure(self, key: impl Into<String>, nested: StructBuilder) -> Self {
        self.set(key, nested.build())
    }

    pub fn list(self, key: impl Into<String>, items: Vec<Value>) -> Self {
        self.set(key, Value::List(items))
    }

    /// Set an arbitrary value, replacing any previous one.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Value {
        Value::Struct(self.fields)
    }
}

/// A KFX fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Fragment type symbol name (`"$266"`, `"$157"`, ...)
    pub ftype: String,
    /// Fragment id symbol name; equals `ftype` for singletons
    pub fid: String,
    pub value: Value,
}

impl Fragment {
    pub fn new(ftype: impl Into<String>, fid: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            ftype: ftype.into(),
            fid: fid.into(),
            value: value.into(),
        }
    }

    /// Fragment whose payload is stored verbatim (images, fonts).
    pub fn raw(ftype: impl Into<String>, fid: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(ftype, fid, Value::Blob(bytes))
    }

    /// Fragment of which only one instance exists per document.
    pub fn singleton(ftype: impl Into<String>, value: impl Into<Value>) -> Self {
        let ftype = ftype.into();
        Self {
            fid: ftype.clone(),
            ftype,
            value: value.into(),
        }
    }

    /// Whether this fragment type is written as raw bytes.
    pub fn is_raw(&self) -> bool {
        RAW_FRAGMENT_TYPES.contains(&self.ftype.as_str())
    }

    pub fn is_singleton(&self) -> bool {
        self.fid == self.ftype
    }

    /// Raw payload bytes, if the value is a blob.
    pub fn as_raw(&self) -> Option<&[u8]> {
        self.value.as_blob()
    }
}

/// Insertion-ordered fragments with unique `(ftype, fid)` keys.
#[derive(Debug, Clone, Default)]
pub struct FragmentList {
    fragments: Vec<Fragment>,
    keys: HashSet<(String, String)>,
}

impl FragmentList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment, rejecting a second one with the same type and id.
    pub fn push(&mut self, fragment: Fragment) -> Result<()> {
        let key = (fragment.ftype.clone(), fragment.fid.clone());
        if self.keys.contains(&key) {
            return Err(Error::DuplicateFragment {
                ftype: key.0,
                fid: key.1,
            });
        }
        self.keys.insert(key);
        self.fragments.push(fragment);
        Ok(())
    }

    pub fn extend<I: IntoIterator<Item = Fragment>>(&mut self, fragments: I) -> Result<()> {
        for fragment in fragments {
            self.push(fragment)?;
        }
        Ok(())
    }

    pub fn get(&self, ftype: &str, fid: &str) -> Option<&Fragment> {
        self.fragments
            .iter()
            .find(|f| f.ftype == ftype && f.fid == fid)
    }

    pub fn by_type<'a>(&'a self, ftype: &'a str) -> impl Iterator<Item = &'a Fragment> + 'a {
        self.fragments.iter().filter(move |f| f.ftype == ftype)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Fragment> {
        self.fragments.iter()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn as_slice(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_vec(self) -> Vec<Fragment> {
        self.fragments
    }
}

impl<'a> IntoIterator for &'a FragmentList {
    type Item = &'a Fragment;
    type IntoIter = std::slice::Iter<'a, Fragment>;

    fn into_iter(self) -> Self::IntoIter {
        self.fragments.iter()
    }
}

//! Wire-agnostic field representation of one entity.
//!
//! An entity flattens itself into a [`Bundle`]: an ordered map from field
//! names to [`Holder`] values, tagged with the entity's type name and version.
//! Fields of a base type live in a chained super bundle instead of being
//! merged into the derived type's fields.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::BundleError;
use crate::identity::TypeName;
use crate::reference::EntityRef;

/// Element kind of an array, identified on the wire by a single tag letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElemKind {
    Bool,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Str,
    Name,
    Ref,
}

impl ElemKind {
    pub fn tag(self) -> char {
        match self {
            ElemKind::Bool => 'b',
            ElemKind::Char => 'c',
            ElemKind::Byte => 'x',
            ElemKind::Short => 'h',
            ElemKind::Int => 'i',
            ElemKind::Long => 'l',
            ElemKind::Float => 'f',
            ElemKind::Double => 'd',
            ElemKind::Str => 's',
            ElemKind::Name => 'e',
            ElemKind::Ref => 'r',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        Some(match tag {
            'b' => ElemKind::Bool,
            'c' => ElemKind::Char,
            'x' => ElemKind::Byte,
            'h' => ElemKind::Short,
            'i' => ElemKind::Int,
            'l' => ElemKind::Long,
            'f' => ElemKind::Float,
            'd' => ElemKind::Double,
            's' => ElemKind::Str,
            'e' => ElemKind::Name,
            'r' => ElemKind::Ref,
            _ => return None,
        })
    }

    /// Whether the kind may appear in a primitive (`a`) array.
    pub fn is_primitive(self) -> bool {
        !matches!(self, ElemKind::Str | ElemKind::Name | ElemKind::Ref)
    }

    /// Whether `holder` is a non-null value of this kind.
    pub fn matches(self, holder: &Holder) -> bool {
        matches!(
            (self, holder),
            (ElemKind::Bool, Holder::Bool(_))
                | (ElemKind::Char, Holder::Char(_))
                | (ElemKind::Byte, Holder::Byte(_))
                | (ElemKind::Short, Holder::Short(_))
                | (ElemKind::Int, Holder::Int(_))
                | (ElemKind::Long, Holder::Long(_))
                | (ElemKind::Float, Holder::Float(_))
                | (ElemKind::Double, Holder::Double(_))
                | (ElemKind::Str, Holder::Str(_))
                | (ElemKind::Name, Holder::Name(_))
                | (ElemKind::Ref, Holder::Ref(_))
        )
    }
}

/// Array of non-null primitive values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum PrimitiveArray {
    Bool(Vec<bool>),
    Char(Vec<char>),
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl PrimitiveArray {
    pub fn kind(&self) -> ElemKind {
        match self {
            PrimitiveArray::Bool(_) => ElemKind::Bool,
            PrimitiveArray::Char(_) => ElemKind::Char,
            PrimitiveArray::Byte(_) => ElemKind::Byte,
            PrimitiveArray::Short(_) => ElemKind::Short,
            PrimitiveArray::Int(_) => ElemKind::Int,
            PrimitiveArray::Long(_) => ElemKind::Long,
            PrimitiveArray::Float(_) => ElemKind::Float,
            PrimitiveArray::Double(_) => ElemKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PrimitiveArray::Bool(v) => v.len(),
            PrimitiveArray::Char(v) => v.len(),
            PrimitiveArray::Byte(v) => v.len(),
            PrimitiveArray::Short(v) => v.len(),
            PrimitiveArray::Int(v) => v.len(),
            PrimitiveArray::Long(v) => v.len(),
            PrimitiveArray::Float(v) => v.len(),
            PrimitiveArray::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build an array of `kind` from scalar holders.
    ///
    /// Returns `None` if `kind` is not primitive or any item does not match it.
    pub fn from_holders(kind: ElemKind, items: Vec<Holder>) -> Option<Self> {
        fn collect<T>(items: Vec<Holder>, pick: impl Fn(Holder) -> Option<T>) -> Option<Vec<T>> {
            items.into_iter().map(pick).collect()
        }
        Some(match kind {
            ElemKind::Bool => PrimitiveArray::Bool(collect(items, |h| match h {
                Holder::Bool(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Char => PrimitiveArray::Char(collect(items, |h| match h {
                Holder::Char(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Byte => PrimitiveArray::Byte(collect(items, |h| match h {
                Holder::Byte(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Short => PrimitiveArray::Short(collect(items, |h| match h {
                Holder::Short(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Int => PrimitiveArray::Int(collect(items, |h| match h {
                Holder::Int(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Long => PrimitiveArray::Long(collect(items, |h| match h {
                Holder::Long(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Float => PrimitiveArray::Float(collect(items, |h| match h {
                Holder::Float(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Double => PrimitiveArray::Double(collect(items, |h| match h {
                Holder::Double(v) => Some(v),
                _ => None,
            })?),
            ElemKind::Str | ElemKind::Name | ElemKind::Ref => return None,
        })
    }
}

/// Array whose elements are either null or holders of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxedArray {
    kind: ElemKind,
    items: Vec<Holder>,
}

impl BoxedArray {
    /// Returns `None` when an item is neither null nor of `kind`.
    pub fn new(kind: ElemKind, items: Vec<Holder>) -> Option<Self> {
        if items
            .iter()
            .all(|item| item.is_null() || kind.matches(item))
        {
            Some(Self { kind, items })
        } else {
            None
        }
    }

    pub fn kind(&self) -> ElemKind {
        self.kind
    }

    pub fn items(&self) -> &[Holder] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One field value of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Holder {
    Null,
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    /// Symbolic name literal, e.g. an enumeration constant.
    Name(String),
    Array(PrimitiveArray),
    Boxed(BoxedArray),
    Ref(EntityRef),
}

impl Holder {
    pub fn is_null(&self) -> bool {
        matches!(self, Holder::Null)
    }

    /// Short human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Holder::Null => "null",
            Holder::Bool(_) => "bool",
            Holder::Char(_) => "char",
            Holder::Byte(_) => "byte",
            Holder::Short(_) => "short",
            Holder::Int(_) => "int",
            Holder::Long(_) => "long",
            Holder::Float(_) => "float",
            Holder::Double(_) => "double",
            Holder::Str(_) => "string",
            Holder::Name(_) => "name",
            Holder::Array(_) => "array",
            Holder::Boxed(_) => "boxed array",
            Holder::Ref(_) => "reference",
        }
    }

    /// Every reference held directly or inside a boxed array.
    pub fn references(&self) -> Vec<&EntityRef> {
        match self {
            Holder::Ref(r) => vec![r],
            Holder::Boxed(array) => array
                .items()
                .iter()
                .filter_map(|item| match item {
                    Holder::Ref(r) => Some(r),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

macro_rules! scalar_holder {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl From<$ty> for Holder {
            fn from(value: $ty) -> Self {
                Holder::$variant(value)
            }
        }

        impl FromHolder for $ty {
            fn from_holder(field: &str, holder: &Holder) -> Result<Self, BundleError> {
                match holder {
                    Holder::$variant(value) => Ok(value.clone()),
                    other => Err(wrong_kind(field, $label, other)),
                }
            }
        }
    };
}

macro_rules! array_holder {
    ($ty:ty, $variant:ident, $label:literal) => {
        impl From<Vec<$ty>> for Holder {
            fn from(value: Vec<$ty>) -> Self {
                Holder::Array(PrimitiveArray::$variant(value))
            }
        }

        impl FromHolder for Vec<$ty> {
            fn from_holder(field: &str, holder: &Holder) -> Result<Self, BundleError> {
                match holder {
                    Holder::Array(PrimitiveArray::$variant(values)) => Ok(values.clone()),
                    other => Err(wrong_kind(field, $label, other)),
                }
            }
        }
    };
}

fn wrong_kind(field: &str, expected: &'static str, actual: &Holder) -> BundleError {
    BundleError::WrongKind {
        field: field.to_string(),
        expected,
        actual: actual.kind_name(),
    }
}

/// Conversion from a field holder into a Rust value.
pub trait FromHolder: Sized {
    fn from_holder(field: &str, holder: &Holder) -> Result<Self, BundleError>;
}

scalar_holder!(bool, Bool, "bool");
scalar_holder!(char, Char, "char");
scalar_holder!(i8, Byte, "byte");
scalar_holder!(i16, Short, "short");
scalar_holder!(i32, Int, "int");
scalar_holder!(i64, Long, "long");
scalar_holder!(f32, Float, "float");
scalar_holder!(f64, Double, "double");
scalar_holder!(String, Str, "string");
scalar_holder!(EntityRef, Ref, "reference");

array_holder!(bool, Bool, "bool array");
array_holder!(char, Char, "char array");
array_holder!(i8, Byte, "byte array");
array_holder!(i16, Short, "short array");
array_holder!(i32, Int, "int array");
array_holder!(i64, Long, "long array");
array_holder!(f32, Float, "float array");
array_holder!(f64, Double, "double array");

impl From<&str> for Holder {
    fn from(value: &str) -> Self {
        Holder::Str(value.to_string())
    }
}

impl From<PrimitiveArray> for Holder {
    fn from(value: PrimitiveArray) -> Self {
        Holder::Array(value)
    }
}

impl From<BoxedArray> for Holder {
    fn from(value: BoxedArray) -> Self {
        Holder::Boxed(value)
    }
}

impl<T: Into<Holder>> From<Option<T>> for Holder {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Holder::Null)
    }
}

impl<T: FromHolder> FromHolder for Option<T> {
    fn from_holder(field: &str, holder: &Holder) -> Result<Self, BundleError> {
        match holder {
            Holder::Null => Ok(None),
            other => T::from_holder(field, other).map(Some),
        }
    }
}

impl FromHolder for BoxedArray {
    fn from_holder(field: &str, holder: &Holder) -> Result<Self, BundleError> {
        match holder {
            Holder::Boxed(array) => Ok(array.clone()),
            other => Err(wrong_kind(field, "boxed array", other)),
        }
    }
}

/// Whether `name` is a legal field name: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ordered named fields of one entity, optionally chained to a super bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    type_name: TypeName,
    version: u32,
    fields: IndexMap<String, Holder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    super_bundle: Option<Box<Bundle>>,
}

impl Bundle {
    pub fn new(type_name: TypeName, version: u32) -> Self {
        Self {
            type_name,
            version,
            fields: IndexMap::new(),
            super_bundle: None,
        }
    }

    /// Convenience constructor from a plain string type name.
    pub fn of(type_name: &str, version: u32) -> Result<Self, BundleError> {
        let name = TypeName::new(type_name)
            .ok_or_else(|| BundleError::InvalidName(type_name.to_string()))?;
        Ok(Self::new(name, version))
    }

    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Add a field. Names are trimmed and must be identifiers; duplicates
    /// are rejected.
    pub fn put(&mut self, name: &str, value: impl Into<Holder>) -> Result<&mut Self, BundleError> {
        let name = name.trim();
        if !is_identifier(name) {
            return Err(BundleError::InvalidName(name.to_string()));
        }
        if self.fields.contains_key(name) {
            return Err(BundleError::DuplicateField(name.to_string()));
        }
        self.fields.insert(name.to_string(), value.into());
        Ok(self)
    }

    /// Builder form of [`Bundle::put`].
    pub fn with(mut self, name: &str, value: impl Into<Holder>) -> Result<Self, BundleError> {
        self.put(name, value)?;
        Ok(self)
    }

    pub fn set_super(&mut self, bundle: Bundle) {
        self.super_bundle = Some(Box::new(bundle));
    }

    pub fn with_super(mut self, bundle: Bundle) -> Self {
        self.set_super(bundle);
        self
    }

    pub fn super_bundle(&self) -> Option<&Bundle> {
        self.super_bundle.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&Holder> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn require(&self, name: &str) -> Result<&Holder, BundleError> {
        self.fields.get(name).ok_or_else(|| BundleError::FieldMissing {
            field: name.to_string(),
        })
    }

    /// Typed access to a required field.
    pub fn value<T: FromHolder>(&self, name: &str) -> Result<T, BundleError> {
        T::from_holder(name, self.require(name)?)
    }

    /// Typed access to a field that may be absent; absence and null both
    /// read as `None`.
    pub fn value_opt<T: FromHolder>(&self, name: &str) -> Result<Option<T>, BundleError> {
        match self.fields.get(name) {
            None | Some(Holder::Null) => Ok(None),
            Some(holder) => T::from_holder(name, holder).map(Some),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, BundleError> {
        self.value(name)
    }

    pub fn get_int(&self, name: &str) -> Result<i32, BundleError> {
        self.value(name)
    }

    pub fn get_long(&self, name: &str) -> Result<i64, BundleError> {
        self.value(name)
    }

    pub fn get_double(&self, name: &str) -> Result<f64, BundleError> {
        self.value(name)
    }

    pub fn get_str(&self, name: &str) -> Result<&str, BundleError> {
        match self.require(name)? {
            Holder::Str(s) => Ok(s),
            other => Err(wrong_kind(name, "string", other)),
        }
    }

    /// Reference held by `name`; null or absent reads as `None`.
    pub fn get_ref(&self, name: &str) -> Result<Option<EntityRef>, BundleError> {
        self.value_opt(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Holder)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Depth of the super chain, 0 for a bundle without a super bundle.
    pub fn depth(&self) -> usize {
        std::iter::successors(self.super_bundle.as_deref(), |s| s.super_bundle.as_deref()).count()
    }
}
